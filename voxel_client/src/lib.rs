//! `voxel_client`
//!
//! Peer-side systems:
//! - Rendezvous signaling and role/topology transitions
//! - Read-only world replica and action submission while a client
//! - Host promotion from the replica on migration
//! - Held-key input, local mining progress, and console commands

pub mod client;
pub mod console;
pub mod input;
pub mod peer;
pub mod signaling;

pub use client::ClientSession;
pub use peer::{Authority, Peer};
pub use signaling::{RendezvousClient, Signaling};
