//! `voxel_rendezvous`
//!
//! Signaling only: room membership, HOST/CLIENT assignment, host migration to
//! the oldest remaining member, and opaque payload relay between members. No
//! game data passes through here.

pub mod rooms;
pub mod server;

pub use rooms::{Outbound, Rooms};
pub use server::{RendezvousHandle, RendezvousServer};
