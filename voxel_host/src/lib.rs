//! `voxel_host`
//!
//! Host-side session:
//! - Owns the only `Simulation` in a room
//! - Applies peers' INPUT and action messages
//! - Replicates CHUNK_DATA / BLOCK immediately and SYNC on a fixed cadence
//!
//! Transport is abstracted as one unbounded outbound queue per peer, so the
//! session runs the same over TCP links and in-memory channels.

pub mod host;

pub use host::HostSession;
