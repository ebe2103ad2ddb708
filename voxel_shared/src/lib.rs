//! `voxel_shared`
//!
//! Core of the voxel sandbox, used by every peer and by the rendezvous server.
//!
//! Design goals:
//! - One writer: only a host owns a `Simulation` and an authoritative `World`.
//! - Deterministic terrain so a promoted host regenerates what it never saw.
//! - Static tables injected by constructor, never global.
//! - Exhaustively matched wire messages.
//! - No `unsafe`.

pub mod config;
pub mod crafting;
pub mod entity;
pub mod event;
pub mod inventory;
pub mod math;
pub mod mining;
pub mod net;
pub mod physics;
pub mod registry;
pub mod rendezvous;
pub mod sim;
pub mod snapshot;
pub mod topology;
pub mod world;
pub mod worldgen;

pub mod prelude {
    //! Commonly used exports.

    pub use crate::config::*;
    pub use crate::entity::*;
    pub use crate::inventory::{Inventory, Slot};
    pub use crate::math::*;
    pub use crate::net::{LinkEvent, NetMsg};
    pub use crate::registry::{BlockId, ItemId, Registry};
    pub use crate::sim::{Action, Rejection, Simulation, SyncState};
    pub use crate::world::{ChunkKey, World, WorldView};
}
