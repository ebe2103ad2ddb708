//! Configuration.
//!
//! Loaded from JSON strings; every field has a default so partial files work.
//! File IO is left to the binaries.

use serde::{Deserialize, Serialize};

use crate::{math::Vec2, physics::PhysicsConfig};

/// How much the host re-checks discrete actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strictness {
    /// Only refuses unbreakable blocks and impossible placements.
    Trusting,
    /// Also enforces the interaction range on mining.
    #[default]
    Ranged,
    /// Also requires a matching tool to mine and range-checks placement.
    Strict,
}

/// Gameplay rules and constants for the host simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Chunks within this many chunk steps of a player stay loaded.
    pub chunk_radius: i32,
    pub interaction_range: f32,
    /// Attack reach, per axis, between box centers.
    pub attack_range: f32,
    pub pickup_radius: f32,
    pub drop_lifetime_ticks: u32,
    pub pickup_delay_ticks: u32,
    pub move_speed: f32,
    pub jump_speed: f32,
    pub knockback: Vec2,
    pub spawn_point: Vec2,
    pub mob_attack_damage: i32,
    pub mob_attack_cooldown: u32,
    pub mob_attack_range: f32,
    pub mob_aggro_range: f32,
    pub mob_walk_speed: f32,
    pub mob_jump_speed: f32,
    pub mob_knockback: Vec2,
    /// Mobs spawned when a fresh host world starts.
    pub initial_mobs: bool,
    pub strictness: Strictness,
    pub physics: PhysicsConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            chunk_radius: 2,
            interaction_range: 6.25,
            attack_range: 1.875,
            pickup_radius: 1.25,
            drop_lifetime_ticks: 18_000,
            pickup_delay_ticks: 40,
            move_speed: 0.125,
            jump_speed: 0.3125,
            knockback: Vec2::new(5.0 / 32.0, -3.0 / 32.0),
            spawn_point: Vec2::new(32.0, 10.0),
            mob_attack_damage: 2,
            mob_attack_cooldown: 60,
            mob_attack_range: 1.25,
            mob_aggro_range: 9.375,
            mob_walk_speed: 0.0625,
            mob_jump_speed: 0.25,
            mob_knockback: Vec2::new(5.0 / 32.0, -5.0 / 32.0),
            initial_mobs: true,
            strictness: Strictness::default(),
            physics: PhysicsConfig::default(),
        }
    }
}

/// Root configuration of a peer process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerConfig {
    /// Rendezvous server address, e.g. `127.0.0.1:3000`.
    pub rendezvous_addr: String,
    pub room: String,
    /// Where this peer accepts data-channel connections if it becomes host.
    pub listen_addr: String,
    /// Fixed simulation tick rate.
    pub tick_hz: u32,
    /// SYNC broadcast rate; never above `tick_hz`.
    pub sync_hz: u32,
    pub seed: u64,
    /// Snapshot to load on start. Loading makes this peer a detached host.
    pub snapshot_path: Option<String>,
    pub sim: SimConfig,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            rendezvous_addr: "127.0.0.1:3000".to_string(),
            room: "lobby".to_string(),
            listen_addr: "127.0.0.1:0".to_string(),
            tick_hz: 60,
            sync_hz: 20,
            seed: 20_240_601,
            snapshot_path: None,
            sim: SimConfig::default(),
        }
    }
}

impl PeerConfig {
    /// Parses config from JSON.
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }

    /// Simulation ticks between two SYNC broadcasts.
    pub fn sync_every(&self) -> u32 {
        let tick = self.tick_hz.max(1);
        let sync = self.sync_hz.clamp(1, tick);
        (tick / sync).max(1)
    }
}
