//! Simulated entities: players, drops, mobs.
//!
//! These are plain data. The `Simulation` owns and mutates them; SYNC carries
//! them to other peers verbatim.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    crafting::{CraftGrid, GRID_CELLS},
    inventory::{Inventory, Slot},
    math::Vec2,
    physics::Body,
    registry::ItemId,
};

/// Player width and height in blocks.
pub const PLAYER_SIZE: Vec2 = Vec2::new(0.875, 1.75);
/// Mob width and height in blocks.
pub const MOB_SIZE: Vec2 = Vec2::new(0.875, 0.875);
/// Drop width and height in blocks.
pub const DROP_SIZE: Vec2 = Vec2::new(0.5, 0.5);
pub const PLAYER_MAX_HEALTH: i32 = 20;

/// Peer identity handed out by the rendezvous service. Also the id of the
/// peer's player entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(pub u64);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DropId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MobId(pub u64);

/// Raw key state sampled by a peer each frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct KeyState {
    #[serde(default)]
    pub left: bool,
    #[serde(default)]
    pub right: bool,
    #[serde(default)]
    pub jump: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub id: PeerId,
    pub body: Body,
    pub health: i32,
    pub max_health: i32,
    pub inventory: Inventory,
    pub selected: usize,
    pub craft: CraftGrid,
    /// Last key state received; re-applied every tick until replaced.
    #[serde(default)]
    pub input: KeyState,
}

impl Player {
    /// Fresh player at `pos` with full health and an empty inventory.
    pub fn new(id: PeerId, pos: Vec2) -> Self {
        Self {
            id,
            body: Body::new(pos, PLAYER_SIZE),
            health: PLAYER_MAX_HEALTH,
            max_health: PLAYER_MAX_HEALTH,
            inventory: Inventory::new(),
            selected: 0,
            craft: [Slot::EMPTY; GRID_CELLS],
            input: KeyState::default(),
        }
    }

    /// Item in the selected slot, `NONE` when empty.
    pub fn held_item(&self) -> ItemId {
        self.inventory
            .slot(self.selected)
            .map(|s| s.item_id)
            .unwrap_or(ItemId::NONE)
    }

    /// Puts the player back at `pos` with full health.
    pub fn respawn(&mut self, pos: Vec2) {
        self.body.reset(pos);
        self.health = self.max_health;
    }
}

/// A pickup-able item lying in the world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Drop {
    pub id: DropId,
    pub body: Body,
    pub item: ItemId,
    pub count: u32,
    /// Ticks left before the drop despawns.
    pub ttl: u32,
    /// Ticks left before anyone can pick it up.
    pub pickup_delay: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MobKind {
    /// Walks toward and attacks nearby players.
    Zombie,
    /// Wanders, never attacks.
    Pig,
}

impl MobKind {
    /// Health a mob of this kind spawns with.
    pub fn max_health(self) -> i32 {
        match self {
            MobKind::Zombie => 20,
            MobKind::Pig => 10,
        }
    }

    /// Whether this kind chases and attacks players.
    pub fn hostile(self) -> bool {
        matches!(self, MobKind::Zombie)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mob {
    pub id: MobId,
    pub kind: MobKind,
    pub body: Body,
    pub health: i32,
    /// Ticks until the mob may attack again.
    pub attack_cooldown: u32,
    /// Walk direction of a passive mob: -1, 0 or 1.
    #[serde(default)]
    pub heading: i8,
}

impl Mob {
    /// Mob at full health.
    pub fn new(id: MobId, kind: MobKind, pos: Vec2) -> Self {
        Self {
            id,
            kind,
            body: Body::new(pos, MOB_SIZE),
            health: kind.max_health(),
            attack_cooldown: 0,
            heading: 0,
        }
    }
}

/// Target of an attack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum EntityRef {
    Player(PeerId),
    Mob(MobId),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_ref_wire_shape() {
        let json = serde_json::to_string(&EntityRef::Mob(MobId(7))).unwrap();
        assert_eq!(json, r#"{"kind":"mob","id":7}"#);
        let back: EntityRef = serde_json::from_str(r#"{"kind":"player","id":3}"#).unwrap();
        assert_eq!(back, EntityRef::Player(PeerId(3)));
    }

    #[test]
    fn missing_keys_default_to_released() {
        let keys: KeyState = serde_json::from_str(r#"{"right":true}"#).unwrap();
        assert_eq!(
            keys,
            KeyState {
                right: true,
                ..KeyState::default()
            }
        );
    }

    #[test]
    fn respawn_restores_health_and_stops_motion() {
        let mut p = Player::new(PeerId(1), Vec2::new(0.0, 0.0));
        p.health = 3;
        p.body.vel = Vec2::new(1.0, 1.0);
        p.respawn(Vec2::new(32.0, 10.0));
        assert_eq!(p.health, PLAYER_MAX_HEALTH);
        assert_eq!(p.body.vel, Vec2::ZERO);
        assert_eq!(p.body.pos, Vec2::new(32.0, 10.0));
    }
}
