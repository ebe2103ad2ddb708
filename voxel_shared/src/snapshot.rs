//! Local snapshot persistence.
//!
//! A snapshot is the world seed, every loaded chunk's cells, and the saving
//! peer's own position and inventory, as JSON. Loading one starts a detached
//! single-peer host.

use std::{fs, path::Path, sync::Arc};

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    config::SimConfig,
    entity::PeerId,
    inventory::Inventory,
    math::Vec2,
    registry::{BlockId, Registry},
    sim::Simulation,
    world::{Chunk, ChunkKey, ChunkStore, World},
    worldgen::TerrainGenerator,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub cx: i32,
    pub cy: i32,
    pub cells: Vec<BlockId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerRecord {
    pub position: Vec2,
    pub inventory: Inventory,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub saved_at: DateTime<Utc>,
    pub seed: u64,
    pub chunks: Vec<ChunkRecord>,
    pub player: Option<PlayerRecord>,
}

impl Snapshot {
    /// Captures the host world and `me`'s player.
    pub fn capture(sim: &Simulation, me: PeerId) -> Self {
        let player = sim.player(me).map(|p| PlayerRecord {
            position: p.body.pos,
            inventory: p.inventory.clone(),
        });
        Self::from_store(sim.world().generator().seed(), sim.world().store(), player)
    }

    /// Captures any chunk store, e.g. a client's replicated view.
    pub fn from_store(seed: u64, store: &ChunkStore, player: Option<PlayerRecord>) -> Self {
        let chunks = store
            .iter_sorted()
            .into_iter()
            .map(|(key, chunk)| ChunkRecord {
                cx: key.cx,
                cy: key.cy,
                cells: chunk.cells().to_vec(),
            })
            .collect();
        Self {
            saved_at: Utc::now(),
            seed,
            chunks,
            player,
        }
    }

    /// Writes the snapshot as JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_vec_pretty(self).context("serialize snapshot")?;
        fs::write(path, json).with_context(|| format!("write snapshot {}", path.display()))?;
        info!(path = %path.display(), chunks = self.chunks.len(), "Snapshot saved");
        Ok(())
    }

    /// Reads a snapshot written by `save`.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path).with_context(|| format!("read snapshot {}", path.display()))?;
        serde_json::from_slice(&bytes).with_context(|| format!("parse snapshot {}", path.display()))
    }

    /// Rebuilds a host simulation with `me` placed as saved.
    pub fn restore(&self, registry: Arc<Registry>, cfg: SimConfig, me: PeerId) -> Simulation {
        let mut world = World::new(registry, TerrainGenerator::new(self.seed));
        for rec in &self.chunks {
            match Chunk::from_cells(&rec.cells) {
                Some(chunk) => world.insert_chunk(ChunkKey::new(rec.cx, rec.cy), chunk),
                None => warn!(cx = rec.cx, cy = rec.cy, "Skipping malformed chunk in snapshot"),
            }
        }

        let mut sim = Simulation::from_world(world, cfg);
        sim.spawn_player(me);
        if let (Some(rec), Some(p)) = (&self.player, sim.player_mut(me)) {
            p.body.reset(rec.position);
            p.inventory = rec.inventory.clone();
        }
        sim
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{inventory::Slot, registry::ItemId};

    #[test]
    fn save_load_restore_keeps_edits_and_player() -> anyhow::Result<()> {
        let registry = Arc::new(Registry::standard());
        let cfg = SimConfig {
            initial_mobs: false,
            ..SimConfig::default()
        };
        let me = PeerId(9);
        let mut sim = Simulation::new(registry.clone(), 77, cfg.clone());
        sim.spawn_player(me);
        sim.world_mut().set_block(30, 20, BlockId::BRICK);
        {
            let p = sim.player_mut(me).unwrap();
            p.body.pos = Vec2::new(31.0, 12.0);
            p.inventory.set(4, Slot::new(ItemId::STICK, 3));
        }

        let path = std::env::temp_dir().join(format!("voxel-snapshot-{}.json", std::process::id()));
        Snapshot::capture(&sim, me).save(&path)?;
        let loaded = Snapshot::load(&path)?;
        let _ = fs::remove_file(&path);

        assert_eq!(loaded.seed, 77);
        let restored = loaded.restore(registry, cfg, me);
        assert_eq!(restored.world().get_block(30, 20), BlockId::BRICK);
        let p = restored.player(me).unwrap();
        assert_eq!(p.body.pos, Vec2::new(31.0, 12.0));
        assert_eq!(p.inventory.count_of(ItemId::STICK), 3);
        Ok(())
    }

    #[test]
    fn missing_file_reports_path() {
        let err = Snapshot::load("/nonexistent/voxel.json").unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/voxel.json"));
    }
}
