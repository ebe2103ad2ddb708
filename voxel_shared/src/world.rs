//! World store.
//!
//! The grid is split into `CHUNK_SIZE` x `CHUNK_SIZE` chunks held in a map keyed
//! by integer chunk coordinates. Two owners exist:
//! - `WorldView`: what a non-host peer holds. Filled only by replicated
//!   CHUNK_DATA / BLOCK messages; it can never generate terrain.
//! - `World`: the host's authoritative store. Missing chunks are generated
//!   deterministically, and every mutation is journaled so the host can
//!   replicate it.
//!
//! A promoted host turns its `WorldView` into a `World`, keeping every chunk
//! it already held.
//!
//! Generated structures (trees) may spill into a neighbouring chunk that is
//! already loaded. The spill only lands on cells nobody has written since
//! generation; chunks that came from elsewhere (a replica or a snapshot) are
//! never written by a spill because their edit history is unknown.

use std::{
    collections::{hash_map::Entry, HashMap, HashSet},
    sync::Arc,
};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    registry::{BlockId, Registry},
    worldgen::TerrainGenerator,
};

/// Cells along each chunk edge.
pub const CHUNK_SIZE: i32 = 16;
/// Cells in one chunk.
pub const CHUNK_CELLS: usize = (CHUNK_SIZE * CHUNK_SIZE) as usize;

/// Integer chunk coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkKey {
    pub cx: i32,
    pub cy: i32,
}

impl ChunkKey {
    /// Key from chunk coordinates.
    pub const fn new(cx: i32, cy: i32) -> Self {
        Self { cx, cy }
    }

    /// Chunk containing a global cell.
    pub const fn containing(gx: i32, gy: i32) -> Self {
        Self {
            cx: gx.div_euclid(CHUNK_SIZE),
            cy: gy.div_euclid(CHUNK_SIZE),
        }
    }

    /// Global coordinate of the chunk's top-left cell.
    pub const fn origin(&self) -> (i32, i32) {
        (self.cx * CHUNK_SIZE, self.cy * CHUNK_SIZE)
    }

    /// Chunks whose keys lie within `radius` of this one on both axes.
    pub fn around(self, radius: i32) -> impl Iterator<Item = ChunkKey> {
        let Self { cx, cy } = self;
        (-radius..=radius)
            .flat_map(move |dy| (-radius..=radius).map(move |dx| ChunkKey::new(cx + dx, cy + dy)))
    }
}

/// Index of a global cell inside its chunk's array.
pub const fn local_index(gx: i32, gy: i32) -> usize {
    (gy.rem_euclid(CHUNK_SIZE) * CHUNK_SIZE + gx.rem_euclid(CHUNK_SIZE)) as usize
}

/// One chunk's cells in row-major order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    cells: Box<[BlockId; CHUNK_CELLS]>,
}

impl Chunk {
    /// Chunk with every cell set to `block`.
    pub fn new_filled(block: BlockId) -> Self {
        Self {
            cells: Box::new([block; CHUNK_CELLS]),
        }
    }

    /// All Air.
    pub fn new_empty() -> Self {
        Self::new_filled(BlockId::AIR)
    }

    /// Builds a chunk from a replicated cell array. Rejects the wrong length.
    pub fn from_cells(cells: &[BlockId]) -> Option<Self> {
        let cells: [BlockId; CHUNK_CELLS] = cells.try_into().ok()?;
        Some(Self {
            cells: Box::new(cells),
        })
    }

    #[inline]
    pub fn get(&self, lx: i32, ly: i32) -> BlockId {
        self.cells[(ly * CHUNK_SIZE + lx) as usize]
    }

    #[inline]
    pub fn set(&mut self, lx: i32, ly: i32, block: BlockId) {
        self.cells[(ly * CHUNK_SIZE + lx) as usize] = block;
    }

    /// Cells in row-major order.
    pub fn cells(&self) -> &[BlockId] {
        &self.cells[..]
    }
}

/// Anything collision and rules can read cells from.
pub trait BlockSource {
    fn block_at(&self, gx: i32, gy: i32) -> BlockId;
}

/// Map of loaded chunks. No generation policy of its own.
#[derive(Debug, Clone, Default)]
pub struct ChunkStore {
    chunks: HashMap<ChunkKey, Chunk>,
}

impl ChunkStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cell value, or Air when the chunk is not loaded.
    pub fn get_block(&self, gx: i32, gy: i32) -> BlockId {
        self.chunks
            .get(&ChunkKey::containing(gx, gy))
            .map(|c| c.cells[local_index(gx, gy)])
            .unwrap_or(BlockId::AIR)
    }

    /// Writes a cell in place. Returns false (and does nothing) when the
    /// chunk is not loaded.
    pub fn set_block(&mut self, gx: i32, gy: i32, block: BlockId) -> bool {
        match self.chunks.get_mut(&ChunkKey::containing(gx, gy)) {
            Some(chunk) => {
                chunk.cells[local_index(gx, gy)] = block;
                true
            }
            None => false,
        }
    }

    /// Chunk at `key`, if loaded.
    pub fn get(&self, key: ChunkKey) -> Option<&Chunk> {
        self.chunks.get(&key)
    }

    /// Whether `key` is loaded.
    pub fn contains(&self, key: ChunkKey) -> bool {
        self.chunks.contains_key(&key)
    }

    /// Adds or replaces a chunk.
    pub fn insert(&mut self, key: ChunkKey, chunk: Chunk) {
        self.chunks.insert(key, chunk);
    }

    /// Loaded chunk count.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Loaded chunks in key order.
    pub fn iter_sorted(&self) -> Vec<(ChunkKey, &Chunk)> {
        let mut out: Vec<_> = self.chunks.iter().map(|(k, c)| (*k, c)).collect();
        out.sort_by_key(|(k, _)| *k);
        out
    }
}

impl BlockSource for ChunkStore {
    fn block_at(&self, gx: i32, gy: i32) -> BlockId {
        self.get_block(gx, gy)
    }
}

/// Read-only replica of the host's world.
#[derive(Debug, Clone, Default)]
pub struct WorldView {
    store: ChunkStore,
}

impl WorldView {
    /// Empty replica.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_block(&self, gx: i32, gy: i32) -> BlockId {
        self.store.get_block(gx, gy)
    }

    /// Applies a CHUNK_DATA payload. Malformed cell arrays are dropped.
    pub fn apply_chunk(&mut self, key: ChunkKey, cells: &[BlockId]) -> bool {
        match Chunk::from_cells(cells) {
            Some(chunk) => {
                self.store.insert(key, chunk);
                true
            }
            None => {
                debug!(cx = key.cx, cy = key.cy, len = cells.len(), "Dropping malformed chunk");
                false
            }
        }
    }

    /// Applies a BLOCK payload. Cells in chunks this peer never received are
    /// dropped.
    pub fn apply_block(&mut self, gx: i32, gy: i32, block: BlockId) -> bool {
        self.store.set_block(gx, gy, block)
    }

    /// Held chunks.
    pub fn store(&self) -> &ChunkStore {
        &self.store
    }

    /// Takes authority over the held chunks. Chunks this peer never received
    /// will be regenerated on demand.
    pub fn into_authoritative(self, registry: Arc<Registry>, generator: TerrainGenerator) -> World {
        World::with_store(registry, generator, self.store)
    }
}

/// Journaled world mutation, replicated by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorldEvent {
    /// A cell of an already loaded chunk changed.
    BlockChanged { x: i32, y: i32, id: BlockId },
    /// A chunk was generated for the first time.
    ChunkGenerated(ChunkKey),
}

/// The host's authoritative world store.
pub struct World {
    registry: Arc<Registry>,
    generator: TerrainGenerator,
    store: ChunkStore,
    journal: Vec<WorldEvent>,
    /// Cells written through `set_block` since their chunk was generated.
    edited: HashSet<(i32, i32)>,
    /// Chunks installed as-is rather than generated here.
    foreign: HashSet<ChunkKey>,
}

impl World {
    /// Empty world that generates chunks on demand.
    pub fn new(registry: Arc<Registry>, generator: TerrainGenerator) -> Self {
        Self::with_store(registry, generator, ChunkStore::new())
    }

    /// Wraps chunks received from elsewhere. They are kept verbatim.
    pub fn with_store(registry: Arc<Registry>, generator: TerrainGenerator, store: ChunkStore) -> Self {
        let foreign = store.chunks.keys().copied().collect();
        Self {
            registry,
            generator,
            store,
            journal: Vec::new(),
            edited: HashSet::new(),
            foreign,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn shared_registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    /// Terrain generator for missing chunks.
    pub fn generator(&self) -> &TerrainGenerator {
        &self.generator
    }

    pub fn store(&self) -> &ChunkStore {
        &self.store
    }

    /// Cell value, 0 when the chunk is not loaded.
    pub fn get_block(&self, gx: i32, gy: i32) -> BlockId {
        self.store.get_block(gx, gy)
    }

    /// Whether the cell blocks movement.
    pub fn is_solid(&self, gx: i32, gy: i32) -> bool {
        self.registry.blocks.is_solid(self.get_block(gx, gy))
    }

    /// Mutates a loaded cell and journals it. No-op when unloaded. The cell
    /// is never touched by generation afterwards.
    pub fn set_block(&mut self, gx: i32, gy: i32, block: BlockId) -> bool {
        if !self.write_cell(gx, gy, block) {
            return false;
        }
        self.edited.insert((gx, gy));
        true
    }

    /// True once `set_block` has written the cell.
    pub fn is_edited(&self, gx: i32, gy: i32) -> bool {
        self.edited.contains(&(gx, gy))
    }

    fn write_cell(&mut self, gx: i32, gy: i32, block: BlockId) -> bool {
        if !self.store.set_block(gx, gy, block) {
            return false;
        }
        self.journal.push(WorldEvent::BlockChanged { x: gx, y: gy, id: block });
        true
    }

    /// Returns the cached chunk, generating it first if absent.
    ///
    /// Structure cells that fall into neighbouring chunks are written only
    /// into a loaded, locally generated neighbour, onto an Air cell that was
    /// never edited. Everything else is lost.
    pub fn get_or_create_chunk(&mut self, key: ChunkKey) -> &Chunk {
        if !self.store.contains(key) {
            let generated = self.generator.generate(key);
            self.store.insert(key, generated.chunk);
            self.journal.push(WorldEvent::ChunkGenerated(key));

            let mut dropped = 0usize;
            for (gx, gy, block) in generated.overflow {
                let neighbour = ChunkKey::containing(gx, gy);
                if self.foreign.contains(&neighbour) || self.edited.contains(&(gx, gy)) {
                    continue;
                }
                let empty = self
                    .store
                    .get(neighbour)
                    .map(|c| c.cells[local_index(gx, gy)].is_air());
                match empty {
                    Some(true) => {
                        self.write_cell(gx, gy, block);
                    }
                    Some(false) => {}
                    None => dropped += 1,
                }
            }
            if dropped > 0 {
                debug!(cx = key.cx, cy = key.cy, dropped, "Structure cells fell into unloaded chunks");
            }
        }

        match self.store.chunks.entry(key) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => e.insert(Chunk::new_empty()),
        }
    }

    /// Generates every missing chunk within `radius` of `center`. Returns how
    /// many were created.
    pub fn ensure_loaded(&mut self, center: ChunkKey, radius: i32) -> usize {
        let missing: Vec<ChunkKey> = center.around(radius).filter(|k| !self.store.contains(*k)).collect();
        for key in &missing {
            self.get_or_create_chunk(*key);
        }
        missing.len()
    }

    /// Installs a chunk verbatim (snapshot restore).
    pub fn insert_chunk(&mut self, key: ChunkKey, chunk: Chunk) {
        self.foreign.insert(key);
        self.store.insert(key, chunk);
    }

    /// Mutations since the last call, in order.
    pub fn drain_journal(&mut self) -> Vec<WorldEvent> {
        std::mem::take(&mut self.journal)
    }
}

impl BlockSource for World {
    fn block_at(&self, gx: i32, gy: i32) -> BlockId {
        self.get_block(gx, gy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn world(seed: u64) -> World {
        World::new(Arc::new(Registry::standard()), TerrainGenerator::new(seed))
    }

    #[test]
    fn chunk_key_handles_negative_coordinates() {
        assert_eq!(ChunkKey::containing(-1, -17), ChunkKey::new(-1, -2));
        assert_eq!(ChunkKey::containing(15, 16), ChunkKey::new(0, 1));
        assert_eq!(local_index(-1, 0), 15);
    }

    #[test]
    fn unloaded_reads_are_air_and_writes_are_noops() {
        let mut w = world(1);
        assert_eq!(w.get_block(5, 5), BlockId::AIR);
        assert!(!w.set_block(5, 5, BlockId::STONE));
        assert!(w.drain_journal().is_empty());
    }

    #[test]
    fn set_block_on_loaded_chunk_is_journaled() {
        let mut w = world(1);
        w.get_or_create_chunk(ChunkKey::new(0, 0));
        w.drain_journal();
        assert!(w.set_block(3, 5, BlockId::GLASS));
        assert_eq!(w.get_block(3, 5), BlockId::GLASS);
        assert_eq!(
            w.drain_journal(),
            vec![WorldEvent::BlockChanged { x: 3, y: 5, id: BlockId::GLASS }]
        );
    }

    #[test]
    fn generation_is_cached() {
        let mut w = world(7);
        let key = ChunkKey::new(1, 2);
        w.get_or_create_chunk(key);
        w.set_block(17, 33, BlockId::GLASS);
        w.get_or_create_chunk(key);
        assert_eq!(w.get_block(17, 33), BlockId::GLASS);
    }

    #[test]
    fn view_rejects_malformed_chunk_and_unloaded_block() {
        let mut v = WorldView::new();
        assert!(!v.apply_chunk(ChunkKey::new(0, 0), &[BlockId::STONE; 3]));
        assert!(!v.apply_block(1, 1, BlockId::STONE));
        assert!(v.apply_chunk(ChunkKey::new(0, 0), &[BlockId::STONE; CHUNK_CELLS]));
        assert!(v.apply_block(1, 1, BlockId::AIR));
        assert_eq!(v.get_block(1, 1), BlockId::AIR);
        assert_eq!(v.get_block(2, 1), BlockId::STONE);
    }

    #[test]
    fn promoted_view_keeps_held_chunks() {
        let mut v = WorldView::new();
        v.apply_chunk(ChunkKey::new(0, 0), &[BlockId::BRICK; CHUNK_CELLS]);
        let w = v.into_authoritative(Arc::new(Registry::standard()), TerrainGenerator::new(3));
        assert_eq!(w.get_block(4, 4), BlockId::BRICK);
        assert_eq!(w.store().len(), 1);
    }

    /// A tree rooted in one chunk whose cell at `(x, y)` lands in a
    /// neighbour generated earlier.
    fn spilling_tree(seed: u64) -> (ChunkKey, ChunkKey, i32, i32, BlockId) {
        let gen = TerrainGenerator::new(seed);
        (-2000..2000)
            .filter(|&gx| gen.has_tree(gx))
            .find_map(|gx| {
                let root = ChunkKey::containing(gx, gen.surface_height(gx));
                gen.generate(root).overflow.into_iter().find_map(|(x, y, block)| {
                    let neighbour = ChunkKey::containing(x, y);
                    let mut w = world(seed);
                    w.get_or_create_chunk(neighbour);
                    let before = w.get_block(x, y);
                    w.get_or_create_chunk(root);
                    (before.is_air() && w.get_block(x, y) == block).then_some((root, neighbour, x, y, block))
                })
            })
            .expect("some tree crossing a chunk edge")
    }

    #[test]
    fn structure_spills_into_loaded_neighbour() {
        let (root, neighbour, x, y, block) = spilling_tree(7);
        let mut w = world(7);
        w.get_or_create_chunk(neighbour);
        w.drain_journal();
        w.get_or_create_chunk(root);
        assert_eq!(w.get_block(x, y), block);
        assert!(w
            .drain_journal()
            .contains(&WorldEvent::BlockChanged { x, y, id: block }));
        assert!(!w.is_edited(x, y));
    }

    #[test]
    fn structure_spill_skips_edited_cells() {
        let (root, neighbour, x, y, _) = spilling_tree(7);
        let mut w = world(7);
        w.get_or_create_chunk(neighbour);
        assert!(w.set_block(x, y, BlockId::DIRT));
        assert!(w.set_block(x, y, BlockId::AIR));
        w.drain_journal();

        w.get_or_create_chunk(root);
        assert_eq!(w.get_block(x, y), BlockId::AIR);
        assert!(!w
            .drain_journal()
            .iter()
            .any(|e| matches!(e, WorldEvent::BlockChanged { .. })));
    }

    #[test]
    fn structure_spill_skips_replicated_chunks() {
        let (root, neighbour, x, y, _) = spilling_tree(7);
        let mut generated = world(7);
        let cells = generated.get_or_create_chunk(neighbour).cells().to_vec();

        let mut v = WorldView::new();
        v.apply_chunk(neighbour, &cells);
        let mut w = v.into_authoritative(Arc::new(Registry::standard()), TerrainGenerator::new(7));
        w.get_or_create_chunk(root);
        assert_eq!(w.get_block(x, y), BlockId::AIR);
    }

    #[test]
    fn ensure_loaded_counts_new_chunks_only() {
        let mut w = world(2);
        assert_eq!(w.ensure_loaded(ChunkKey::new(0, 0), 1), 9);
        assert_eq!(w.ensure_loaded(ChunkKey::new(1, 0), 1), 3);
    }
}
