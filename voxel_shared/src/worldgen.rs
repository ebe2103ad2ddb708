//! Deterministic terrain generation.
//!
//! Every cell is a pure function of the world seed and its coordinates, so a
//! migrated host (or anyone regenerating a chunk it never received) produces
//! the same unmodified terrain as the departed host did.
//!
//! Layout per column, top to bottom (y grows downward): air above a surface
//! height taken from 1-D value noise of x, grass (or sand on low ground) at the
//! surface, a dirt/sand band, then stone with ore rolls, a bedrock row, and
//! the void below it. Trees and plants are rooted on the surface cell; the
//! parts that land outside the chunk being generated are returned separately.

use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::{
    registry::BlockId,
    world::{Chunk, ChunkKey, CHUNK_SIZE},
};

/// Mean surface row.
pub const SURFACE_BASE: i32 = 32;
/// Surface rows span `SURFACE_BASE - AMPLITUDE/2 .. SURFACE_BASE + AMPLITUDE/2`.
pub const SURFACE_AMPLITUDE: i32 = 8;
/// Columns whose surface is at or below this row are sandy.
pub const SAND_LEVEL: i32 = 34;
/// Last solid row.
pub const BEDROCK_ROW: i32 = 63;
/// Minimum depth below the surface for ore.
pub const ORE_MIN_DEPTH: i32 = 6;

const TREE_CHANCE: f64 = 0.12;
const PLANT_CHANCE: f64 = 0.15;

const SALT_HEIGHT_LOW: u64 = 0x51;
const SALT_HEIGHT_HIGH: u64 = 0x52;
const SALT_DIRT: u64 = 0x53;
const SALT_ORE: u64 = 0x54;
const SALT_TREE: u64 = 0x55;
const SALT_TREE_SHAPE: u64 = 0x56;
const SALT_PLANT: u64 = 0x57;

/// Result of generating one chunk.
#[derive(Debug, Clone)]
pub struct GeneratedChunk {
    pub chunk: Chunk,
    /// Structure cells rooted in this chunk that land in a neighbour.
    pub overflow: Vec<(i32, i32, BlockId)>,
}

/// Seeded terrain function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerrainGenerator {
    seed: u64,
}

impl TerrainGenerator {
    /// Generator for `seed`.
    pub const fn new(seed: u64) -> Self {
        Self { seed }
    }

    /// World seed.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Surface row of column `gx`.
    pub fn surface_height(&self, gx: i32) -> i32 {
        let x = gx as f64;
        let n = 0.65 * value_noise(self.seed ^ SALT_HEIGHT_LOW, x / 24.0)
            + 0.35 * value_noise(self.seed ^ SALT_HEIGHT_HIGH, x / 8.0);
        SURFACE_BASE - SURFACE_AMPLITUDE / 2 + (n * SURFACE_AMPLITUDE as f64).floor() as i32
    }

    fn sandy(&self, surface: i32) -> bool {
        surface >= SAND_LEVEL
    }

    /// Terrain cell before structures.
    pub fn base_block(&self, gx: i32, gy: i32) -> BlockId {
        if gy > BEDROCK_ROW {
            return BlockId::AIR;
        }
        if gy == BEDROCK_ROW {
            return BlockId::BEDROCK;
        }

        let surface = self.surface_height(gx);
        if gy < surface {
            return BlockId::AIR;
        }

        let sandy = self.sandy(surface);
        if gy == surface {
            return if sandy { BlockId::SAND } else { BlockId::GRASS };
        }

        let band = 3 + (hash01(self.seed, gx as i64, 0, SALT_DIRT) * 2.0) as i32;
        if gy <= surface + band {
            return if sandy { BlockId::SAND } else { BlockId::DIRT };
        }

        if gy - surface >= ORE_MIN_DEPTH {
            if let Some(ore) = self.ore_at(gx, gy) {
                return ore;
            }
        }
        BlockId::STONE
    }

    fn ore_at(&self, gx: i32, gy: i32) -> Option<BlockId> {
        let r = hash01(self.seed, gx as i64, gy as i64, SALT_ORE);
        let depth = gy - self.surface_height(gx);
        if gy >= 56 && r < 0.006 {
            Some(BlockId::DIAMOND_ORE)
        } else if gy >= 48 && r < 0.016 {
            Some(BlockId::GOLD_ORE)
        } else if depth >= 10 && r < 0.035 {
            Some(BlockId::IRON_ORE)
        } else if r < 0.05 {
            Some(BlockId::COPPER_ORE)
        } else if r < 0.075 {
            Some(BlockId::COAL_ORE)
        } else {
            None
        }
    }

    fn tree_roll(&self, gx: i32) -> bool {
        !self.sandy(self.surface_height(gx)) && hash01(self.seed, gx as i64, 0, SALT_TREE) < TREE_CHANCE
    }

    /// Whether a tree is rooted on column `gx`. Trees keep two columns apart.
    pub fn has_tree(&self, gx: i32) -> bool {
        self.tree_roll(gx) && !self.tree_roll(gx - 1) && !self.tree_roll(gx - 2)
    }

    /// Cells of the structure rooted on column `gx`, trunk first.
    pub fn structure(&self, gx: i32) -> Vec<(i32, i32, BlockId)> {
        let surface = self.surface_height(gx);
        let mut cells = Vec::new();

        if self.has_tree(gx) {
            let mut rng = StdRng::seed_from_u64(mix(self.seed, gx as i64, 0, SALT_TREE_SHAPE));
            let height: i32 = rng.gen_range(3..=5);
            let top = surface - height;
            for y in top..surface {
                cells.push((gx, y, BlockId::WOOD));
            }
            let wide = rng.gen_bool(0.5);
            for (dy, half) in [(0, 2), (-1, 2), (-2, if wide { 2 } else { 1 })] {
                for dx in -half..=half {
                    if dx == 0 && dy == 0 {
                        continue;
                    }
                    cells.push((gx + dx, top - 1 + dy, BlockId::LEAVES));
                }
            }
            cells.push((gx, top - 1, BlockId::LEAVES));
        } else if !self.sandy(surface) {
            let r = hash01(self.seed, gx as i64, 0, SALT_PLANT);
            if r < PLANT_CHANCE * 0.7 {
                cells.push((gx, surface - 1, BlockId::TALL_GRASS));
            } else if r < PLANT_CHANCE {
                cells.push((gx, surface - 1, BlockId::FLOWER));
            }
        }
        cells
    }

    /// Generates one chunk. Pure in `(seed, key)`.
    pub fn generate(&self, key: ChunkKey) -> GeneratedChunk {
        let (ox, oy) = key.origin();
        let mut chunk = Chunk::new_empty();

        for ly in 0..CHUNK_SIZE {
            for lx in 0..CHUNK_SIZE {
                chunk.set(lx, ly, self.base_block(ox + lx, oy + ly));
            }
        }

        let mut overflow = Vec::new();
        for lx in 0..CHUNK_SIZE {
            let gx = ox + lx;
            let surface = self.surface_height(gx);
            if ChunkKey::containing(gx, surface) != key {
                continue;
            }
            for (x, y, block) in self.structure(gx) {
                if ChunkKey::containing(x, y) == key {
                    let (lx, ly) = (x - ox, y - oy);
                    if chunk.get(lx, ly).is_air() {
                        chunk.set(lx, ly, block);
                    }
                } else {
                    overflow.push((x, y, block));
                }
            }
        }

        GeneratedChunk { chunk, overflow }
    }
}

fn splitmix64(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

fn mix(seed: u64, a: i64, b: i64, salt: u64) -> u64 {
    let h = splitmix64(seed ^ salt.wrapping_mul(0x2545_f491_4f6c_dd1d));
    let h = splitmix64(h ^ a as u64);
    splitmix64(h ^ (b as u64).rotate_left(32))
}

/// Uniform value in [0, 1) for a coordinate triple.
fn hash01(seed: u64, a: i64, b: i64, salt: u64) -> f64 {
    (mix(seed, a, b, salt) >> 11) as f64 / (1u64 << 53) as f64
}

/// Smoothly interpolated lattice noise in [0, 1).
fn value_noise(seed: u64, x: f64) -> f64 {
    let i = x.floor();
    let t = x - i;
    let t = t * t * (3.0 - 2.0 * t);
    let a = hash01(seed, i as i64, 0, 0);
    let b = hash01(seed, i as i64 + 1, 0, 0);
    a + (b - a) * t
}
