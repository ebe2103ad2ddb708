//! Mining progress, accumulated by the peer doing the mining.
//!
//! The host never sees progress; it receives a single MINE once the work
//! reaches the block's hardness.

use crate::registry::{BlockId, ItemId, Registry};

/// Work multiplier when the held tool is not the block's preferred category.
pub const WRONG_TOOL_FACTOR: f32 = 0.3;

/// Work done per tick on `block` while holding `held`.
pub fn mining_rate(registry: &Registry, block: BlockId, held: ItemId) -> f32 {
    let (category, power) = registry.items.tool(held);
    let required = registry.blocks.get(block).required_tool;
    let factor = match required {
        Some(req) if category != Some(req) => WRONG_TOOL_FACTOR,
        _ => 1.0,
    };
    power as f32 * factor
}

/// Ticks of continuous mining needed, `None` for blocks that cannot break.
pub fn ticks_to_break(registry: &Registry, block: BlockId, held: ItemId) -> Option<u32> {
    let def = registry.blocks.get(block);
    if block.is_air() || def.unbreakable {
        return None;
    }
    let rate = mining_rate(registry, block, held);
    Some((def.hardness as f32 / rate).ceil().max(1.0) as u32)
}

/// Progress on the cell currently being mined.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MiningProgress {
    target: Option<(i32, i32)>,
    work: f32,
}

impl MiningProgress {
    /// No target.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cell being mined.
    pub fn target(&self) -> Option<(i32, i32)> {
        self.target
    }

    /// Fraction of the hardness reached, for display.
    pub fn fraction(&self, registry: &Registry, block: BlockId) -> f32 {
        let hardness = registry.blocks.get(block).hardness.max(1) as f32;
        (self.work / hardness).min(1.0)
    }

    /// Drops the target and its progress.
    pub fn cancel(&mut self) {
        self.target = None;
        self.work = 0.0;
    }

    /// Adds one tick of work on `(x, y)`. Switching target restarts from
    /// zero. Returns true on the tick the block should break; the caller then
    /// sends MINE and the progress resets.
    pub fn tick(&mut self, registry: &Registry, x: i32, y: i32, block: BlockId, held: ItemId) -> bool {
        let def = registry.blocks.get(block);
        if block.is_air() || def.unbreakable {
            self.cancel();
            return false;
        }
        if self.target != Some((x, y)) {
            self.target = Some((x, y));
            self.work = 0.0;
        }
        self.work += mining_rate(registry, block, held);
        if self.work >= def.hardness as f32 {
            self.cancel();
            return true;
        }
        false
    }
}
