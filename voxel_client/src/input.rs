//! Input handling.
//!
//! Without a window the held keys come from the console: `keys left jump`
//! holds those keys until the next `keys` line. Mining is a held action too;
//! progress accumulates locally every frame and a single MINE goes out once
//! the block would break.

use voxel_shared::{
    entity::KeyState,
    mining::MiningProgress,
    net::NetMsg,
    registry::{BlockId, ItemId, Registry},
    sim::Action,
};

/// Parses key names into a held-key set. Unknown names are errors.
pub fn parse_keys<'a>(names: impl IntoIterator<Item = &'a str>) -> Result<KeyState, String> {
    let mut keys = KeyState::default();
    for name in names {
        match name {
            "left" | "a" => keys.left = true,
            "right" | "d" => keys.right = true,
            "jump" | "w" | "space" => keys.jump = true,
            "none" => {}
            other => return Err(format!("unknown key '{other}'")),
        }
    }
    Ok(keys)
}

/// Per-frame INPUT for the held keys.
pub fn build_input(keys: KeyState) -> NetMsg {
    NetMsg::Input(keys)
}

/// A block the local player is holding the mine button on.
#[derive(Debug, Clone, Default)]
pub struct MiningIntent {
    target: Option<(i32, i32)>,
    progress: MiningProgress,
}

impl MiningIntent {
    /// Targets a cell, restarting progress if the target changed.
    pub fn start(&mut self, x: i32, y: i32) {
        self.target = Some((x, y));
    }

    /// Drops the target and its progress.
    pub fn stop(&mut self) {
        self.target = None;
        self.progress.cancel();
    }

    /// Cell being mined.
    pub fn target(&self) -> Option<(i32, i32)> {
        self.target
    }

    /// Progress on the current target in `0.0..=1.0`.
    pub fn fraction(&self, registry: &Registry, block: BlockId) -> f32 {
        self.progress.fraction(registry, block)
    }

    /// Advances one frame against the block currently seen at the target.
    /// Returns the MINE action when it breaks; mining then stops.
    pub fn tick(&mut self, registry: &Registry, block: BlockId, held: ItemId) -> Option<Action> {
        let (x, y) = self.target?;
        if block.is_air() {
            self.stop();
            return None;
        }
        if self.progress.tick(registry, x, y, block, held) {
            self.stop();
            return Some(Action::Mine { x, y });
        }
        None
    }
}
