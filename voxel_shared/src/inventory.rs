//! Inventory slots.
//!
//! A slot holds `count > 0` units of `item_id`, or is empty with both zeroed.
//! Every mutation goes through `Slot` methods so the invariant holds.

use serde::{Deserialize, Serialize};

use crate::registry::{ItemCatalog, ItemId};

/// Number of slots in a player inventory.
pub const INVENTORY_SLOTS: usize = 9;

/// One stack of items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Slot {
    pub item_id: ItemId,
    pub count: u32,
}

impl Slot {
    pub const EMPTY: Slot = Slot {
        item_id: ItemId::NONE,
        count: 0,
    };

    /// Builds a slot, collapsing zero counts or the null item to empty.
    pub fn new(item_id: ItemId, count: u32) -> Self {
        if item_id.is_none() || count == 0 {
            Self::EMPTY
        } else {
            Self { item_id, count }
        }
    }

    /// True for the empty slot.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Removes one unit, clearing the item id when the stack runs out.
    pub fn take_one(&mut self) -> Option<ItemId> {
        if self.is_empty() {
            return None;
        }
        let item = self.item_id;
        self.count -= 1;
        if self.count == 0 {
            self.item_id = ItemId::NONE;
        }
        Some(item)
    }

    /// Empties the slot and returns what it held.
    pub fn take_all(&mut self) -> Slot {
        std::mem::take(self)
    }
}

/// Fixed-size slot array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Inventory {
    slots: Vec<Slot>,
}

impl Default for Inventory {
    fn default() -> Self {
        Self {
            slots: vec![Slot::EMPTY; INVENTORY_SLOTS],
        }
    }
}

impl Inventory {
    /// All slots empty.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// True when every slot is empty.
    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Slot::is_empty)
    }

    /// Slot at `index`.
    pub fn slot(&self, index: usize) -> Option<&Slot> {
        self.slots.get(index)
    }

    /// Mutable slot at `index`.
    pub fn slot_mut(&mut self, index: usize) -> Option<&mut Slot> {
        self.slots.get_mut(index)
    }

    /// Every slot in order.
    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    /// Overwrites a slot. Out-of-range indexes are ignored.
    pub fn set(&mut self, index: usize, slot: Slot) {
        if let Some(s) = self.slots.get_mut(index) {
            *s = Slot::new(slot.item_id, slot.count);
        }
    }

    /// Adds items, topping up matching stacks first and then filling empty
    /// slots. Returns the count that did not fit.
    pub fn add(&mut self, item: ItemId, mut count: u32, items: &ItemCatalog) -> u32 {
        if item.is_none() {
            return 0;
        }
        let max = items.max_stack(item).max(1);

        for slot in self.slots.iter_mut().filter(|s| s.item_id == item) {
            let room = max.saturating_sub(slot.count);
            let moved = room.min(count);
            slot.count += moved;
            count -= moved;
            if count == 0 {
                return 0;
            }
        }

        for slot in self.slots.iter_mut().filter(|s| s.is_empty()) {
            let moved = max.min(count);
            *slot = Slot::new(item, moved);
            count -= moved;
            if count == 0 {
                return 0;
            }
        }

        count
    }

    /// Total units of an item across all slots.
    pub fn count_of(&self, item: ItemId) -> u32 {
        self.slots
            .iter()
            .filter(|s| s.item_id == item)
            .map(|s| s.count)
            .sum()
    }
}
