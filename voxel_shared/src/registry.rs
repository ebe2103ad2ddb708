//! Static lookup tables: blocks, items, recipes.
//!
//! A `Registry` is built once and shared behind an `Arc`; the world store and
//! the simulation take it in their constructors and never mutate it.
//!
//! Item ids below `BLOCK_ITEM_LIMIT` are the item form of the block with the
//! same id. Tools, weapons and food live above it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::crafting::RecipeBook;

/// Voxel cell type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockId(pub u16);

impl BlockId {
    pub const AIR: BlockId = BlockId(0);
    pub const GRASS: BlockId = BlockId(1);
    pub const DIRT: BlockId = BlockId(2);
    pub const STONE: BlockId = BlockId(3);
    pub const SAND: BlockId = BlockId(4);
    pub const WOOD: BlockId = BlockId(5);
    pub const LEAVES: BlockId = BlockId(6);
    pub const WATER: BlockId = BlockId(7);
    pub const COAL_ORE: BlockId = BlockId(11);
    pub const COPPER_ORE: BlockId = BlockId(12);
    pub const IRON_ORE: BlockId = BlockId(13);
    pub const GOLD_ORE: BlockId = BlockId(14);
    pub const DIAMOND_ORE: BlockId = BlockId(15);
    pub const OBSIDIAN: BlockId = BlockId(19);
    pub const COBBLE: BlockId = BlockId(21);
    pub const BRICK: BlockId = BlockId(22);
    pub const GLASS: BlockId = BlockId(24);
    pub const PLANKS: BlockId = BlockId(26);
    pub const STONE_BRICK: BlockId = BlockId(27);
    pub const CRAFT_TABLE: BlockId = BlockId(31);
    pub const FURNACE: BlockId = BlockId(32);
    pub const CHEST: BlockId = BlockId(33);
    pub const TORCH: BlockId = BlockId(40);
    pub const FLOWER: BlockId = BlockId(41);
    pub const TALL_GRASS: BlockId = BlockId(42);
    pub const SAPLING: BlockId = BlockId(47);
    pub const BEDROCK: BlockId = BlockId(51);

    /// True for id 0.
    pub fn is_air(self) -> bool {
        self == BlockId::AIR
    }
}

/// Tool family a block prefers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCategory {
    Pickaxe,
    Axe,
    Shovel,
}

/// Static block properties.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockDef {
    pub name: &'static str,
    pub solid: bool,
    /// Mining work needed to break the block.
    pub hardness: u32,
    pub required_tool: Option<ToolCategory>,
    /// Item spawned on break. `None` drops the block's own item.
    pub drop: Option<ItemId>,
    pub unbreakable: bool,
}

impl BlockDef {
    const fn new(name: &'static str, hardness: u32) -> Self {
        Self {
            name,
            solid: true,
            hardness,
            required_tool: None,
            drop: None,
            unbreakable: false,
        }
    }

    const fn passable(mut self) -> Self {
        self.solid = false;
        self
    }

    const fn tool(mut self, category: ToolCategory) -> Self {
        self.required_tool = Some(category);
        self
    }

    const fn drops(mut self, item: ItemId) -> Self {
        self.drop = Some(item);
        self
    }

    const fn unbreakable(mut self) -> Self {
        self.unbreakable = true;
        self
    }
}

/// Block id -> properties. Id 0 is always non-solid Air.
#[derive(Debug, Clone)]
pub struct BlockCatalog {
    defs: BTreeMap<BlockId, BlockDef>,
    air: BlockDef,
}

impl BlockCatalog {
    /// The built-in blocks.
    pub fn standard() -> Self {
        use ToolCategory::*;

        let air = BlockDef::new("Air", 0).passable();
        let entries = [
            (BlockId::AIR, air.clone()),
            (BlockId::GRASS, BlockDef::new("Grass", 45).tool(Shovel).drops(ItemId::from_block(BlockId::DIRT))),
            (BlockId::DIRT, BlockDef::new("Dirt", 40).tool(Shovel)),
            (BlockId::STONE, BlockDef::new("Stone", 200).tool(Pickaxe).drops(ItemId::from_block(BlockId::COBBLE))),
            (BlockId::SAND, BlockDef::new("Sand", 40).tool(Shovel)),
            (BlockId::WOOD, BlockDef::new("Wood", 120).tool(Axe)),
            (BlockId::LEAVES, BlockDef::new("Leaves", 15).drops(ItemId::from_block(BlockId::SAPLING))),
            (BlockId::WATER, BlockDef::new("Water", 0).passable().unbreakable()),
            (BlockId::COAL_ORE, BlockDef::new("CoalOre", 300).tool(Pickaxe)),
            (BlockId::COPPER_ORE, BlockDef::new("CopperOre", 300).tool(Pickaxe)),
            (BlockId::IRON_ORE, BlockDef::new("IronOre", 300).tool(Pickaxe)),
            (BlockId::GOLD_ORE, BlockDef::new("GoldOre", 300).tool(Pickaxe)),
            (BlockId::DIAMOND_ORE, BlockDef::new("DiamondOre", 400).tool(Pickaxe)),
            (BlockId::OBSIDIAN, BlockDef::new("Obsidian", 1500).tool(Pickaxe)),
            (BlockId::COBBLE, BlockDef::new("Cobble", 200).tool(Pickaxe)),
            (BlockId::BRICK, BlockDef::new("Brick", 200).tool(Pickaxe)),
            (BlockId::GLASS, BlockDef::new("Glass", 30)),
            (BlockId::PLANKS, BlockDef::new("Planks", 100).tool(Axe)),
            (BlockId::STONE_BRICK, BlockDef::new("StoneBrick", 200).tool(Pickaxe)),
            (BlockId::CRAFT_TABLE, BlockDef::new("CraftTable", 100).tool(Axe)),
            (BlockId::FURNACE, BlockDef::new("Furnace", 200).tool(Pickaxe)),
            (BlockId::CHEST, BlockDef::new("Chest", 100).tool(Axe)),
            (BlockId::TORCH, BlockDef::new("Torch", 1).passable()),
            (BlockId::FLOWER, BlockDef::new("Flower", 1).passable()),
            (BlockId::TALL_GRASS, BlockDef::new("TallGrass", 1).passable()),
            (BlockId::SAPLING, BlockDef::new("Sapling", 1).passable()),
            (BlockId::BEDROCK, BlockDef::new("Bedrock", 0).unbreakable()),
        ];

        Self {
            defs: entries.into_iter().collect(),
            air,
        }
    }

    /// Looks up a block. Unknown ids resolve to Air.
    pub fn get(&self, id: BlockId) -> &BlockDef {
        self.defs.get(&id).unwrap_or(&self.air)
    }

    /// Whether `id` is a known block.
    pub fn contains(&self, id: BlockId) -> bool {
        self.defs.contains_key(&id)
    }

    /// Unknown ids are not solid.
    pub fn is_solid(&self, id: BlockId) -> bool {
        self.get(id).solid
    }

    /// Item spawned when this block breaks.
    pub fn drop_item(&self, id: BlockId) -> ItemId {
        self.get(id).drop.unwrap_or(ItemId::from_block(id))
    }
}

/// Inventory item type. 0 means "no item".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub u16);

/// Item ids below this are block items.
pub const BLOCK_ITEM_LIMIT: u16 = 256;

impl ItemId {
    pub const NONE: ItemId = ItemId(0);

    pub const WOOD_PICK: ItemId = ItemId(256);
    pub const STONE_PICK: ItemId = ItemId(257);
    pub const IRON_PICK: ItemId = ItemId(258);
    pub const DIAMOND_PICK: ItemId = ItemId(259);
    pub const WOOD_AXE: ItemId = ItemId(264);
    pub const STONE_AXE: ItemId = ItemId(265);
    pub const WOOD_SHOVEL: ItemId = ItemId(268);
    pub const WOOD_SWORD: ItemId = ItemId(272);
    pub const STONE_SWORD: ItemId = ItemId(273);
    pub const IRON_SWORD: ItemId = ItemId(274);
    pub const DIAMOND_SWORD: ItemId = ItemId(275);
    pub const APPLE: ItemId = ItemId(280);
    pub const STICK: ItemId = ItemId(281);

    /// Item that places `block`.
    pub const fn from_block(block: BlockId) -> Self {
        ItemId(block.0)
    }

    /// Block this item places, if it is a block item.
    pub fn as_block(self) -> Option<BlockId> {
        (self.0 != 0 && self.0 < BLOCK_ITEM_LIMIT).then_some(BlockId(self.0))
    }

    /// True for the empty item.
    pub fn is_none(self) -> bool {
        self == ItemId::NONE
    }
}

/// What an item does when held.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ItemKind {
    Block(BlockId),
    Tool { category: ToolCategory, power: u32 },
    Weapon { damage: i32 },
    Food { heal: i32 },
    Material,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ItemDef {
    pub name: &'static str,
    pub kind: ItemKind,
    pub max_stack: u32,
}

/// Damage dealt with an empty hand or a non-weapon.
pub const BARE_HAND_DAMAGE: i32 = 1;
/// Mining power of an empty hand or a non-tool.
pub const BARE_HAND_POWER: u32 = 1;

/// Item id -> properties.
#[derive(Debug, Clone)]
pub struct ItemCatalog {
    defs: BTreeMap<ItemId, ItemDef>,
}

impl ItemCatalog {
    /// Block items plus the built-in tools, weapons and food.
    pub fn standard(blocks: &BlockCatalog) -> Self {
        use ToolCategory::*;

        let mut defs: BTreeMap<ItemId, ItemDef> = blocks
            .defs
            .iter()
            .filter(|(id, _)| !id.is_air())
            .map(|(id, def)| {
                (
                    ItemId::from_block(*id),
                    ItemDef {
                        name: def.name,
                        kind: ItemKind::Block(*id),
                        max_stack: 64,
                    },
                )
            })
            .collect();

        let tool = |name, category, power| ItemDef {
            name,
            kind: ItemKind::Tool { category, power },
            max_stack: 1,
        };
        let weapon = |name, damage| ItemDef {
            name,
            kind: ItemKind::Weapon { damage },
            max_stack: 1,
        };

        defs.insert(ItemId::WOOD_PICK, tool("WoodPick", Pickaxe, 2));
        defs.insert(ItemId::STONE_PICK, tool("StonePick", Pickaxe, 3));
        defs.insert(ItemId::IRON_PICK, tool("IronPick", Pickaxe, 4));
        defs.insert(ItemId::DIAMOND_PICK, tool("DiaPick", Pickaxe, 5));
        defs.insert(ItemId::WOOD_AXE, tool("WoodAxe", Axe, 2));
        defs.insert(ItemId::STONE_AXE, tool("StoneAxe", Axe, 3));
        defs.insert(ItemId::WOOD_SHOVEL, tool("WoodShovel", Shovel, 2));
        defs.insert(ItemId::WOOD_SWORD, weapon("WoodSword", 4));
        defs.insert(ItemId::STONE_SWORD, weapon("StoneSword", 5));
        defs.insert(ItemId::IRON_SWORD, weapon("IronSword", 6));
        defs.insert(ItemId::DIAMOND_SWORD, weapon("DiaSword", 8));
        defs.insert(
            ItemId::APPLE,
            ItemDef {
                name: "Apple",
                kind: ItemKind::Food { heal: 2 },
                max_stack: 64,
            },
        );
        defs.insert(
            ItemId::STICK,
            ItemDef {
                name: "Stick",
                kind: ItemKind::Material,
                max_stack: 64,
            },
        );

        Self { defs }
    }

    /// Definition of `id`.
    pub fn get(&self, id: ItemId) -> Option<&ItemDef> {
        self.defs.get(&id)
    }

    /// Stack limit, 64 for unknown ids.
    pub fn max_stack(&self, id: ItemId) -> u32 {
        self.get(id).map(|d| d.max_stack).unwrap_or(64)
    }

    /// Block placed by this item, if any.
    pub fn placeable(&self, id: ItemId) -> Option<BlockId> {
        match self.get(id)?.kind {
            ItemKind::Block(block) => Some(block),
            _ => None,
        }
    }

    /// Damage dealt when attacking with `id` held.
    pub fn weapon_damage(&self, id: ItemId) -> i32 {
        match self.get(id).map(|d| d.kind) {
            Some(ItemKind::Weapon { damage }) => damage,
            _ => BARE_HAND_DAMAGE,
        }
    }

    /// Health restored by eating one unit, if the item is food.
    pub fn heal(&self, id: ItemId) -> Option<i32> {
        match self.get(id)?.kind {
            ItemKind::Food { heal } => Some(heal),
            _ => None,
        }
    }

    /// Tool category and power, falling back to the bare hand.
    pub fn tool(&self, id: ItemId) -> (Option<ToolCategory>, u32) {
        match self.get(id).map(|d| d.kind) {
            Some(ItemKind::Tool { category, power }) => (Some(category), power),
            _ => (None, BARE_HAND_POWER),
        }
    }
}

/// All static tables, injected into world and simulation constructors.
#[derive(Debug, Clone)]
pub struct Registry {
    pub blocks: BlockCatalog,
    pub items: ItemCatalog,
    pub recipes: RecipeBook,
}

impl Registry {
    /// Built-in blocks, items and recipes.
    pub fn standard() -> Self {
        let blocks = BlockCatalog::standard();
        let items = ItemCatalog::standard(&blocks);
        Self {
            blocks,
            items,
            recipes: RecipeBook::standard(),
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn air_is_id_zero_and_not_solid() {
        let blocks = BlockCatalog::standard();
        assert_eq!(blocks.get(BlockId::AIR).name, "Air");
        assert!(!blocks.is_solid(BlockId::AIR));
    }

    #[test]
    fn unknown_block_resolves_to_air() {
        let blocks = BlockCatalog::standard();
        assert!(!blocks.contains(BlockId(999)));
        assert!(!blocks.is_solid(BlockId(999)));
    }

    #[test]
    fn stone_drops_cobble_and_dirt_drops_itself() {
        let blocks = BlockCatalog::standard();
        assert_eq!(blocks.drop_item(BlockId::STONE), ItemId::from_block(BlockId::COBBLE));
        assert_eq!(blocks.drop_item(BlockId::DIRT), ItemId::from_block(BlockId::DIRT));
    }

    #[test]
    fn block_items_place_their_block() {
        let reg = Registry::standard();
        assert_eq!(reg.items.placeable(ItemId::from_block(BlockId::DIRT)), Some(BlockId::DIRT));
        assert_eq!(reg.items.placeable(ItemId::WOOD_PICK), None);
        assert_eq!(ItemId::WOOD_PICK.as_block(), None);
    }

    #[test]
    fn tools_and_weapons_fall_back_to_hand() {
        let reg = Registry::standard();
        assert_eq!(reg.items.tool(ItemId::DIAMOND_PICK), (Some(ToolCategory::Pickaxe), 5));
        assert_eq!(reg.items.tool(ItemId::NONE), (None, BARE_HAND_POWER));
        assert_eq!(reg.items.weapon_damage(ItemId::IRON_SWORD), 6);
        assert_eq!(reg.items.weapon_damage(ItemId::STICK), BARE_HAND_DAMAGE);
    }
}
