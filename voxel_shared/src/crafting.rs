//! Crafting.
//!
//! Matching is a pure function of a 3x3 ingredient grid (row-major). Rules are
//! tried in declared order and the first match wins. A shapeless rule compares
//! the multiset of occupied cells; a shaped rule compares every cell in place.

use crate::{
    inventory::Slot,
    registry::{BlockId, ItemId},
};

/// Cells in a crafting grid.
pub const GRID_CELLS: usize = 9;

pub type CraftGrid = [Slot; GRID_CELLS];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecipeShape {
    /// Ingredients in any arrangement, one unit per listed id.
    Shapeless(Vec<ItemId>),
    /// Exact positional pattern; `ItemId::NONE` cells must be empty.
    Shaped([ItemId; GRID_CELLS]),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipe {
    pub name: &'static str,
    pub shape: RecipeShape,
    pub output: Slot,
}

impl Recipe {
    /// Whether the grid satisfies this recipe.
    pub fn matches(&self, grid: &[ItemId; GRID_CELLS]) -> bool {
        match &self.shape {
            RecipeShape::Shaped(pattern) => pattern == grid,
            RecipeShape::Shapeless(ingredients) => {
                let mut wanted = ingredients.clone();
                let mut present: Vec<ItemId> =
                    grid.iter().copied().filter(|id| !id.is_none()).collect();
                wanted.sort();
                present.sort();
                wanted == present
            }
        }
    }
}

/// Ordered recipe list.
#[derive(Debug, Clone, Default)]
pub struct RecipeBook {
    recipes: Vec<Recipe>,
}

impl RecipeBook {
    /// Book with `recipes` in priority order.
    pub fn new(recipes: Vec<Recipe>) -> Self {
        Self { recipes }
    }

    /// The built-in recipes.
    pub fn standard() -> Self {
        const E: ItemId = ItemId::NONE;
        const P: ItemId = ItemId::from_block(BlockId::PLANKS);
        const C: ItemId = ItemId::from_block(BlockId::COBBLE);
        const S: ItemId = ItemId::STICK;

        let shaped = |name, pattern, item, count| Recipe {
            name,
            shape: RecipeShape::Shaped(pattern),
            output: Slot::new(item, count),
        };

        Self::new(vec![
            Recipe {
                name: "planks",
                shape: RecipeShape::Shapeless(vec![ItemId::from_block(BlockId::WOOD)]),
                output: Slot::new(P, 4),
            },
            shaped(
                "craft_table",
                [P, P, E, P, P, E, E, E, E],
                ItemId::from_block(BlockId::CRAFT_TABLE),
                1,
            ),
            shaped(
                "chest",
                [P, P, P, P, E, P, P, P, P],
                ItemId::from_block(BlockId::CHEST),
                1,
            ),
            shaped(
                "furnace",
                [C, C, C, C, E, C, C, C, C],
                ItemId::from_block(BlockId::FURNACE),
                1,
            ),
            shaped("sticks", [P, E, E, P, E, E, E, E, E], S, 4),
            shaped("wood_pick", [P, P, P, E, S, E, E, S, E], ItemId::WOOD_PICK, 1),
            shaped("stone_pick", [C, C, C, E, S, E, E, S, E], ItemId::STONE_PICK, 1),
            shaped("wood_axe", [P, P, E, P, S, E, E, S, E], ItemId::WOOD_AXE, 1),
            shaped("wood_shovel", [E, P, E, E, S, E, E, S, E], ItemId::WOOD_SHOVEL, 1),
            shaped("wood_sword", [E, P, E, E, P, E, E, S, E], ItemId::WOOD_SWORD, 1),
            shaped("stone_sword", [E, C, E, E, C, E, E, S, E], ItemId::STONE_SWORD, 1),
        ])
    }

    /// Recipes in priority order.
    pub fn recipes(&self) -> &[Recipe] {
        &self.recipes
    }

    /// First recipe matching the grid's item layout.
    pub fn find(&self, grid: &CraftGrid) -> Option<&Recipe> {
        let ids = grid.map(|slot| slot.item_id);
        self.recipes.iter().find(|r| r.matches(&ids))
    }

    /// Applies the matching recipe: removes one unit from every occupied cell
    /// and returns the result stack. Leaves the grid untouched on no match.
    pub fn collect(&self, grid: &mut CraftGrid) -> Option<Slot> {
        let output = self.find(grid)?.output;
        for cell in grid.iter_mut() {
            cell.take_one();
        }
        Some(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(ids: [ItemId; GRID_CELLS], count: u32) -> CraftGrid {
        ids.map(|id| Slot::new(id, count))
    }

    const P: ItemId = ItemId::from_block(BlockId::PLANKS);
    const E: ItemId = ItemId::NONE;

    #[test]
    fn craft_table_shaped_match_and_collect() {
        let book = RecipeBook::standard();
        let mut g = grid([P, P, E, P, P, E, E, E, E], 3);

        assert_eq!(book.find(&g).map(|r| r.name), Some("craft_table"));
        let out = book.collect(&mut g).unwrap();

        assert_eq!(out, Slot::new(ItemId::from_block(BlockId::CRAFT_TABLE), 1));
        for i in [0, 1, 3, 4] {
            assert_eq!(g[i].count, 2);
        }
        assert!(g[2].is_empty());
    }

    #[test]
    fn shaped_pattern_is_positional() {
        let book = RecipeBook::standard();
        // Same four planks shifted right by one column.
        let g = grid([E, P, P, E, P, P, E, E, E], 1);
        assert!(book.find(&g).is_none());
    }

    #[test]
    fn shapeless_matches_any_cell() {
        let book = RecipeBook::standard();
        let wood = ItemId::from_block(BlockId::WOOD);
        let mut g = grid([E; GRID_CELLS], 0);
        g[7] = Slot::new(wood, 1);

        let out = book.collect(&mut g).unwrap();
        assert_eq!(out, Slot::new(P, 4));
        assert!(g.iter().all(Slot::is_empty));
    }

    #[test]
    fn no_match_leaves_grid_untouched() {
        let book = RecipeBook::standard();
        let mut g = grid([P, E, P, E, E, E, E, E, E], 1);
        let before = g;
        assert!(book.collect(&mut g).is_none());
        assert_eq!(g, before);
    }

    #[test]
    fn first_declared_rule_wins() {
        let a = Recipe {
            name: "a",
            shape: RecipeShape::Shapeless(vec![P]),
            output: Slot::new(ItemId::STICK, 1),
        };
        let mut b = a.clone();
        b.name = "b";
        let book = RecipeBook::new(vec![a, b]);
        let mut g = grid([E; GRID_CELLS], 0);
        g[0] = Slot::new(P, 1);
        assert_eq!(book.find(&g).map(|r| r.name), Some("a"));
    }
}
