//! Recipe lookup and material rollup over a store snapshot.

pub mod bonus;
pub mod fetcher;
pub mod rollup;

pub use bonus::{apply_bonus, CraftingBonus};
pub use fetcher::{fetch_recipe, Ingredient, Recipe, RecipeSource};
pub use rollup::{rollup, LimitEvent, LimitKind, Rollup, RollupLimits, RollupMode};
