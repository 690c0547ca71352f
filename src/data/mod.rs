pub mod model;
pub mod registry;
pub mod resolver;
pub mod sanitize;
pub mod store;
pub mod validate;

pub use model::{IngredientRef, Item, Perk, Rarity, RecipeRow, RecipeTable};
pub use resolver::{AliasMap, CuratedTable};
pub use store::{Store, StoreSnapshot, StoreTables, MAX_RESULTS};
