//! Recipe fetcher: resolves an item, consults `recipes_primary` then `recipes_legacy`,
//! and normalizes ingredient names through the resolver.

use indexmap::IndexMap;
use serde::Serialize;
use tracing::{debug, warn};

use crate::data::model::{decode_ingredients, RecipeRow, RecipeTable};
use crate::data::store::StoreSnapshot;
use crate::error::{CoreError, CoreResult};

/// Backend the fetcher reads from. The snapshot never fails; other backends may report
/// `StoreUnavailable`, which the fetcher propagates untouched.
pub trait RecipeSource {
    fn resolve(&self, input: &str) -> String;
    fn recipe_row(&self, table: RecipeTable, key: &str) -> CoreResult<Option<RecipeRow>>;
}

impl RecipeSource for StoreSnapshot {
    fn resolve(&self, input: &str) -> String {
        StoreSnapshot::resolve(self, input)
    }

    fn recipe_row(&self, table: RecipeTable, key: &str) -> CoreResult<Option<RecipeRow>> {
        Ok(StoreSnapshot::recipe_row(self, table, key).cloned())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ingredient {
    /// Resolved item key.
    pub item: String,
    pub quantity: u64,
}

/// A recipe with every ingredient resolved and every quantity positive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Recipe {
    pub output_item_name: String,
    pub station: String,
    pub tradeskill: String,
    pub required_level: u32,
    pub tier: u8,
    pub source: RecipeTable,
    pub ingredients: Vec<Ingredient>,
}

/// Direct ingredients of `input`, or `None` when neither table has a usable row.
pub fn fetch_recipe<S: RecipeSource + ?Sized>(source: &S, input: &str) -> CoreResult<Option<Recipe>> {
    let key = source.resolve(input);
    for table in [RecipeTable::Primary, RecipeTable::Legacy] {
        let Some(row) = source.recipe_row(table, &key)? else {
            continue;
        };
        match normalize_row(source, &key, table, &row) {
            Ok(recipe) => return Ok(Some(recipe)),
            Err(err) => warn!(table = table.as_str(), error = %err, "skipping unusable recipe row"),
        }
    }
    debug!(key = %key, "no recipe");
    Ok(None)
}

fn normalize_row<S: RecipeSource + ?Sized>(
    source: &S,
    key: &str,
    table: RecipeTable,
    row: &RecipeRow,
) -> CoreResult<Recipe> {
    let payload = decode_ingredients(&row.ingredients).map_err(|err| CoreError::MalformedPayload {
        key: key.to_string(),
        reason: err.to_string(),
    })?;

    let mut merged: IndexMap<String, u64> = IndexMap::new();
    for ingredient in payload {
        let Ok(quantity) = u64::try_from(ingredient.quantity) else {
            debug!(key, ingredient = %ingredient.name, quantity = ingredient.quantity, "dropping negative quantity");
            continue;
        };
        if quantity == 0 {
            debug!(key, ingredient = %ingredient.name, "dropping zero quantity");
            continue;
        }
        let item = source.resolve(&ingredient.name);
        if item.is_empty() {
            continue;
        }
        let total = merged.entry(item).or_insert(0);
        *total = total.saturating_add(quantity);
    }

    Ok(Recipe {
        output_item_name: key.to_string(),
        station: row.station.clone(),
        tradeskill: row.tradeskill.clone(),
        required_level: row.required_level,
        tier: row.tier,
        source: table,
        ingredients: merged
            .into_iter()
            .map(|(item, quantity)| Ingredient { item, quantity })
            .collect(),
    })
}
