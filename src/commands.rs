//! The query surface shared by the CLI and the HTTP server.
//!
//! Every operation takes free-form text, runs it through the name resolver, and
//! answers from one store snapshot.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::cancel::CancelToken;
use crate::data::model::{Item, Perk, RecipeTable};
use crate::data::store::{StoreSnapshot, MAX_RESULTS};
use crate::error::{CoreError, CoreResult};
use crate::recipe::bonus::{apply_bonus, CraftingBonus};
use crate::recipe::fetcher::fetch_recipe;
use crate::recipe::rollup::{rollup as run_rollup, LimitEvent, RollupLimits, RollupMode};
use crate::scaler::scale_description;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemView {
    pub key: String,
    pub item_id: String,
    pub name: String,
    pub rarity: String,
    pub tier: u8,
    pub item_type: String,
    pub item_class: Vec<String>,
    pub weight: f64,
    pub max_stack: u32,
    pub icon: Option<String>,
    pub gear_score: Option<u32>,
    pub description: String,
    pub perks: Vec<String>,
    pub craftable: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerkView {
    pub perk_id: String,
    pub name: String,
    /// Description with scaling placeholders evaluated at `gear_score`.
    pub description: String,
    pub gear_score: f64,
    pub perk_type: String,
    pub icon: Option<String>,
    pub condition: Option<String>,
    pub compatible_with: Vec<String>,
    pub exclusive_labels: Vec<String>,
    pub craft_mod: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngredientLine {
    pub key: String,
    pub name: String,
    pub quantity: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecipeView {
    pub key: String,
    pub name: String,
    pub station: String,
    pub tradeskill: String,
    pub required_level: u32,
    pub tier: u8,
    pub source: RecipeTable,
    pub ingredients: Vec<IngredientLine>,
}

/// Rollup parameters as a caller supplies them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollupRequest {
    pub item: String,
    #[serde(default = "default_quantity")]
    pub quantity: u64,
    #[serde(default)]
    pub fort: bool,
    #[serde(default)]
    pub armor_pct: f64,
    #[serde(default = "default_tradeskill")]
    pub tradeskill: u32,
    #[serde(default)]
    pub mode: RollupMode,
}

fn default_quantity() -> u64 {
    1
}

fn default_tradeskill() -> u32 {
    1
}

impl RollupRequest {
    pub fn new(item: impl Into<String>, quantity: u64, mode: RollupMode) -> Self {
        Self {
            item: item.into(),
            quantity,
            fort: false,
            armor_pct: 0.0,
            tradeskill: 1,
            mode,
        }
    }

    pub fn bonus(&self) -> CraftingBonus {
        CraftingBonus::new(self.fort, self.armor_pct, self.tradeskill)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MaterialLine {
    pub key: String,
    pub name: String,
    pub raw: u64,
    pub adjusted: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MaterialsView {
    pub key: String,
    pub name: String,
    pub quantity: u64,
    pub mode: RollupMode,
    pub total_bonus: f64,
    pub bonus_factor: f64,
    /// First-discovery order.
    pub materials: Vec<MaterialLine>,
    pub limit_events: Vec<LimitEvent>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionKind {
    Item,
    Perk,
    Craftable,
}

impl FromStr for SuggestionKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "item" | "items" => Ok(Self::Item),
            "perk" | "perks" => Ok(Self::Perk),
            "craftable" | "recipe" | "recipes" => Ok(Self::Craftable),
            other => Err(format!("unknown suggestion kind '{other}' (expected item, perk or craftable)")),
        }
    }
}

impl fmt::Display for SuggestionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Item => "item",
            Self::Perk => "perk",
            Self::Craftable => "craftable",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Suggestion {
    pub name: String,
    pub value: String,
}

/// Item by resolved name or id, falling back to the best substring match.
pub fn lookup_item(snapshot: &StoreSnapshot, query: &str) -> CoreResult<ItemView> {
    let resolved = snapshot.resolve(query);
    let item = snapshot
        .item(&resolved)
        .or_else(|| snapshot.find_item(query, false).into_iter().next())
        .ok_or_else(|| CoreError::NotFound(format!("item '{}'", query.trim())))?;
    Ok(item_view(snapshot, item))
}

fn item_view(snapshot: &StoreSnapshot, item: &Item) -> ItemView {
    let key = item.key();
    ItemView {
        craftable: snapshot.has_recipe(&key),
        key,
        item_id: item.item_id.clone(),
        name: item.name.clone(),
        rarity: item.rarity.to_string(),
        tier: item.tier,
        item_type: item.item_type.clone(),
        item_class: item.item_class.clone(),
        weight: item.weight,
        max_stack: item.max_stack,
        icon: item.icon.clone(),
        gear_score: item.gear_score,
        description: item.description.clone(),
        perks: item.perk_ids().map(str::to_string).collect(),
    }
}

/// Perk by id or exact name, falling back to the best substring match. The description is
/// rendered at `gear_score`.
pub fn lookup_perk(snapshot: &StoreSnapshot, query: &str, gear_score: f64) -> CoreResult<PerkView> {
    let perk = snapshot
        .find_perk(query, true)
        .into_iter()
        .next()
        .or_else(|| snapshot.find_perk(query, false).into_iter().next())
        .ok_or_else(|| CoreError::NotFound(format!("perk '{}'", query.trim())))?;
    Ok(perk_view(perk, gear_score))
}

fn perk_view(perk: &Perk, gear_score: f64) -> PerkView {
    PerkView {
        perk_id: perk.perk_id.clone(),
        name: perk.name.clone(),
        description: scale_description(&perk.description, gear_score),
        gear_score,
        perk_type: perk.perk_type.clone(),
        icon: perk.icon.clone(),
        condition: perk.condition.clone(),
        compatible_with: perk.compatible_with.clone(),
        exclusive_labels: perk.exclusive_labels.clone(),
        craft_mod: perk.craft_mod.clone(),
    }
}

/// Direct recipe for `item`, ingredients under their canonical names.
pub fn show_recipe(snapshot: &StoreSnapshot, item: &str) -> CoreResult<RecipeView> {
    let recipe = fetch_recipe(snapshot, item)?
        .ok_or_else(|| CoreError::NotFound(format!("recipe for '{}'", item.trim())))?;
    Ok(RecipeView {
        name: snapshot.display_name(&recipe.output_item_name),
        key: recipe.output_item_name,
        station: recipe.station,
        tradeskill: recipe.tradeskill,
        required_level: recipe.required_level,
        tier: recipe.tier,
        source: recipe.source,
        ingredients: recipe
            .ingredients
            .into_iter()
            .map(|ingredient| IngredientLine {
                name: snapshot.display_name(&ingredient.item),
                key: ingredient.item,
                quantity: ingredient.quantity,
            })
            .collect(),
    })
}

/// Material totals for `request`, raw and with the crafting bonus applied.
pub fn rollup(
    snapshot: &StoreSnapshot,
    request: &RollupRequest,
    limits: &RollupLimits,
    cancel: &CancelToken,
) -> CoreResult<MaterialsView> {
    let result = run_rollup(snapshot, &request.item, request.quantity, request.mode, limits, cancel)?;
    let bonus = request.bonus();
    let adjusted = apply_bonus(&result.materials, &bonus);

    Ok(MaterialsView {
        name: snapshot.display_name(&result.item),
        key: result.item,
        quantity: result.quantity,
        mode: result.mode,
        total_bonus: bonus.total_bonus(),
        bonus_factor: bonus.factor(),
        materials: result
            .materials
            .iter()
            .map(|(key, raw)| MaterialLine {
                key: key.clone(),
                name: snapshot.display_name(key),
                raw: *raw,
                adjusted: adjusted.get(key).copied().unwrap_or(*raw),
            })
            .collect(),
        limit_events: result.events,
    })
}

/// Up to [`MAX_RESULTS`] suggestions for a partially typed name.
pub fn autocomplete(snapshot: &StoreSnapshot, kind: SuggestionKind, query: &str) -> Vec<Suggestion> {
    let mut suggestions: Vec<Suggestion> = match kind {
        SuggestionKind::Item => snapshot
            .find_item(query, false)
            .into_iter()
            .map(|item| Suggestion {
                name: item.name.clone(),
                value: item.key(),
            })
            .collect(),
        SuggestionKind::Perk => snapshot
            .find_perk(query, false)
            .into_iter()
            .map(|perk| Suggestion {
                name: perk.name.clone(),
                value: perk.perk_id.clone(),
            })
            .collect(),
        SuggestionKind::Craftable => snapshot
            .find_craftable(query)
            .into_iter()
            .map(|key| Suggestion {
                name: snapshot.display_name(&key),
                value: key,
            })
            .collect(),
    };
    suggestions.truncate(MAX_RESULTS);
    suggestions
}
