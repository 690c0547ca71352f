//! Stored record types: items, perks and recipe rows.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::data::sanitize::normalize_key;

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Rarity {
    #[default]
    Common,
    Uncommon,
    Rare,
    Epic,
    Legendary,
    Artifact,
}

impl Rarity {
    /// Upstream ordinal (0 = common). Out-of-range values clamp to the nearest end.
    pub fn from_ordinal(ordinal: i64) -> Self {
        match ordinal {
            i64::MIN..=0 => Self::Common,
            1 => Self::Uncommon,
            2 => Self::Rare,
            3 => Self::Epic,
            4 => Self::Legendary,
            _ => Self::Artifact,
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "common" => Some(Self::Common),
            "uncommon" => Some(Self::Uncommon),
            "rare" => Some(Self::Rare),
            "epic" => Some(Self::Epic),
            "legendary" => Some(Self::Legendary),
            "artifact" => Some(Self::Artifact),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Common => "common",
            Self::Uncommon => "uncommon",
            Self::Rare => "rare",
            Self::Epic => "epic",
            Self::Legendary => "legendary",
            Self::Artifact => "artifact",
        }
    }
}

impl fmt::Display for Rarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub item_id: String,
    pub name: String,
    #[serde(default)]
    pub rarity: Rarity,
    #[serde(default)]
    pub tier: u8,
    #[serde(default)]
    pub item_type: String,
    #[serde(default)]
    pub item_class: Vec<String>,
    #[serde(default)]
    pub weight: f64,
    #[serde(default)]
    pub max_stack: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gear_score: Option<u32>,
    #[serde(default)]
    pub description: String,
    /// Pipe-separated perk ids.
    #[serde(default)]
    pub perks: String,
}

impl Item {
    /// Lowercased canonical name with whitespace runs collapsed: the store key.
    pub fn key(&self) -> String {
        normalize_key(&self.name)
    }

    pub fn perk_ids(&self) -> impl Iterator<Item = &str> {
        self.perks.split('|').map(str::trim).filter(|id| !id.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Perk {
    pub perk_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub perk_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    /// Item classes the perk can roll on.
    #[serde(default)]
    pub compatible_with: Vec<String>,
    #[serde(default)]
    pub exclusive_labels: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub craft_mod: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_label: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecipeTable {
    Primary,
    Legacy,
}

impl RecipeTable {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "recipes_primary",
            Self::Legacy => "recipes_legacy",
        }
    }
}

/// One row of either recipe table. `ingredients` is the JSON payload the fetcher parses at query time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeRow {
    pub output_item_key: String,
    #[serde(default)]
    pub station: String,
    #[serde(default)]
    pub tradeskill: String,
    #[serde(default)]
    pub required_level: u32,
    #[serde(default)]
    pub tier: u8,
    pub ingredients: String,
    /// Upstream record with canonicalized field names, kept for fields not modelled yet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IngredientRef {
    #[serde(alias = "item", alias = "id")]
    pub name: String,
    #[serde(alias = "qty")]
    pub quantity: i64,
}

/// Encode ingredient refs into the stored payload shape.
pub fn encode_ingredients(ingredients: &[IngredientRef]) -> String {
    serde_json::to_string(ingredients).unwrap_or_else(|_| "[]".to_string())
}

pub fn decode_ingredients(payload: &str) -> Result<Vec<IngredientRef>, serde_json::Error> {
    serde_json::from_str(payload)
}
