#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use forgewright::config::Config;
use forgewright::error::FetchError;
use forgewright::ingest::{PageFetcher, RetryPolicy};
use serde_json::{json, Value};

/// Serves canned pages by URL; anything else is a 404.
#[derive(Default)]
pub struct FixtureFetcher {
    pages: HashMap<String, Value>,
}

impl FixtureFetcher {
    pub fn with_page(mut self, url: &str, body: Value) -> Self {
        self.pages.insert(url.to_string(), body);
        self
    }

    pub fn without(mut self, url: &str) -> Self {
        self.pages.remove(url);
        self
    }
}

impl PageFetcher for FixtureFetcher {
    fn fetch(&self, url: &str) -> Result<Value, FetchError> {
        self.pages.get(url).cloned().ok_or_else(|| FetchError::Status {
            url: url.to_string(),
            status: 404,
        })
    }
}

pub fn no_retry() -> RetryPolicy {
    RetryPolicy {
        attempts: 1,
        base_delay: Duration::ZERO,
    }
}

/// Config pointing every source at `fixture://` URLs and files under `dir`.
pub fn fixture_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.data_dir = dir.to_path_buf();
    config.sources.items_url = "fixture://items/{page}".to_string();
    config.sources.recipes_url = Some("fixture://recipes/{page}".to_string());
    config.sources.perks_url = "fixture://perks/{page}".to_string();
    config.sources.legacy_recipes_csv = Some(dir.join("recipes_legacy.csv"));
    config.sources.alias_dump = Some(dir.join("aliases.json"));
    config
}

pub fn fixture_fetcher() -> FixtureFetcher {
    FixtureFetcher::default()
        .with_page(
            "fixture://items/1",
            json!({"pageCount": 2, "data": [
                {"id": "OreT1", "name": "Iron Ore", "tier": 1, "itemType": "Resource"},
                {"id": "IngotT1", "name": "Iron Ingot", "tier": 2, "rarity": 0},
                {"id": "IngotT2", "name": "Steel Ingot", "tier": 3, "rarity": 1},
                {"id": "Charcoal", "name": "Charcoal", "tier": 2}
            ]}),
        )
        .with_page(
            "fixture://items/2",
            json!({"pageCount": 2, "data": [
                {"id": "FluxT1", "name": "Sand Flux", "tier": 1},
                {"id": "IngotT5", "name": "Asmodeum", "tier": 5, "rarity": 3},
                {"id": "IngotT53", "name": "Prismatic Ingot", "tier": 5, "rarity": 4,
                 "description": "<b>Shimmering</b> metal"}
            ]}),
        )
        .with_page(
            "fixture://recipes/1",
            json!({"pageCount": 1, "data": [
                {"id": "r_steel", "output": {"name": "Steel Ingot"}, "station": "Smelter",
                 "tradeskill": "Smelting", "recipeLevel": 50, "tier": 3,
                 "ingredients": [
                     {"name": "Iron Ingot", "quantity": 3},
                     {"name": "Charcoal", "quantity": 1},
                     {"name": "FluxT1", "quantity": 1}
                 ]},
                {"id": "r_iron", "output": {"id": "IngotT1"}, "station": "Smelter",
                 "ingredients": [{"name": "Iron Ore", "quantity": 4}]}
            ]}),
        )
        .with_page(
            "fixture://perks/1",
            json!({"pageCount": 1, "data": [
                {"id": "PerkID_Keen", "name": "Keen", "perkType": "Generated",
                 "description": "Deals {[5 * perkMultiplier]} bonus damage"}
            ]}),
        )
}

pub const LEGACY_CSV: &str = "Name,Ingredient1,Qty1,Ingredient2,Qty2\n\
Prismatic Ingot,IngotT5,2,Charcoal,1\n\
Iron Ingot,OreT1,9,,\n";

pub const ALIAS_DUMP: &str = r#"{"prismatic bar": "Prismatic Ingot", "ferrous ingot": "Iron Ingot"}"#;

/// Write the legacy CSV and alias dump next to `config`'s data dir.
pub fn write_local_sources(config: &Config) {
    if let Some(path) = &config.sources.legacy_recipes_csv {
        std::fs::write(path, LEGACY_CSV).expect("legacy csv should be writable");
    }
    if let Some(path) = &config.sources.alias_dump {
        std::fs::write(path, ALIAS_DUMP).expect("alias dump should be writable");
    }
}
