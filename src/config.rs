//! Runtime configuration: defaults, then an optional YAML file, then environment variables.
//!
//! Environment variables:
//! - `FORGEWRIGHT_CONFIG` - YAML file to load before env overrides
//! - `FORGEWRIGHT_DATA_DIR` - store and registry root (default `data`)
//! - `FORGEWRIGHT_BIND` - server bind address (default `127.0.0.1:3000`)
//! - `FORGEWRIGHT_ITEMS_URL`, `FORGEWRIGHT_RECIPES_URL`, `FORGEWRIGHT_PERKS_URL` - page URL templates with `{page}`
//! - `FORGEWRIGHT_LEGACY_RECIPES_CSV` - legacy recipe CSV path
//! - `FORGEWRIGHT_ALIAS_DUMP` - external alias dump path
//! - `FORGEWRIGHT_CURATED_MATERIALS` - override for the shipped generic-material table
//! - `FORGEWRIGHT_MAX_DEPTH`, `FORGEWRIGHT_MAX_UNIQUE_MATERIALS` - rollup caps
//! - `FORGEWRIGHT_GEAR_SCORE` - gear score used when rendering perk descriptions
//! - `FORGEWRIGHT_QUERY_TIMEOUT_MS` - per-request deadline for server queries

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::recipe::rollup::RollupLimits;

pub const DEFAULT_DATA_DIR: &str = "data";
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";
pub const DEFAULT_ITEMS_URL: &str = "https://nwdb.info/db/items/page/{page}.json";
pub const DEFAULT_RECIPES_URL: &str = "https://nwdb.info/db/recipes/page/{page}.json";
pub const DEFAULT_PERKS_URL: &str = "https://nwdb.info/db/perks/page/{page}.json";
pub const DEFAULT_ICON_BASE_URL: &str = "https://cdn.nwdb.info/db/images/live/v9/";
pub const DEFAULT_GEAR_SCORE: f64 = 725.0;
pub const DEFAULT_SUSPICIOUS_QUANTITY: u64 = 10_000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
}

/// Where ingestion pulls its data from and how hard it retries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub items_url: String,
    /// `None` runs legacy-only recipe ingestion.
    pub recipes_url: Option<String>,
    pub perks_url: String,
    pub legacy_recipes_csv: Option<PathBuf>,
    pub alias_dump: Option<PathBuf>,
    /// Replaces the embedded generic-material table when set.
    pub curated_materials: Option<PathBuf>,
    pub icon_base_url: String,
    pub retry_attempts: u32,
    pub retry_base_delay_ms: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            items_url: DEFAULT_ITEMS_URL.to_string(),
            recipes_url: Some(DEFAULT_RECIPES_URL.to_string()),
            perks_url: DEFAULT_PERKS_URL.to_string(),
            legacy_recipes_csv: Some(PathBuf::from("data/sources/recipes_legacy.csv")),
            alias_dump: Some(PathBuf::from("data/sources/aliases.json")),
            curated_materials: None,
            icon_base_url: DEFAULT_ICON_BASE_URL.to_string(),
            retry_attempts: 3,
            retry_base_delay_ms: 2_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub data_dir: PathBuf,
    pub bind_addr: String,
    pub sources: SourceConfig,
    pub rollup: RollupLimits,
    pub gear_score: f64,
    pub suspicious_quantity: u64,
    pub query_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            sources: SourceConfig::default(),
            rollup: RollupLimits::default(),
            gear_score: DEFAULT_GEAR_SCORE,
            suspicious_quantity: DEFAULT_SUSPICIOUS_QUANTITY,
            query_timeout_ms: 5_000,
        }
    }
}

impl Config {
    /// Defaults, then `FORGEWRIGHT_CONFIG` (if set), then the other env vars.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var("FORGEWRIGHT_CONFIG") {
            Ok(path) => Self::from_yaml_file(&path)?,
            Err(_) => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply `FORGEWRIGHT_*` overrides through `lookup`. Unparseable numbers keep the current value.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(dir) = lookup("FORGEWRIGHT_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(bind) = lookup("FORGEWRIGHT_BIND") {
            self.bind_addr = bind;
        }
        if let Some(url) = lookup("FORGEWRIGHT_ITEMS_URL") {
            self.sources.items_url = url;
        }
        if let Some(url) = lookup("FORGEWRIGHT_RECIPES_URL") {
            self.sources.recipes_url = (!url.trim().is_empty()).then_some(url);
        }
        if let Some(url) = lookup("FORGEWRIGHT_PERKS_URL") {
            self.sources.perks_url = url;
        }
        if let Some(path) = lookup("FORGEWRIGHT_LEGACY_RECIPES_CSV") {
            self.sources.legacy_recipes_csv = Some(PathBuf::from(path));
        }
        if let Some(path) = lookup("FORGEWRIGHT_ALIAS_DUMP") {
            self.sources.alias_dump = Some(PathBuf::from(path));
        }
        if let Some(path) = lookup("FORGEWRIGHT_CURATED_MATERIALS") {
            self.sources.curated_materials = Some(PathBuf::from(path));
        }
        override_parsed(&lookup, "FORGEWRIGHT_MAX_DEPTH", &mut self.rollup.max_depth);
        override_parsed(
            &lookup,
            "FORGEWRIGHT_MAX_UNIQUE_MATERIALS",
            &mut self.rollup.max_unique_materials,
        );
        override_parsed(&lookup, "FORGEWRIGHT_GEAR_SCORE", &mut self.gear_score);
        override_parsed(&lookup, "FORGEWRIGHT_QUERY_TIMEOUT_MS", &mut self.query_timeout_ms);
    }

    pub fn store_dir(&self) -> PathBuf {
        self.data_dir.join("store")
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }
}

fn override_parsed<T: FromStr + std::fmt::Display>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    target: &mut T,
) {
    let Some(raw) = lookup(name) else {
        return;
    };
    match raw.trim().parse::<T>() {
        Ok(value) => *target = value,
        Err(_) => warn!(variable = name, value = %raw, "invalid value, keeping {}", target),
    }
}
