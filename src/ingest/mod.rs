//! Offline ingestion: fetch every source, normalize, then swap the whole store in one commit.
//!
//! Items are authoritative: if they cannot be fetched the run aborts and the live
//! store is untouched. The primary recipe source, the legacy CSV, the alias dump
//! and the perk source each degrade with a warning instead.

pub mod items;
pub mod perks;
pub mod recipes;
pub mod source;

use std::collections::HashMap;
use std::path::Path;

use serde::Serialize;
use tracing::{info, warn};

use crate::cancel::CancelToken;
use crate::config::Config;
use crate::data::model::{Item, Perk, RecipeRow, RecipeTable};
use crate::data::registry::{DataSetEntry, Registry};
use crate::data::resolver::{load_alias_dump, AliasMap, CuratedTable};
use crate::data::store::{Store, StoreTables};
use crate::error::IngestError;

pub use recipes::SuspiciousQuantity;
pub use source::{HttpFetcher, PageFetcher, RetryPolicy};

/// A record dropped during normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedRecord {
    pub table: &'static str,
    pub index: usize,
    pub reason: String,
}

impl SkippedRecord {
    pub fn new(table: &'static str, index: usize, reason: impl Into<String>) -> Self {
        Self {
            table,
            index,
            reason: reason.into(),
        }
    }
}

/// A recipe whose output key matches no item. Kept in its table, reported here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrphanRecipe {
    pub table: &'static str,
    pub key: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TableCounts {
    pub items: usize,
    pub perks: usize,
    pub recipes_primary: usize,
    pub recipes_legacy: usize,
    pub aliases: usize,
}

/// Outcome of a committed ingestion run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    pub counts: TableCounts,
    pub skipped: Vec<SkippedRecord>,
    pub orphan_recipes: Vec<OrphanRecipe>,
    pub suspicious_quantities: Vec<SuspiciousQuantity>,
    pub warnings: Vec<String>,
}

impl IngestReport {
    fn warn(&mut self, message: String) {
        warn!("{message}");
        self.warnings.push(message);
    }
}

/// Drives one ingestion run against `store`.
pub struct Ingestor<'a> {
    config: &'a Config,
    fetcher: &'a dyn PageFetcher,
    retry: RetryPolicy,
}

impl<'a> Ingestor<'a> {
    pub fn new(config: &'a Config, fetcher: &'a dyn PageFetcher) -> Self {
        Self {
            config,
            fetcher,
            retry: RetryPolicy::from_config(&config.sources),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Fetch, normalize and commit. Nothing is written unless every required step succeeds.
    pub fn run(&self, store: &Store, cancel: &CancelToken) -> Result<IngestReport, IngestError> {
        let sources = &self.config.sources;
        let threshold = self.config.suspicious_quantity;
        let mut report = IngestReport::default();

        let curated = self.curated_table()?;

        let raw_items = source::fetch_pages(self.fetcher, &sources.items_url, &self.retry, "items", cancel)?;
        let (items, skipped) = items::normalize_items(raw_items, &sources.icon_base_url);
        report.skipped.extend(skipped);
        if items.is_empty() {
            return Err(IngestError::SchemaMismatch {
                source_name: "items".to_string(),
                reason: "no usable item records".to_string(),
            });
        }

        let external = self.external_aliases(&mut report);
        let aliases = AliasMap::build(&curated, &items, &external);

        let recipes_primary = match &sources.recipes_url {
            Some(url) => match source::fetch_pages(self.fetcher, url, &self.retry, "recipes_primary", cancel) {
                Ok(records) => {
                    let load = recipes::normalize_primary(records, &aliases, threshold);
                    report.skipped.extend(load.skipped);
                    report.suspicious_quantities.extend(load.suspicious);
                    load.rows
                }
                Err(IngestError::Cancelled) => return Err(IngestError::Cancelled),
                Err(err) => {
                    report.warn(format!("primary recipe source failed, continuing legacy-only: {err}"));
                    Vec::new()
                }
            },
            None => {
                report.warn("no primary recipe source configured, continuing legacy-only".to_string());
                Vec::new()
            }
        };

        let recipes_legacy = match &sources.legacy_recipes_csv {
            Some(path) => match recipes::load_legacy_csv(path, &aliases, threshold)? {
                Some(load) => {
                    report.skipped.extend(load.skipped);
                    report.suspicious_quantities.extend(load.suspicious);
                    load.rows
                }
                None => {
                    report.warn(format!("legacy recipe csv {} not found", path.display()));
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        let perks = self.perks(store, &mut report, cancel)?;

        let tables = StoreTables {
            registry: self.registry(&items, &perks, &recipes_primary, &recipes_legacy, &aliases),
            items,
            perks,
            recipes_primary,
            recipes_legacy,
            aliases,
        };
        report.orphan_recipes = find_orphans(&tables);
        report.counts = TableCounts {
            items: tables.items.len(),
            perks: tables.perks.len(),
            recipes_primary: tables.recipes_primary.len(),
            recipes_legacy: tables.recipes_legacy.len(),
            aliases: tables.aliases.len(),
        };

        if cancel.is_cancelled() {
            return Err(IngestError::Cancelled);
        }
        store.commit(tables)?;
        info!(
            items = report.counts.items,
            perks = report.counts.perks,
            primary = report.counts.recipes_primary,
            legacy = report.counts.recipes_legacy,
            orphans = report.orphan_recipes.len(),
            "ingestion committed"
        );
        Ok(report)
    }

    fn curated_table(&self) -> Result<CuratedTable, IngestError> {
        match &self.config.sources.curated_materials {
            Some(path) => Ok(CuratedTable::load(path)?),
            None => CuratedTable::embedded().map_err(|err| IngestError::SchemaMismatch {
                source_name: "curated_materials".to_string(),
                reason: err.to_string(),
            }),
        }
    }

    fn external_aliases(&self, report: &mut IngestReport) -> HashMap<String, String> {
        let Some(path) = &self.config.sources.alias_dump else {
            return HashMap::new();
        };
        if !path.exists() {
            report.warn(format!("alias dump {} not found, continuing without it", path.display()));
            return HashMap::new();
        }
        match load_alias_dump(path) {
            Ok(aliases) => aliases,
            Err(err) => {
                report.warn(format!("alias dump {} unreadable, continuing without it: {err}", path.display()));
                HashMap::new()
            }
        }
    }

    /// Fresh perks, or the live store's perks when the perk source is unreachable.
    fn perks(&self, store: &Store, report: &mut IngestReport, cancel: &CancelToken) -> Result<Vec<Perk>, IngestError> {
        let sources = &self.config.sources;
        match source::fetch_pages(self.fetcher, &sources.perks_url, &self.retry, "perks", cancel) {
            Ok(records) => {
                let (perks, skipped) = perks::normalize_perks(records, &sources.icon_base_url);
                report.skipped.extend(skipped);
                Ok(perks)
            }
            Err(IngestError::SourceUnavailable { reason, .. }) => {
                let previous = store
                    .snapshot()
                    .map(|snapshot| snapshot.tables().perks.clone())
                    .unwrap_or_default();
                report.warn(format!(
                    "perk source unavailable, keeping {} previously stored perks: {reason}",
                    previous.len()
                ));
                Ok(previous)
            }
            Err(err) => Err(err),
        }
    }

    fn registry(
        &self,
        items: &[Item],
        perks: &[Perk],
        primary: &[RecipeRow],
        legacy: &[RecipeRow],
        aliases: &AliasMap,
    ) -> Registry {
        let sources = &self.config.sources;
        let path_text = |path: Option<&Path>| path.map(|p| p.display().to_string()).unwrap_or_default();
        let version = env!("CARGO_PKG_VERSION");
        let mut registry = Registry::new();
        registry.insert(
            "items".to_string(),
            DataSetEntry::stamped(sources.items_url.clone(), "items.json", items.len()).with_version(version),
        );
        registry.insert(
            "perks".to_string(),
            DataSetEntry::stamped(sources.perks_url.clone(), "perks.json", perks.len()).with_version(version),
        );
        registry.insert(
            RecipeTable::Primary.as_str().to_string(),
            DataSetEntry::stamped(
                sources.recipes_url.clone().unwrap_or_default(),
                "recipes_primary.json",
                primary.len(),
            )
            .with_version(version),
        );
        registry.insert(
            RecipeTable::Legacy.as_str().to_string(),
            DataSetEntry::stamped(path_text(sources.legacy_recipes_csv.as_deref()), "recipes_legacy.json", legacy.len())
                .with_version(version),
        );
        registry.insert(
            "aliases".to_string(),
            DataSetEntry::stamped(path_text(sources.alias_dump.as_deref()), "aliases.json", aliases.len())
                .with_version(version),
        );
        registry
    }
}

/// Recipes whose output key names no item. Logged and reported; the rows stay.
fn find_orphans(tables: &StoreTables) -> Vec<OrphanRecipe> {
    let item_keys: std::collections::HashSet<String> = tables.items.iter().map(|item| item.key()).collect();
    let mut orphans = Vec::new();
    for (table, rows) in [
        (RecipeTable::Primary, &tables.recipes_primary),
        (RecipeTable::Legacy, &tables.recipes_legacy),
    ] {
        for row in rows.iter().filter(|row| !item_keys.contains(&row.output_item_key)) {
            warn!(table = table.as_str(), key = %row.output_item_key, "orphan recipe");
            orphans.push(OrphanRecipe {
                table: table.as_str(),
                key: row.output_item_key.clone(),
            });
        }
    }
    orphans
}

#[cfg(test)]
mod tests {
    use super::source::testing::{no_delay, CannedFetcher};
    use super::*;
    use crate::error::CoreError;
    use serde_json::json;

    fn config(dir: &Path) -> Config {
        let mut config = Config::default();
        config.data_dir = dir.to_path_buf();
        config.sources.items_url = "items/{page}".to_string();
        config.sources.recipes_url = Some("recipes/{page}".to_string());
        config.sources.perks_url = "perks/{page}".to_string();
        config.sources.legacy_recipes_csv = Some(dir.join("legacy.csv"));
        config.sources.alias_dump = Some(dir.join("aliases.json"));
        config
    }

    fn fetcher() -> CannedFetcher {
        CannedFetcher::default()
            .with_page(
                "items/1",
                json!({"pageCount": 1, "data": [
                    {"id": "OreT1", "name": "Iron Ore"},
                    {"id": "IngotT1", "name": "Iron Ingot"},
                    {"id": "IngotT5", "name": "Asmodeum"}
                ]}),
            )
            .with_page(
                "recipes/1",
                json!({"pageCount": 1, "data": [
                    {"id": "r1", "output": {"name": "Iron Ingot"}, "ingredients": [{"name": "Iron Ore", "quantity": 4}]},
                    {"id": "r2", "output": {"name": "Lost Relic"}, "ingredients": [{"name": "Iron Ore", "quantity": 1}]}
                ]}),
            )
            .with_page("perks/1", json!({"pageCount": 1, "data": [{"id": "PerkID_A", "name": "Keen"}]}))
    }

    #[test]
    fn run_commits_all_tables_and_reports_orphans() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        std::fs::write(dir.path().join("legacy.csv"), "Name,Ingredient1,Qty1\nAsmodeum,IngotT1,3\n").unwrap();
        let store = Store::unloaded(config.store_dir());

        let fetcher = fetcher();
        let report = Ingestor::new(&config, &fetcher)
            .with_retry(no_delay(1))
            .run(&store, &CancelToken::new())
            .unwrap();

        assert_eq!(report.counts.items, 3);
        assert_eq!(report.counts.recipes_primary, 2);
        assert_eq!(report.counts.recipes_legacy, 1);
        assert_eq!(report.orphan_recipes, vec![OrphanRecipe { table: "recipes_primary", key: "lost relic".to_string() }]);
        assert!(report.warnings.iter().any(|w| w.contains("alias dump")));

        let snapshot = store.snapshot().unwrap();
        assert!(snapshot.has_recipe("asmodeum"));
        assert_eq!(snapshot.registry()["items"].records, 3);
        assert!(Store::open(config.store_dir()).is_ok());
    }

    #[test]
    fn item_failure_aborts_without_touching_the_store() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let store = Store::unloaded(config.store_dir());
        let fetcher = CannedFetcher::default();

        let err = Ingestor::new(&config, &fetcher)
            .with_retry(no_delay(2))
            .run(&store, &CancelToken::new())
            .unwrap_err();
        assert!(matches!(err, IngestError::SourceUnavailable { .. }));
        assert_eq!(fetcher.calls_to("items/1"), 2);
        assert!(matches!(store.snapshot(), Err(CoreError::StoreUnavailable(_))));
        assert!(!config.store_dir().exists());
    }

    #[test]
    fn missing_primary_source_falls_back_to_legacy_only() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.sources.recipes_url = Some("gone/{page}".to_string());
        std::fs::write(dir.path().join("legacy.csv"), "Name,Ingredient1,Qty1\nIron Ingot,OreT1,4\n").unwrap();
        let store = Store::unloaded(config.store_dir());

        let fetcher = fetcher();
        let report = Ingestor::new(&config, &fetcher)
            .with_retry(no_delay(1))
            .run(&store, &CancelToken::new())
            .unwrap();
        assert_eq!(report.counts.recipes_primary, 0);
        assert_eq!(report.counts.recipes_legacy, 1);
        assert!(report.warnings.iter().any(|w| w.contains("legacy-only")));
    }

    #[test]
    fn unreachable_perks_keep_the_previous_ones() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let store = Store::unloaded(config.store_dir());
        let fetcher = fetcher();
        Ingestor::new(&config, &fetcher)
            .with_retry(no_delay(1))
            .run(&store, &CancelToken::new())
            .unwrap();

        let mut without_perks = config.clone();
        without_perks.sources.perks_url = "offline/{page}".to_string();
        let report = Ingestor::new(&without_perks, &fetcher)
            .with_retry(no_delay(1))
            .run(&store, &CancelToken::new())
            .unwrap();
        assert_eq!(report.counts.perks, 1);
        assert!(store.snapshot().unwrap().perk("perkid_a").is_some());
    }

    #[test]
    fn irregular_item_spacing_does_not_orphan_its_recipe() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.sources.legacy_recipes_csv = None;
        config.sources.alias_dump = None;
        let store = Store::unloaded(config.store_dir());
        let fetcher = CannedFetcher::default()
            .with_page(
                "items/1",
                json!({"pageCount": 1, "data": [
                    {"id": "OreT1", "name": "Iron Ore"},
                    {"id": "IngotT1", "name": "Iron  Ingot"}
                ]}),
            )
            .with_page(
                "recipes/1",
                json!({"pageCount": 1, "data": [
                    {"output": {"name": "Iron  Ingot"}, "ingredients": [{"name": "Iron Ore", "quantity": 4}]}
                ]}),
            )
            .with_page("perks/1", json!({"pageCount": 1, "data": [{"id": "PerkID_A", "name": "Keen"}]}));

        let report = Ingestor::new(&config, &fetcher)
            .with_retry(no_delay(1))
            .run(&store, &CancelToken::new())
            .unwrap();
        assert_eq!(report.counts.recipes_primary, 1);
        assert!(report.orphan_recipes.is_empty());
        assert!(store.snapshot().unwrap().has_recipe("iron ingot"));
    }
}
