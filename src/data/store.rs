//! Item & recipe store: an immutable in-memory snapshot, persisted as JSON tables.
//!
//! On disk the store directory holds generation directories (`gen-*`) plus a
//! `CURRENT` file naming the live one. A commit writes a fresh generation and
//! then renames a new `CURRENT` over the old, so a reader sees either the old
//! or the new tables, never a mix. In memory the live snapshot sits behind an
//! `Arc`; readers clone the `Arc` and never hold the lock while querying.

use std::collections::HashMap;
use std::fs;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::data::model::{Item, Perk, RecipeRow, RecipeTable};
use crate::data::registry::{Registry, REGISTRY_FILE};
use crate::data::resolver::AliasMap;
use crate::data::sanitize::normalize_key;
use crate::error::{CoreError, CoreResult};

/// Upper bound on list query results (and autocomplete suggestions).
pub const MAX_RESULTS: usize = 25;

const CURRENT_FILE: &str = "CURRENT";
const ITEMS_FILE: &str = "items.json";
const PERKS_FILE: &str = "perks.json";
const PRIMARY_FILE: &str = "recipes_primary.json";
const LEGACY_FILE: &str = "recipes_legacy.json";
const ALIASES_FILE: &str = "aliases.json";

/// Everything the store persists. Ingestion builds one of these and commits it as a unit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreTables {
    pub items: Vec<Item>,
    pub perks: Vec<Perk>,
    pub recipes_primary: Vec<RecipeRow>,
    pub recipes_legacy: Vec<RecipeRow>,
    pub aliases: AliasMap,
    pub registry: Registry,
}

/// Indexed, read-only view over one set of tables.
#[derive(Debug, Default)]
pub struct StoreSnapshot {
    tables: StoreTables,
    item_names: Vec<String>,
    item_by_key: HashMap<String, usize>,
    item_by_id: HashMap<String, usize>,
    perk_names: Vec<String>,
    perk_by_id: HashMap<String, usize>,
    primary: HashMap<String, usize>,
    legacy: HashMap<String, usize>,
}

impl StoreSnapshot {
    pub fn from_tables(tables: StoreTables) -> Self {
        let item_names: Vec<String> = tables.items.iter().map(Item::key).collect();
        let mut item_by_key = HashMap::with_capacity(tables.items.len());
        let mut item_by_id = HashMap::with_capacity(tables.items.len());
        for (index, item) in tables.items.iter().enumerate() {
            item_by_key.entry(item_names[index].clone()).or_insert(index);
            item_by_id.entry(normalize_key(&item.item_id)).or_insert(index);
        }

        let perk_names: Vec<String> = tables.perks.iter().map(|p| normalize_key(&p.name)).collect();
        let perk_by_id = tables
            .perks
            .iter()
            .enumerate()
            .map(|(index, perk)| (normalize_key(&perk.perk_id), index))
            .collect();

        let primary = index_recipes(&tables.recipes_primary);
        let legacy = index_recipes(&tables.recipes_legacy);

        Self {
            tables,
            item_names,
            item_by_key,
            item_by_id,
            perk_names,
            perk_by_id,
            primary,
            legacy,
        }
    }

    pub fn tables(&self) -> &StoreTables {
        &self.tables
    }

    pub fn registry(&self) -> &Registry {
        &self.tables.registry
    }

    pub fn aliases(&self) -> &AliasMap {
        &self.tables.aliases
    }

    pub fn resolve(&self, input: &str) -> String {
        self.tables.aliases.resolve(input)
    }

    /// Item by lowercased canonical name or internal id.
    pub fn item(&self, key: &str) -> Option<&Item> {
        let key = normalize_key(key);
        self.item_by_key
            .get(&key)
            .or_else(|| self.item_by_id.get(&key))
            .map(|&index| &self.tables.items[index])
    }

    pub fn perk(&self, perk_id: &str) -> Option<&Perk> {
        self.perk_by_id
            .get(&normalize_key(perk_id))
            .map(|&index| &self.tables.perks[index])
    }

    /// Items matching `query`, at most [`MAX_RESULTS`]. Exact matches compare name or id; otherwise
    /// substring matches on the name, prefix matches first, then lexicographic.
    pub fn find_item(&self, query: &str, exact: bool) -> Vec<&Item> {
        let query = normalize_key(query);
        if exact {
            return self.item(&query).into_iter().collect();
        }
        ranked_matches(&self.item_names, &query)
            .into_iter()
            .map(|index| &self.tables.items[index])
            .collect()
    }

    /// Perks matching `query` by id or name, same ordering as [`StoreSnapshot::find_item`].
    pub fn find_perk(&self, query: &str, exact: bool) -> Vec<&Perk> {
        let query = normalize_key(query);
        if exact {
            let by_id = self.perk(&query);
            let by_name = self
                .perk_names
                .iter()
                .position(|name| *name == query)
                .map(|index| &self.tables.perks[index]);
            return by_id.or(by_name).into_iter().collect();
        }
        ranked_matches(&self.perk_names, &query)
            .into_iter()
            .map(|index| &self.tables.perks[index])
            .collect()
    }

    pub fn recipe_row(&self, table: RecipeTable, key: &str) -> Option<&RecipeRow> {
        let index = match table {
            RecipeTable::Primary => self.primary.get(key),
            RecipeTable::Legacy => self.legacy.get(key),
        }?;
        Some(match table {
            RecipeTable::Primary => &self.tables.recipes_primary[*index],
            RecipeTable::Legacy => &self.tables.recipes_legacy[*index],
        })
    }

    /// True when either recipe table has a row for the resolved key.
    pub fn has_recipe(&self, key: &str) -> bool {
        let key = self.resolve(key);
        self.primary.contains_key(&key) || self.legacy.contains_key(&key)
    }

    /// Keys present in either recipe table, primary first, without duplicates.
    pub fn recipe_keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self
            .tables
            .recipes_primary
            .iter()
            .map(|row| row.output_item_key.as_str())
            .collect();
        keys.extend(
            self.tables
                .recipes_legacy
                .iter()
                .map(|row| row.output_item_key.as_str())
                .filter(|key| !self.primary.contains_key(*key)),
        );
        keys
    }

    /// Recipe output keys matching `query`, ranked like [`StoreSnapshot::find_item`].
    pub fn find_craftable(&self, query: &str) -> Vec<String> {
        let query = normalize_key(query);
        let keys: Vec<String> = self.recipe_keys().into_iter().map(str::to_string).collect();
        ranked_matches(&keys, &query)
            .into_iter()
            .map(|index| keys[index].clone())
            .collect()
    }

    /// Display name for a key: the item's canonical name when known, otherwise the key itself.
    pub fn display_name(&self, key: &str) -> String {
        self.item(key)
            .map(|item| item.name.clone())
            .unwrap_or_else(|| key.to_string())
    }
}

fn index_recipes(rows: &[RecipeRow]) -> HashMap<String, usize> {
    let mut index = HashMap::with_capacity(rows.len());
    for (position, row) in rows.iter().enumerate() {
        index.entry(row.output_item_key.clone()).or_insert(position);
    }
    index
}

fn ranked_matches(names: &[String], query: &str) -> Vec<usize> {
    let mut hits: Vec<(bool, &str, usize)> = names
        .iter()
        .enumerate()
        .filter(|(_, name)| name.contains(query))
        .map(|(index, name)| (!name.starts_with(query), name.as_str(), index))
        .collect();
    hits.sort();
    hits.into_iter().take(MAX_RESULTS).map(|(_, _, index)| index).collect()
}

/// Handle to the live snapshot and, when persistent, its directory.
#[derive(Debug)]
pub struct Store {
    dir: Option<PathBuf>,
    current: RwLock<Option<Arc<StoreSnapshot>>>,
}

impl Store {
    /// Open the store at `dir`, loading the generation named by `CURRENT`.
    pub fn open(dir: impl Into<PathBuf>) -> CoreResult<Self> {
        let dir = dir.into();
        let tables = read_tables(&dir)?;
        let snapshot = StoreSnapshot::from_tables(tables);
        info!(
            dir = %dir.display(),
            items = snapshot.tables.items.len(),
            perks = snapshot.tables.perks.len(),
            primary = snapshot.tables.recipes_primary.len(),
            legacy = snapshot.tables.recipes_legacy.len(),
            "store loaded"
        );
        Ok(Self {
            dir: Some(dir),
            current: RwLock::new(Some(Arc::new(snapshot))),
        })
    }

    /// Store at `dir` with nothing loaded yet. Queries fail with `StoreUnavailable` until a commit.
    pub fn unloaded(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
            current: RwLock::new(None),
        }
    }

    /// Open `dir` if it holds a committed store, otherwise return an unloaded store there.
    pub fn open_or_unloaded(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        match Self::open(dir.clone()) {
            Ok(store) => store,
            Err(err) => {
                warn!(dir = %dir.display(), error = %err, "starting with an unloaded store");
                Self::unloaded(dir)
            }
        }
    }

    /// Memory-only store, never persisted.
    pub fn in_memory(tables: StoreTables) -> Self {
        Self {
            dir: None,
            current: RwLock::new(Some(Arc::new(StoreSnapshot::from_tables(tables)))),
        }
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// The live snapshot.
    pub fn snapshot(&self) -> CoreResult<Arc<StoreSnapshot>> {
        let guard = self
            .current
            .read()
            .map_err(|_| CoreError::StoreUnavailable("store lock poisoned".to_string()))?;
        guard
            .clone()
            .ok_or_else(|| CoreError::StoreUnavailable("no data loaded; run ingest first".to_string()))
    }

    /// Persist `tables` (when the store has a directory) and swap them in as the live snapshot.
    pub fn commit(&self, tables: StoreTables) -> CoreResult<Arc<StoreSnapshot>> {
        if let Some(dir) = &self.dir {
            write_generation(dir, &tables)?;
        }
        let snapshot = Arc::new(StoreSnapshot::from_tables(tables));
        let mut guard = self
            .current
            .write()
            .map_err(|_| CoreError::StoreUnavailable("store lock poisoned".to_string()))?;
        *guard = Some(Arc::clone(&snapshot));
        Ok(snapshot)
    }
}

fn unavailable(context: &str, path: &Path, err: impl std::fmt::Display) -> CoreError {
    CoreError::StoreUnavailable(format!("{context} {}: {err}", path.display()))
}

fn read_tables(dir: &Path) -> CoreResult<StoreTables> {
    let current_path = dir.join(CURRENT_FILE);
    let generation = fs::read_to_string(&current_path)
        .map_err(|err| unavailable("failed to read", &current_path, err))?;
    let generation_dir = dir.join(generation.trim());

    Ok(StoreTables {
        items: read_table(&generation_dir.join(ITEMS_FILE))?,
        perks: read_table(&generation_dir.join(PERKS_FILE))?,
        recipes_primary: read_table(&generation_dir.join(PRIMARY_FILE))?,
        recipes_legacy: read_table(&generation_dir.join(LEGACY_FILE))?,
        aliases: read_table(&generation_dir.join(ALIASES_FILE))?,
        registry: read_table(&generation_dir.join(REGISTRY_FILE))?,
    })
}

fn read_table<T: DeserializeOwned>(path: &Path) -> CoreResult<T> {
    let file = fs::File::open(path).map_err(|err| unavailable("failed to open", path, err))?;
    serde_json::from_reader(BufReader::new(file)).map_err(|err| unavailable("failed to parse", path, err))
}

fn write_table<T: Serialize>(path: &Path, value: &T) -> CoreResult<()> {
    let file = fs::File::create(path).map_err(|err| unavailable("failed to create", path, err))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)
        .map_err(|err| unavailable("failed to serialize", path, err))?;
    writer.flush().map_err(|err| unavailable("failed to flush", path, err))
}

fn write_generation(dir: &Path, tables: &StoreTables) -> CoreResult<()> {
    fs::create_dir_all(dir).map_err(|err| unavailable("failed to create", dir, err))?;
    let previous = fs::read_to_string(dir.join(CURRENT_FILE))
        .ok()
        .map(|name| name.trim().to_string());

    let stamp = chrono::Utc::now().format("%Y%m%d%H%M%S%9f");
    let mut generation = format!("gen-{stamp}");
    let mut suffix = 1;
    while dir.join(&generation).exists() {
        generation = format!("gen-{stamp}-{suffix}");
        suffix += 1;
    }
    let generation_dir = dir.join(&generation);
    fs::create_dir_all(&generation_dir).map_err(|err| unavailable("failed to create", &generation_dir, err))?;

    write_table(&generation_dir.join(ITEMS_FILE), &tables.items)?;
    write_table(&generation_dir.join(PERKS_FILE), &tables.perks)?;
    write_table(&generation_dir.join(PRIMARY_FILE), &tables.recipes_primary)?;
    write_table(&generation_dir.join(LEGACY_FILE), &tables.recipes_legacy)?;
    write_table(&generation_dir.join(ALIASES_FILE), &tables.aliases)?;
    write_table(&generation_dir.join(REGISTRY_FILE), &tables.registry)?;

    let pending = dir.join(format!("{CURRENT_FILE}.pending"));
    fs::write(&pending, &generation).map_err(|err| unavailable("failed to write", &pending, err))?;
    fs::rename(&pending, dir.join(CURRENT_FILE))
        .map_err(|err| unavailable("failed to swap", &pending, err))?;
    info!(generation = %generation, "store generation committed");

    prune_generations(dir, &generation, previous.as_deref());
    Ok(())
}

/// Drop generations other than the live one and the one it replaced.
fn prune_generations(dir: &Path, live: &str, previous: Option<&str>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().to_string();
        if !name.starts_with("gen-") || name == live || Some(name.as_str()) == previous {
            continue;
        }
        match fs::remove_dir_all(entry.path()) {
            Ok(()) => debug!(generation = %name, "pruned old store generation"),
            Err(err) => warn!(generation = %name, error = %err, "failed to prune store generation"),
        }
    }
}
