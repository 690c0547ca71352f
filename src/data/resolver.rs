//! Name resolution: maps display names, internal ids and legacy tokens to one item key.
//!
//! Three alias sources feed one closed map. Precedence on collision is
//! curated > per-item > external. The map is closed at build time (every
//! target maps to itself or is absent), which keeps [`AliasMap::resolve`]
//! idempotent and O(1).

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::data::model::Item;
use crate::data::sanitize::normalize_key;

const EMBEDDED_GENERIC_MATERIALS: &str = include_str!("../../data/generic_materials.json");

/// Curated generic-material table: internal id -> canonical display name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CuratedTable {
    entries: HashMap<String, String>,
}

impl CuratedTable {
    /// Table shipped with the crate.
    pub fn embedded() -> Result<Self, serde_json::Error> {
        Self::from_json(EMBEDDED_GENERIC_MATERIALS)
    }

    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        let parsed: HashMap<String, String> = serde_json::from_str(raw)?;
        Ok(Self::from_pairs(parsed))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, std::io::Error> {
        let raw = fs::read_to_string(path)?;
        Self::from_json(&raw).map_err(std::io::Error::other)
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let entries = pairs
            .into_iter()
            .map(|(id, name)| (normalize_key(id.as_ref()), name.as_ref().trim().to_string()))
            .filter(|(id, name)| !id.is_empty() && !name.is_empty())
            .collect();
        Self { entries }
    }

    /// Display name for a normalized id.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Load an external alias dump (`{"alias": "Canonical Name"}`), normalizing both sides.
pub fn load_alias_dump(path: impl AsRef<Path>) -> Result<HashMap<String, String>, std::io::Error> {
    let raw = fs::read_to_string(path)?;
    let parsed: HashMap<String, String> =
        serde_json::from_str(&raw).map_err(std::io::Error::other)?;
    Ok(parsed
        .into_iter()
        .map(|(alias, canonical)| (normalize_key(&alias), normalize_key(&canonical)))
        .filter(|(alias, canonical)| !alias.is_empty() && !canonical.is_empty())
        .collect())
}

/// Closed alias map: alias key -> canonical item key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AliasMap {
    entries: HashMap<String, String>,
}

impl AliasMap {
    /// Build from the three sources. Later inserts win, so external goes first and curated last.
    pub fn build(curated: &CuratedTable, items: &[Item], external: &HashMap<String, String>) -> Self {
        let mut entries: HashMap<String, String> = HashMap::new();

        for (alias, canonical) in external {
            entries.insert(normalize_key(alias), normalize_key(canonical));
        }

        for item in items {
            let id_key = normalize_key(&item.item_id);
            let target = curated
                .get(&id_key)
                .map(normalize_key)
                .unwrap_or_else(|| item.key());
            if target.is_empty() {
                continue;
            }
            let name_key = item.key();
            if !name_key.is_empty() {
                entries.insert(name_key, target.clone());
            }
            if !id_key.is_empty() {
                entries.insert(id_key, target);
            }
        }

        for (id, name) in curated.iter() {
            entries.insert(id.to_string(), normalize_key(name));
        }

        Self::closed(entries)
    }

    /// Map any input to its canonical key; unknown inputs come back normalized but otherwise unchanged.
    pub fn resolve(&self, input: &str) -> String {
        let key = normalize_key(input);
        match self.entries.get(&key) {
            Some(canonical) => canonical.clone(),
            None => key,
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Rebuild with every entry chased to its terminal key.
    fn closed(entries: HashMap<String, String>) -> Self {
        let closed = entries
            .keys()
            .map(|alias| (alias.clone(), chase(&entries, alias)))
            .collect();
        Self { entries: closed }
    }
}

/// Follow alias links from `start` until a key that is absent or maps to itself. Cycles collapse to
/// their lexicographically smallest member.
fn chase(entries: &HashMap<String, String>, start: &str) -> String {
    let mut path: Vec<&str> = vec![start];
    let mut current = start;
    loop {
        match entries.get(current) {
            Some(next) if next != current => {
                if let Some(pos) = path.iter().position(|seen| *seen == next.as_str()) {
                    let representative = path[pos..].iter().min().copied().unwrap_or(current);
                    warn!(alias = start, representative, "alias cycle collapsed");
                    return representative.to_string();
                }
                debug!(from = current, to = next.as_str(), "alias hop");
                path.push(next.as_str());
                current = next.as_str();
            }
            _ => return current.to_string(),
        }
    }
}
