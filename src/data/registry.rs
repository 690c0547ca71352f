//! Data registry: provenance for each stored dataset.
//! Written at every store commit; read by the server and CLI to show "data as of".

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSetEntry {
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
    pub path: String,
    #[serde(default)]
    pub records: usize,
}

impl DataSetEntry {
    /// Entry stamped with today's UTC date.
    pub fn stamped(source: impl Into<String>, path: impl Into<String>, records: usize) -> Self {
        Self {
            source: source.into(),
            data_version: None,
            last_updated: Some(chrono::Utc::now().format("%Y-%m-%d").to_string()),
            path: path.into(),
            records,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.data_version = Some(version.into());
        self
    }
}

pub type Registry = BTreeMap<String, DataSetEntry>;

pub const REGISTRY_FILE: &str = "registry.json";
