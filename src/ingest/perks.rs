//! Perk records: upstream JSON -> [`Perk`].

use rayon::prelude::*;
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::data::model::Perk;
use crate::data::sanitize::sanitize_html;
use crate::ingest::items::icon_url;
use crate::ingest::SkippedRecord;

#[derive(Debug, Deserialize)]
struct RawPerk {
    id: String,
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default, rename = "perkType")]
    perk_type: Option<String>,
    #[serde(default)]
    icon: Option<String>,
    #[serde(default)]
    condition: Option<String>,
    #[serde(default, rename = "itemClass")]
    item_class: Vec<String>,
    #[serde(default, rename = "exclusiveLabels")]
    exclusive_labels: Vec<String>,
    #[serde(default, rename = "exclusiveLabel")]
    exclusive_label: Option<String>,
    #[serde(default, rename = "craftMod")]
    craft_mod: Option<Value>,
    #[serde(default, rename = "generatedLabel")]
    generated_label: Option<String>,
}

/// Normalize raw perk records in parallel, keeping input order. Duplicate ids keep the first record.
pub fn normalize_perks(records: Vec<Value>, icon_base_url: &str) -> (Vec<Perk>, Vec<SkippedRecord>) {
    let parsed: Vec<Result<Perk, SkippedRecord>> = records
        .into_par_iter()
        .enumerate()
        .map(|(index, record)| {
            serde_json::from_value::<RawPerk>(record)
                .map_err(|err| SkippedRecord::new("perks", index, err.to_string()))
                .and_then(|raw| convert(raw, icon_base_url).ok_or_else(|| SkippedRecord::new("perks", index, "blank id or name")))
        })
        .collect();

    let mut perks: Vec<Perk> = Vec::with_capacity(parsed.len());
    let mut skipped = Vec::new();
    let mut seen = std::collections::HashSet::new();
    for result in parsed {
        match result {
            Ok(perk) if seen.insert(perk.perk_id.to_lowercase()) => perks.push(perk),
            Ok(_) => {}
            Err(skip) => {
                warn!(table = skip.table, index = skip.index, reason = %skip.reason, "skipping perk record");
                skipped.push(skip);
            }
        }
    }
    (perks, skipped)
}

fn convert(raw: RawPerk, icon_base_url: &str) -> Option<Perk> {
    let perk_id = raw.id.trim().to_string();
    let name = raw.name.trim().to_string();
    if perk_id.is_empty() || name.is_empty() {
        return None;
    }

    let mut exclusive_labels = raw.exclusive_labels;
    if let Some(label) = raw.exclusive_label.filter(|label| !label.trim().is_empty()) {
        if !exclusive_labels.contains(&label) {
            exclusive_labels.push(label);
        }
    }

    let craft_mod = match raw.craft_mod {
        Some(Value::Object(fields)) => fields.get("name").and_then(Value::as_str).map(str::to_string),
        Some(Value::String(name)) => Some(name),
        _ => None,
    };

    Some(Perk {
        perk_id,
        name,
        description: raw.description.as_deref().map(sanitize_html).unwrap_or_default(),
        perk_type: raw.perk_type.unwrap_or_default(),
        icon: raw.icon.as_deref().and_then(|icon| icon_url(icon_base_url, icon)),
        condition: raw.condition.map(|text| sanitize_html(&text)).filter(|text| !text.is_empty()),
        compatible_with: raw.item_class,
        exclusive_labels,
        craft_mod,
        generated_label: raw.generated_label,
    })
}
