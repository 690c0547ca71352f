//! Item records: upstream JSON -> [`Item`].

use std::collections::HashSet;

use rayon::prelude::*;
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::data::model::{Item, Rarity};
use crate::data::sanitize::sanitize_html;
use crate::ingest::SkippedRecord;

#[derive(Debug, Deserialize)]
struct RawItem {
    id: String,
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    icon: Option<String>,
    #[serde(default)]
    rarity: Option<Value>,
    #[serde(default)]
    tier: Option<Value>,
    #[serde(default, rename = "typeName")]
    type_name: Option<String>,
    #[serde(default, rename = "itemClass")]
    item_class: Vec<String>,
    #[serde(default)]
    weight: Option<f64>,
    #[serde(default, rename = "maxStackSize")]
    max_stack_size: Option<u32>,
    #[serde(default, rename = "gearScore")]
    gear_score: Option<Value>,
    #[serde(default)]
    perks: Vec<Value>,
}

/// Normalize raw item records in parallel, keeping input order, then drop duplicate ids and names
/// (first occurrence wins).
pub fn normalize_items(records: Vec<Value>, icon_base_url: &str) -> (Vec<Item>, Vec<SkippedRecord>) {
    let parsed: Vec<Result<Item, SkippedRecord>> = records
        .into_par_iter()
        .enumerate()
        .map(|(index, record)| {
            serde_json::from_value::<RawItem>(record)
                .map_err(|err| SkippedRecord::new("items", index, err.to_string()))
                .and_then(|raw| convert(raw, icon_base_url).map_err(|reason| SkippedRecord::new("items", index, reason)))
        })
        .collect();

    let mut items = Vec::with_capacity(parsed.len());
    let mut skipped = Vec::new();
    let mut seen_ids = HashSet::new();
    let mut seen_names = HashSet::new();
    for result in parsed {
        match result {
            Ok(item) => {
                if !seen_ids.insert(item.item_id.to_lowercase()) {
                    continue;
                }
                if !seen_names.insert(item.key()) {
                    warn!(item_id = %item.item_id, name = %item.name, "duplicate item name, keeping the first");
                    continue;
                }
                items.push(item);
            }
            Err(skip) => {
                warn!(table = skip.table, index = skip.index, reason = %skip.reason, "skipping item record");
                skipped.push(skip);
            }
        }
    }
    (items, skipped)
}

fn convert(raw: RawItem, icon_base_url: &str) -> Result<Item, String> {
    let item_id = raw.id.trim().to_string();
    let name = raw.name.trim().to_string();
    if item_id.is_empty() || name.is_empty() {
        return Err("blank id or name".to_string());
    }

    let perks = raw
        .perks
        .iter()
        .filter_map(|perk| match perk {
            Value::String(id) => Some(id.trim().to_string()),
            Value::Object(fields) => fields.get("id").and_then(Value::as_str).map(str::to_string),
            _ => None,
        })
        .filter(|id| !id.is_empty())
        .collect::<Vec<_>>()
        .join("|");

    Ok(Item {
        item_id,
        name,
        rarity: parse_rarity(raw.rarity.as_ref()),
        tier: raw
            .tier
            .as_ref()
            .and_then(as_u64)
            .map(|tier| tier.clamp(1, 5) as u8)
            .unwrap_or(1),
        item_type: raw.type_name.unwrap_or_default(),
        item_class: raw.item_class,
        weight: raw.weight.unwrap_or(0.0),
        max_stack: raw.max_stack_size.unwrap_or(1),
        icon: raw.icon.as_deref().and_then(|icon| icon_url(icon_base_url, icon)),
        gear_score: raw
            .gear_score
            .as_ref()
            .and_then(as_u64)
            .and_then(|score| u32::try_from(score).ok()),
        description: raw.description.as_deref().map(sanitize_html).unwrap_or_default(),
        perks,
    })
}

fn parse_rarity(value: Option<&Value>) -> Rarity {
    match value {
        Some(Value::String(label)) => Rarity::from_label(label)
            .or_else(|| label.trim().parse::<i64>().ok().map(Rarity::from_ordinal))
            .unwrap_or_default(),
        Some(Value::Number(ordinal)) => ordinal.as_i64().map(Rarity::from_ordinal).unwrap_or_default(),
        _ => Rarity::Common,
    }
}

fn as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(number) => number
            .as_u64()
            .or_else(|| number.as_f64().filter(|v| *v >= 0.0).map(|v| v.round() as u64)),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

/// Absolute icon URL. Relative paths are joined onto `base` and get `.png` when extensionless.
pub fn icon_url(base: &str, icon: &str) -> Option<String> {
    let icon = icon.trim();
    if icon.is_empty() {
        return None;
    }
    if icon.starts_with("http://") || icon.starts_with("https://") {
        return Some(icon.to_string());
    }
    let path = icon.trim_start_matches('/');
    let file_name = path.rsplit('/').next().unwrap_or(path);
    let extension = if file_name.contains('.') { "" } else { ".png" };
    Some(format!("{}/{path}{extension}", base.trim_end_matches('/')))
}
