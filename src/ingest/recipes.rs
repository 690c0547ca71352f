//! Recipe records: primary JSON source and legacy CSV, each into its own table.

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::data::model::{encode_ingredients, IngredientRef, RecipeRow, RecipeTable};
use crate::data::resolver::AliasMap;
use crate::data::sanitize::{canonical_field_name, canonicalize_fields};
use crate::error::IngestError;
use crate::ingest::SkippedRecord;

const LEGACY_SOURCE: &str = "recipes_legacy";
const LEGACY_INGREDIENT_SLOTS: usize = 7;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SuspiciousQuantity {
    pub table: &'static str,
    pub recipe: String,
    pub ingredient: String,
    pub quantity: i64,
}

#[derive(Debug, Default)]
pub struct RecipeLoad {
    pub rows: Vec<RecipeRow>,
    pub skipped: Vec<SkippedRecord>,
    pub suspicious: Vec<SuspiciousQuantity>,
}

impl RecipeLoad {
    /// Add a row unless its key is already taken in this table.
    fn push(&mut self, table: RecipeTable, row: RecipeRow, seen: &mut HashSet<String>) {
        if seen.insert(row.output_item_key.clone()) {
            self.rows.push(row);
        } else {
            warn!(table = table.as_str(), key = %row.output_item_key, "duplicate recipe key, keeping the first");
        }
    }

    fn flag_suspicious(&mut self, table: RecipeTable, recipe: &str, ingredients: &[IngredientRef], threshold: u64) {
        for ingredient in ingredients {
            if ingredient.quantity.unsigned_abs() > threshold {
                warn!(
                    table = table.as_str(),
                    recipe,
                    ingredient = %ingredient.name,
                    quantity = ingredient.quantity,
                    "suspicious ingredient quantity"
                );
                self.suspicious.push(SuspiciousQuantity {
                    table: table.as_str(),
                    recipe: recipe.to_string(),
                    ingredient: ingredient.name.clone(),
                    quantity: ingredient.quantity,
                });
            }
        }
    }
}

/// Recipes from the primary JSON source. Output names are resolved to item keys; ingredient names
/// stay verbatim in the payload and are resolved at query time.
pub fn normalize_primary(records: Vec<Value>, aliases: &AliasMap, suspicious_quantity: u64) -> RecipeLoad {
    let table = RecipeTable::Primary;
    let mut load = RecipeLoad::default();
    let mut seen = HashSet::new();

    for (index, record) in records.into_iter().enumerate() {
        let record = canonicalize_fields(record);
        let Some(fields) = record.as_object() else {
            load.skipped.push(SkippedRecord::new(table.as_str(), index, "record is not an object"));
            continue;
        };
        let Some(output) = output_name(fields) else {
            warn!(table = table.as_str(), index, "recipe record without output name");
            load.skipped.push(SkippedRecord::new(table.as_str(), index, "missing output name"));
            continue;
        };
        let Some(ingredients) = fields.get("ingredients").and_then(Value::as_array) else {
            load.skipped.push(SkippedRecord::new(table.as_str(), index, "missing ingredients array"));
            continue;
        };

        let ingredients: Vec<IngredientRef> = ingredients.iter().filter_map(primary_ingredient).collect();
        let key = aliases.resolve(&output);
        load.flag_suspicious(table, &key, &ingredients, suspicious_quantity);

        let row = RecipeRow {
            output_item_key: key,
            station: text_field(fields, &["station", "stations"]).unwrap_or_default(),
            tradeskill: text_field(fields, &["tradeskill", "skill"]).unwrap_or_default(),
            required_level: number_field(fields, &["recipeLevel", "level", "required_level"])
                .and_then(|level| u32::try_from(level).ok())
                .unwrap_or(0),
            tier: number_field(fields, &["tier"])
                .map(|tier| tier.clamp(0, 5) as u8)
                .unwrap_or(0),
            ingredients: encode_ingredients(&ingredients),
            raw: Some(record.clone()),
        };
        load.push(table, row, &mut seen);
    }

    info!(table = table.as_str(), rows = load.rows.len(), skipped = load.skipped.len(), "primary recipes normalized");
    load
}

fn output_name(fields: &Map<String, Value>) -> Option<String> {
    let output = fields.get("output");
    let from_output = output.and_then(|value| match value {
        Value::Object(inner) => inner
            .get("name")
            .or_else(|| inner.get("id"))
            .and_then(Value::as_str)
            .map(str::to_string),
        Value::String(name) => Some(name.clone()),
        _ => None,
    });
    from_output
        .or_else(|| fields.get("name").and_then(Value::as_str).map(str::to_string))
        .filter(|name| !name.trim().is_empty())
}

fn primary_ingredient(value: &Value) -> Option<IngredientRef> {
    let fields = value.as_object()?;
    let name = fields
        .get("name")
        .or_else(|| fields.get("id"))
        .and_then(Value::as_str)?
        .trim()
        .to_string();
    let quantity = fields
        .get("quantity")
        .or_else(|| fields.get("qty"))
        .and_then(value_as_i64)?;
    (!name.is_empty()).then_some(IngredientRef { name, quantity })
}

fn text_field(fields: &Map<String, Value>, names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| match fields.get(*name)? {
        Value::String(text) => Some(text.trim().to_string()),
        Value::Array(values) => values.iter().find_map(Value::as_str).map(str::to_string),
        _ => None,
    })
}

fn number_field(fields: &Map<String, Value>, names: &[&str]) -> Option<i64> {
    names.iter().find_map(|name| fields.get(*name).and_then(value_as_i64))
}

fn value_as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64().or_else(|| number.as_f64().map(|v| v.round() as i64)),
        Value::String(text) => parse_quantity(text),
        _ => None,
    }
}

fn parse_quantity(text: &str) -> Option<i64> {
    let text = text.trim();
    text.parse::<i64>()
        .ok()
        .or_else(|| text.parse::<f64>().ok().filter(|v| v.is_finite()).map(|v| v.round() as i64))
}

/// Legacy CSV at `path`. A missing file yields `None`.
pub fn load_legacy_csv(
    path: &Path,
    aliases: &AliasMap,
    suspicious_quantity: u64,
) -> Result<Option<RecipeLoad>, IngestError> {
    if !path.exists() {
        return Ok(None);
    }
    let file = File::open(path)?;
    read_legacy_csv(file, aliases, suspicious_quantity).map(Some)
}

/// Rows with `Name` and up to seven `IngredientN`/`QtyN` pairs; only positive quantities are kept.
/// Optional station, tradeskill, level and tier columns are read when present.
pub fn read_legacy_csv<R: Read>(
    reader: R,
    aliases: &AliasMap,
    suspicious_quantity: u64,
) -> Result<RecipeLoad, IngestError> {
    let table = RecipeTable::Legacy;
    let mut csv_reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers: Vec<String> = csv_reader
        .headers()
        .map_err(|err| schema_mismatch(err.to_string()))?
        .iter()
        .map(|header| canonical_field_name(header).to_lowercase())
        .collect();
    let columns: HashMap<&str, usize> = headers
        .iter()
        .enumerate()
        .map(|(index, header)| (header.as_str(), index))
        .collect();
    let name_column = *columns
        .get("name")
        .ok_or_else(|| schema_mismatch("missing `Name` column".to_string()))?;
    let slots: Vec<(usize, usize)> = (1..=LEGACY_INGREDIENT_SLOTS)
        .filter_map(|slot| {
            let ingredient = columns.get(format!("ingredient{slot}").as_str())?;
            let quantity = columns.get(format!("qty{slot}").as_str())?;
            Some((*ingredient, *quantity))
        })
        .collect();
    if slots.is_empty() {
        return Err(schema_mismatch("no IngredientN/QtyN column pairs".to_string()));
    }
    let station_column = find_column(&columns, &["station"]);
    let tradeskill_column = find_column(&columns, &["tradeskill", "skill"]);
    let level_column = find_column(&columns, &["level", "required_level", "recipe_level"]);
    let tier_column = find_column(&columns, &["tier"]);

    let mut load = RecipeLoad::default();
    let mut seen = HashSet::new();
    for (index, record) in csv_reader.records().enumerate() {
        let record = match record {
            Ok(record) => record,
            Err(err) => {
                warn!(table = table.as_str(), index, error = %err, "skipping unreadable csv row");
                load.skipped.push(SkippedRecord::new(table.as_str(), index, err.to_string()));
                continue;
            }
        };
        let name = record.get(name_column).unwrap_or_default();
        if name.is_empty() {
            load.skipped.push(SkippedRecord::new(table.as_str(), index, "blank Name"));
            continue;
        }

        let mut ingredients = Vec::new();
        for (ingredient_column, quantity_column) in &slots {
            let ingredient = record.get(*ingredient_column).unwrap_or_default();
            if ingredient.is_empty() {
                continue;
            }
            let quantity = record.get(*quantity_column).and_then(parse_quantity).unwrap_or(0);
            if quantity > 0 {
                ingredients.push(IngredientRef {
                    name: ingredient.to_string(),
                    quantity,
                });
            }
        }

        let key = aliases.resolve(name);
        load.flag_suspicious(table, &key, &ingredients, suspicious_quantity);

        let raw: Map<String, Value> = headers
            .iter()
            .zip(record.iter())
            .filter(|(_, value)| !value.is_empty())
            .map(|(header, value)| (header.clone(), Value::String(value.to_string())))
            .collect();
        let cell = |column: Option<usize>| column.and_then(|index| record.get(index)).unwrap_or_default();

        let row = RecipeRow {
            output_item_key: key,
            station: cell(station_column).to_string(),
            tradeskill: cell(tradeskill_column).to_string(),
            required_level: parse_quantity(cell(level_column))
                .and_then(|level| u32::try_from(level).ok())
                .unwrap_or(0),
            tier: parse_quantity(cell(tier_column))
                .map(|tier| tier.clamp(0, 5) as u8)
                .unwrap_or(0),
            ingredients: encode_ingredients(&ingredients),
            raw: Some(Value::Object(raw)),
        };
        load.push(table, row, &mut seen);
    }

    info!(table = table.as_str(), rows = load.rows.len(), skipped = load.skipped.len(), "legacy recipes read");
    Ok(load)
}

fn find_column(columns: &HashMap<&str, usize>, names: &[&str]) -> Option<usize> {
    names.iter().find_map(|name| columns.get(name).copied())
}

fn schema_mismatch(reason: String) -> IngestError {
    IngestError::SchemaMismatch {
        source_name: LEGACY_SOURCE.to_string(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::{decode_ingredients, Item, Rarity};
    use crate::data::resolver::CuratedTable;
    use serde_json::json;

    fn aliases() -> AliasMap {
        let items = vec![Item {
            item_id: "IngotT53".to_string(),
            name: "Prismatic Ingot".to_string(),
            rarity: Rarity::Legendary,
            tier: 5,
            item_type: "Resource".to_string(),
            item_class: vec![],
            weight: 0.1,
            max_stack: 1000,
            icon: None,
            gear_score: None,
            description: String::new(),
            perks: String::new(),
        }];
        AliasMap::build(&CuratedTable::default(), &items, &HashMap::new())
    }

    #[test]
    fn primary_records_keep_raw_fields_and_verbatim_ingredients() {
        let load = normalize_primary(
            vec![
                json!({
                    "id": "recipe_prismatic",
                    "output": {"id": "IngotT53", "name": "Prismatic Ingot"},
                    "station": ["Smelter"],
                    "tradeskill": "Smelting",
                    "recipeLevel": 200,
                    "tier": 5,
                    "Bonus (%)": 3,
                    "ingredients": [{"id": "IngotT5", "quantity": 4}, {"name": "Cinnabar", "quantity": 1}]
                }),
                json!({"id": "broken", "ingredients": []}),
                json!({"name": "prismatic ingot", "ingredients": []}),
            ],
            &aliases(),
            10_000,
        );
        assert_eq!(load.rows.len(), 1);
        assert_eq!(load.skipped.len(), 1);
        let row = &load.rows[0];
        assert_eq!(row.output_item_key, "prismatic ingot");
        assert_eq!(row.station, "Smelter");
        assert_eq!(row.required_level, 200);
        let ingredients = decode_ingredients(&row.ingredients).unwrap();
        assert_eq!(ingredients[0].name, "IngotT5");
        assert!(row.raw.as_ref().unwrap().get("Bonus_percent").is_some());
    }

    #[test]
    fn legacy_csv_keeps_positive_quantities_and_flags_suspicious_ones() {
        let csv = "Name,Ingredient1,Qty1,Ingredient2,Qty2,Ingredient3,Qty3,Station (Main)\n\
                   Prismatic Ingot,ingott5,4,Cinnabar,0,Tolvium,-1,Smelter\n\
                   Dungeon Materia,Void Dust,455000,,,,,\n\
                   ,Ignored,1,,,,,\n";
        let load = read_legacy_csv(csv.as_bytes(), &aliases(), 10_000).unwrap();
        assert_eq!(load.rows.len(), 2);
        assert_eq!(load.skipped.len(), 1);

        let first = &load.rows[0];
        assert_eq!(first.output_item_key, "prismatic ingot");
        let ingredients = decode_ingredients(&first.ingredients).unwrap();
        assert_eq!(ingredients, vec![IngredientRef { name: "ingott5".to_string(), quantity: 4 }]);
        assert_eq!(
            first.raw.as_ref().unwrap().get("station_main").and_then(Value::as_str),
            Some("Smelter")
        );

        assert_eq!(load.suspicious.len(), 1);
        assert_eq!(load.suspicious[0].quantity, 455_000);
    }

    #[test]
    fn legacy_csv_without_name_column_is_a_schema_mismatch() {
        let err = read_legacy_csv("Item,Qty1\nx,1\n".as_bytes(), &aliases(), 10_000).unwrap_err();
        assert!(matches!(err, IngestError::SchemaMismatch { .. }));
    }
}
