use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::Serialize;

use crate::data::model::{decode_ingredients, RecipeRow, RecipeTable};
use crate::data::store::StoreSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationSeverity {
    Error,
    Warning,
    Info,
}

impl ValidationSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Info => "info",
        }
    }
}

impl fmt::Display for ValidationSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationDiagnostic {
    pub severity: ValidationSeverity,
    pub context: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    pub diagnostics: Vec<ValidationDiagnostic>,
}

impl ValidationReport {
    pub fn push(
        &mut self,
        severity: ValidationSeverity,
        context: impl Into<String>,
        message: impl Into<String>,
    ) {
        self.diagnostics.push(ValidationDiagnostic {
            severity,
            context: context.into(),
            message: message.into(),
        });
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|diag| diag.severity == ValidationSeverity::Error)
    }

    pub fn count(&self, severity: ValidationSeverity) -> usize {
        self.diagnostics
            .iter()
            .filter(|diag| diag.severity == severity)
            .count()
    }
}

/// Check a loaded snapshot for data problems the query path would paper over.
///
/// Errors: unreadable ingredient payloads, blank output keys. Warnings: orphan
/// recipes, non-positive or suspicious quantities. Info: ingredients that resolve
/// to nothing known, and keys present in both tables with different ingredients.
pub fn validate_snapshot(snapshot: &StoreSnapshot, suspicious_quantity: u64) -> ValidationReport {
    let mut report = ValidationReport::default();
    let tables = snapshot.tables();

    let mut parsed: HashMap<(RecipeTable, &str), BTreeMap<String, i64>> = HashMap::new();
    for (table, rows) in [
        (RecipeTable::Primary, &tables.recipes_primary),
        (RecipeTable::Legacy, &tables.recipes_legacy),
    ] {
        for (index, row) in rows.iter().enumerate() {
            let context = format!("{}[{index}] '{}'", table.as_str(), row.output_item_key);
            if let Some(ingredients) = validate_row(&mut report, snapshot, &context, row, suspicious_quantity) {
                parsed.insert((table, row.output_item_key.as_str()), ingredients);
            }
        }
    }

    for key in snapshot.recipe_keys() {
        let (Some(primary), Some(legacy)) = (
            parsed.get(&(RecipeTable::Primary, key)),
            parsed.get(&(RecipeTable::Legacy, key)),
        ) else {
            continue;
        };
        if primary != legacy {
            report.push(
                ValidationSeverity::Info,
                format!("recipes '{key}'"),
                "legacy recipe differs from primary and is shadowed by it",
            );
        }
    }

    report
}

/// Per-row checks. Returns the resolved ingredient totals when the payload parses.
fn validate_row(
    report: &mut ValidationReport,
    snapshot: &StoreSnapshot,
    context: &str,
    row: &RecipeRow,
    suspicious_quantity: u64,
) -> Option<BTreeMap<String, i64>> {
    if row.output_item_key.trim().is_empty() {
        report.push(ValidationSeverity::Error, context, "missing output item key");
        return None;
    }
    if snapshot.item(&snapshot.resolve(&row.output_item_key)).is_none() {
        report.push(
            ValidationSeverity::Warning,
            context,
            "orphan recipe: output does not resolve to a known item",
        );
    }

    let ingredients = match decode_ingredients(&row.ingredients) {
        Ok(ingredients) => ingredients,
        Err(err) => {
            report.push(
                ValidationSeverity::Error,
                format!("{context}.ingredients"),
                format!("unreadable ingredient payload: {err}"),
            );
            return None;
        }
    };
    if ingredients.is_empty() {
        report.push(ValidationSeverity::Warning, format!("{context}.ingredients"), "recipe has no ingredients");
    }

    let mut totals = BTreeMap::new();
    for (index, ingredient) in ingredients.iter().enumerate() {
        let ingredient_context = format!("{context}.ingredients[{index}] '{}'", ingredient.name);
        if ingredient.quantity <= 0 {
            report.push(
                ValidationSeverity::Warning,
                ingredient_context.clone(),
                format!("non-positive quantity {} is dropped at query time", ingredient.quantity),
            );
        } else if ingredient.quantity.unsigned_abs() > suspicious_quantity {
            report.push(
                ValidationSeverity::Warning,
                ingredient_context.clone(),
                format!("suspicious quantity {} exceeds {suspicious_quantity}", ingredient.quantity),
            );
        }

        let resolved = snapshot.resolve(&ingredient.name);
        if snapshot.item(&resolved).is_none() && !snapshot.has_recipe(&resolved) {
            report.push(
                ValidationSeverity::Info,
                ingredient_context,
                format!("'{resolved}' is not a known item; treated as a base material"),
            );
        }
        if ingredient.quantity > 0 {
            *totals.entry(resolved).or_insert(0) += ingredient.quantity;
        }
    }
    Some(totals)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::{encode_ingredients, IngredientRef, Item, Rarity};
    use crate::data::resolver::{AliasMap, CuratedTable};
    use crate::data::store::StoreTables;

    fn item(item_id: &str, name: &str) -> Item {
        Item {
            item_id: item_id.to_string(),
            name: name.to_string(),
            rarity: Rarity::Common,
            tier: 2,
            item_type: "Resource".to_string(),
            item_class: vec![],
            weight: 0.1,
            max_stack: 1000,
            icon: None,
            gear_score: None,
            description: String::new(),
            perks: String::new(),
        }
    }

    fn row(key: &str, ingredients: &[(&str, i64)]) -> RecipeRow {
        let refs: Vec<IngredientRef> = ingredients
            .iter()
            .map(|(name, quantity)| IngredientRef {
                name: name.to_string(),
                quantity: *quantity,
            })
            .collect();
        RecipeRow {
            output_item_key: key.to_string(),
            station: "Smelter".to_string(),
            tradeskill: "Smelting".to_string(),
            required_level: 0,
            tier: 2,
            ingredients: encode_ingredients(&refs),
            raw: None,
        }
    }

    fn snapshot(primary: Vec<RecipeRow>, legacy: Vec<RecipeRow>) -> StoreSnapshot {
        let items = vec![item("OreT1", "Iron Ore"), item("IngotT2", "Iron Ingot")];
        StoreSnapshot::from_tables(StoreTables {
            aliases: AliasMap::build(&CuratedTable::default(), &items, &HashMap::new()),
            items,
            recipes_primary: primary,
            recipes_legacy: legacy,
            ..StoreTables::default()
        })
    }

    #[test]
    fn clean_snapshot_has_no_diagnostics() {
        let snap = snapshot(vec![row("iron ingot", &[("OreT1", 4)])], vec![]);
        let report = validate_snapshot(&snap, 10_000);
        assert!(report.diagnostics.is_empty(), "{:?}", report.diagnostics);
    }

    #[test]
    fn flags_orphans_quantities_and_unknown_ingredients() {
        let snap = snapshot(
            vec![row("mystery blade", &[("Iron Ingot", 0), ("Void Dust", 455_000)])],
            vec![],
        );
        let report = validate_snapshot(&snap, 10_000);
        assert!(!report.has_errors());
        assert_eq!(report.count(ValidationSeverity::Warning), 3);
        assert_eq!(report.count(ValidationSeverity::Info), 1);
        assert!(report.diagnostics.iter().any(|d| d.message.contains("orphan")));
        assert!(report.diagnostics.iter().any(|d| d.message.contains("455000")));
    }

    #[test]
    fn unreadable_payload_is_an_error() {
        let mut broken = row("iron ingot", &[]);
        broken.ingredients = "not json".to_string();
        let report = validate_snapshot(&snapshot(vec![broken], vec![]), 10_000);
        assert!(report.has_errors());
    }

    #[test]
    fn shadowed_legacy_recipe_with_different_ingredients_is_reported() {
        let same = snapshot(
            vec![row("iron ingot", &[("Iron Ore", 4)])],
            vec![row("iron ingot", &[("OreT1", 4)])],
        );
        assert!(validate_snapshot(&same, 10_000).diagnostics.is_empty());

        let differing = snapshot(
            vec![row("iron ingot", &[("Iron Ore", 4)])],
            vec![row("iron ingot", &[("Iron Ore", 5)])],
        );
        let report = validate_snapshot(&differing, 10_000);
        assert_eq!(report.count(ValidationSeverity::Info), 1);
        assert!(report.diagnostics[0].message.contains("shadowed"));
    }
}
