use std::collections::HashMap;

use forgewright::cancel::CancelToken;
use forgewright::commands::{self, RollupRequest};
use forgewright::data::model::{encode_ingredients, IngredientRef, Item, Perk, Rarity, RecipeRow};
use forgewright::data::{AliasMap, CuratedTable, StoreSnapshot, StoreTables};
use forgewright::recipe::bonus::{apply_bonus, CraftingBonus};
use forgewright::recipe::rollup::{rollup, sum_materials, LimitKind, RollupLimits, RollupMode};
use indexmap::IndexMap;

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

fn recipe(key: &str, ingredients: &[(&str, i64)]) -> RecipeRow {
    RecipeRow {
        output_item_key: key.to_string(),
        station: "Smelter".to_string(),
        tradeskill: "Smelting".to_string(),
        required_level: 0,
        tier: 2,
        ingredients: encode_ingredients(
            &ingredients
                .iter()
                .map(|(name, quantity)| IngredientRef {
                    name: name.to_string(),
                    quantity: *quantity,
                })
                .collect::<Vec<_>>(),
        ),
        raw: None,
    }
}

fn snapshot(primary: Vec<RecipeRow>, legacy: Vec<RecipeRow>) -> StoreSnapshot {
    let items = vec![
        item("OreT1", "Iron Ore"),
        item("IngotT1", "Iron Ingot"),
        item("IngotT2", "Steel Ingot"),
        item("Charcoal", "Charcoal"),
        item("FluxT1", "Flux"),
        item("IngotT5", "Asmodeum"),
        item("IngotT53", "Prismatic Ingot"),
        item("FiberT1", "Fiber"),
    ];
    let curated = CuratedTable::embedded().expect("embedded table should parse");
    StoreSnapshot::from_tables(StoreTables {
        aliases: AliasMap::build(&curated, &items, &HashMap::new()),
        items,
        perks: vec![Perk {
            perk_id: "PerkID_Keen".to_string(),
            name: "Keen".to_string(),
            description: "Deals {[5 * perkMultiplier]} bonus damage".to_string(),
            perk_type: "Generated".to_string(),
            icon: None,
            condition: None,
            compatible_with: vec![],
            exclusive_labels: vec![],
            craft_mod: None,
            generated_label: None,
        }],
        recipes_primary: primary,
        recipes_legacy: legacy,
        ..StoreTables::default()
    })
}

fn smelting() -> StoreSnapshot {
    snapshot(
        vec![recipe(
            "steel ingot",
            &[("Iron Ingot", 3), ("Charcoal", 1), ("FluxT1", 1)],
        )],
        vec![
            recipe("iron ingot", &[("Iron Ore", 4)]),
            recipe("prismatic ingot", &[("IngotT5", 2), ("Charcoal", 1)]),
        ],
    )
}

fn materials(entries: &[(&str, u64)]) -> IndexMap<String, u64> {
    entries.iter().map(|(key, value)| (key.to_string(), *value)).collect()
}

#[test]
fn terminal_item_rolls_up_to_itself() {
    let snap = smelting();
    let limits = RollupLimits::default();
    for mode in [RollupMode::Direct, RollupMode::Deep] {
        let result = rollup(&snap, "iron ore", 7, mode, &limits, &CancelToken::new()).unwrap();
        assert_eq!(result.materials, materials(&[("iron ore", 7)]));
    }
}

#[test]
fn deep_rollup_expands_two_levels() {
    let snap = smelting();
    let result = rollup(
        &snap,
        "Steel Ingot",
        1,
        RollupMode::Deep,
        &RollupLimits::default(),
        &CancelToken::new(),
    )
    .unwrap();
    assert_eq!(
        result.materials,
        materials(&[("iron ore", 12), ("charcoal", 1), ("flux", 1)])
    );
    assert!(result.events.is_empty());
}

#[test]
fn direct_rollup_stops_after_one_level() {
    let snap = smelting();
    let result = rollup(
        &snap,
        "IngotT2",
        2,
        RollupMode::Direct,
        &RollupLimits::default(),
        &CancelToken::new(),
    )
    .unwrap();
    assert_eq!(
        result.materials,
        materials(&[("iron ingot", 6), ("charcoal", 2), ("flux", 2)])
    );
}

#[test]
fn legacy_ids_accumulate_under_their_display_name() {
    let snap = smelting();
    let result = rollup(
        &snap,
        "prismatic ingot",
        1,
        RollupMode::Deep,
        &RollupLimits::default(),
        &CancelToken::new(),
    )
    .unwrap();
    assert_eq!(result.materials.get("asmodeum"), Some(&2));
    assert!(!result.materials.contains_key("ingott5"));
}

#[test]
fn large_bonus_floors_every_material_at_one() {
    let bonus = CraftingBonus::new(true, 10.0, 250);
    assert!(bonus.factor() <= 0.0);
    let adjusted = apply_bonus(&materials(&[("fiber", 3), ("cloth", 1)]), &bonus);
    assert_eq!(adjusted, materials(&[("fiber", 1), ("cloth", 1)]));
}

#[test]
fn two_node_cycle_terminates_and_names_the_loop() {
    let snap = snapshot(
        vec![recipe("a", &[("b", 1)]), recipe("b", &[("a", 1)])],
        vec![],
    );
    let result = rollup(
        &snap,
        "A",
        1,
        RollupMode::Deep,
        &RollupLimits::default(),
        &CancelToken::new(),
    )
    .unwrap();
    assert_eq!(result.materials, materials(&[("a", 1)]));
    let cycle = result
        .events
        .iter()
        .find(|event| event.kind == LimitKind::Cycle)
        .expect("cycle should be reported");
    assert_eq!(cycle.key, "a");
    assert_eq!(cycle.members, vec!["b".to_string()]);
}

#[test]
fn cycle_under_a_full_bonus_never_adjusts_below_one() {
    let snap = snapshot(
        vec![recipe("a", &[("b", 1)]), recipe("b", &[("a", 1)])],
        vec![],
    );
    let mut request = RollupRequest::new("a".to_string(), 1, RollupMode::Deep);
    request.fort = true;
    request.armor_pct = 10.0;
    request.tradeskill = 250;
    let view = commands::rollup(&snap, &request, &RollupLimits::default(), &CancelToken::new()).unwrap();

    assert_eq!(view.total_bonus, 100.0);
    assert!(!view.materials.is_empty());
    assert!(view.materials.iter().all(|line| line.raw >= 1 && line.adjusted >= 1));
    assert_eq!(view.limit_events[0].members, vec!["b".to_string()]);
}

#[test]
fn self_cycle_yields_the_node_as_base_material() {
    let snap = snapshot(vec![recipe("ouroboros", &[("ouroboros", 2)])], vec![]);
    let result = rollup(
        &snap,
        "ouroboros",
        1,
        RollupMode::Deep,
        &RollupLimits::default(),
        &CancelToken::new(),
    )
    .unwrap();
    assert_eq!(result.materials, materials(&[("ouroboros", 2)]));
}

#[test]
fn chain_deeper_than_the_cap_is_cut_at_depth_twenty() {
    let names: Vec<String> = (0..=21).map(|level| format!("stage {level}")).collect();
    let primary = names
        .windows(2)
        .map(|pair| recipe(&pair[0], &[(pair[1].as_str(), 1)]))
        .collect();
    let snap = snapshot(primary, vec![]);
    let result = rollup(
        &snap,
        "stage 0",
        1,
        RollupMode::Deep,
        &RollupLimits::default(),
        &CancelToken::new(),
    )
    .unwrap();
    assert_eq!(result.materials, materials(&[("stage 20", 1)]));
    assert_eq!(result.events.len(), 1);
    assert_eq!(result.events[0].kind, LimitKind::Depth);
}

#[test]
fn deep_rollup_is_additive_in_quantity() {
    let snap = smelting();
    let limits = RollupLimits::default();
    let run = |quantity| {
        rollup(&snap, "steel ingot", quantity, RollupMode::Deep, &limits, &CancelToken::new())
            .unwrap()
            .materials
    };
    assert_eq!(run(5), sum_materials(&run(2), &run(3)));
}

#[test]
fn rollup_command_reports_raw_and_adjusted_amounts() {
    let snap = smelting();
    let mut request = RollupRequest::new("steel ingot".to_string(), 10, RollupMode::Deep);
    request.fort = true;
    let view = commands::rollup(&snap, &request, &RollupLimits::default(), &CancelToken::new()).unwrap();

    assert_eq!(view.total_bonus, 10.0);
    let ore = view
        .materials
        .iter()
        .find(|line| line.key == "iron ore")
        .expect("iron ore should be listed");
    assert_eq!(ore.raw, 120);
    assert_eq!(ore.adjusted, 108);
    assert!(view.materials.iter().all(|line| line.adjusted >= 1));
}

#[test]
fn cancelled_rollup_returns_cancelled() {
    let snap = smelting();
    let cancel = CancelToken::new();
    cancel.cancel();
    let err = rollup(&snap, "steel ingot", 1, RollupMode::Deep, &RollupLimits::default(), &cancel)
        .unwrap_err();
    assert!(matches!(err, forgewright::CoreError::Cancelled));
}

#[test]
fn perk_view_scales_description_to_gear_score() {
    let snap = smelting();
    let view = commands::lookup_perk(&snap, "keen", 725.0).unwrap();
    assert_eq!(view.description, "Deals 7.25 bonus damage");
}
