mod common;

use std::path::Path;
use std::process::{Command, Output};

use common::{fixture_config, fixture_fetcher, no_retry, write_local_sources};
use forgewright::cancel::CancelToken;
use forgewright::data::Store;
use forgewright::ingest::Ingestor;

fn bin() -> &'static str {
    env!("CARGO_BIN_EXE_forgewright")
}

fn seeded_data_dir() -> tempfile::TempDir {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = fixture_config(dir.path());
    write_local_sources(&config);
    let store = Store::unloaded(config.store_dir());
    Ingestor::new(&config, &fixture_fetcher())
        .with_retry(no_retry())
        .run(&store, &CancelToken::new())
        .expect("seed ingest should succeed");
    dir
}

fn run(data_dir: &Path, args: &[&str]) -> Output {
    Command::new(bin())
        .args(args)
        .env("FORGEWRIGHT_DATA_DIR", data_dir)
        .env_remove("FORGEWRIGHT_CONFIG")
        .env("RUST_LOG", "warn")
        .output()
        .expect("forgewright should run")
}

fn stdout_json(output: &Output) -> serde_json::Value {
    let stdout = String::from_utf8_lossy(&output.stdout);
    serde_json::from_str(&stdout).expect("command should emit json")
}

#[test]
fn unknown_command_prints_usage() {
    let output = Command::new(bin()).arg("simulate").output().expect("should run");
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("usage: forgewright"));
}

#[test]
fn item_command_resolves_internal_ids() {
    let dir = seeded_data_dir();
    let output = run(dir.path(), &["item", "IngotT2"]);
    assert_eq!(output.status.code(), Some(0));
    let payload = stdout_json(&output);
    assert_eq!(payload["key"], "steel ingot");
    assert_eq!(payload["rarity"], "uncommon");
    assert_eq!(payload["craftable"], true);
}

#[test]
fn item_command_fails_for_unknown_items() {
    let dir = seeded_data_dir();
    let output = run(dir.path(), &["item", "unobtainium"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("not found"));
}

#[test]
fn rollup_command_joins_words_and_applies_flags() {
    let dir = seeded_data_dir();
    let output = run(dir.path(), &["rollup", "steel", "ingot", "10", "--deep", "--fort"]);
    assert_eq!(output.status.code(), Some(0));
    let payload = stdout_json(&output);
    assert_eq!(payload["key"], "steel ingot");
    assert_eq!(payload["quantity"], 10);
    assert_eq!(payload["mode"], "deep");
    let materials = payload["materials"].as_array().expect("materials should be an array");
    let ore = materials
        .iter()
        .find(|line| line["key"] == "iron ore")
        .expect("iron ore should be listed");
    assert_eq!(ore["raw"], 120);
    assert_eq!(ore["adjusted"], 108);
}

#[test]
fn rollup_command_requires_an_item() {
    let dir = seeded_data_dir();
    let output = run(dir.path(), &["rollup", "--deep"]);
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn perk_command_scales_to_requested_gear_score() {
    let dir = seeded_data_dir();
    let output = run(dir.path(), &["perk", "keen", "--gear-score", "725"]);
    assert_eq!(output.status.code(), Some(0));
    assert_eq!(stdout_json(&output)["description"], "Deals 7.25 bonus damage");
}

#[test]
fn autocomplete_command_lists_suggestions() {
    let dir = seeded_data_dir();
    let output = run(dir.path(), &["autocomplete", "item", "ingot"]);
    assert_eq!(output.status.code(), Some(0));
    let payload = stdout_json(&output);
    let suggestions = payload.as_array().expect("suggestions should be an array");
    assert!(suggestions.iter().any(|s| s["value"] == "steel ingot"));

    let bad = run(dir.path(), &["autocomplete", "ships", "x"]);
    assert_eq!(bad.status.code(), Some(2));
}

#[test]
fn validate_and_version_commands_read_the_store() {
    let dir = seeded_data_dir();
    let validate = run(dir.path(), &["validate"]);
    assert_eq!(validate.status.code(), Some(0));
    assert!(String::from_utf8_lossy(&validate.stdout).contains("validation passed"));

    let version = run(dir.path(), &["version"]);
    assert_eq!(version.status.code(), Some(0));
    let payload = stdout_json(&version);
    assert_eq!(payload["datasets"]["items"]["records"], 7);
}

#[test]
fn query_commands_fail_without_ingested_data() {
    let dir = tempfile::tempdir().expect("tempdir");
    let output = run(dir.path(), &["recipe", "steel ingot"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("store unavailable"));
}
