use std::sync::Arc;

use serde::Serialize;

use crate::cancel::CancelToken;
use crate::commands::{self, RollupRequest, SuggestionKind};
use crate::config::Config;
use crate::data::store::{Store, StoreSnapshot};
use crate::data::validate::validate_snapshot;
use crate::error::CoreError;
use crate::ingest::{HttpFetcher, Ingestor};
use crate::recipe::rollup::RollupMode;
use crate::server::{self, AppState};

const USAGE: &str = "usage: forgewright <serve|ingest|item|perk|recipe|rollup|autocomplete|validate|version>";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Serve,
    Ingest,
    Item,
    Perk,
    Recipe,
    Rollup,
    Autocomplete,
    Validate,
    Version,
}

pub fn parse_command(args: &[String]) -> Option<Command> {
    match args.get(1).map(String::as_str) {
        Some("serve") => Some(Command::Serve),
        Some("ingest") => Some(Command::Ingest),
        Some("item") => Some(Command::Item),
        Some("perk") => Some(Command::Perk),
        Some("recipe") => Some(Command::Recipe),
        Some("rollup") => Some(Command::Rollup),
        Some("autocomplete") => Some(Command::Autocomplete),
        Some("validate") => Some(Command::Validate),
        Some("version") => Some(Command::Version),
        _ => None,
    }
}

pub fn run_with_args(args: &[String]) -> i32 {
    let Some(command) = parse_command(args) else {
        eprintln!("{USAGE}");
        return 2;
    };
    let config = match Config::load() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("config error: {err}");
            return 1;
        }
    };

    match command {
        Command::Serve => handle_serve(config),
        Command::Ingest => handle_ingest(&config),
        Command::Item => handle_item(&config, args),
        Command::Perk => handle_perk(&config, args),
        Command::Recipe => handle_recipe(&config, args),
        Command::Rollup => handle_rollup(&config, args),
        Command::Autocomplete => handle_autocomplete(&config, args),
        Command::Validate => handle_validate(&config),
        Command::Version => handle_version(&config),
    }
}

fn handle_serve(config: Config) -> i32 {
    let store = Store::open_or_unloaded(config.store_dir());
    match server::run_server(AppState::new(store, config)) {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("server error: {err}");
            1
        }
    }
}

fn handle_ingest(config: &Config) -> i32 {
    let store = Store::open_or_unloaded(config.store_dir());
    let fetcher = HttpFetcher::new();
    match Ingestor::new(config, &fetcher).run(&store, &CancelToken::new()) {
        Ok(report) => print_json(&report),
        Err(err) => {
            eprintln!("ingest failed: {err}");
            1
        }
    }
}

fn handle_item(config: &Config, args: &[String]) -> i32 {
    let Some(query) = positional_text(args) else {
        eprintln!("usage: forgewright item <name-or-id>");
        return 2;
    };
    with_snapshot(config, |snapshot| commands::lookup_item(snapshot, &query))
}

fn handle_perk(config: &Config, args: &[String]) -> i32 {
    let Some(query) = positional_text(args) else {
        eprintln!("usage: forgewright perk <name-or-id> [--gear-score N]");
        return 2;
    };
    let gear_score = match flag_value(args, "--gear-score") {
        Some(raw) => match raw.parse::<f64>() {
            Ok(score) if score.is_finite() && score > 0.0 => score,
            _ => {
                eprintln!("invalid gear score '{raw}'");
                return 2;
            }
        },
        None => config.gear_score,
    };
    with_snapshot(config, |snapshot| commands::lookup_perk(snapshot, &query, gear_score))
}

fn handle_recipe(config: &Config, args: &[String]) -> i32 {
    let Some(item) = positional_text(args) else {
        eprintln!("usage: forgewright recipe <item>");
        return 2;
    };
    with_snapshot(config, |snapshot| commands::show_recipe(snapshot, &item))
}

fn handle_rollup(config: &Config, args: &[String]) -> i32 {
    const ROLLUP_USAGE: &str =
        "usage: forgewright rollup <item> [quantity] [--deep] [--fort] [--armor PCT] [--tradeskill LEVEL]";
    let mut words = positional_words(args);
    let quantity = match words.last().map(|word| word.parse::<u64>()) {
        Some(Ok(quantity)) if words.len() > 1 => {
            words.pop();
            quantity
        }
        _ => 1,
    };
    if words.is_empty() || quantity == 0 {
        eprintln!("{ROLLUP_USAGE}");
        return 2;
    }

    let mode = if has_flag(args, "--deep") {
        RollupMode::Deep
    } else {
        match flag_value(args, "--mode").map(str::parse::<RollupMode>) {
            Some(Ok(mode)) => mode,
            Some(Err(err)) => {
                eprintln!("{err}");
                return 2;
            }
            None => RollupMode::Direct,
        }
    };
    let mut request = RollupRequest::new(words.join(" "), quantity, mode);
    request.fort = has_flag(args, "--fort");
    if let Some(raw) = flag_value(args, "--armor") {
        let Ok(armor) = raw.parse::<f64>() else {
            eprintln!("invalid armor bonus '{raw}'");
            return 2;
        };
        request.armor_pct = armor;
    }
    if let Some(raw) = flag_value(args, "--tradeskill") {
        let Ok(level) = raw.parse::<u32>() else {
            eprintln!("invalid tradeskill level '{raw}'");
            return 2;
        };
        request.tradeskill = level;
    }

    let cancel = CancelToken::with_timeout(config.query_timeout());
    with_snapshot(config, |snapshot| {
        commands::rollup(snapshot, &request, &config.rollup, &cancel)
    })
}

fn handle_autocomplete(config: &Config, args: &[String]) -> i32 {
    let Some(kind) = args.get(2) else {
        eprintln!("usage: forgewright autocomplete <item|perk|craftable> [query]");
        return 2;
    };
    let kind = match kind.parse::<SuggestionKind>() {
        Ok(kind) => kind,
        Err(err) => {
            eprintln!("{err}");
            return 2;
        }
    };
    let query = args.iter().skip(3).filter(|arg| !arg.starts_with("--")).cloned().collect::<Vec<_>>().join(" ");
    with_snapshot(config, |snapshot| Ok(commands::autocomplete(snapshot, kind, &query)))
}

fn handle_validate(config: &Config) -> i32 {
    let snapshot = match open_snapshot(config) {
        Ok(snapshot) => snapshot,
        Err(err) => {
            eprintln!("{err}");
            return 1;
        }
    };
    let report = validate_snapshot(&snapshot, config.suspicious_quantity);
    for diagnostic in &report.diagnostics {
        eprintln!("[{}] {}: {}", diagnostic.severity, diagnostic.context, diagnostic.message);
    }
    if report.has_errors() {
        eprintln!("validation failed: {} diagnostic(s)", report.diagnostics.len());
        1
    } else {
        println!("validation passed: {} diagnostic(s)", report.diagnostics.len());
        0
    }
}

fn handle_version(config: &Config) -> i32 {
    #[derive(Serialize)]
    struct VersionView<'a> {
        version: &'static str,
        store: String,
        datasets: Option<&'a crate::data::registry::Registry>,
    }

    let snapshot = open_snapshot(config).ok();
    print_json(&VersionView {
        version: env!("CARGO_PKG_VERSION"),
        store: config.store_dir().display().to_string(),
        datasets: snapshot.as_ref().map(|snapshot| snapshot.registry()),
    })
}

fn open_snapshot(config: &Config) -> Result<Arc<StoreSnapshot>, CoreError> {
    Store::open(config.store_dir())?.snapshot()
}

/// Run a query against the stored snapshot and print its result as JSON.
fn with_snapshot<T, F>(config: &Config, query: F) -> i32
where
    T: Serialize,
    F: FnOnce(&StoreSnapshot) -> Result<T, CoreError>,
{
    let snapshot = match open_snapshot(config) {
        Ok(snapshot) => snapshot,
        Err(err) => {
            eprintln!("{err}");
            return 1;
        }
    };
    match query(&snapshot) {
        Ok(view) => print_json(&view),
        Err(err) => {
            eprintln!("{err}");
            1
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> i32 {
    match serde_json::to_string_pretty(value) {
        Ok(payload) => {
            println!("{payload}");
            0
        }
        Err(err) => {
            eprintln!("failed to serialize result: {err}");
            1
        }
    }
}

const VALUE_FLAGS: &[&str] = &["--gear-score", "--mode", "--armor", "--tradeskill"];

/// Arguments after the command that are neither flags nor flag values.
fn positional_words(args: &[String]) -> Vec<String> {
    let mut words = Vec::new();
    let mut iter = args.iter().skip(2);
    while let Some(arg) = iter.next() {
        if VALUE_FLAGS.contains(&arg.as_str()) {
            iter.next();
        } else if !arg.starts_with("--") {
            words.push(arg.clone());
        }
    }
    words
}

fn positional_text(args: &[String]) -> Option<String> {
    let text = positional_words(args).join(" ");
    (!text.trim().is_empty()).then_some(text)
}

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().skip(2).any(|arg| arg == flag)
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .skip(2)
        .position(|arg| arg == flag)
        .and_then(|index| args.get(index + 3))
        .map(String::as_str)
}
