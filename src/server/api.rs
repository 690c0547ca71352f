use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

use crate::cancel::CancelToken;
use crate::commands::{self, RollupRequest, SuggestionKind};
use crate::data::validate::validate_snapshot;
use crate::error::CoreError;
use crate::server::AppState;

/// Decoded query-string parameters. Later duplicates win.
#[derive(Debug, Default)]
pub struct QueryParams(HashMap<String, String>);

impl QueryParams {
    pub fn parse(query: &str) -> Self {
        let pairs = query
            .split('&')
            .filter(|pair| !pair.is_empty())
            .filter_map(|pair| {
                let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
                Some((decode(key)?, decode(value)?))
            })
            .collect();
        Self(pairs)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    fn required(&self, key: &str) -> Result<&str, ApiError> {
        self.get(key)
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| ApiError::BadRequest(format!("missing query parameter '{key}'")))
    }
}

fn decode(raw: &str) -> Option<String> {
    urlencoding::decode(&raw.replace('+', " "))
        .ok()
        .map(|value| value.into_owned())
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Core(CoreError),
    Serialize(serde_json::Error),
}

impl ApiError {
    pub fn status(&self) -> u16 {
        match self {
            Self::BadRequest(_) => 400,
            Self::Core(CoreError::NotFound(_) | CoreError::MalformedPayload { .. }) => 404,
            Self::Core(CoreError::StoreUnavailable(_) | CoreError::Cancelled) => 503,
            Self::Serialize(_) => 500,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadRequest(message) => write!(f, "{message}"),
            Self::Core(err) => write!(f, "{err}"),
            Self::Serialize(err) => write!(f, "failed to serialize response: {err}"),
        }
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        Self::Core(err)
    }
}

fn to_json<T: Serialize>(payload: &T) -> Result<String, ApiError> {
    serde_json::to_string_pretty(payload).map_err(ApiError::Serialize)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    store_loaded: bool,
}

pub fn health_payload(state: &AppState) -> Result<String, ApiError> {
    to_json(&HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        store_loaded: state.store.snapshot().is_ok(),
    })
}

pub fn data_version_payload(state: &AppState) -> Result<String, ApiError> {
    let snapshot = state.store.snapshot()?;
    to_json(snapshot.registry())
}

pub fn item_payload(state: &AppState, params: &QueryParams) -> Result<String, ApiError> {
    let query = params.required("q")?;
    let snapshot = state.store.snapshot()?;
    to_json(&commands::lookup_item(&snapshot, query)?)
}

pub fn perk_payload(state: &AppState, params: &QueryParams) -> Result<String, ApiError> {
    let query = params.required("q")?;
    let gear_score = match params.get("gear_score") {
        Some(raw) => raw
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|score| score.is_finite() && *score > 0.0)
            .ok_or_else(|| ApiError::BadRequest(format!("invalid gear_score '{raw}'")))?,
        None => state.config.gear_score,
    };
    let snapshot = state.store.snapshot()?;
    to_json(&commands::lookup_perk(&snapshot, query, gear_score)?)
}

pub fn recipe_payload(state: &AppState, params: &QueryParams) -> Result<String, ApiError> {
    let item = params.required("item")?;
    let snapshot = state.store.snapshot()?;
    to_json(&commands::show_recipe(&snapshot, item)?)
}

pub fn rollup_payload(state: &AppState, body: &str) -> Result<String, ApiError> {
    let request: RollupRequest = serde_json::from_str(body)
        .map_err(|err| ApiError::BadRequest(format!("Invalid request body: {err}")))?;
    if request.item.trim().is_empty() {
        return Err(ApiError::BadRequest("item must not be empty".to_string()));
    }
    if request.quantity == 0 {
        return Err(ApiError::BadRequest("quantity must be at least 1".to_string()));
    }
    let snapshot = state.store.snapshot()?;
    let cancel = CancelToken::with_timeout(state.config.query_timeout());
    to_json(&commands::rollup(&snapshot, &request, &state.config.rollup, &cancel)?)
}

#[derive(Debug, Serialize)]
struct AutocompleteResponse {
    kind: SuggestionKind,
    suggestions: Vec<commands::Suggestion>,
}

pub fn autocomplete_payload(state: &AppState, params: &QueryParams) -> Result<String, ApiError> {
    let kind = params
        .get("kind")
        .unwrap_or("item")
        .parse::<SuggestionKind>()
        .map_err(ApiError::BadRequest)?;
    let query = params.get("q").unwrap_or_default();
    let snapshot = state.store.snapshot()?;
    to_json(&AutocompleteResponse {
        kind,
        suggestions: commands::autocomplete(&snapshot, kind, query),
    })
}

pub fn validate_payload(state: &AppState) -> Result<String, ApiError> {
    let snapshot = state.store.snapshot()?;
    to_json(&validate_snapshot(&snapshot, state.config.suspicious_quantity))
}
