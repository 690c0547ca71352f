//! Error types for the query path and the ingestion run.

use thiserror::Error;

/// Errors surfaced by store queries, recipe fetches and rollups.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Resolved key has no record or recipe.
    #[error("not found: {0}")]
    NotFound(String),

    /// The store backend could not serve the query.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// The caller's cancellation signal fired before the query completed.
    #[error("query cancelled")]
    Cancelled,

    /// A stored payload could not be parsed. Callers treat it as absence.
    #[error("malformed payload for '{key}': {reason}")]
    MalformedPayload { key: String, reason: String },
}

/// Terminal errors for one ingestion run. The live store is untouched when any of these is returned.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("source '{source_name}' unavailable: {reason}")]
    SourceUnavailable { source_name: String, reason: String },

    #[error("source '{source_name}' does not match the expected schema: {reason}")]
    SchemaMismatch { source_name: String, reason: String },

    #[error("ingestion cancelled")]
    Cancelled,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Store(#[from] CoreError),
}

/// One failed transport attempt against a remote source.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("http status {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("transport error for {url}: {reason}")]
    Transport { url: String, reason: String },

    #[error("failed to read body from {url}: {reason}")]
    Body { url: String, reason: String },
}

pub type CoreResult<T> = Result<T, CoreError>;
