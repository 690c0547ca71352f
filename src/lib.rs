//! Recipe resolution and material rollup engine for crafting queries.
//!
//! The query path is `data::resolver` -> `recipe::fetcher` -> `recipe::rollup`,
//! all reading one immutable [`data::store::StoreSnapshot`]. `ingest` rebuilds
//! the store offline and swaps it in as a unit.

pub mod cancel;
pub mod cli;
pub mod commands;
pub mod config;
pub mod data;
pub mod error;
pub mod ingest;
pub mod logging;
pub mod recipe;
pub mod scaler;
pub mod server;

pub use cancel::CancelToken;
pub use config::Config;
pub use error::{CoreError, IngestError};
