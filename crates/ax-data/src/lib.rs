//! Data access for the award explorer: sources, the embedded engine, and the
//! queries the explorer runs against it

pub mod cache;
pub mod config;
pub mod engine;
pub mod fetch;
pub mod queries;
pub mod query;
pub mod sources;

use arrow::error::ArrowError;
use tokio::task::JoinError;
use thiserror::Error;

// Re-exports
pub use cache::SourceCache;
pub use config::ExplorerConfig;
pub use engine::{Engine, EngineConnection, EngineSlot, RawRow, ResultSet, SqliteEngine};
pub use fetch::{FetchOptions, LoadedSource, Page, PagedFetcher};
pub use queries::{list_contracts, top_related, ContractQuery, LISTING_COLUMNS};
pub use query::{ColumnKind, ColumnSet, Filter, Predicate, Projection, QuerySpec, SelectItem};
pub use sources::{DefaultFetcher, Granularity, MemoryFetcher, SourceFetcher, SourceLayout, SourceLocator};

/// Errors that can occur in data operations
#[derive(Error, Debug)]
pub enum DataError {
    /// The source file could not be retrieved
    #[error("failed to fetch {locator}: {reason}")]
    Fetch { locator: String, reason: String },

    /// The query was accepted but failed to execute
    #[error("query failed: {0}")]
    Engine(String),

    #[error("unsupported source file: {0}")]
    Decode(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Arrow error: {0}")]
    Arrow(#[from] ArrowError),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Join error: {0}")]
    Join(#[from] JoinError),

    #[error("invalid paging: page size must be positive")]
    InvalidPaging,

    #[error("configuration error: {0}")]
    Config(String),
}

impl DataError {
    pub fn fetch(locator: impl std::fmt::Display, reason: impl std::fmt::Display) -> Self {
        DataError::Fetch {
            locator: locator.to_string(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T, E = DataError> = std::result::Result<T, E>;
