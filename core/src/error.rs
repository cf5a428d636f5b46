use thiserror::Error;

/// Failures surfaced by the engine, the store, and query parsing.
#[derive(Debug, Error)]
pub enum SearchError {
    /// The requested document does not exist.
    #[error("document not found: {0}")]
    NotFound(String),

    /// Malformed document payload or malformed query, rejected before any
    /// state changes.
    #[error("invalid input: {0}")]
    Validation(String),

    /// The persistence layer failed; callers see the error rather than
    /// partial or stale data.
    #[error("document store error: {0}")]
    Store(#[from] rusqlite::Error),

    /// Store and index disagree in a way that could not be repaired.
    #[error("index inconsistency: {0}")]
    Inconsistency(String),
}

pub type Result<T> = std::result::Result<T, SearchError>;
