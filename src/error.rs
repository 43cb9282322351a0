//! Error types for sinan-stats.

use thiserror::Error;

/// Errors surfaced by the statistics and ingestion entry points.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StatsError {
    /// Wrong shape or value passed to a statistic or counter.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A required column is absent from the dataset.
    #[error("missing column: {0}")]
    MissingColumn(String),

    /// A date string could not be parsed.
    #[error("invalid date: {0}")]
    InvalidDate(String),

    /// Reading, merging or filtering a chunk failed.
    #[error("ingestion failed: {0}")]
    IngestionFailed(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, StatsError>;
