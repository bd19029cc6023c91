//! Error taxonomy for the pipeline.
//!
//! `FetchError` and `SchemaMismatchError` are per-period and recovered by the
//! adapter run loop. Everything that reaches `PipelineError` aborts the run.

use crate::models::SourceKind;
use chrono::NaiveDateTime;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FetchError {
    #[error("report not found: {address}")]
    NotFound { address: String },

    #[error("HTTP {status} fetching {address}")]
    Http { address: String, status: u16 },

    #[error("network error fetching {address}: {message}")]
    Network { address: String, message: String },

    #[error("unsupported report format for {address}: {detail}")]
    UnsupportedFormat { address: String, detail: String },

    #[error("I/O error reading {address}: {message}")]
    Io { address: String, message: String },

    #[error("malformed payload from {address}: {message}")]
    Malformed { address: String, message: String },
}

/// A table whose shape matches none of the layouts known for its source.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("table does not match layout '{layout}': {detail}")]
pub struct SchemaMismatchError {
    pub layout: &'static str,
    pub detail: String,
}

impl SchemaMismatchError {
    pub fn new(layout: &'static str, detail: impl Into<String>) -> Self {
        Self {
            layout,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{dataset}: duplicate ({timestamp}, {category}) for metric '{metric}' has no aggregation rule")]
pub struct AggregationAmbiguityError {
    pub dataset: SourceKind,
    pub timestamp: NaiveDateTime,
    pub category: String,
    pub metric: &'static str,
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("no overlapping time range across sources: {detail}")]
pub struct EmptyOverlapError {
    pub detail: String,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    AggregationAmbiguity(#[from] AggregationAmbiguityError),

    #[error(transparent)]
    EmptyOverlap(#[from] EmptyOverlapError),

    #[error("{dataset}: duplicate timestamp {timestamp}")]
    DuplicateTimestamp {
        dataset: SourceKind,
        timestamp: NaiveDateTime,
    },

    #[error("column '{column}' is contributed by both {first} and {second}")]
    ColumnCollision {
        column: String,
        first: SourceKind,
        second: SourceKind,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
