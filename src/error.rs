//! Error types for rideseg

use thiserror::Error;

/// Errors that can occur during computation
#[derive(Debug, Error)]
pub enum ComputeError {
    #[error("Failed to parse dataset: {0}")]
    ParseError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid CSV: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(#[from] InvalidInput),

    #[error("Encoding error: {0}")]
    EncodingError(String),
}

/// Invocation-level input problems. Any of these aborts the whole call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidInput {
    /// The working set is empty.
    #[error("empty input")]
    EmptyInput,

    /// Every record carried an unparseable date.
    #[error("no record has a parseable date")]
    NoValidTimestamps,

    /// No feature fields were selected.
    #[error("feature set is empty")]
    EmptyFeatureSet,

    /// A feature vector does not match the dimensionality of the first one.
    #[error("dimension mismatch at vector {index}: expected {expected}, found {found}")]
    DimensionMismatch {
        index: usize,
        expected: usize,
        found: usize,
    },

    /// A feature value is NaN or infinite.
    #[error("non-finite value at vector {index}, dimension {dimension}")]
    NonFiniteValue { index: usize, dimension: usize },

    /// More clusters were requested than there are distinct standardized points.
    #[error("invalid cluster count: requested {requested}, but only {distinct} distinct points")]
    TooManyClusters { requested: usize, distinct: usize },

    /// Invalid parameter value.
    #[error("invalid parameter {name}: {message}")]
    InvalidParameter {
        name: &'static str,
        message: &'static str,
    },

    /// A derived field was requested from a record that has no derived metrics.
    #[error("field '{field}' is not available on this record")]
    UnavailableField { field: String },
}
