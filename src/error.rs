//! Error types for topic-dict-scorer.

use thiserror::Error;

/// Top-level error type for dictionary loading, scoring and aggregation.
#[derive(Debug, Error)]
pub enum DictError {
    /// Malformed dictionary, missing topic names, unknown data source.
    #[error("configuration error: {0}")]
    Config(String),

    /// Missing required column, empty input that makes aggregation ill-defined.
    #[error("data error: {0}")]
    Data(String),

    /// Output length does not match the dictionary cardinality or the forced window.
    #[error("shape error: expected {expected:?}, got {actual:?}")]
    Shape {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// I/O error wrapper.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// TSV reader/writer error.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON (topic index, popularity weights, config).
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// CBOR cache encoding.
    #[error("cbor error: {0}")]
    Cbor(#[from] serde_cbor::Error),

    /// `.npy` ensemble output.
    #[error("npy error: {0}")]
    Npy(#[from] ndarray_npy::WriteNpyError),
}

/// Result type for topic-dict-scorer operations.
pub type Result<T> = std::result::Result<T, DictError>;
