//! Error types for dsproc.

use thiserror::Error;

/// Result type alias for dsproc operations.
pub type Result<T> = std::result::Result<T, DsprocError>;

/// Main error type for dataset processing.
#[derive(Error, Debug)]
pub enum DsprocError {
    /// Configuration errors (e.g. an unknown chat template).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Operation has no implementation on this processor.
    #[error("Not implemented: {0}")]
    NotImplemented(String),

    /// A collator was handed a batch with nothing to pad.
    #[error("Empty batch: {0}")]
    EmptyBatch(String),

    /// A row is missing a field the operation needs.
    #[error("Missing field '{field}' in row {row}")]
    MissingField {
        /// Field or column name.
        field: String,
        /// Row index within its split.
        row: usize,
    },

    /// Statistics were requested over a column with no rows.
    #[error("Column '{0}' has no rows")]
    EmptyColumn(String),

    /// Tokenizer errors.
    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    /// I/O errors.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors that carry their own context.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// JSON errors.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML errors.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Invalid argument.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}
