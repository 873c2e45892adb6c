//! Error types for jailvote

use thiserror::Error;

/// jailvote error type
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV parsing error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid CLI/config flag combination. Fatal at startup, before any I/O.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Source data violates an assumed invariant. Fatal — indicates upstream
    /// corruption, not a retryable condition.
    #[error("Data integrity error: {0}")]
    DataIntegrity(String),

    /// A single model fit cannot be estimated (degenerate design matrix,
    /// zero usable rows). Recoverable per grid cell.
    #[error("Estimation error: {0}")]
    Estimation(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Computation error
    #[error("Computation error: {0}")]
    Computation(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
