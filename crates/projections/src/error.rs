//! Projection error types.

use thiserror::Error;

/// Errors that can occur during projection processing.
#[derive(Debug, Error)]
pub enum ProjectionError {
    /// The published-message log could not be read.
    #[error("Message log error: {0}")]
    MessageLog(#[from] messaging::BusError),

    /// A logged message does not decode into a known contract.
    #[error("Contract error: {0}")]
    Contract(#[from] domain::ContractError),

    /// A projection-specific error.
    #[error("Projection error: {0}")]
    Projection(String),
}

/// Result type for projection operations.
pub type Result<T> = std::result::Result<T, ProjectionError>;
