use thiserror::Error;

/// Errors that can occur when talking to the message bus or the idempotency ledger.
#[derive(Debug, Error)]
pub enum BusError {
    /// No queue with this name has been declared.
    #[error("Unknown queue: {0}")]
    UnknownQueue(String),

    /// The delivery was already settled or never handed out.
    #[error("Unknown delivery {tag} on queue {queue}")]
    UnknownDelivery { queue: String, tag: u64 },

    /// The broker could not be reached or refused the operation.
    #[error("Broker unavailable: {0}")]
    Unavailable(String),

    /// An envelope is missing a required field.
    #[error("Invalid envelope: {0}")]
    InvalidEnvelope(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl BusError {
    /// Returns true if retrying the same operation later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, BusError::Unavailable(_) | BusError::Database(_))
    }
}

/// Result type for messaging operations.
pub type Result<T> = std::result::Result<T, BusError>;
