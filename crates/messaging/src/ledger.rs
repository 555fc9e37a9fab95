use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{MessageId, Result};

/// Records which messages each consumer has already handled.
///
/// Delivery is at-least-once, so every consumer checks the ledger before
/// handling a message and records it only after its local writes and
/// follow-up publishes succeeded.
#[async_trait]
pub trait IdempotencyLedger: Send + Sync {
    /// Returns true if `consumer` already handled `message_id`.
    async fn is_processed(&self, consumer: &str, message_id: MessageId) -> Result<bool>;

    /// Records `message_id` as handled by `consumer`.
    ///
    /// Returns false if it was already recorded.
    async fn mark_processed(&self, consumer: &str, message_id: MessageId) -> Result<bool>;
}

/// In-memory idempotency ledger for testing and single-process runs.
#[derive(Clone, Default)]
pub struct InMemoryLedger {
    processed: Arc<RwLock<HashSet<(String, MessageId)>>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of messages recorded for a consumer.
    pub async fn processed_count(&self, consumer: &str) -> usize {
        self.processed
            .read()
            .await
            .iter()
            .filter(|(c, _)| c == consumer)
            .count()
    }
}

#[async_trait]
impl IdempotencyLedger for InMemoryLedger {
    async fn is_processed(&self, consumer: &str, message_id: MessageId) -> Result<bool> {
        Ok(self
            .processed
            .read()
            .await
            .contains(&(consumer.to_string(), message_id)))
    }

    async fn mark_processed(&self, consumer: &str, message_id: MessageId) -> Result<bool> {
        Ok(self
            .processed
            .write()
            .await
            .insert((consumer.to_string(), message_id)))
    }
}
