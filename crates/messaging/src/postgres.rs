use async_trait::async_trait;
use sqlx::PgPool;

use crate::{IdempotencyLedger, MessageId, Result};

/// PostgreSQL-backed idempotency ledger.
///
/// Uses the `processed_messages` table; the `(consumer, message_id)` primary
/// key makes concurrent `mark_processed` calls for the same message race-free.
#[derive(Clone)]
pub struct PostgresLedger {
    pool: PgPool,
}

impl PostgresLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl IdempotencyLedger for PostgresLedger {
    async fn is_processed(&self, consumer: &str, message_id: MessageId) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM processed_messages WHERE consumer = $1 AND message_id = $2)",
        )
        .bind(consumer)
        .bind(message_id.as_uuid())
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn mark_processed(&self, consumer: &str, message_id: MessageId) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO processed_messages (consumer, message_id, processed_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (consumer, message_id) DO NOTHING
            "#,
        )
        .bind(consumer)
        .bind(message_id.as_uuid())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}
