use std::marker::PhantomData;

use async_trait::async_trait;
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::aggregate::Aggregate;
use crate::repository::{Repository, RepositoryError, Result, Version};

/// Runs the database migrations shared by the repositories and the
/// idempotency ledger.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("../../migrations").run(pool).await?;
    Ok(())
}

/// PostgreSQL-backed repository.
///
/// Every aggregate type shares the `entities` table; rows are JSONB documents
/// keyed by `(aggregate_type, id)`. The `unique_entity_key` constraint on
/// `(aggregate_type, unique_key)` backs [`Aggregate::unique_key`].
pub struct PostgresRepository<A: Aggregate> {
    pool: PgPool,
    _phantom: PhantomData<fn() -> A>,
}

impl<A: Aggregate> Clone for PostgresRepository<A> {
    fn clone(&self) -> Self {
        Self::new(self.pool.clone())
    }
}

impl<A: Aggregate> PostgresRepository<A> {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            _phantom: PhantomData,
        }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn row_to_aggregate(row: PgRow) -> Result<A> {
        let state: serde_json::Value = row.try_get("state")?;
        let mut aggregate: A = serde_json::from_value(state)?;
        aggregate.set_version(Version::new(row.try_get("version")?));
        Ok(aggregate)
    }

    fn map_write_error(&self, id: A::Id, expected: Version, key: Option<&str>, e: sqlx::Error) -> RepositoryError {
        if let sqlx::Error::Database(ref db_err) = e {
            match db_err.constraint() {
                Some("unique_entity_key") => {
                    return RepositoryError::UniqueViolation {
                        aggregate_type: A::aggregate_type(),
                        key: key.unwrap_or_default().to_string(),
                    };
                }
                Some("entities_pkey") => {
                    return RepositoryError::ConcurrencyConflict {
                        aggregate_type: A::aggregate_type(),
                        aggregate_id: id.to_string(),
                        expected,
                        actual: expected.next(),
                    };
                }
                _ => {}
            }
        }
        RepositoryError::Database(e)
    }

    async fn current_version(&self, id: Uuid) -> Result<Version> {
        let version: Option<i64> = sqlx::query_scalar(
            "SELECT version FROM entities WHERE aggregate_type = $1 AND id = $2",
        )
        .bind(A::aggregate_type())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(Version::new(version.unwrap_or(0)))
    }
}

#[async_trait]
impl<A: Aggregate> Repository<A> for PostgresRepository<A> {
    async fn get(&self, id: A::Id) -> Result<Option<A>> {
        let row = sqlx::query(
            "SELECT state, version FROM entities WHERE aggregate_type = $1 AND id = $2",
        )
        .bind(A::aggregate_type())
        .bind(Into::<Uuid>::into(id))
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_aggregate).transpose()
    }

    async fn find_by_unique_key(&self, key: &str) -> Result<Option<A>> {
        let row = sqlx::query(
            "SELECT state, version FROM entities WHERE aggregate_type = $1 AND unique_key = $2",
        )
        .bind(A::aggregate_type())
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_aggregate).transpose()
    }

    async fn list(&self) -> Result<Vec<A>> {
        let rows = sqlx::query(
            "SELECT state, version FROM entities WHERE aggregate_type = $1 ORDER BY created_at, id",
        )
        .bind(A::aggregate_type())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_aggregate).collect()
    }

    async fn save(&self, aggregate: &A, expected: Version) -> Result<Version> {
        let id = aggregate
            .id()
            .ok_or(RepositoryError::MissingIdentity(A::aggregate_type()))?;
        let uuid: Uuid = id.into();
        let key = aggregate.unique_key();
        let new_version = expected.next();

        let mut stored = aggregate.clone();
        stored.set_version(new_version);
        let state = serde_json::to_value(&stored)?;

        if expected == Version::initial() {
            sqlx::query(
                r#"
                INSERT INTO entities (aggregate_type, id, version, unique_key, state, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, NOW(), NOW())
                "#,
            )
            .bind(A::aggregate_type())
            .bind(uuid)
            .bind(new_version.as_i64())
            .bind(key.as_deref())
            .bind(&state)
            .execute(&self.pool)
            .await
            .map_err(|e| self.map_write_error(id, expected, key.as_deref(), e))?;

            return Ok(new_version);
        }

        let result = sqlx::query(
            r#"
            UPDATE entities
            SET version = $3, unique_key = $4, state = $5, updated_at = NOW()
            WHERE aggregate_type = $1 AND id = $2 AND version = $6
            "#,
        )
        .bind(A::aggregate_type())
        .bind(uuid)
        .bind(new_version.as_i64())
        .bind(key.as_deref())
        .bind(&state)
        .bind(expected.as_i64())
        .execute(&self.pool)
        .await
        .map_err(|e| self.map_write_error(id, expected, key.as_deref(), e))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::ConcurrencyConflict {
                aggregate_type: A::aggregate_type(),
                aggregate_id: id.to_string(),
                expected,
                actual: self.current_version(uuid).await?,
            });
        }

        Ok(new_version)
    }
}
