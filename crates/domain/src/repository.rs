//! Versioned persistence for aggregates.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::aggregate::Aggregate;

/// Version number for an aggregate, used for optimistic concurrency control.
///
/// A never-saved aggregate is at version 0; every successful save
/// increments the version by one.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Version(i64);

impl Version {
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the initial version (0) for a new aggregate.
    pub fn initial() -> Self {
        Self(0)
    }

    /// Returns the version after the first save (1).
    pub fn first() -> Self {
        Self(1)
    }

    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Version {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// Errors that can occur when loading or saving aggregates.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// The stored version did not match the version the caller loaded.
    #[error(
        "Concurrency conflict for {aggregate_type} {aggregate_id}: expected version {expected}, found {actual}"
    )]
    ConcurrencyConflict {
        aggregate_type: &'static str,
        aggregate_id: String,
        expected: Version,
        actual: Version,
    },

    /// Another aggregate of the same type already holds this unique key.
    #[error("Unique key {key} already taken for {aggregate_type}")]
    UniqueViolation {
        aggregate_type: &'static str,
        key: String,
    },

    /// The aggregate has no id yet and cannot be stored.
    #[error("Cannot save {0} without an id")]
    MissingIdentity(&'static str),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Result type for repository operations.
pub type Result<T> = std::result::Result<T, RepositoryError>;

/// Storage for one aggregate type.
///
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait Repository<A: Aggregate>: Send + Sync {
    /// Loads an aggregate by id.
    async fn get(&self, id: A::Id) -> Result<Option<A>>;

    /// Loads the aggregate currently holding a unique key.
    async fn find_by_unique_key(&self, key: &str) -> Result<Option<A>>;

    /// Loads every aggregate of this type, oldest first.
    async fn list(&self) -> Result<Vec<A>>;

    /// Persists an aggregate.
    ///
    /// `expected` is the version the caller loaded (`Version::initial()` for a
    /// new aggregate). Fails with `ConcurrencyConflict` if the stored version
    /// differs and with `UniqueViolation` if the aggregate's unique key is
    /// held by another aggregate. Returns the new version.
    async fn save(&self, aggregate: &A, expected: Version) -> Result<Version>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_ordering() {
        assert!(Version::new(1) < Version::new(2));
        assert_eq!(Version::initial().next(), Version::first());
        assert_eq!(Version::first().as_i64(), 1);
    }

    #[test]
    fn conflict_message_names_the_aggregate() {
        let err = RepositoryError::ConcurrencyConflict {
            aggregate_type: "Dispatch",
            aggregate_id: "abc".to_string(),
            expected: Version::new(1),
            actual: Version::new(2),
        };
        assert_eq!(
            err.to_string(),
            "Concurrency conflict for Dispatch abc: expected version 1, found 2"
        );
    }
}
