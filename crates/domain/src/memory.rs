use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::aggregate::Aggregate;
use crate::repository::{Repository, RepositoryError, Result, Version};

struct Table<A: Aggregate> {
    rows: HashMap<A::Id, A>,
    insertion_order: Vec<A::Id>,
    unique_keys: HashMap<String, A::Id>,
}

impl<A: Aggregate> Default for Table<A> {
    fn default() -> Self {
        Self {
            rows: HashMap::new(),
            insertion_order: Vec::new(),
            unique_keys: HashMap::new(),
        }
    }
}

/// In-memory repository implementation for testing and single-process runs.
///
/// Enforces the same version and unique-key rules as the PostgreSQL
/// implementation, under a single lock so a check and its write are atomic.
#[derive(Clone)]
pub struct InMemoryRepository<A: Aggregate> {
    table: Arc<RwLock<Table<A>>>,
    /// Saves still to be rejected as if another writer had won.
    failing_saves: Arc<RwLock<usize>>,
}

impl<A: Aggregate> Default for InMemoryRepository<A> {
    fn default() -> Self {
        Self {
            table: Arc::new(RwLock::new(Table::default())),
            failing_saves: Arc::new(RwLock::new(0)),
        }
    }
}

impl<A: Aggregate> InMemoryRepository<A> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored aggregates.
    pub async fn count(&self) -> usize {
        self.table.read().await.rows.len()
    }

    /// Rejects the next `count` saves with a concurrency conflict.
    pub async fn fail_next_saves(&self, count: usize) {
        *self.failing_saves.write().await = count;
    }

    /// Removes every stored aggregate.
    pub async fn clear(&self) {
        let mut table = self.table.write().await;
        table.rows.clear();
        table.insertion_order.clear();
        table.unique_keys.clear();
    }
}

#[async_trait]
impl<A: Aggregate> Repository<A> for InMemoryRepository<A> {
    async fn get(&self, id: A::Id) -> Result<Option<A>> {
        Ok(self.table.read().await.rows.get(&id).cloned())
    }

    async fn find_by_unique_key(&self, key: &str) -> Result<Option<A>> {
        let table = self.table.read().await;
        Ok(table
            .unique_keys
            .get(key)
            .and_then(|id| table.rows.get(id))
            .cloned())
    }

    async fn list(&self) -> Result<Vec<A>> {
        let table = self.table.read().await;
        Ok(table
            .insertion_order
            .iter()
            .filter_map(|id| table.rows.get(id))
            .cloned()
            .collect())
    }

    async fn save(&self, aggregate: &A, expected: Version) -> Result<Version> {
        let id = aggregate
            .id()
            .ok_or(RepositoryError::MissingIdentity(A::aggregate_type()))?;

        {
            let mut failing = self.failing_saves.write().await;
            if *failing > 0 {
                *failing -= 1;
                return Err(RepositoryError::ConcurrencyConflict {
                    aggregate_type: A::aggregate_type(),
                    aggregate_id: id.to_string(),
                    expected,
                    actual: expected.next(),
                });
            }
        }

        let mut table = self.table.write().await;

        let previous = table.rows.get(&id);
        let actual = previous.map_or(Version::initial(), |a| a.version());
        if actual != expected {
            return Err(RepositoryError::ConcurrencyConflict {
                aggregate_type: A::aggregate_type(),
                aggregate_id: id.to_string(),
                expected,
                actual,
            });
        }
        let previous_key = previous.and_then(|a| a.unique_key());

        let key = aggregate.unique_key();
        if let Some(ref key) = key
            && let Some(owner) = table.unique_keys.get(key)
            && *owner != id
        {
            return Err(RepositoryError::UniqueViolation {
                aggregate_type: A::aggregate_type(),
                key: key.clone(),
            });
        }

        if let Some(old) = previous_key
            && key.as_ref() != Some(&old)
        {
            table.unique_keys.remove(&old);
        }
        if let Some(key) = key {
            table.unique_keys.insert(key, id);
        }

        let new_version = expected.next();
        let mut stored = aggregate.clone();
        stored.set_version(new_version);
        if table.rows.insert(id, stored).is_none() {
            table.insertion_order.push(id);
        }

        Ok(new_version)
    }
}
