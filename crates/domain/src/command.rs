//! Command handling infrastructure.

use std::sync::Arc;

use crate::aggregate::Aggregate;
use crate::error::DomainError;
use crate::repository::{Repository, RepositoryError, Version};

/// How many times a command is re-run on a freshly loaded aggregate before
/// a concurrency conflict is given up on.
const MAX_RELOADS: usize = 3;

/// Result of command execution.
#[derive(Debug)]
pub struct CommandResult<A: Aggregate> {
    /// The aggregate after applying the new events.
    pub aggregate: A,

    /// The events that were generated. Empty when the command was a no-op.
    pub events: Vec<A::Event>,

    /// The version of the aggregate after the command.
    pub new_version: Version,
}

impl<A: Aggregate> CommandResult<A> {
    /// Returns true if the command changed nothing.
    pub fn is_noop(&self) -> bool {
        self.events.is_empty()
    }
}

/// Handler for executing commands against aggregates.
///
/// The handler is responsible for:
/// 1. Loading the aggregate from its repository
/// 2. Executing the command to produce events
/// 3. Applying the events and saving with optimistic concurrency
pub struct CommandHandler<A: Aggregate> {
    repository: Arc<dyn Repository<A>>,
}

impl<A: Aggregate> Clone for CommandHandler<A> {
    fn clone(&self) -> Self {
        Self {
            repository: Arc::clone(&self.repository),
        }
    }
}

impl<A: Aggregate> CommandHandler<A> {
    pub fn new(repository: Arc<dyn Repository<A>>) -> Self {
        Self { repository }
    }

    /// Returns a reference to the underlying repository.
    pub fn repository(&self) -> &Arc<dyn Repository<A>> {
        &self.repository
    }

    /// Loads an aggregate, returning None if it doesn't exist.
    pub async fn load(&self, id: A::Id) -> Result<Option<A>, DomainError> {
        Ok(self.repository.get(id).await?)
    }

    /// Loads an aggregate, failing with `AggregateNotFound` if it doesn't exist.
    pub async fn load_existing(&self, id: A::Id) -> Result<A, DomainError> {
        self.load(id)
            .await?
            .ok_or_else(|| DomainError::AggregateNotFound {
                aggregate_type: A::aggregate_type(),
                aggregate_id: id.to_string(),
            })
    }

    /// Loads the aggregate currently holding a unique key.
    pub async fn find_by_unique_key(&self, key: &str) -> Result<Option<A>, DomainError> {
        Ok(self.repository.find_by_unique_key(key).await?)
    }

    /// Executes a command against an existing aggregate and persists the result.
    pub async fn execute<F>(&self, id: A::Id, command_fn: F) -> Result<CommandResult<A>, DomainError>
    where
        F: FnOnce(&A) -> Result<Vec<A::Event>, A::Error>,
        DomainError: From<A::Error>,
    {
        let aggregate = self.load_existing(id).await?;
        self.execute_on(aggregate, command_fn).await
    }

    /// Executes a command against a fresh aggregate and inserts it.
    pub async fn create<F>(&self, command_fn: F) -> Result<CommandResult<A>, DomainError>
    where
        F: FnOnce(&A) -> Result<Vec<A::Event>, A::Error>,
        DomainError: From<A::Error>,
    {
        self.execute_on(A::default(), command_fn).await
    }

    /// Executes a command against an already loaded aggregate.
    ///
    /// The save expects the repository to still hold the version the
    /// aggregate was loaded at. When the command returns no events nothing
    /// is written.
    pub async fn execute_on<F>(
        &self,
        mut aggregate: A,
        command_fn: F,
    ) -> Result<CommandResult<A>, DomainError>
    where
        F: FnOnce(&A) -> Result<Vec<A::Event>, A::Error>,
        DomainError: From<A::Error>,
    {
        let current_version = aggregate.version();
        let events = command_fn(&aggregate)?;

        if events.is_empty() {
            return Ok(CommandResult {
                aggregate,
                events,
                new_version: current_version,
            });
        }

        aggregate.apply_events(events.iter().cloned());
        let new_version = self.repository.save(&aggregate, current_version).await?;
        aggregate.set_version(new_version);

        Ok(CommandResult {
            aggregate,
            events,
            new_version,
        })
    }

    /// Like [`execute_on`](Self::execute_on), but when the stored version has
    /// moved on the aggregate is reloaded and the command decided again.
    ///
    /// For writes that must follow an announcement already on the bus.
    pub async fn execute_on_latest<F>(
        &self,
        aggregate: A,
        command_fn: F,
    ) -> Result<CommandResult<A>, DomainError>
    where
        F: Fn(&A) -> Result<Vec<A::Event>, A::Error>,
        DomainError: From<A::Error>,
    {
        let id = aggregate
            .id()
            .ok_or(RepositoryError::MissingIdentity(A::aggregate_type()))?;
        let mut result = self.execute_on(aggregate, &command_fn).await;
        for _ in 0..MAX_RELOADS {
            match result {
                Err(DomainError::Repository(RepositoryError::ConcurrencyConflict { .. })) => {
                    result = self.execute(id, &command_fn).await;
                }
                other => return other,
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::tests::{TestAggregate, TestError, TestEvent};
    use crate::memory::InMemoryRepository;
    use crate::repository::RepositoryError;
    use uuid::Uuid;

    impl From<TestError> for DomainError {
        fn from(e: TestError) -> Self {
            DomainError::AggregateNotFound {
                aggregate_type: "TestAggregate",
                aggregate_id: e.to_string(),
            }
        }
    }

    fn handler() -> (CommandHandler<TestAggregate>, InMemoryRepository<TestAggregate>) {
        let repo = InMemoryRepository::new();
        (CommandHandler::new(Arc::new(repo.clone())), repo)
    }

    fn created(key: &str) -> impl FnOnce(&TestAggregate) -> Result<Vec<TestEvent>, TestError> {
        let key = key.to_string();
        move |_| {
            Ok(vec![TestEvent::Created {
                id: Uuid::new_v4(),
                key,
            }])
        }
    }

    #[tokio::test]
    async fn create_inserts_aggregate() {
        let (handler, repo) = handler();

        let result = handler.create(created("a")).await.unwrap();

        assert_eq!(result.events.len(), 1);
        assert_eq!(result.new_version, Version::first());
        assert_eq!(result.aggregate.version, Version::first());
        assert_eq!(repo.count().await, 1);
    }

    #[tokio::test]
    async fn execute_updates_existing_aggregate() {
        let (handler, _) = handler();
        let id = handler.create(created("a")).await.unwrap().aggregate.id.unwrap();

        let result = handler
            .execute(id, |_| Ok(vec![TestEvent::Updated { value: 42 }]))
            .await
            .unwrap();

        assert_eq!(result.new_version, Version::new(2));
        assert_eq!(result.aggregate.value, 42);
        assert_eq!(handler.load_existing(id).await.unwrap().value, 42);
    }

    #[tokio::test]
    async fn execute_on_missing_aggregate_fails() {
        let (handler, _) = handler();
        let result = handler
            .execute(Uuid::new_v4(), |_| Ok(vec![TestEvent::Updated { value: 1 }]))
            .await;
        assert!(matches!(result, Err(DomainError::AggregateNotFound { .. })));
    }

    #[tokio::test]
    async fn empty_events_write_nothing() {
        let (handler, _) = handler();
        let id = handler.create(created("a")).await.unwrap().aggregate.id.unwrap();

        let result = handler.execute(id, |_| Ok(vec![])).await.unwrap();

        assert!(result.is_noop());
        assert_eq!(result.new_version, Version::first());
    }

    #[tokio::test]
    async fn command_error_is_propagated() {
        let (handler, repo) = handler();
        let result = handler.create(|_| Err(TestError::InvalidValue(-1))).await;

        assert!(result.is_err());
        assert_eq!(repo.count().await, 0);
    }

    #[tokio::test]
    async fn stale_aggregate_is_rejected() {
        let (handler, _) = handler();
        let first = handler.create(created("a")).await.unwrap().aggregate;
        let stale = first.clone();

        handler
            .execute_on(first, |_| Ok(vec![TestEvent::Updated { value: 1 }]))
            .await
            .unwrap();
        let result = handler
            .execute_on(stale, |_| Ok(vec![TestEvent::Updated { value: 2 }]))
            .await;

        assert!(matches!(
            result,
            Err(DomainError::Repository(
                RepositoryError::ConcurrencyConflict { .. }
            ))
        ));
    }

    #[tokio::test]
    async fn latest_write_survives_a_concurrent_update() {
        let (handler, repo) = handler();
        let first = handler.create(created("a")).await.unwrap().aggregate;
        let stale = first.clone();
        handler
            .execute_on(first, |_| Ok(vec![TestEvent::Updated { value: 1 }]))
            .await
            .unwrap();

        let result = handler
            .execute_on_latest(stale, |a| Ok(vec![TestEvent::Updated { value: a.value + 10 }]))
            .await
            .unwrap();

        assert_eq!(result.aggregate.value, 11);
        assert_eq!(result.new_version, Version::new(3));

        repo.fail_next_saves(MAX_RELOADS + 1).await;
        let latest = handler.load_existing(result.aggregate.id.unwrap()).await.unwrap();
        let gave_up = handler
            .execute_on_latest(latest, |_| Ok(vec![TestEvent::Updated { value: 0 }]))
            .await;
        assert!(matches!(
            gave_up,
            Err(DomainError::Repository(
                RepositoryError::ConcurrencyConflict { .. }
            ))
        ));
    }
}
