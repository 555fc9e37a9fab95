//! Core aggregate and domain event traits.

use std::fmt::{Debug, Display};
use std::hash::Hash;

use serde::{Serialize, de::DeserializeOwned};
use uuid::Uuid;

use crate::repository::Version;

/// Trait for domain events.
///
/// Domain events represent facts that have happened to one entity.
/// They are immutable and named in past tense.
pub trait DomainEvent: Serialize + DeserializeOwned + Send + Sync + Clone {
    /// Returns the event type name.
    fn event_type(&self) -> &'static str;
}

/// Trait for the entities each saga service owns.
///
/// Every state change goes through two steps:
/// - a command method inspects the current state and returns the events to
///   record (an empty list means "nothing to do", which is how idempotent
///   re-processing shows up)
/// - `apply` folds those events into the state, purely and deterministically
///
/// The resulting state is persisted as a versioned document.
pub trait Aggregate:
    Default + Clone + Debug + Serialize + DeserializeOwned + Send + Sync + Sized + 'static
{
    /// Identifier type of this entity.
    type Id: Copy
        + Eq
        + Hash
        + Debug
        + Display
        + Into<Uuid>
        + From<Uuid>
        + Send
        + Sync
        + 'static;

    /// The type of events this aggregate produces and consumes.
    type Event: DomainEvent;

    /// The type of errors this aggregate's commands can produce.
    type Error: std::error::Error + Send + Sync;

    /// Returns the aggregate type name.
    fn aggregate_type() -> &'static str;

    /// Returns the aggregate's unique identifier.
    ///
    /// Returns None for a new, uninitialized aggregate.
    fn id(&self) -> Option<Self::Id>;

    /// Returns the current version of the aggregate.
    ///
    /// Version starts at 0 for a new aggregate and increments with every save.
    fn version(&self) -> Version;

    /// Sets the aggregate version. Called by repositories after a save or load.
    fn set_version(&mut self, version: Version);

    /// Applies an event to the aggregate, updating its state.
    ///
    /// Must not fail: events represent facts that have happened.
    fn apply(&mut self, event: Self::Event);

    /// Natural key that must be unique among live aggregates of this type.
    ///
    /// Repositories reject a save that would give two aggregates the same key.
    fn unique_key(&self) -> Option<String> {
        None
    }

    /// Applies multiple events in sequence.
    fn apply_events(&mut self, events: impl IntoIterator<Item = Self::Event>) {
        for event in events {
            self.apply(event);
        }
    }
}
