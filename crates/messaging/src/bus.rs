use std::pin::Pin;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_core::Stream;
use serde::{Deserialize, Serialize};

use crate::{Envelope, MessageQuery, Result};

/// Broker-assigned handle for one delivery of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeliveryTag(u64);

impl DeliveryTag {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for DeliveryTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A message handed to a consumer. It stays unacknowledged until the
/// consumer acks, nacks or dead-letters it.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub tag: DeliveryTag,
    pub queue: String,
    pub envelope: Envelope,
    /// How many times this message has been handed out, starting at 1.
    pub delivery_count: u32,
}

impl Delivery {
    pub fn is_redelivery(&self) -> bool {
        self.delivery_count > 1
    }
}

/// A message parked after it could not be processed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetter {
    pub queue: String,
    pub envelope: Envelope,
    pub reason: String,
    pub delivery_count: u32,
    pub dead_lettered_at: DateTime<Utc>,
}

/// A stream of envelopes.
pub type EnvelopeStream = Pin<Box<dyn Stream<Item = Result<Envelope>> + Send>>;

/// Topic/queue broker with at-least-once delivery.
///
/// Queues are bound to routing-key patterns; a published message is copied to
/// every bound queue and each queue is consumed independently. Delivery order
/// across queues is not guaranteed and a nacked message may come back after
/// messages published later.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Declares a queue bound to the given routing-key patterns.
    ///
    /// Patterns follow topic-exchange rules: `*` matches one dot-separated
    /// word, `#` matches zero or more. Declaring an existing queue adds bindings.
    async fn declare_queue(&self, queue: &str, bindings: &[&str]) -> Result<()>;

    /// Publishes a batch of messages. Either every message is routed or none is.
    async fn publish_batch(&self, envelopes: Vec<Envelope>) -> Result<()>;

    /// Takes the next ready message from a queue, if any.
    async fn receive(&self, queue: &str) -> Result<Option<Delivery>>;

    /// Settles a delivery as processed.
    async fn ack(&self, delivery: &Delivery) -> Result<()>;

    /// Rejects a delivery. With `requeue` the message goes back to the queue
    /// for redelivery, otherwise it is discarded.
    async fn nack(&self, delivery: &Delivery, requeue: bool) -> Result<()>;

    /// Moves a delivery to the queue's dead-letter store.
    async fn dead_letter(&self, delivery: &Delivery, reason: &str) -> Result<()>;
}

/// Extension trait providing convenience methods for buses.
#[async_trait]
pub trait MessageBusExt: MessageBus {
    /// Publishes a single message.
    async fn publish(&self, envelope: Envelope) -> Result<()> {
        self.publish_batch(vec![envelope]).await
    }
}

impl<T: MessageBus + ?Sized> MessageBusExt for T {}

/// Read access to everything that was published, in publish order.
///
/// Used to rebuild read models and to audit a saga after the fact.
#[async_trait]
pub trait MessageLog: Send + Sync {
    async fn query_published(&self, query: MessageQuery) -> Result<Vec<Envelope>>;

    /// Streams published messages starting at a position in the log.
    async fn stream_published(&self, from_position: usize) -> Result<EnvelopeStream>;

    /// Number of messages published so far.
    async fn published_count(&self) -> Result<usize>;
}

/// Matches a routing key against a topic binding pattern.
pub fn routing_matches(pattern: &str, routing_key: &str) -> bool {
    let pattern: Vec<&str> = pattern.split('.').collect();
    let key: Vec<&str> = routing_key.split('.').collect();
    matches_words(&pattern, &key)
}

fn matches_words(pattern: &[&str], key: &[&str]) -> bool {
    match pattern.split_first() {
        None => key.is_empty(),
        Some((&"#", rest)) => (0..=key.len()).any(|skip| matches_words(rest, &key[skip..])),
        Some((word, rest)) => match key.split_first() {
            Some((head, tail)) => (*word == "*" || word == head) && matches_words(rest, tail),
            None => false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_binding_matches_only_its_key() {
        assert!(routing_matches("order.created", "order.created"));
        assert!(!routing_matches("order.created", "order.status-changed"));
        assert!(!routing_matches("order.created", "order.created.v2"));
    }

    #[test]
    fn star_matches_one_word() {
        assert!(routing_matches("order.*", "order.created"));
        assert!(!routing_matches("order.*", "order"));
        assert!(!routing_matches("*.created", "order.item.created"));
    }

    #[test]
    fn hash_matches_any_suffix() {
        assert!(routing_matches("#", "dispatch.scheduled"));
        assert!(routing_matches("dispatch.#", "dispatch"));
        assert!(routing_matches("dispatch.#", "dispatch.status-changed"));
        assert!(!routing_matches("dispatch.#", "payment.ready"));
    }
}
