use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use uuid::Uuid;

use crate::{BusError, Result};

/// Current version of the envelope layout.
pub const SCHEMA_VERSION: u32 = 1;

/// Unique identifier for a published message.
///
/// Consumers key their idempotency ledger on this id, so a redelivered
/// message always carries the id it was first published with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(Uuid);

impl MessageId {
    /// Creates a new random message ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Derives a stable message ID from the entity a message is about and a
    /// name for the occasion. The same inputs always give the same ID, so a
    /// message republished after a failed write is dropped as a duplicate.
    pub fn derived(entity: Uuid, occasion: &str) -> Self {
        Self(Uuid::new_v5(&entity, occasion.as_bytes()))
    }

    /// Creates a message ID from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for MessageId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// A message on the bus: a typed payload plus the routing and tracing
/// metadata every consumer needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub message_id: MessageId,

    /// Logical event name (e.g. "OrderCreated").
    pub event_type: String,

    /// Topic the message is published under (e.g. "order.created").
    pub routing_key: String,

    /// Entity the event is about.
    pub aggregate_id: Uuid,

    /// Saga instance the event belongs to. Always the order id.
    pub correlation_id: Uuid,

    pub schema_version: u32,

    pub occurred_at: DateTime<Utc>,

    pub payload: serde_json::Value,

    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Envelope {
    /// Creates a new envelope builder.
    pub fn builder() -> EnvelopeBuilder {
        EnvelopeBuilder::default()
    }

    /// Deserializes the payload into a concrete message type.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }
}

/// Builder for constructing envelopes.
#[derive(Debug, Default)]
pub struct EnvelopeBuilder {
    message_id: Option<MessageId>,
    event_type: Option<String>,
    routing_key: Option<String>,
    aggregate_id: Option<Uuid>,
    correlation_id: Option<Uuid>,
    occurred_at: Option<DateTime<Utc>>,
    payload: Option<serde_json::Value>,
    metadata: HashMap<String, serde_json::Value>,
}

impl EnvelopeBuilder {
    /// Sets the message ID. If not set, a new ID will be generated.
    pub fn message_id(mut self, id: MessageId) -> Self {
        self.message_id = Some(id);
        self
    }

    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    pub fn routing_key(mut self, routing_key: impl Into<String>) -> Self {
        self.routing_key = Some(routing_key.into());
        self
    }

    pub fn aggregate_id(mut self, id: impl Into<Uuid>) -> Self {
        self.aggregate_id = Some(id.into());
        self
    }

    pub fn correlation_id(mut self, id: impl Into<Uuid>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    /// Sets the timestamp. If not set, the current time will be used.
    pub fn occurred_at(mut self, at: DateTime<Utc>) -> Self {
        self.occurred_at = Some(at);
        self
    }

    /// Sets the payload from a serializable value.
    pub fn payload<T: Serialize>(mut self, payload: &T) -> Result<Self> {
        self.payload = Some(serde_json::to_value(payload)?);
        Ok(self)
    }

    /// Sets the payload from a raw JSON value.
    pub fn payload_raw(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Adds a metadata entry.
    pub fn metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Builds the envelope, failing if a required field is missing.
    ///
    /// The correlation id defaults to the aggregate id.
    pub fn build(self) -> Result<Envelope> {
        let missing = |field: &str| BusError::InvalidEnvelope(format!("{field} is required"));

        let aggregate_id = self.aggregate_id.ok_or_else(|| missing("aggregate_id"))?;
        Ok(Envelope {
            message_id: self.message_id.unwrap_or_default(),
            event_type: self.event_type.ok_or_else(|| missing("event_type"))?,
            routing_key: self.routing_key.ok_or_else(|| missing("routing_key"))?,
            aggregate_id,
            correlation_id: self.correlation_id.unwrap_or(aggregate_id),
            schema_version: SCHEMA_VERSION,
            occurred_at: self.occurred_at.unwrap_or_else(Utc::now),
            payload: self.payload.ok_or_else(|| missing("payload"))?,
            metadata: self.metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_ids_are_unique() {
        assert_ne!(MessageId::new(), MessageId::new());
    }

    #[test]
    fn derived_ids_are_stable_per_occasion() {
        let entity = Uuid::new_v4();
        assert_eq!(
            MessageId::derived(entity, "stock-release"),
            MessageId::derived(entity, "stock-release")
        );
        assert_ne!(
            MessageId::derived(entity, "stock-release"),
            MessageId::derived(entity, "payment-ready")
        );
        assert_ne!(
            MessageId::derived(entity, "stock-release"),
            MessageId::derived(Uuid::new_v4(), "stock-release")
        );
    }

    #[test]
    fn builder_fills_defaults() {
        let aggregate = Uuid::new_v4();
        let envelope = Envelope::builder()
            .event_type("OrderCreated")
            .routing_key("order.created")
            .aggregate_id(aggregate)
            .payload_raw(serde_json::json!({"orderId": aggregate}))
            .metadata("source", serde_json::json!("orders"))
            .build()
            .unwrap();

        assert_eq!(envelope.correlation_id, aggregate);
        assert_eq!(envelope.schema_version, SCHEMA_VERSION);
        assert_eq!(
            envelope.metadata.get("source"),
            Some(&serde_json::json!("orders"))
        );
    }

    #[test]
    fn builder_reports_missing_fields() {
        let err = Envelope::builder()
            .event_type("OrderCreated")
            .aggregate_id(Uuid::new_v4())
            .payload_raw(serde_json::json!({}))
            .build()
            .unwrap_err();

        assert!(matches!(err, BusError::InvalidEnvelope(ref m) if m.contains("routing_key")));
    }

    #[test]
    fn envelope_uses_camel_case_on_the_wire() {
        let envelope = Envelope::builder()
            .event_type("OrderCreated")
            .routing_key("order.created")
            .aggregate_id(Uuid::new_v4())
            .payload_raw(serde_json::json!({}))
            .build()
            .unwrap();

        let json = serde_json::to_value(&envelope).unwrap();
        assert!(json.get("messageId").is_some());
        assert!(json.get("correlationId").is_some());
        assert_eq!(json["schemaVersion"], 1);
    }

    #[test]
    fn decode_reports_payload_mismatch() {
        let envelope = Envelope::builder()
            .event_type("Anything")
            .routing_key("x")
            .aggregate_id(Uuid::new_v4())
            .payload_raw(serde_json::json!("not an object"))
            .build()
            .unwrap();

        let decoded: Result<HashMap<String, u32>> = envelope.decode();
        assert!(matches!(decoded, Err(BusError::Serialization(_))));
    }
}
