use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::Envelope;

/// Filter over the published-message log.
#[derive(Debug, Clone, Default)]
pub struct MessageQuery {
    /// Filter by saga instance (order id).
    pub correlation_id: Option<Uuid>,

    /// Filter by the entity the message is about.
    pub aggregate_id: Option<Uuid>,

    /// Filter by event types (any of these types).
    pub event_types: Option<Vec<String>>,

    /// Filter by messages at or after this timestamp.
    pub from_timestamp: Option<DateTime<Utc>>,

    /// Filter by messages at or before this timestamp.
    pub to_timestamp: Option<DateTime<Utc>>,

    /// Maximum number of messages to return.
    pub limit: Option<usize>,

    /// Number of messages to skip.
    pub offset: Option<usize>,
}

impl MessageQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a query for every message of one saga instance.
    pub fn for_correlation(correlation_id: impl Into<Uuid>) -> Self {
        Self {
            correlation_id: Some(correlation_id.into()),
            ..Default::default()
        }
    }

    /// Creates a query for messages of a specific type.
    pub fn for_event_type(event_type: impl Into<String>) -> Self {
        Self {
            event_types: Some(vec![event_type.into()]),
            ..Default::default()
        }
    }

    pub fn aggregate_id(mut self, id: impl Into<Uuid>) -> Self {
        self.aggregate_id = Some(id.into());
        self
    }

    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_types
            .get_or_insert_with(Vec::new)
            .push(event_type.into());
        self
    }

    pub fn from_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.from_timestamp = Some(timestamp);
        self
    }

    pub fn to_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.to_timestamp = Some(timestamp);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Returns true if the envelope passes every filter set on this query.
    pub fn matches(&self, envelope: &Envelope) -> bool {
        if let Some(id) = self.correlation_id
            && envelope.correlation_id != id
        {
            return false;
        }
        if let Some(id) = self.aggregate_id
            && envelope.aggregate_id != id
        {
            return false;
        }
        if let Some(ref types) = self.event_types
            && !types.contains(&envelope.event_type)
        {
            return false;
        }
        if let Some(from) = self.from_timestamp
            && envelope.occurred_at < from
        {
            return false;
        }
        if let Some(to) = self.to_timestamp
            && envelope.occurred_at > to
        {
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(event_type: &str, correlation: Uuid) -> Envelope {
        Envelope::builder()
            .event_type(event_type)
            .routing_key("test")
            .aggregate_id(Uuid::new_v4())
            .correlation_id(correlation)
            .payload_raw(serde_json::json!({}))
            .build()
            .unwrap()
    }

    #[test]
    fn empty_query_matches_everything() {
        assert!(MessageQuery::new().matches(&envelope("A", Uuid::new_v4())));
    }

    #[test]
    fn filters_by_correlation_and_type() {
        let order = Uuid::new_v4();
        let query = MessageQuery::for_correlation(order)
            .event_type("PaymentReady")
            .event_type("OrderCreated");

        assert!(query.matches(&envelope("OrderCreated", order)));
        assert!(query.matches(&envelope("PaymentReady", order)));
        assert!(!query.matches(&envelope("DispatchScheduled", order)));
        assert!(!query.matches(&envelope("OrderCreated", Uuid::new_v4())));
    }

    #[test]
    fn filters_by_time_window() {
        let e = envelope("A", Uuid::new_v4());
        let later = e.occurred_at + chrono::Duration::seconds(5);
        assert!(!MessageQuery::new().from_timestamp(later).matches(&e));
        assert!(MessageQuery::new().to_timestamp(later).matches(&e));
    }
}
