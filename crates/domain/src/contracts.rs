//! Integration events exchanged between the saga services.
//!
//! Domain events stay inside the service that owns an aggregate. The events
//! below are the public contracts that cross service boundaries on the bus.
//! Each one travels as the payload of a [`messaging::Envelope`] whose
//! correlation id is the order the saga instance belongs to.

use chrono::{DateTime, Utc};
use common::{DispatchId, Money, OrderId, ProductId};
use messaging::{Envelope, SCHEMA_VERSION};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::dispatch::DispatchStatus;
use crate::order::{OrderLine, OrderStatus};

/// Routing keys, one topic per event type.
pub mod routing {
    pub const ORDER_CREATED: &str = "order.created";
    pub const STOCK_ADJUSTMENT: &str = "inventory.stock-adjustment";
    pub const ORDER_STATUS_CHANGED: &str = "order.status-changed";
    pub const PAYMENT_READY: &str = "payment.ready";
    pub const DISPATCH_SCHEDULED: &str = "dispatch.scheduled";
    pub const DISPATCH_STATUS_CHANGED: &str = "dispatch.status-changed";
}

/// Errors raised while mapping between envelopes and contracts.
#[derive(Debug, Error)]
pub enum ContractError {
    #[error("Unsupported schema version {0}")]
    UnsupportedSchema(u32),

    /// The envelope header names a different event than its payload.
    #[error("Envelope declares {declared} but carries {actual}")]
    TypeMismatch { declared: String, actual: String },

    #[error("Malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Envelope error: {0}")]
    Envelope(#[from] messaging::BusError),
}

/// Every message the saga publishes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum IntegrationEvent {
    /// An order was accepted and waits for payment.
    OrderCreated(OrderCreated),

    /// Stock must move for an order: negative deltas reserve, positive release.
    StockAdjustment(StockAdjustment),

    /// Payment tells the order service the order is paid.
    OrderStatusChanged(OrderStatusChanged),

    /// An order is paid and ready for dispatch.
    PaymentReady(PaymentReady),

    /// A dispatch date was assigned.
    DispatchScheduled(DispatchScheduled),

    /// Shipment reports the dispatch left.
    DispatchStatusChanged(DispatchStatusChanged),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCreated {
    pub order_id: OrderId,
    pub initial_status: OrderStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockDelta {
    pub product_id: ProductId,
    pub quantity_delta: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockAdjustment {
    pub order_id: OrderId,
    pub lines: Vec<StockDelta>,
}

impl StockAdjustment {
    /// Takes the ordered quantities out of stock.
    pub fn reserve(order_id: OrderId, lines: &[OrderLine]) -> Self {
        Self::from_lines(order_id, lines, -1)
    }

    /// Puts the ordered quantities back.
    pub fn release(order_id: OrderId, lines: &[OrderLine]) -> Self {
        Self::from_lines(order_id, lines, 1)
    }

    fn from_lines(order_id: OrderId, lines: &[OrderLine], sign: i64) -> Self {
        Self {
            order_id,
            lines: lines
                .iter()
                .map(|line| StockDelta {
                    product_id: line.product_id,
                    quantity_delta: sign * i64::from(line.quantity),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderStatusChanged {
    pub order_id: OrderId,
    pub status: OrderStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentReady {
    pub order_id: OrderId,
    pub delivery_address: String,
    pub shipping_cost: Money,

    /// Absent when the order was marked charged outside the payment service.
    pub total_amount: Option<Money>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchScheduled {
    pub dispatch_id: DispatchId,
    pub order_id: OrderId,
    pub delivery_address: String,
    pub contact_email: String,
    pub scheduled_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchStatusChanged {
    pub dispatch_id: DispatchId,
    pub status: DispatchStatus,
    pub shipped_at: DateTime<Utc>,
}

impl IntegrationEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            IntegrationEvent::OrderCreated(_) => "OrderCreated",
            IntegrationEvent::StockAdjustment(_) => "StockAdjustment",
            IntegrationEvent::OrderStatusChanged(_) => "OrderStatusChanged",
            IntegrationEvent::PaymentReady(_) => "PaymentReady",
            IntegrationEvent::DispatchScheduled(_) => "DispatchScheduled",
            IntegrationEvent::DispatchStatusChanged(_) => "DispatchStatusChanged",
        }
    }

    pub fn routing_key(&self) -> &'static str {
        match self {
            IntegrationEvent::OrderCreated(_) => routing::ORDER_CREATED,
            IntegrationEvent::StockAdjustment(_) => routing::STOCK_ADJUSTMENT,
            IntegrationEvent::OrderStatusChanged(_) => routing::ORDER_STATUS_CHANGED,
            IntegrationEvent::PaymentReady(_) => routing::PAYMENT_READY,
            IntegrationEvent::DispatchScheduled(_) => routing::DISPATCH_SCHEDULED,
            IntegrationEvent::DispatchStatusChanged(_) => routing::DISPATCH_STATUS_CHANGED,
        }
    }

    /// Service that publishes this event.
    pub fn producer(&self) -> &'static str {
        match self {
            IntegrationEvent::OrderCreated(_) | IntegrationEvent::StockAdjustment(_) => "orders",
            IntegrationEvent::OrderStatusChanged(_) | IntegrationEvent::PaymentReady(_) => {
                "payments"
            }
            IntegrationEvent::DispatchScheduled(_) => "dispatches",
            IntegrationEvent::DispatchStatusChanged(_) => "shipments",
        }
    }

    /// Entity the event is about.
    pub fn aggregate_id(&self) -> Uuid {
        match self {
            IntegrationEvent::OrderCreated(e) => e.order_id.into(),
            IntegrationEvent::StockAdjustment(e) => e.order_id.into(),
            IntegrationEvent::OrderStatusChanged(e) => e.order_id.into(),
            IntegrationEvent::PaymentReady(e) => e.order_id.into(),
            IntegrationEvent::DispatchScheduled(e) => e.dispatch_id.into(),
            IntegrationEvent::DispatchStatusChanged(e) => e.dispatch_id.into(),
        }
    }

    /// Order the event belongs to, when the payload carries it.
    pub fn order_id(&self) -> Option<OrderId> {
        match self {
            IntegrationEvent::OrderCreated(e) => Some(e.order_id),
            IntegrationEvent::StockAdjustment(e) => Some(e.order_id),
            IntegrationEvent::OrderStatusChanged(e) => Some(e.order_id),
            IntegrationEvent::PaymentReady(e) => Some(e.order_id),
            IntegrationEvent::DispatchScheduled(e) => Some(e.order_id),
            IntegrationEvent::DispatchStatusChanged(_) => None,
        }
    }

    /// Wraps the event in an envelope correlated to `order_id`.
    pub fn to_envelope(&self, order_id: OrderId) -> Result<Envelope, ContractError> {
        let envelope = Envelope::builder()
            .event_type(self.event_type())
            .routing_key(self.routing_key())
            .aggregate_id(self.aggregate_id())
            .correlation_id(order_id)
            .payload(self)?
            .metadata("producer", serde_json::json!(self.producer()))
            .build()?;
        Ok(envelope)
    }

    /// Decodes the payload of an envelope, checking it against the header.
    pub fn from_envelope(envelope: &Envelope) -> Result<Self, ContractError> {
        if envelope.schema_version != SCHEMA_VERSION {
            return Err(ContractError::UnsupportedSchema(envelope.schema_version));
        }
        let event: IntegrationEvent = serde_json::from_value(envelope.payload.clone())?;
        if event.event_type() != envelope.event_type {
            return Err(ContractError::TypeMismatch {
                declared: envelope.event_type.clone(),
                actual: event.event_type().to_string(),
            });
        }
        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payment_ready(order_id: OrderId) -> IntegrationEvent {
        IntegrationEvent::PaymentReady(PaymentReady {
            order_id,
            delivery_address: "123 Main St".to_string(),
            shipping_cost: Money::from_cents(2050),
            total_amount: Some(Money::from_cents(12050)),
        })
    }

    #[test]
    fn envelope_carries_routing_and_correlation() {
        let order_id = OrderId::new();
        let envelope = payment_ready(order_id).to_envelope(order_id).unwrap();

        assert_eq!(envelope.event_type, "PaymentReady");
        assert_eq!(envelope.routing_key, routing::PAYMENT_READY);
        assert_eq!(envelope.correlation_id, order_id.as_uuid());
        assert_eq!(envelope.aggregate_id, order_id.as_uuid());
        assert_eq!(
            envelope.metadata.get("producer"),
            Some(&serde_json::json!("payments"))
        );
        assert_eq!(IntegrationEvent::from_envelope(&envelope).unwrap(), payment_ready(order_id));
    }

    #[test]
    fn dispatch_status_changed_is_correlated_by_argument() {
        let order_id = OrderId::new();
        let dispatch_id = DispatchId::new();
        let event = IntegrationEvent::DispatchStatusChanged(DispatchStatusChanged {
            dispatch_id,
            status: DispatchStatus::Shipped,
            shipped_at: Utc::now(),
        });

        let envelope = event.to_envelope(order_id).unwrap();
        assert_eq!(envelope.aggregate_id, dispatch_id.as_uuid());
        assert_eq!(envelope.correlation_id, order_id.as_uuid());
        assert_eq!(event.order_id(), None);
    }

    #[test]
    fn payload_uses_tagged_camel_case_layout() {
        let order_id = OrderId::new();
        let event = IntegrationEvent::OrderCreated(OrderCreated {
            order_id,
            initial_status: OrderStatus::PendingPayment,
        });

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "OrderCreated");
        assert_eq!(json["data"]["initialStatus"], "pending_payment");
        assert_eq!(json["data"]["orderId"], order_id.to_string());
    }

    #[test]
    fn mismatched_header_is_rejected() {
        let order_id = OrderId::new();
        let mut envelope = payment_ready(order_id).to_envelope(order_id).unwrap();
        envelope.event_type = "OrderCreated".to_string();

        assert!(matches!(
            IntegrationEvent::from_envelope(&envelope),
            Err(ContractError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn malformed_payload_is_rejected() {
        let order_id = OrderId::new();
        let mut envelope = payment_ready(order_id).to_envelope(order_id).unwrap();
        envelope.payload = serde_json::json!({"type": "PaymentReady", "data": {"orderId": 42}});

        assert!(matches!(
            IntegrationEvent::from_envelope(&envelope),
            Err(ContractError::Malformed(_))
        ));
    }

    #[test]
    fn unknown_schema_version_is_rejected() {
        let order_id = OrderId::new();
        let mut envelope = payment_ready(order_id).to_envelope(order_id).unwrap();
        envelope.schema_version = 2;

        assert!(matches!(
            IntegrationEvent::from_envelope(&envelope),
            Err(ContractError::UnsupportedSchema(2))
        ));
    }

    #[test]
    fn stock_adjustment_signs_deltas() {
        let order_id = OrderId::new();
        let lines = [OrderLine::new(10, 2), OrderLine::new(11, 1)];

        let reserve = StockAdjustment::reserve(order_id, &lines);
        let release = StockAdjustment::release(order_id, &lines);

        assert_eq!(reserve.lines[0].quantity_delta, -2);
        assert_eq!(release.lines[1].quantity_delta, 1);
        assert_eq!(reserve.lines[0].product_id, ProductId::new(10));
    }
}
