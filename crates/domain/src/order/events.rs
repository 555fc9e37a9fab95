//! Order domain events.

use chrono::{DateTime, Utc};
use common::{ClientId, OrderId};
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;

use super::OrderLine;

/// Events that can occur on an order aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OrderEvent {
    /// Order was accepted.
    OrderPlaced(OrderPlacedData),

    /// Order was announced and now waits for payment.
    PaymentAwaited(PaymentAwaitedData),

    /// Order moved to another client.
    ClientReassigned(ClientReassignedData),

    /// Order lines were replaced.
    LinesRevised(LinesRevisedData),

    /// A charge completed for the order.
    OrderPaid(OrderPaidData),

    /// Order was cancelled.
    OrderCancelled(OrderCancelledData),
}

impl DomainEvent for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::OrderPlaced(_) => "OrderPlaced",
            OrderEvent::PaymentAwaited(_) => "PaymentAwaited",
            OrderEvent::ClientReassigned(_) => "ClientReassigned",
            OrderEvent::LinesRevised(_) => "LinesRevised",
            OrderEvent::OrderPaid(_) => "OrderPaid",
            OrderEvent::OrderCancelled(_) => "OrderCancelled",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderPlacedData {
    pub order_id: OrderId,
    pub client_id: ClientId,
    pub lines: Vec<OrderLine>,
    pub placed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentAwaitedData {
    pub awaiting_since: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientReassignedData {
    pub previous: ClientId,
    pub client_id: ClientId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinesRevisedData {
    pub previous: Vec<OrderLine>,
    pub lines: Vec<OrderLine>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderPaidData {
    pub paid_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderCancelledData {
    pub reason: String,
    pub cancelled_at: DateTime<Utc>,
}

// Convenience constructors for events
impl OrderEvent {
    pub fn order_placed(order_id: OrderId, client_id: ClientId, lines: Vec<OrderLine>) -> Self {
        OrderEvent::OrderPlaced(OrderPlacedData {
            order_id,
            client_id,
            lines,
            placed_at: Utc::now(),
        })
    }

    pub fn payment_awaited() -> Self {
        OrderEvent::PaymentAwaited(PaymentAwaitedData {
            awaiting_since: Utc::now(),
        })
    }

    pub fn client_reassigned(previous: ClientId, client_id: ClientId) -> Self {
        OrderEvent::ClientReassigned(ClientReassignedData {
            previous,
            client_id,
        })
    }

    pub fn lines_revised(previous: Vec<OrderLine>, lines: Vec<OrderLine>) -> Self {
        OrderEvent::LinesRevised(LinesRevisedData { previous, lines })
    }

    pub fn order_paid() -> Self {
        OrderEvent::OrderPaid(OrderPaidData {
            paid_at: Utc::now(),
        })
    }

    pub fn order_cancelled(reason: impl Into<String>) -> Self {
        OrderEvent::OrderCancelled(OrderCancelledData {
            reason: reason.into(),
            cancelled_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_names() {
        assert_eq!(OrderEvent::payment_awaited().event_type(), "PaymentAwaited");
        assert_eq!(OrderEvent::order_paid().event_type(), "OrderPaid");
        assert_eq!(
            OrderEvent::order_cancelled("x").event_type(),
            "OrderCancelled"
        );
    }

    #[test]
    fn events_are_tagged_on_the_wire() {
        let event = OrderEvent::order_placed(
            OrderId::new(),
            ClientId::new(7),
            vec![OrderLine::new(10, 2)],
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "OrderPlaced");
        assert_eq!(json["data"]["client_id"], 7);
        assert_eq!(json["data"]["lines"][0]["quantity"], 2);
    }
}
