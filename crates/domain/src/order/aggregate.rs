//! Order aggregate implementation.

use chrono::{DateTime, Utc};
use common::{ClientId, OrderId};
use serde::{Deserialize, Serialize};

use crate::aggregate::Aggregate;
use crate::repository::Version;

use super::{
    OrderError, OrderEvent, OrderLine, OrderRevision, OrderStatus, StatusRequest,
    value_objects::{merge_lines, total_quantity},
};

/// Order aggregate root.
///
/// Owned by the order service. Other services only ever see it through the
/// messages it publishes and the `GetOrder` lookup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Order {
    id: Option<OrderId>,

    /// Current version for optimistic concurrency.
    #[serde(default)]
    version: Version,

    client_id: Option<ClientId>,

    status: OrderStatus,

    /// Lines merged per product, ordered by product id.
    lines: Vec<OrderLine>,

    placed_at: Option<DateTime<Utc>>,

    paid_at: Option<DateTime<Utc>>,

    cancellation_reason: Option<String>,
}

impl Aggregate for Order {
    type Id = OrderId;
    type Event = OrderEvent;
    type Error = OrderError;

    fn aggregate_type() -> &'static str {
        "Order"
    }

    fn id(&self) -> Option<OrderId> {
        self.id
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    fn apply(&mut self, event: Self::Event) {
        match event {
            OrderEvent::OrderPlaced(data) => {
                self.id = Some(data.order_id);
                self.client_id = Some(data.client_id);
                self.lines = data.lines;
                self.placed_at = Some(data.placed_at);
                self.status = OrderStatus::Created;
            }
            OrderEvent::PaymentAwaited(_) => {
                self.status = OrderStatus::PendingPayment;
            }
            OrderEvent::ClientReassigned(data) => {
                self.client_id = Some(data.client_id);
            }
            OrderEvent::LinesRevised(data) => {
                self.lines = data.lines;
            }
            OrderEvent::OrderPaid(data) => {
                self.status = OrderStatus::Paid;
                self.paid_at = Some(data.paid_at);
            }
            OrderEvent::OrderCancelled(data) => {
                self.status = OrderStatus::Cancelled;
                self.cancellation_reason = Some(data.reason);
            }
        }
    }
}

// Query methods
impl Order {
    pub fn client_id(&self) -> Option<ClientId> {
        self.client_id
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn lines(&self) -> &[OrderLine] {
        &self.lines
    }

    pub fn total_quantity(&self) -> u64 {
        total_quantity(&self.lines)
    }

    pub fn placed_at(&self) -> Option<DateTime<Utc>> {
        self.placed_at
    }

    pub fn paid_at(&self) -> Option<DateTime<Utc>> {
        self.paid_at
    }

    pub fn cancellation_reason(&self) -> Option<&str> {
        self.cancellation_reason.as_deref()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

// Command methods (return events)
impl Order {
    /// Places a new order and moves it straight to waiting for payment.
    pub fn place(
        &self,
        order_id: OrderId,
        client_id: Option<ClientId>,
        lines: &[OrderLine],
    ) -> Result<Vec<OrderEvent>, OrderError> {
        if self.id.is_some() {
            return Err(OrderError::AlreadyPlaced);
        }
        let client_id = client_id.ok_or(OrderError::ClientRequired)?;
        let lines = validate_lines(lines)?;

        Ok(vec![
            OrderEvent::order_placed(order_id, client_id, lines),
            OrderEvent::payment_awaited(),
        ])
    }

    /// Records that a charge completed. Already paid orders are left as they are.
    pub fn mark_paid(&self) -> Result<Vec<OrderEvent>, OrderError> {
        if self.status == OrderStatus::Paid {
            return Ok(vec![]);
        }
        if !self.status.can_mark_paid() {
            return Err(OrderError::InvalidStateTransition {
                current_status: self.status,
                action: "mark paid",
            });
        }
        Ok(vec![OrderEvent::order_paid()])
    }

    /// Cancels the order. Cancelling twice is a no-op.
    pub fn cancel(&self, reason: impl Into<String>) -> Result<Vec<OrderEvent>, OrderError> {
        if self.status == OrderStatus::Cancelled {
            return Ok(vec![]);
        }
        if !self.status.can_cancel() {
            return Err(OrderError::InvalidStateTransition {
                current_status: self.status,
                action: "cancel",
            });
        }
        Ok(vec![OrderEvent::order_cancelled(reason)])
    }

    pub fn reassign_client(&self, client_id: ClientId) -> Result<Vec<OrderEvent>, OrderError> {
        let previous = self.client_id.ok_or(OrderError::NotPlaced)?;
        if previous == client_id {
            return Ok(vec![]);
        }
        if self.status == OrderStatus::Cancelled {
            return Err(OrderError::InvalidStateTransition {
                current_status: self.status,
                action: "reassign client",
            });
        }
        Ok(vec![OrderEvent::client_reassigned(previous, client_id)])
    }

    pub fn revise_lines(&self, lines: &[OrderLine]) -> Result<Vec<OrderEvent>, OrderError> {
        let lines = validate_lines(lines)?;
        if lines == self.lines {
            return Ok(vec![]);
        }
        if !self.status.can_revise_lines() {
            return Err(OrderError::LinesLocked {
                current_status: self.status,
            });
        }
        Ok(vec![OrderEvent::lines_revised(self.lines.clone(), lines)])
    }

    /// Applies a partial update: client first, then lines, then status.
    pub fn revise(&self, revision: &OrderRevision) -> Result<Vec<OrderEvent>, OrderError> {
        let mut scratch = self.clone();
        let mut events = Vec::new();
        let mut record = |scratch: &mut Order, new: Vec<OrderEvent>| {
            scratch.apply_events(new.iter().cloned());
            events.extend(new);
        };

        if let Some(client_id) = revision.client_id {
            let new = scratch.reassign_client(client_id)?;
            record(&mut scratch, new);
        }
        if let Some(ref lines) = revision.lines {
            let new = scratch.revise_lines(lines)?;
            record(&mut scratch, new);
        }
        if let Some(request) = revision.status {
            let new = scratch.request_status(request)?;
            record(&mut scratch, new);
        }

        Ok(events)
    }

    fn request_status(&self, request: StatusRequest) -> Result<Vec<OrderEvent>, OrderError> {
        match request.target() {
            OrderStatus::Paid => self.mark_paid(),
            OrderStatus::Cancelled => self.cancel("cancelled by update"),
            target if target == self.status => Ok(vec![]),
            _ => Err(OrderError::InvalidStateTransition {
                current_status: self.status,
                action: "move back",
            }),
        }
    }
}

fn validate_lines(lines: &[OrderLine]) -> Result<Vec<OrderLine>, OrderError> {
    if let Some(line) = lines.iter().find(|l| l.quantity == 0) {
        return Err(OrderError::InvalidQuantity {
            product_id: line.product_id,
        });
    }
    merge_lines(lines)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn placed_order() -> Order {
        let mut order = Order::default();
        let events = order
            .place(
                OrderId::new(),
                Some(ClientId::new(7)),
                &[OrderLine::new(10, 2)],
            )
            .unwrap();
        order.apply_events(events);
        order
    }

    fn apply(order: &mut Order, events: Vec<OrderEvent>) {
        order.apply_events(events);
    }

    #[test]
    fn test_place_order_waits_for_payment() {
        let order = placed_order();
        assert!(order.id().is_some());
        assert_eq!(order.status(), OrderStatus::PendingPayment);
        assert_eq!(order.client_id(), Some(ClientId::new(7)));
        assert_eq!(order.total_quantity(), 2);
    }

    #[test]
    fn test_place_requires_client() {
        let result = Order::default().place(OrderId::new(), None, &[OrderLine::new(10, 1)]);
        assert!(matches!(result, Err(OrderError::ClientRequired)));
    }

    #[test]
    fn test_place_rejects_zero_quantity() {
        let result = Order::default().place(
            OrderId::new(),
            Some(ClientId::new(1)),
            &[OrderLine::new(10, 0)],
        );
        assert!(matches!(result, Err(OrderError::InvalidQuantity { .. })));
    }

    #[test]
    fn test_place_twice_fails() {
        let order = placed_order();
        let result = order.place(OrderId::new(), Some(ClientId::new(1)), &[]);
        assert!(matches!(result, Err(OrderError::AlreadyPlaced)));
    }

    #[test]
    fn test_place_merges_duplicate_lines() {
        let mut order = Order::default();
        let events = order
            .place(
                OrderId::new(),
                Some(ClientId::new(7)),
                &[OrderLine::new(10, 1), OrderLine::new(10, 1)],
            )
            .unwrap();
        apply(&mut order, events);
        assert_eq!(order.lines(), &[OrderLine::new(10, 2)]);
    }

    #[test]
    fn test_mark_paid_is_idempotent() {
        let mut order = placed_order();
        let events = order.mark_paid().unwrap();
        assert_eq!(events.len(), 1);
        apply(&mut order, events);

        assert_eq!(order.status(), OrderStatus::Paid);
        assert!(order.paid_at().is_some());
        assert!(order.mark_paid().unwrap().is_empty());
    }

    #[test]
    fn test_cannot_pay_cancelled_order() {
        let mut order = placed_order();
        let events = order.cancel("client request").unwrap();
        apply(&mut order, events);

        assert!(matches!(
            order.mark_paid(),
            Err(OrderError::InvalidStateTransition { .. })
        ));
        assert_eq!(order.cancellation_reason(), Some("client request"));
    }

    #[test]
    fn test_cannot_cancel_paid_order() {
        let mut order = placed_order();
        let events = order.mark_paid().unwrap();
        apply(&mut order, events);

        assert!(matches!(
            order.cancel("late"),
            Err(OrderError::InvalidStateTransition { .. })
        ));
    }

    #[test]
    fn test_lines_locked_once_paid() {
        let mut order = placed_order();
        let events = order.mark_paid().unwrap();
        apply(&mut order, events);

        let result = order.revise_lines(&[OrderLine::new(10, 5)]);
        assert!(matches!(result, Err(OrderError::LinesLocked { .. })));
        assert!(order.revise_lines(&[OrderLine::new(10, 2)]).unwrap().is_empty());
    }

    #[test]
    fn test_revise_applies_client_lines_and_status() {
        let order = placed_order();
        let revision = OrderRevision {
            client_id: Some(ClientId::new(8)),
            lines: Some(vec![OrderLine::new(11, 1)]),
            status: Some(StatusRequest::Charged),
        };

        let events = order.revise(&revision).unwrap();
        let mut revised = order.clone();
        apply(&mut revised, events);

        assert_eq!(revised.client_id(), Some(ClientId::new(8)));
        assert_eq!(revised.lines(), &[OrderLine::new(11, 1)]);
        assert_eq!(revised.status(), OrderStatus::Paid);
    }

    #[test]
    fn test_revise_cannot_move_status_back() {
        let mut order = placed_order();
        let events = order.mark_paid().unwrap();
        apply(&mut order, events);

        let revision = OrderRevision {
            status: Some(StatusRequest::Set(OrderStatus::PendingPayment)),
            ..Default::default()
        };
        assert!(order.revise(&revision).is_err());
    }

    #[test]
    fn test_revise_with_nothing_changed_is_empty() {
        let order = placed_order();
        let revision = OrderRevision {
            client_id: Some(ClientId::new(7)),
            status: Some(StatusRequest::Set(OrderStatus::PendingPayment)),
            ..Default::default()
        };
        assert!(order.revise(&revision).unwrap().is_empty());
    }

    #[test]
    fn test_serialization() {
        let order = placed_order();
        let json = serde_json::to_value(&order).unwrap();
        let restored: Order = serde_json::from_value(json).unwrap();
        assert_eq!(restored.id(), order.id());
        assert_eq!(restored.lines(), order.lines());
        assert_eq!(restored.status(), order.status());
    }
}
