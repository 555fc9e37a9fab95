//! Queues and their bindings. One queue per consumer and event type.

use domain::routing;
use messaging::MessageBus;

use crate::error::Result;

pub const DISPATCH_ORDER_CREATED: &str = "dispatch.order-created";
pub const DISPATCH_PAYMENT_READY: &str = "dispatch.payment-ready";
pub const DISPATCH_STATUS_CHANGED: &str = "dispatch.status-changed";
pub const INVENTORY_ORDER_CREATED: &str = "inventory.order-created";
pub const INVENTORY_STOCK_ADJUSTMENT: &str = "inventory.stock-adjustment";
pub const ORDER_STATUS_CHANGED: &str = "order.status-changed";
pub const ORDER_PAYMENT_READY: &str = "order.payment-ready";
pub const SHIPMENT_DISPATCH_SCHEDULED: &str = "shipment.dispatch-scheduled";

/// `(queue, routing key)` pairs.
pub const BINDINGS: &[(&str, &str)] = &[
    (DISPATCH_ORDER_CREATED, routing::ORDER_CREATED),
    (INVENTORY_ORDER_CREATED, routing::ORDER_CREATED),
    (INVENTORY_STOCK_ADJUSTMENT, routing::STOCK_ADJUSTMENT),
    (ORDER_STATUS_CHANGED, routing::ORDER_STATUS_CHANGED),
    (ORDER_PAYMENT_READY, routing::PAYMENT_READY),
    (DISPATCH_PAYMENT_READY, routing::PAYMENT_READY),
    (SHIPMENT_DISPATCH_SCHEDULED, routing::DISPATCH_SCHEDULED),
    (DISPATCH_STATUS_CHANGED, routing::DISPATCH_STATUS_CHANGED),
];

/// Declares every queue. Safe to run more than once.
pub async fn declare(bus: &dyn MessageBus) -> Result<()> {
    for &(queue, routing_key) in BINDINGS {
        bus.declare_queue(queue, &[routing_key]).await?;
    }
    tracing::debug!(queues = BINDINGS.len(), "topology declared");
    Ok(())
}
