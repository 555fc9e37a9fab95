//! One service per state machine, plus the inventory leaf.
//!
//! Services follow one rule for side effects: look everything up first, then
//! announce on the bus, then record the local change. An announcement that a
//! retry may repeat carries a message id derived from its entity, so a write
//! that fails after a successful publish is retried without a second effect
//! downstream.

pub mod dispatch;
pub mod inventory;
pub mod order;
pub mod payment;
pub mod shipment;

pub use dispatch::DispatchService;
pub use inventory::InMemoryInventory;
pub use order::OrderService;
pub use payment::{ChargeRequest, GatewayError, PaymentGateway, PaymentService, SimulatedGateway};
pub use shipment::ShipmentService;

use common::OrderId;
use domain::IntegrationEvent;
use messaging::{MessageBus, MessageId};

use crate::error::Result;

/// Publishes events correlated to one order as a single batch.
pub(crate) async fn announce(
    bus: &dyn MessageBus,
    order_id: OrderId,
    events: &[IntegrationEvent],
) -> Result<()> {
    let envelopes = events
        .iter()
        .map(|event| event.to_envelope(order_id))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    bus.publish_batch(envelopes).await?;
    tracing::debug!(%order_id, count = events.len(), "events published");
    Ok(())
}

/// Publishes one event under a caller-chosen message id.
pub(crate) async fn announce_once(
    bus: &dyn MessageBus,
    order_id: OrderId,
    event: IntegrationEvent,
    message_id: MessageId,
) -> Result<()> {
    let mut envelope = event.to_envelope(order_id)?;
    envelope.message_id = message_id;
    bus.publish_batch(vec![envelope]).await?;
    tracing::debug!(%order_id, %message_id, "event published");
    Ok(())
}
