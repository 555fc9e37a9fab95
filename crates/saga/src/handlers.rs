//! Message handlers: decode an envelope and hand it to its service.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use domain::{IntegrationEvent, OrderStatus};
use messaging::Envelope;

use crate::error::{Result, SagaError};
use crate::services::{DispatchService, InMemoryInventory, OrderService, ShipmentService};

/// Handles one message. Errors are classified by [`SagaError::disposition`].
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, envelope: &Envelope) -> Result<()>;
}

fn unexpected(consumer: &str, event: &IntegrationEvent) -> SagaError {
    SagaError::InvalidArgument(format!(
        "{consumer} does not handle {}",
        event.event_type()
    ))
}

/// Order consumer: payment confirmations in either wiring.
pub struct OrderHandler(pub Arc<OrderService>);

#[async_trait]
impl MessageHandler for OrderHandler {
    async fn handle(&self, envelope: &Envelope) -> Result<()> {
        match IntegrationEvent::from_envelope(envelope)? {
            IntegrationEvent::OrderStatusChanged(e) if e.status == OrderStatus::Paid => {
                self.0.on_payment_completed(e.order_id).await?;
            }
            IntegrationEvent::OrderStatusChanged(e) => {
                tracing::debug!(order_id = %e.order_id, status = %e.status, "status change ignored");
            }
            IntegrationEvent::PaymentReady(e) => {
                self.0.on_payment_completed(e.order_id).await?;
            }
            other => return Err(unexpected("orders", &other)),
        }
        Ok(())
    }
}

/// Dispatch consumer: order creation, payment readiness and shipment reports.
pub struct DispatchHandler(pub Arc<DispatchService>);

#[async_trait]
impl MessageHandler for DispatchHandler {
    async fn handle(&self, envelope: &Envelope) -> Result<()> {
        match IntegrationEvent::from_envelope(envelope)? {
            IntegrationEvent::OrderCreated(e) => {
                self.0.on_order_created(&e).await?;
            }
            IntegrationEvent::PaymentReady(e) => {
                self.0.on_payment_ready(&e).await?;
            }
            IntegrationEvent::DispatchStatusChanged(e) => {
                self.0.on_shipment_confirmed(&e).await?;
            }
            other => return Err(unexpected("dispatches", &other)),
        }
        Ok(())
    }
}

/// Shipment consumer: scheduled dispatches.
pub struct ShipmentHandler(pub Arc<ShipmentService>);

#[async_trait]
impl MessageHandler for ShipmentHandler {
    async fn handle(&self, envelope: &Envelope) -> Result<()> {
        match IntegrationEvent::from_envelope(envelope)? {
            IntegrationEvent::DispatchScheduled(e) => {
                self.0.on_dispatch_scheduled(&e, Utc::now()).await?;
            }
            other => return Err(unexpected("shipments", &other)),
        }
        Ok(())
    }
}

/// Inventory consumer. Stock moves only on adjustments; order creation is
/// recorded for audit.
pub struct InventoryHandler(pub InMemoryInventory);

#[async_trait]
impl MessageHandler for InventoryHandler {
    async fn handle(&self, envelope: &Envelope) -> Result<()> {
        match IntegrationEvent::from_envelope(envelope)? {
            IntegrationEvent::StockAdjustment(e) => {
                self.0.apply_adjustment(envelope.message_id, &e).await?;
            }
            IntegrationEvent::OrderCreated(e) => {
                tracing::debug!(order_id = %e.order_id, "order created, awaiting stock adjustment");
            }
            other => return Err(unexpected("inventory", &other)),
        }
        Ok(())
    }
}
