//! Dispatch (despacho) service: the hub between payment and shipment.

use std::sync::Arc;

use common::{DispatchId, OrderId};
use domain::{
    Aggregate, CommandHandler, CommandResult, Dispatch, DispatchError, DispatchEvent,
    DispatchScheduled, DispatchStatus, DispatchStatusChanged, DomainError, IntegrationEvent,
    OrderCreated, PaymentReady, RepositoryError, ScheduleRequest,
};
use messaging::{MessageBus, MessageId};

use super::announce_once;
use crate::collaborators::{ClientDirectory, CollaboratorError, OrderLookup};
use crate::error::{Result, SagaError};
use crate::outbound::OutboundPolicy;

/// Used when the client has no contact email on file.
pub const UNSPECIFIED_CONTACT: &str = "contact not specified";

/// Owns dispatches. Exactly one per order, created by whichever of the
/// order-created or payment-ready messages arrives first.
pub struct DispatchService {
    dispatches: CommandHandler<Dispatch>,
    orders: Arc<dyn OrderLookup>,
    clients: Arc<dyn ClientDirectory>,
    bus: Arc<dyn MessageBus>,
    policy: OutboundPolicy,
}

impl DispatchService {
    pub fn new(
        dispatches: CommandHandler<Dispatch>,
        orders: Arc<dyn OrderLookup>,
        clients: Arc<dyn ClientDirectory>,
        bus: Arc<dyn MessageBus>,
        policy: OutboundPolicy,
    ) -> Self {
        Self {
            dispatches,
            orders,
            clients,
            bus,
            policy,
        }
    }

    /// Opens a pending dispatch for a new order. Replays leave the existing
    /// dispatch untouched.
    #[tracing::instrument(skip(self, event), fields(order_id = %event.order_id))]
    pub async fn on_order_created(&self, event: &OrderCreated) -> Result<Dispatch> {
        let result = self.upsert(event.order_id, |_| Ok(vec![])).await?;
        Ok(result.aggregate)
    }

    /// Records the payment and moves the dispatch to ready-to-ship, creating
    /// the dispatch if the order-created message has not arrived yet.
    #[tracing::instrument(skip(self, event), fields(order_id = %event.order_id))]
    pub async fn on_payment_ready(&self, event: &PaymentReady) -> Result<Dispatch> {
        let result = self
            .upsert(event.order_id, |d| {
                d.record_payment(&event.delivery_address, event.shipping_cost, event.total_amount)
            })
            .await?;
        if !result.is_noop() {
            tracing::info!(
                order_id = %event.order_id,
                shipping_cost = %result.aggregate.shipping_cost(),
                status = %result.aggregate.status(),
                "payment recorded on dispatch"
            );
        }
        Ok(result.aggregate)
    }

    /// Explicit creation. Returns the existing dispatch if the order has one.
    #[tracing::instrument(skip(self))]
    pub async fn create(&self, order_id: OrderId) -> Result<Dispatch> {
        self.policy
            .call("orders", || self.orders.get_order(order_id))
            .await?;
        let result = self.upsert(order_id, |_| Ok(vec![])).await?;
        Ok(result.aggregate)
    }

    /// Applies a partial update.
    ///
    /// Setting a new dispatch date announces the dispatch to shipment with the
    /// client's contact email before the date is recorded. The announcement
    /// is identified by dispatch and date, so retrying a schedule whose write
    /// failed announces the same message again and shipment drops it.
    #[tracing::instrument(skip(self, request), fields(dispatch_id = %id))]
    pub async fn schedule(&self, id: DispatchId, request: ScheduleRequest) -> Result<Dispatch> {
        let dispatch = self.dispatches.load_existing(id).await?;
        let order_id = dispatch
            .order_id()
            .ok_or_else(|| SagaError::Internal(format!("dispatch {id} has no order")))?;

        let changes = dispatch.schedule(&request)?;
        let newly_scheduled = changes
            .iter()
            .any(|e| matches!(e, DispatchEvent::DispatchScheduled(_)));
        let mut planned = dispatch.clone();
        planned.apply_events(changes);

        let mut announced_for = None;
        if newly_scheduled {
            let contact_email = self.contact_email(order_id).await?;
            let scheduled_at = planned
                .scheduled_at()
                .ok_or_else(|| SagaError::Internal(format!("dispatch {id} lost its date")))?;
            let event = IntegrationEvent::DispatchScheduled(DispatchScheduled {
                dispatch_id: id,
                order_id,
                delivery_address: planned.delivery_address().unwrap_or_default().to_string(),
                contact_email,
                scheduled_at,
            });
            let message_id = MessageId::derived(
                id.as_uuid(),
                &format!("dispatch-scheduled:{}", scheduled_at.to_rfc3339()),
            );
            announce_once(self.bus.as_ref(), order_id, event, message_id).await?;
            announced_for = Some(scheduled_at);
        }

        // The shipment may already have reported back by the time the date
        // is written; a shipped dispatch keeps its state.
        let result = self
            .dispatches
            .execute_on_latest(dispatch, |d| {
                if d.status().is_terminal() {
                    Ok(vec![])
                } else {
                    d.schedule(&request)
                }
            })
            .await?;

        if let Some(scheduled_at) = announced_for {
            metrics::counter!("dispatches_scheduled_total").increment(1);
            tracing::info!(dispatch_id = %id, %order_id, %scheduled_at, "dispatch scheduled");
        }
        Ok(result.aggregate)
    }

    /// Marks the dispatch shipped once its shipment has left.
    #[tracing::instrument(skip(self, event), fields(dispatch_id = %event.dispatch_id))]
    pub async fn on_shipment_confirmed(&self, event: &DispatchStatusChanged) -> Result<Dispatch> {
        if event.status != DispatchStatus::Shipped {
            tracing::debug!(status = %event.status, "ignoring non-shipping status change");
            return self.get(event.dispatch_id).await;
        }
        let result = self
            .dispatches
            .execute(event.dispatch_id, |d| d.confirm_shipment(event.shipped_at))
            .await?;
        if !result.is_noop() {
            tracing::info!(dispatch_id = %event.dispatch_id, "dispatch shipped");
        }
        Ok(result.aggregate)
    }

    pub async fn get(&self, id: DispatchId) -> Result<Dispatch> {
        Ok(self.dispatches.load_existing(id).await?)
    }

    pub async fn get_by_order(&self, order_id: OrderId) -> Result<Dispatch> {
        self.dispatches
            .find_by_unique_key(&Dispatch::order_key(order_id))
            .await?
            .ok_or_else(|| SagaError::not_found("Dispatch", format!("for order {order_id}")))
    }

    pub async fn list(&self) -> Result<Vec<Dispatch>> {
        Ok(self.dispatches.repository().list().await?)
    }

    pub async fn list_by_status(&self, status: DispatchStatus) -> Result<Vec<Dispatch>> {
        let mut dispatches = self.list().await?;
        dispatches.retain(|d| d.status() == status);
        Ok(dispatches)
    }

    /// Runs `command` on the order's dispatch, opening the dispatch first if
    /// there is none. A concurrent opener wins the order key; the loser
    /// reloads and applies its command as an update.
    async fn upsert<F>(&self, order_id: OrderId, command: F) -> Result<CommandResult<Dispatch>>
    where
        F: Fn(&Dispatch) -> std::result::Result<Vec<DispatchEvent>, DispatchError>,
    {
        let key = Dispatch::order_key(order_id);
        for _ in 0..2 {
            if let Some(existing) = self.dispatches.find_by_unique_key(&key).await? {
                return Ok(self.dispatches.execute_on(existing, &command).await?);
            }

            let dispatch_id = DispatchId::new();
            let created = self
                .dispatches
                .create(|d| {
                    let mut opened = d.clone();
                    let mut events = opened.open(dispatch_id, order_id)?;
                    opened.apply_events(events.iter().cloned());
                    events.extend(command(&opened)?);
                    Ok(events)
                })
                .await;

            match created {
                Ok(result) => {
                    metrics::counter!("dispatches_created_total").increment(1);
                    tracing::info!(%order_id, %dispatch_id, status = %result.aggregate.status(), "dispatch created");
                    return Ok(result);
                }
                Err(DomainError::Repository(RepositoryError::UniqueViolation { .. })) => {
                    tracing::debug!(%order_id, "dispatch opened concurrently, retrying as update");
                }
                Err(error) => return Err(error.into()),
            }
        }
        Err(SagaError::StaleWrite(format!(
            "dispatch for order {order_id} kept changing"
        )))
    }

    async fn contact_email(&self, order_id: OrderId) -> Result<String> {
        let order = self
            .policy
            .call("orders", || self.orders.get_order(order_id))
            .await?;
        let email = match self
            .policy
            .call("clients", || self.clients.get_client(order.client_id))
            .await
        {
            Ok(client) => client.contact_email.filter(|e| !e.trim().is_empty()),
            Err(CollaboratorError::NotFound { .. }) => None,
            Err(error) => return Err(error.into()),
        };
        Ok(email.unwrap_or_else(|| UNSPECIFIED_CONTACT.to_string()))
    }
}
