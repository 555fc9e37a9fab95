//! Shipment (envio) service.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::{DispatchId, ShipmentId};
use domain::{
    Aggregate, CommandHandler, DispatchScheduled, DispatchStatus, DispatchStatusChanged,
    DomainError, IntegrationEvent, RepositoryError, Shipment, ShipmentPlan,
};
use messaging::{MessageBus, MessageBusExt, MessageId};

use crate::error::{Result, SagaError};
use crate::notifier::{Notifier, ShipmentNotice};

/// Owns shipments. Releases a shipment as soon as its dispatch date has
/// arrived, notifies the customer and reports back to dispatch.
pub struct ShipmentService {
    shipments: CommandHandler<Shipment>,
    notifier: Arc<dyn Notifier>,
    bus: Arc<dyn MessageBus>,
}

impl ShipmentService {
    pub fn new(
        shipments: CommandHandler<Shipment>,
        notifier: Arc<dyn Notifier>,
        bus: Arc<dyn MessageBus>,
    ) -> Self {
        Self {
            shipments,
            notifier,
            bus,
        }
    }

    /// Prepares the shipment for a scheduled dispatch and ships it if due.
    ///
    /// A shipment still waiting takes over the date and contact of the newest
    /// schedule. A redelivered message for a shipment that already left
    /// changes nothing and announces nothing.
    #[tracing::instrument(skip(self, event), fields(dispatch_id = %event.dispatch_id, order_id = %event.order_id))]
    pub async fn on_dispatch_scheduled(
        &self,
        event: &DispatchScheduled,
        now: DateTime<Utc>,
    ) -> Result<Shipment> {
        let plan = plan_of(event);
        let shipment = match self.find(event.dispatch_id).await? {
            Some(existing) => existing,
            None => self.prepare(&plan).await?,
        };
        if shipment.status().has_left() {
            tracing::debug!("shipment already left");
            return Ok(shipment);
        }

        let result = self
            .shipments
            .execute_on(shipment, |s| s.reschedule(&plan))
            .await?;
        if !result.is_noop() {
            tracing::info!(scheduled_at = %plan.scheduled_at, "shipment rescheduled");
        }
        self.release(result.aggregate, now).await
    }

    /// Ships every prepared shipment whose date has arrived. Returns how
    /// many left.
    #[tracing::instrument(skip(self))]
    pub async fn release_due(&self, now: DateTime<Utc>) -> Result<usize> {
        let due: Vec<Shipment> = self
            .shipments
            .repository()
            .list()
            .await?
            .into_iter()
            .filter(|s| s.is_due(now))
            .collect();

        let mut shipped = 0;
        for shipment in due {
            let id = shipment.id();
            match self.release(shipment, now).await {
                Ok(s) if s.status().has_left() => shipped += 1,
                Ok(_) => {}
                Err(error) => tracing::warn!(shipment_id = ?id, %error, "releasing shipment failed"),
            }
        }
        if shipped > 0 {
            tracing::info!(shipped, "due shipments released");
        }
        Ok(shipped)
    }

    /// Records delivery. Informational only, nothing is announced.
    #[tracing::instrument(skip(self))]
    pub async fn mark_delivered(&self, id: ShipmentId) -> Result<Shipment> {
        let result = self.shipments.execute(id, |s| s.deliver(Utc::now())).await?;
        Ok(result.aggregate)
    }

    pub async fn get(&self, id: ShipmentId) -> Result<Shipment> {
        Ok(self.shipments.load_existing(id).await?)
    }

    pub async fn find_by_dispatch(&self, dispatch_id: DispatchId) -> Result<Shipment> {
        self.find(dispatch_id)
            .await?
            .ok_or_else(|| SagaError::not_found("Shipment", format!("for dispatch {dispatch_id}")))
    }

    async fn find(&self, dispatch_id: DispatchId) -> Result<Option<Shipment>> {
        Ok(self
            .shipments
            .find_by_unique_key(&Shipment::dispatch_key(dispatch_id))
            .await?)
    }

    async fn prepare(&self, plan: &ShipmentPlan) -> Result<Shipment> {
        let shipment_id = ShipmentId::new();
        match self.shipments.create(|s| s.prepare(shipment_id, plan)).await {
            Ok(result) => {
                tracing::info!(%shipment_id, "shipment prepared");
                Ok(result.aggregate)
            }
            Err(DomainError::Repository(RepositoryError::UniqueViolation { .. })) => {
                self.find(plan.dispatch_id).await?.ok_or_else(|| {
                    SagaError::StaleWrite(format!(
                        "shipment for dispatch {} vanished",
                        plan.dispatch_id
                    ))
                })
            }
            Err(error) => Err(error.into()),
        }
    }

    /// Ships a prepared shipment if due, reports back to dispatch and
    /// notifies the customer. A shipment that is not due yet stays preparing.
    ///
    /// The report is published before the shipment is recorded as shipped
    /// and carries the shipment id as its message id, so a retry after a
    /// failed write republishes the same message and consumers drop it.
    async fn release(&self, shipment: Shipment, now: DateTime<Utc>) -> Result<Shipment> {
        if !shipment.is_due(now) {
            tracing::info!(scheduled_at = ?shipment.scheduled_at(), "shipment not due yet");
            return Ok(shipment);
        }
        if shipment.ship(now)?.is_empty() {
            return Ok(shipment);
        }

        let (Some(shipment_id), Some(dispatch_id), Some(order_id)) =
            (shipment.id(), shipment.dispatch_id(), shipment.order_id())
        else {
            return Err(SagaError::Internal("prepared shipment is incomplete".to_string()));
        };

        let mut envelope = IntegrationEvent::DispatchStatusChanged(DispatchStatusChanged {
            dispatch_id,
            status: DispatchStatus::Shipped,
            shipped_at: now,
        })
        .to_envelope(order_id)?;
        envelope.message_id = MessageId::from_uuid(shipment_id.as_uuid());
        self.bus.publish(envelope).await?;

        let shipment = self
            .shipments
            .execute_on(shipment, |s| s.ship(now))
            .await?
            .aggregate;

        self.notifier
            .shipment_sent(&ShipmentNotice {
                order_id,
                recipient: shipment.contact_email().to_string(),
                shipped_at: now,
                status: shipment.status(),
                delivery_address: shipment.delivery_address().to_string(),
            })
            .await;

        metrics::counter!("shipments_shipped_total").increment(1);
        tracing::info!(%shipment_id, %dispatch_id, %order_id, "shipment shipped");
        Ok(shipment)
    }
}

fn plan_of(event: &DispatchScheduled) -> ShipmentPlan {
    ShipmentPlan {
        dispatch_id: event.dispatch_id,
        order_id: event.order_id,
        delivery_address: event.delivery_address.clone(),
        contact_email: event.contact_email.clone(),
        scheduled_at: event.scheduled_at,
    }
}
