//! Shipment aggregate implementation.

use chrono::{DateTime, Utc};
use common::{DispatchId, OrderId, ShipmentId};
use serde::{Deserialize, Serialize};

use crate::aggregate::Aggregate;
use crate::repository::Version;

use super::{
    ShipmentError, ShipmentEvent, ShipmentStatus,
    events::{
        ShipmentDeliveredData, ShipmentPreparedData, ShipmentRescheduledData, ShipmentShippedData,
    },
};

/// What a shipment is created from: the scheduled dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct ShipmentPlan {
    pub dispatch_id: DispatchId,
    pub order_id: OrderId,
    pub delivery_address: String,
    pub contact_email: String,
    pub scheduled_at: DateTime<Utc>,
}

/// Shipment aggregate root. One per dispatch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Shipment {
    id: Option<ShipmentId>,

    #[serde(default)]
    version: Version,

    dispatch_id: Option<DispatchId>,

    order_id: Option<OrderId>,

    status: ShipmentStatus,

    delivery_address: String,

    contact_email: String,

    scheduled_at: Option<DateTime<Utc>>,

    prepared_at: Option<DateTime<Utc>>,

    shipped_at: Option<DateTime<Utc>>,

    delivered_at: Option<DateTime<Utc>>,
}

impl Aggregate for Shipment {
    type Id = ShipmentId;
    type Event = ShipmentEvent;
    type Error = ShipmentError;

    fn aggregate_type() -> &'static str {
        "Shipment"
    }

    fn id(&self) -> Option<ShipmentId> {
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
            ShipmentEvent::ShipmentPrepared(data) => {
                self.id = Some(data.shipment_id);
                self.dispatch_id = Some(data.dispatch_id);
                self.order_id = Some(data.order_id);
                self.delivery_address = data.delivery_address;
                self.contact_email = data.contact_email;
                self.scheduled_at = Some(data.scheduled_at);
                self.prepared_at = Some(data.prepared_at);
                self.status = ShipmentStatus::Preparing;
            }
            ShipmentEvent::ShipmentRescheduled(data) => {
                self.delivery_address = data.delivery_address;
                self.contact_email = data.contact_email;
                self.scheduled_at = Some(data.scheduled_at);
            }
            ShipmentEvent::ShipmentShipped(data) => {
                self.status = ShipmentStatus::Shipped;
                self.shipped_at = Some(data.shipped_at);
            }
            ShipmentEvent::ShipmentDelivered(data) => {
                self.status = ShipmentStatus::Delivered;
                self.delivered_at = Some(data.delivered_at);
            }
        }
    }

    fn unique_key(&self) -> Option<String> {
        self.dispatch_id.map(Self::dispatch_key)
    }
}

// Query methods
impl Shipment {
    /// Unique key a shipment holds for its dispatch.
    pub fn dispatch_key(dispatch_id: DispatchId) -> String {
        format!("dispatch:{dispatch_id}")
    }

    pub fn dispatch_id(&self) -> Option<DispatchId> {
        self.dispatch_id
    }

    pub fn order_id(&self) -> Option<OrderId> {
        self.order_id
    }

    pub fn status(&self) -> ShipmentStatus {
        self.status
    }

    pub fn delivery_address(&self) -> &str {
        &self.delivery_address
    }

    pub fn contact_email(&self) -> &str {
        &self.contact_email
    }

    pub fn scheduled_at(&self) -> Option<DateTime<Utc>> {
        self.scheduled_at
    }

    pub fn shipped_at(&self) -> Option<DateTime<Utc>> {
        self.shipped_at
    }

    pub fn delivered_at(&self) -> Option<DateTime<Utc>> {
        self.delivered_at
    }

    /// Returns true if the shipment is waiting and its dispatch date has arrived.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status.can_ship() && self.scheduled_at.is_some_and(|at| at <= now)
    }
}

// Command methods (return events)
impl Shipment {
    pub fn prepare(
        &self,
        shipment_id: ShipmentId,
        plan: &ShipmentPlan,
    ) -> Result<Vec<ShipmentEvent>, ShipmentError> {
        if self.id.is_some() {
            return Err(ShipmentError::AlreadyPrepared);
        }
        Ok(vec![ShipmentEvent::ShipmentPrepared(ShipmentPreparedData {
            shipment_id,
            dispatch_id: plan.dispatch_id,
            order_id: plan.order_id,
            delivery_address: plan.delivery_address.clone(),
            contact_email: plan.contact_email.clone(),
            scheduled_at: plan.scheduled_at,
            prepared_at: Utc::now(),
        })])
    }

    /// Takes over a newer plan for a shipment that is still waiting. A plan
    /// identical to the current one, or a shipment that already left, yields
    /// nothing.
    pub fn reschedule(&self, plan: &ShipmentPlan) -> Result<Vec<ShipmentEvent>, ShipmentError> {
        let Some(dispatch_id) = self.dispatch_id else {
            return Err(ShipmentError::InvalidStateTransition {
                current_status: self.status,
                action: "reschedule",
            });
        };
        if dispatch_id != plan.dispatch_id {
            return Err(ShipmentError::DispatchMismatch {
                expected: dispatch_id,
                actual: plan.dispatch_id,
            });
        }
        if self.status.has_left() {
            return Ok(vec![]);
        }
        if self.scheduled_at == Some(plan.scheduled_at)
            && self.delivery_address == plan.delivery_address
            && self.contact_email == plan.contact_email
        {
            return Ok(vec![]);
        }
        Ok(vec![ShipmentEvent::ShipmentRescheduled(ShipmentRescheduledData {
            delivery_address: plan.delivery_address.clone(),
            contact_email: plan.contact_email.clone(),
            scheduled_at: plan.scheduled_at,
            previous_scheduled_at: self.scheduled_at,
        })])
    }

    /// Releases the shipment. Already released shipments are left as they are.
    pub fn ship(&self, now: DateTime<Utc>) -> Result<Vec<ShipmentEvent>, ShipmentError> {
        if self.status.has_left() {
            return Ok(vec![]);
        }
        if !self.is_due(now) {
            return Err(ShipmentError::NotDue {
                scheduled_at: self.scheduled_at.unwrap_or(now),
            });
        }
        Ok(vec![ShipmentEvent::ShipmentShipped(ShipmentShippedData {
            shipped_at: now,
        })])
    }

    pub fn deliver(&self, now: DateTime<Utc>) -> Result<Vec<ShipmentEvent>, ShipmentError> {
        if self.status == ShipmentStatus::Delivered {
            return Ok(vec![]);
        }
        if !self.status.can_deliver() {
            return Err(ShipmentError::InvalidStateTransition {
                current_status: self.status,
                action: "deliver",
            });
        }
        Ok(vec![ShipmentEvent::ShipmentDelivered(ShipmentDeliveredData {
            delivered_at: now,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn plan(scheduled_at: DateTime<Utc>) -> ShipmentPlan {
        ShipmentPlan {
            dispatch_id: DispatchId::new(),
            order_id: OrderId::new(),
            delivery_address: "123 Main St".to_string(),
            contact_email: "ana@example.com".to_string(),
            scheduled_at,
        }
    }

    fn prepared(scheduled_at: DateTime<Utc>) -> Shipment {
        let mut shipment = Shipment::default();
        let events = shipment.prepare(ShipmentId::new(), &plan(scheduled_at)).unwrap();
        shipment.apply_events(events);
        shipment
    }

    fn plan_for(shipment: &Shipment, scheduled_at: DateTime<Utc>) -> ShipmentPlan {
        ShipmentPlan {
            dispatch_id: shipment.dispatch_id().unwrap(),
            order_id: shipment.order_id().unwrap(),
            delivery_address: shipment.delivery_address().to_string(),
            contact_email: shipment.contact_email().to_string(),
            scheduled_at,
        }
    }

    #[test]
    fn test_reschedule_moves_waiting_shipment() {
        let now = Utc::now();
        let mut shipment = prepared(now + Duration::days(3));
        assert!(!shipment.is_due(now));

        let mut earlier = plan_for(&shipment, now - Duration::minutes(1));
        earlier.contact_email = "ops@example.com".to_string();
        let events = shipment.reschedule(&earlier).unwrap();
        shipment.apply_events(events);

        assert!(shipment.is_due(now));
        assert_eq!(shipment.contact_email(), "ops@example.com");
        assert!(shipment.reschedule(&earlier).unwrap().is_empty());
    }

    #[test]
    fn test_reschedule_after_shipping_is_noop() {
        let now = Utc::now();
        let mut shipment = prepared(now);
        let events = shipment.ship(now).unwrap();
        shipment.apply_events(events);

        let later = plan_for(&shipment, now + Duration::days(1));
        assert!(shipment.reschedule(&later).unwrap().is_empty());
        assert_eq!(shipment.scheduled_at(), Some(now));
    }

    #[test]
    fn test_reschedule_rejects_other_dispatch() {
        let shipment = prepared(Utc::now());
        let other = plan(Utc::now());
        assert!(matches!(
            shipment.reschedule(&other),
            Err(ShipmentError::DispatchMismatch { .. })
        ));
    }

    #[test]
    fn test_prepare_starts_preparing() {
        let shipment = prepared(Utc::now());
        assert_eq!(shipment.status(), ShipmentStatus::Preparing);
        assert_eq!(shipment.contact_email(), "ana@example.com");
        assert!(shipment.unique_key().unwrap().starts_with("dispatch:"));
    }

    #[test]
    fn test_due_shipment_ships() {
        let now = Utc::now();
        let mut shipment = prepared(now - Duration::minutes(1));
        assert!(shipment.is_due(now));

        let events = shipment.ship(now).unwrap();
        shipment.apply_events(events);

        assert_eq!(shipment.status(), ShipmentStatus::Shipped);
        assert_eq!(shipment.shipped_at(), Some(now));
        assert!(!shipment.is_due(now));
    }

    #[test]
    fn test_future_shipment_is_not_due() {
        let now = Utc::now();
        let shipment = prepared(now + Duration::days(1));
        assert!(!shipment.is_due(now));
        assert!(matches!(shipment.ship(now), Err(ShipmentError::NotDue { .. })));
    }

    #[test]
    fn test_ship_twice_is_noop() {
        let now = Utc::now();
        let mut shipment = prepared(now);
        let events = shipment.ship(now).unwrap();
        shipment.apply_events(events);

        assert!(shipment.ship(now).unwrap().is_empty());
    }

    #[test]
    fn test_deliver_requires_shipped() {
        let now = Utc::now();
        let mut shipment = prepared(now);
        assert!(shipment.deliver(now).is_err());

        let events = shipment.ship(now).unwrap();
        shipment.apply_events(events);
        let events = shipment.deliver(now).unwrap();
        shipment.apply_events(events);

        assert_eq!(shipment.status(), ShipmentStatus::Delivered);
        assert!(shipment.deliver(now).unwrap().is_empty());
    }
}
