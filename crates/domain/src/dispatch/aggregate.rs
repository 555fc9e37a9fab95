//! Dispatch aggregate implementation.

use chrono::{DateTime, Utc};
use common::{DispatchId, Money, OrderId};
use serde::{Deserialize, Serialize};

use crate::aggregate::Aggregate;
use crate::repository::Version;

use super::{
    DispatchError, DispatchEvent, DispatchStatus,
    events::{
        AddressChangedData, DispatchOpenedData, DispatchScheduledData, DispatchShippedData,
        PaymentRecordedData, StatusAdvancedData,
    },
};

/// Partial update of a dispatch. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScheduleRequest {
    pub scheduled_at: Option<DateTime<Utc>>,
    pub status: Option<DispatchStatus>,
    pub delivery_address: Option<String>,
}

/// Dispatch aggregate root.
///
/// There is exactly one dispatch per order, whichever of the order-created
/// or payment-ready messages arrives first creates it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Dispatch {
    id: Option<DispatchId>,

    #[serde(default)]
    version: Version,

    order_id: Option<OrderId>,

    status: DispatchStatus,

    delivery_address: Option<String>,

    shipping_cost: Money,

    total_amount: Option<Money>,

    scheduled_at: Option<DateTime<Utc>>,

    shipped_at: Option<DateTime<Utc>>,

    opened_at: Option<DateTime<Utc>>,
}

impl Aggregate for Dispatch {
    type Id = DispatchId;
    type Event = DispatchEvent;
    type Error = DispatchError;

    fn aggregate_type() -> &'static str {
        "Dispatch"
    }

    fn id(&self) -> Option<DispatchId> {
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
            DispatchEvent::DispatchOpened(data) => {
                self.id = Some(data.dispatch_id);
                self.order_id = Some(data.order_id);
                self.opened_at = Some(data.opened_at);
                self.status = DispatchStatus::Pending;
            }
            DispatchEvent::PaymentRecorded(data) => {
                self.delivery_address = Some(data.delivery_address);
                self.shipping_cost = data.shipping_cost;
                if data.total_amount.is_some() {
                    self.total_amount = data.total_amount;
                }
                self.status = self.status.max(DispatchStatus::ReadyToShip);
            }
            DispatchEvent::AddressChanged(data) => {
                self.delivery_address = Some(data.delivery_address);
            }
            DispatchEvent::DispatchScheduled(data) => {
                self.scheduled_at = Some(data.scheduled_at);
                self.status = self.status.max(DispatchStatus::Scheduled);
            }
            DispatchEvent::StatusAdvanced(data) => {
                self.status = self.status.max(data.to);
            }
            DispatchEvent::DispatchShipped(data) => {
                self.status = DispatchStatus::Shipped;
                self.shipped_at = Some(data.shipped_at);
            }
        }
    }

    fn unique_key(&self) -> Option<String> {
        self.order_id.map(Self::order_key)
    }
}

// Query methods
impl Dispatch {
    /// Unique key a dispatch holds for its order.
    pub fn order_key(order_id: OrderId) -> String {
        format!("order:{order_id}")
    }

    pub fn order_id(&self) -> Option<OrderId> {
        self.order_id
    }

    pub fn status(&self) -> DispatchStatus {
        self.status
    }

    pub fn delivery_address(&self) -> Option<&str> {
        self.delivery_address.as_deref()
    }

    pub fn shipping_cost(&self) -> Money {
        self.shipping_cost
    }

    pub fn total_amount(&self) -> Option<Money> {
        self.total_amount
    }

    pub fn scheduled_at(&self) -> Option<DateTime<Utc>> {
        self.scheduled_at
    }

    pub fn shipped_at(&self) -> Option<DateTime<Utc>> {
        self.shipped_at
    }

    pub fn opened_at(&self) -> Option<DateTime<Utc>> {
        self.opened_at
    }
}

// Command methods (return events)
impl Dispatch {
    pub fn open(
        &self,
        dispatch_id: DispatchId,
        order_id: OrderId,
    ) -> Result<Vec<DispatchEvent>, DispatchError> {
        if self.id.is_some() {
            return Err(DispatchError::AlreadyOpened);
        }
        Ok(vec![DispatchEvent::DispatchOpened(DispatchOpenedData {
            dispatch_id,
            order_id,
            opened_at: Utc::now(),
        })])
    }

    /// Records payment data and moves the dispatch to ready-to-ship.
    ///
    /// Once scheduled or shipped the dispatch keeps its state: a late or
    /// redelivered payment message never moves it back.
    pub fn record_payment(
        &self,
        delivery_address: &str,
        shipping_cost: Money,
        total_amount: Option<Money>,
    ) -> Result<Vec<DispatchEvent>, DispatchError> {
        if !self.status.accepts_payment() {
            return Ok(vec![]);
        }
        let unchanged = self.status == DispatchStatus::ReadyToShip
            && self.delivery_address.as_deref() == Some(delivery_address)
            && self.shipping_cost == shipping_cost
            && (total_amount.is_none() || total_amount == self.total_amount);
        if unchanged {
            return Ok(vec![]);
        }

        Ok(vec![DispatchEvent::PaymentRecorded(PaymentRecordedData {
            delivery_address: delivery_address.to_string(),
            shipping_cost,
            total_amount,
            recorded_at: Utc::now(),
        })])
    }

    /// Applies a partial update: address, then dispatch date, then status.
    pub fn schedule(&self, request: &ScheduleRequest) -> Result<Vec<DispatchEvent>, DispatchError> {
        if self.status.is_terminal() {
            return Err(DispatchError::AlreadyShipped);
        }

        let mut events = Vec::new();
        let mut status = self.status;
        let mut scheduled_at = self.scheduled_at;

        if let Some(ref address) = request.delivery_address {
            if address.trim().is_empty() {
                return Err(DispatchError::EmptyAddress);
            }
            if self.delivery_address.as_deref() != Some(address.as_str()) {
                events.push(DispatchEvent::AddressChanged(AddressChangedData {
                    delivery_address: address.clone(),
                }));
            }
        }

        if let Some(at) = request.scheduled_at
            && scheduled_at != Some(at)
        {
            if !self.status.can_schedule() {
                return Err(DispatchError::NotPaid);
            }
            events.push(DispatchEvent::DispatchScheduled(DispatchScheduledData {
                scheduled_at: at,
            }));
            scheduled_at = Some(at);
            status = status.max(DispatchStatus::Scheduled);
        }

        if let Some(target) = request.status
            && target != status
        {
            if target < status {
                return Err(DispatchError::StatusRegression {
                    from: status,
                    to: target,
                });
            }
            match target {
                DispatchStatus::ReadyToShip => return Err(DispatchError::NotPaid),
                DispatchStatus::Scheduled if scheduled_at.is_none() => {
                    return Err(DispatchError::ScheduleRequired);
                }
                DispatchStatus::Shipped => {
                    return Err(DispatchError::InvalidStateTransition {
                        current_status: status,
                        action: "mark shipped without a shipment",
                    });
                }
                _ => events.push(DispatchEvent::StatusAdvanced(StatusAdvancedData {
                    from: status,
                    to: target,
                })),
            }
        }

        Ok(events)
    }

    /// Marks the dispatch shipped. Repeated confirmations are no-ops.
    pub fn confirm_shipment(&self, shipped_at: DateTime<Utc>) -> Result<Vec<DispatchEvent>, DispatchError> {
        if self.status == DispatchStatus::Shipped {
            return Ok(vec![]);
        }
        Ok(vec![DispatchEvent::DispatchShipped(DispatchShippedData {
            shipped_at,
        })])
    }
}
