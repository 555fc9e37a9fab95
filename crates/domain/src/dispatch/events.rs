//! Dispatch domain events.

use chrono::{DateTime, Utc};
use common::{DispatchId, Money, OrderId};
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;

use super::DispatchStatus;

/// Events that can occur on a dispatch aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum DispatchEvent {
    DispatchOpened(DispatchOpenedData),
    PaymentRecorded(PaymentRecordedData),
    AddressChanged(AddressChangedData),
    DispatchScheduled(DispatchScheduledData),
    StatusAdvanced(StatusAdvancedData),
    DispatchShipped(DispatchShippedData),
}

impl DomainEvent for DispatchEvent {
    fn event_type(&self) -> &'static str {
        match self {
            DispatchEvent::DispatchOpened(_) => "DispatchOpened",
            DispatchEvent::PaymentRecorded(_) => "PaymentRecorded",
            DispatchEvent::AddressChanged(_) => "AddressChanged",
            DispatchEvent::DispatchScheduled(_) => "DispatchScheduled",
            DispatchEvent::StatusAdvanced(_) => "StatusAdvanced",
            DispatchEvent::DispatchShipped(_) => "DispatchShipped",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchOpenedData {
    pub dispatch_id: DispatchId,
    pub order_id: OrderId,
    pub opened_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRecordedData {
    pub delivery_address: String,
    pub shipping_cost: Money,
    pub total_amount: Option<Money>,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddressChangedData {
    pub delivery_address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchScheduledData {
    pub scheduled_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusAdvancedData {
    pub from: DispatchStatus,
    pub to: DispatchStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchShippedData {
    pub shipped_at: DateTime<Utc>,
}
