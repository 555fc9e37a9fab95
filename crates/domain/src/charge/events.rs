//! Charge domain events.

use chrono::{DateTime, Utc};
use common::{ChargeId, Money, OrderId};
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;

/// Events that can occur on a charge aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ChargeEvent {
    ChargeInitiated(ChargeInitiatedData),
    ChargeCompleted(ChargeCompletedData),
    ChargeFailed(ChargeFailedData),
    ShippingCostAmended(ShippingCostAmendedData),
}

impl DomainEvent for ChargeEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ChargeEvent::ChargeInitiated(_) => "ChargeInitiated",
            ChargeEvent::ChargeCompleted(_) => "ChargeCompleted",
            ChargeEvent::ChargeFailed(_) => "ChargeFailed",
            ChargeEvent::ShippingCostAmended(_) => "ShippingCostAmended",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargeInitiatedData {
    pub charge_id: ChargeId,
    pub order_id: OrderId,
    pub amount: Money,
    pub shipping_cost: Money,
    pub total_amount: Money,
    pub method: String,
    pub currency: String,
    pub initiated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargeCompletedData {
    pub transaction_id: String,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargeFailedData {
    pub reason: String,
    pub failed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShippingCostAmendedData {
    pub previous: Money,
    pub shipping_cost: Money,
    pub total_amount: Money,
}
