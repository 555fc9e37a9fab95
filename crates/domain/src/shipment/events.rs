//! Shipment domain events.

use chrono::{DateTime, Utc};
use common::{DispatchId, OrderId, ShipmentId};
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;

/// Events that can occur on a shipment aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ShipmentEvent {
    ShipmentPrepared(ShipmentPreparedData),
    ShipmentRescheduled(ShipmentRescheduledData),
    ShipmentShipped(ShipmentShippedData),
    ShipmentDelivered(ShipmentDeliveredData),
}

impl DomainEvent for ShipmentEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ShipmentEvent::ShipmentPrepared(_) => "ShipmentPrepared",
            ShipmentEvent::ShipmentRescheduled(_) => "ShipmentRescheduled",
            ShipmentEvent::ShipmentShipped(_) => "ShipmentShipped",
            ShipmentEvent::ShipmentDelivered(_) => "ShipmentDelivered",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShipmentPreparedData {
    pub shipment_id: ShipmentId,
    pub dispatch_id: DispatchId,
    pub order_id: OrderId,
    pub delivery_address: String,
    pub contact_email: String,
    pub scheduled_at: DateTime<Utc>,
    pub prepared_at: DateTime<Utc>,
}

/// A newer dispatch date or destination for a shipment still waiting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShipmentRescheduledData {
    pub delivery_address: String,
    pub contact_email: String,
    pub scheduled_at: DateTime<Utc>,
    pub previous_scheduled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShipmentShippedData {
    pub shipped_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShipmentDeliveredData {
    pub delivered_at: DateTime<Utc>,
}
