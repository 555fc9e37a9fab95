//! Shipment state machine.

use serde::{Deserialize, Serialize};

/// The status of a shipment.
///
/// ```text
/// Preparing ──► Shipped ──► Delivered
/// ```
/// `Shipped` ends the saga; `Delivered` is recorded for information only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ShipmentStatus {
    #[default]
    Preparing,
    Shipped,
    Delivered,
}

impl ShipmentStatus {
    pub fn can_ship(&self) -> bool {
        matches!(self, ShipmentStatus::Preparing)
    }

    pub fn can_deliver(&self) -> bool {
        matches!(self, ShipmentStatus::Shipped)
    }

    /// Returns true once the shipment has left.
    pub fn has_left(&self) -> bool {
        matches!(self, ShipmentStatus::Shipped | ShipmentStatus::Delivered)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ShipmentStatus::Preparing => "preparing",
            ShipmentStatus::Shipped => "shipped",
            ShipmentStatus::Delivered => "delivered",
        }
    }
}

impl std::fmt::Display for ShipmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
