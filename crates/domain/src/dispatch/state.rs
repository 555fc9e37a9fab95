//! Dispatch state machine.

use serde::{Deserialize, Serialize};

/// The status of a dispatch.
///
/// State transitions (forward only):
/// ```text
/// Pending ──► ReadyToShip ──► Scheduled ──► Shipped
/// ```
/// Variants are declared in lifecycle order, so `Ord` gives the "never
/// regresses" comparison.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum DispatchStatus {
    /// Order known, payment not yet seen.
    #[default]
    Pending,

    /// Paid; address and shipping cost recorded.
    ReadyToShip,

    /// A dispatch date was assigned.
    Scheduled,

    /// The shipment left (terminal state).
    Shipped,
}

impl DispatchStatus {
    /// Returns true once payment was recorded.
    pub fn is_paid(&self) -> bool {
        *self >= DispatchStatus::ReadyToShip
    }

    /// Returns true if payment data may still be (re)recorded.
    pub fn accepts_payment(&self) -> bool {
        *self <= DispatchStatus::ReadyToShip
    }

    pub fn can_schedule(&self) -> bool {
        matches!(self, DispatchStatus::ReadyToShip | DispatchStatus::Scheduled)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DispatchStatus::Shipped)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchStatus::Pending => "pending",
            DispatchStatus::ReadyToShip => "ready_to_ship",
            DispatchStatus::Scheduled => "scheduled",
            DispatchStatus::Shipped => "shipped",
        }
    }
}

impl std::fmt::Display for DispatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for DispatchStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" | "pendiente de pago" => Ok(DispatchStatus::Pending),
            "ready_to_ship" | "orden pagada - lista para enviar" => Ok(DispatchStatus::ReadyToShip),
            "scheduled" | "agendada" => Ok(DispatchStatus::Scheduled),
            "shipped" | "enviada" => Ok(DispatchStatus::Shipped),
            other => Err(format!("unknown dispatch status: {other}")),
        }
    }
}
