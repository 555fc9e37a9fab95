//! Order state machine.

use serde::{Deserialize, Serialize};

/// The status of an order in its lifecycle.
///
/// State transitions:
/// ```text
/// Created ──► PendingPayment ──► Paid
///    │              │
///    └──────────────┴──► Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Order accepted but not yet announced to the other services.
    #[default]
    Created,

    /// Order announced, waiting for a completed charge.
    PendingPayment,

    /// A charge completed for this order (terminal success).
    Paid,

    /// Order was cancelled (terminal state).
    Cancelled,
}

impl OrderStatus {
    /// Returns true if the order lines can still be changed.
    pub fn can_revise_lines(&self) -> bool {
        matches!(self, OrderStatus::Created | OrderStatus::PendingPayment)
    }

    /// Returns true if the order can be marked paid in this state.
    pub fn can_mark_paid(&self) -> bool {
        matches!(self, OrderStatus::Created | OrderStatus::PendingPayment)
    }

    /// Returns true if the order can be cancelled in this state.
    pub fn can_cancel(&self) -> bool {
        !self.is_terminal()
    }

    /// Returns true if this is a terminal state (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Paid | OrderStatus::Cancelled)
    }

    /// Returns the wire name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Created => "created",
            OrderStatus::PendingPayment => "pending_payment",
            OrderStatus::Paid => "paid",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "created" => Ok(OrderStatus::Created),
            "pending_payment" | "pendiente de pago" => Ok(OrderStatus::PendingPayment),
            "paid" | "pagado" => Ok(OrderStatus::Paid),
            "cancelled" | "canceled" | "cancelado" => Ok(OrderStatus::Cancelled),
            other => Err(format!("unknown order status: {other}")),
        }
    }
}
