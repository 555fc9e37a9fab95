//! Charge state machine.

use serde::{Deserialize, Serialize};

/// The status of a charge.
///
/// State transitions:
/// ```text
/// Pending ──┬──► Completed
///           └──► Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChargeStatus {
    /// Recorded, waiting for the payment gateway.
    #[default]
    Pending,

    /// Money was taken (terminal state).
    Completed,

    /// The gateway declined or the charge could not be announced (terminal state).
    Failed,
}

impl ChargeStatus {
    /// Returns true if a charge in this status blocks other charges for the same order.
    pub fn holds_order(&self) -> bool {
        matches!(self, ChargeStatus::Pending | ChargeStatus::Completed)
    }

    pub fn can_complete(&self) -> bool {
        matches!(self, ChargeStatus::Pending)
    }

    pub fn can_fail(&self) -> bool {
        matches!(self, ChargeStatus::Pending)
    }

    pub fn can_amend(&self) -> bool {
        !matches!(self, ChargeStatus::Failed)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ChargeStatus::Completed | ChargeStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChargeStatus::Pending => "pending",
            ChargeStatus::Completed => "completed",
            ChargeStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ChargeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
