//! Charge (cobro) aggregate and the shipping cost rule.

mod aggregate;
mod events;
pub mod shipping;
mod state;

pub use aggregate::{Charge, ChargeTerms};
pub use events::{
    ChargeCompletedData, ChargeEvent, ChargeFailedData, ChargeInitiatedData,
    ShippingCostAmendedData,
};
pub use shipping::shipping_cost;
pub use state::ChargeStatus;

use common::Money;
use thiserror::Error;

/// Errors that can occur during charge operations.
#[derive(Debug, Error)]
pub enum ChargeError {
    #[error("Invalid state transition: cannot {action} from {current_status} state")]
    InvalidStateTransition {
        current_status: ChargeStatus,
        action: &'static str,
    },

    #[error("Invalid amount: {0} (must be greater than 0)")]
    InvalidAmount(Money),

    #[error("Invalid shipping cost: {0} (must not be negative)")]
    InvalidShippingCost(Money),

    #[error("Payment method is required")]
    MethodRequired,

    #[error("Charge already initiated")]
    AlreadyInitiated,
}
