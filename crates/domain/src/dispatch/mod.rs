//! Dispatch (despacho) aggregate.

mod aggregate;
mod events;
mod state;

pub use aggregate::{Dispatch, ScheduleRequest};
pub use events::{
    AddressChangedData, DispatchEvent, DispatchOpenedData, DispatchScheduledData,
    DispatchShippedData, PaymentRecordedData, StatusAdvancedData,
};
pub use state::DispatchStatus;

use thiserror::Error;

/// Errors that can occur during dispatch operations.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Invalid state transition: cannot {action} from {current_status} state")]
    InvalidStateTransition {
        current_status: DispatchStatus,
        action: &'static str,
    },

    /// A status change would move the dispatch backwards.
    #[error("Dispatch status cannot regress from {from} to {to}")]
    StatusRegression {
        from: DispatchStatus,
        to: DispatchStatus,
    },

    #[error("Dispatch has not been paid yet")]
    NotPaid,

    #[error("Dispatch already shipped")]
    AlreadyShipped,

    #[error("A dispatch date is required to mark the dispatch scheduled")]
    ScheduleRequired,

    #[error("Delivery address must not be empty")]
    EmptyAddress,

    #[error("Dispatch already opened")]
    AlreadyOpened,
}
