//! Shipment (envio) aggregate.

mod aggregate;
mod events;
mod state;

pub use aggregate::{Shipment, ShipmentPlan};
pub use events::{
    ShipmentDeliveredData, ShipmentEvent, ShipmentPreparedData, ShipmentRescheduledData,
    ShipmentShippedData,
};
pub use state::ShipmentStatus;

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors that can occur during shipment operations.
#[derive(Debug, Error)]
pub enum ShipmentError {
    #[error("Invalid state transition: cannot {action} from {current_status} state")]
    InvalidStateTransition {
        current_status: ShipmentStatus,
        action: &'static str,
    },

    /// The dispatch date has not arrived yet.
    #[error("Shipment not due until {scheduled_at}")]
    NotDue { scheduled_at: DateTime<Utc> },

    #[error("Shipment already prepared")]
    AlreadyPrepared,

    #[error("Shipment is for dispatch {expected}, not {actual}")]
    DispatchMismatch {
        expected: common::DispatchId,
        actual: common::DispatchId,
    },
}
