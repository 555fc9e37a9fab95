//! Order aggregate and related types.

mod aggregate;
mod commands;
mod events;
mod state;
mod value_objects;

pub use aggregate::Order;
pub use commands::{NewOrder, OrderRevision, StatusRequest};
pub use events::{
    ClientReassignedData, LinesRevisedData, OrderCancelledData, OrderEvent, OrderPaidData,
    OrderPlacedData, PaymentAwaitedData,
};
pub use state::OrderStatus;
pub use value_objects::{OrderLine, merge_lines, total_quantity};

use common::ProductId;
use thiserror::Error;

/// Errors that can occur during order operations.
#[derive(Debug, Error)]
pub enum OrderError {
    /// Client ID is required.
    #[error("Client ID is required")]
    ClientRequired,

    /// Order is not in the expected state.
    #[error("Invalid state transition: cannot {action} from {current_status} state")]
    InvalidStateTransition {
        current_status: OrderStatus,
        action: &'static str,
    },

    /// Lines can no longer change.
    #[error("Order lines are locked in {current_status} state")]
    LinesLocked { current_status: OrderStatus },

    #[error("Invalid quantity for product {product_id} (must be greater than 0)")]
    InvalidQuantity { product_id: ProductId },

    #[error("Quantity for product {product_id} is too large")]
    QuantityOverflow { product_id: ProductId },

    #[error("Order already placed")]
    AlreadyPlaced,

    #[error("Order has not been placed")]
    NotPlaced,
}
