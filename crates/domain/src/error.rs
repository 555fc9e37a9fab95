//! Domain error types.

use thiserror::Error;

use crate::charge::ChargeError;
use crate::dispatch::DispatchError;
use crate::order::OrderError;
use crate::repository::RepositoryError;
use crate::shipment::ShipmentError;

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// An error occurred in a repository.
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    #[error("Charge error: {0}")]
    Charge(#[from] ChargeError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Shipment error: {0}")]
    Shipment(#[from] ShipmentError),

    /// Aggregate not found.
    #[error("Aggregate not found: {aggregate_type} with id {aggregate_id}")]
    AggregateNotFound {
        aggregate_type: &'static str,
        aggregate_id: String,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
