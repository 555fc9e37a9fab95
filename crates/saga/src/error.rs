//! Saga error types.

use common::ProductId;
use domain::{
    ChargeError, ContractError, DispatchError, DomainError, OrderError, RepositoryError,
    ShipmentError,
};
use messaging::BusError;
use thiserror::Error;

use crate::collaborators::CollaboratorError;

/// What a consumer does with a message whose handler failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Settle the message; the failure is final and state is unchanged.
    Ack,

    /// Hand the message back to the broker for redelivery.
    Retry,

    /// Park the message; redelivering it cannot succeed.
    DeadLetter,
}

impl Disposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Disposition::Ack => "ack",
            Disposition::Retry => "retry",
            Disposition::DeadLetter => "dead_letter",
        }
    }
}

/// Errors surfaced by the saga services.
#[derive(Debug, Error)]
pub enum SagaError {
    /// A referenced entity does not exist.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    /// Input or message payload is malformed.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The request contradicts current state; nothing was changed.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Another writer updated the entity first.
    #[error("Stale write: {0}")]
    StaleWrite(String),

    /// A collaborator, the broker or the database did not answer in time.
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: ProductId,
        requested: u64,
        available: i64,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SagaError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        SagaError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// How an asynchronous consumer settles a message that failed with this error.
    pub fn disposition(&self) -> Disposition {
        match self {
            SagaError::Conflict(_) => Disposition::Ack,
            SagaError::InvalidArgument(_) | SagaError::InsufficientStock { .. } => {
                Disposition::DeadLetter
            }
            SagaError::NotFound { .. }
            | SagaError::StaleWrite(_)
            | SagaError::UpstreamUnavailable(_)
            | SagaError::Internal(_) => Disposition::Retry,
        }
    }

    /// Short label used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            SagaError::NotFound { .. } => "not_found",
            SagaError::InvalidArgument(_) => "invalid_argument",
            SagaError::Conflict(_) => "conflict",
            SagaError::StaleWrite(_) => "stale_write",
            SagaError::UpstreamUnavailable(_) => "upstream_unavailable",
            SagaError::InsufficientStock { .. } => "insufficient_stock",
            SagaError::Internal(_) => "internal",
        }
    }
}

impl From<DomainError> for SagaError {
    fn from(e: DomainError) -> Self {
        match e {
            DomainError::Repository(e) => e.into(),
            DomainError::Order(e) => e.into(),
            DomainError::Charge(e) => e.into(),
            DomainError::Dispatch(e) => e.into(),
            DomainError::Shipment(e) => e.into(),
            DomainError::AggregateNotFound {
                aggregate_type,
                aggregate_id,
            } => SagaError::NotFound {
                entity: aggregate_type,
                id: aggregate_id,
            },
            DomainError::Serialization(e) => SagaError::Internal(e.to_string()),
        }
    }
}

impl From<RepositoryError> for SagaError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::ConcurrencyConflict { .. } => SagaError::StaleWrite(e.to_string()),
            RepositoryError::UniqueViolation { .. } => SagaError::Conflict(e.to_string()),
            RepositoryError::Database(_) => SagaError::UpstreamUnavailable(e.to_string()),
            RepositoryError::MissingIdentity(_)
            | RepositoryError::Serialization(_)
            | RepositoryError::Migration(_) => SagaError::Internal(e.to_string()),
        }
    }
}

impl From<OrderError> for SagaError {
    fn from(e: OrderError) -> Self {
        match e {
            OrderError::ClientRequired
            | OrderError::InvalidQuantity { .. }
            | OrderError::QuantityOverflow { .. } => {
                SagaError::InvalidArgument(e.to_string())
            }
            OrderError::InvalidStateTransition { .. }
            | OrderError::LinesLocked { .. }
            | OrderError::AlreadyPlaced
            | OrderError::NotPlaced => SagaError::Conflict(e.to_string()),
        }
    }
}

impl From<ChargeError> for SagaError {
    fn from(e: ChargeError) -> Self {
        match e {
            ChargeError::InvalidAmount(_)
            | ChargeError::InvalidShippingCost(_)
            | ChargeError::MethodRequired => SagaError::InvalidArgument(e.to_string()),
            ChargeError::InvalidStateTransition { .. } | ChargeError::AlreadyInitiated => {
                SagaError::Conflict(e.to_string())
            }
        }
    }
}

impl From<DispatchError> for SagaError {
    fn from(e: DispatchError) -> Self {
        match e {
            DispatchError::EmptyAddress | DispatchError::ScheduleRequired => {
                SagaError::InvalidArgument(e.to_string())
            }
            DispatchError::InvalidStateTransition { .. }
            | DispatchError::StatusRegression { .. }
            | DispatchError::NotPaid
            | DispatchError::AlreadyShipped
            | DispatchError::AlreadyOpened => SagaError::Conflict(e.to_string()),
        }
    }
}

impl From<ShipmentError> for SagaError {
    fn from(e: ShipmentError) -> Self {
        SagaError::Conflict(e.to_string())
    }
}

impl From<BusError> for SagaError {
    fn from(e: BusError) -> Self {
        match e {
            BusError::Unavailable(_) | BusError::Database(_) => {
                SagaError::UpstreamUnavailable(e.to_string())
            }
            BusError::InvalidEnvelope(_) | BusError::Serialization(_) => {
                SagaError::InvalidArgument(e.to_string())
            }
            BusError::UnknownQueue(_) | BusError::UnknownDelivery { .. } | BusError::Migration(_) => {
                SagaError::Internal(e.to_string())
            }
        }
    }
}

impl From<ContractError> for SagaError {
    fn from(e: ContractError) -> Self {
        match e {
            ContractError::Envelope(e) => e.into(),
            other => SagaError::InvalidArgument(other.to_string()),
        }
    }
}

impl From<CollaboratorError> for SagaError {
    fn from(e: CollaboratorError) -> Self {
        match e {
            CollaboratorError::NotFound { resource, id } => SagaError::NotFound {
                entity: resource,
                id,
            },
            CollaboratorError::Unavailable { .. } | CollaboratorError::Timeout { .. } => {
                SagaError::UpstreamUnavailable(e.to_string())
            }
        }
    }
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;

#[cfg(test)]
mod tests {
    use super::*;
    use common::DispatchId;
    use domain::Version;

    #[test]
    fn dispositions_follow_the_taxonomy() {
        assert_eq!(SagaError::not_found("Order", 1).disposition(), Disposition::Retry);
        assert_eq!(
            SagaError::InvalidArgument("x".into()).disposition(),
            Disposition::DeadLetter
        );
        assert_eq!(SagaError::Conflict("x".into()).disposition(), Disposition::Ack);
        assert_eq!(SagaError::StaleWrite("x".into()).disposition(), Disposition::Retry);
        assert_eq!(
            SagaError::UpstreamUnavailable("x".into()).disposition(),
            Disposition::Retry
        );
        let stock = SagaError::InsufficientStock {
            product_id: ProductId::new(10),
            requested: 3,
            available: 1,
        };
        assert_eq!(stock.disposition(), Disposition::DeadLetter);
        assert_eq!(SagaError::Internal("x".into()).disposition(), Disposition::Retry);
    }

    #[test]
    fn repository_errors_map_to_conflict_kinds() {
        let stale: SagaError = RepositoryError::ConcurrencyConflict {
            aggregate_type: "Dispatch",
            aggregate_id: DispatchId::new().to_string(),
            expected: Version::first(),
            actual: Version::new(2),
        }
        .into();
        assert_eq!(stale.kind(), "stale_write");

        let duplicate: SagaError = DomainError::Repository(RepositoryError::UniqueViolation {
            aggregate_type: "Charge",
            key: "order:1".to_string(),
        })
        .into();
        assert_eq!(duplicate.kind(), "conflict");
    }

    #[test]
    fn missing_aggregate_is_not_found() {
        let err: SagaError = DomainError::AggregateNotFound {
            aggregate_type: "Order",
            aggregate_id: "abc".to_string(),
        }
        .into();
        assert!(matches!(err, SagaError::NotFound { entity: "Order", .. }));
        assert_eq!(err.to_string(), "Order abc not found");
    }

    #[test]
    fn collaborator_timeouts_are_upstream_failures() {
        let err: SagaError = CollaboratorError::Timeout {
            collaborator: "clients",
            after_ms: 2000,
        }
        .into();
        assert_eq!(err.kind(), "upstream_unavailable");

        let err: SagaError = CollaboratorError::NotFound {
            resource: "Client",
            id: "7".to_string(),
        }
        .into();
        assert_eq!(err.kind(), "not_found");
    }

    #[test]
    fn broker_failures_are_retryable() {
        let err: SagaError = BusError::Unavailable("down".into()).into();
        assert_eq!(err.disposition(), Disposition::Retry);
        let err: SagaError = BusError::InvalidEnvelope("payload".into()).into();
        assert_eq!(err.disposition(), Disposition::DeadLetter);
    }
}
