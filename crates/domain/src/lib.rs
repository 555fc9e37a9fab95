//! Domain layer for the fulfillment saga.
//!
//! This crate provides:
//! - the Aggregate trait and the versioned Repository it is stored through
//! - a generic CommandHandler (load, decide, apply, save)
//! - the Order, Charge, Dispatch and Shipment state machines
//! - the integration events the services exchange on the bus

pub mod aggregate;
pub mod charge;
pub mod command;
pub mod contracts;
pub mod dispatch;
pub mod error;
pub mod memory;
pub mod order;
pub mod postgres;
pub mod repository;
pub mod shipment;

pub use aggregate::{Aggregate, DomainEvent};
pub use charge::{Charge, ChargeError, ChargeEvent, ChargeStatus, ChargeTerms, shipping_cost};
pub use command::{CommandHandler, CommandResult};
pub use contracts::{
    ContractError, DispatchScheduled, DispatchStatusChanged, IntegrationEvent, OrderCreated,
    OrderStatusChanged, PaymentReady, StockAdjustment, StockDelta, routing,
};
pub use dispatch::{Dispatch, DispatchError, DispatchEvent, DispatchStatus, ScheduleRequest};
pub use error::DomainError;
pub use memory::InMemoryRepository;
pub use order::{
    NewOrder, Order, OrderError, OrderEvent, OrderLine, OrderRevision, OrderStatus, StatusRequest,
};
pub use postgres::{PostgresRepository, run_migrations};
pub use repository::{Repository, RepositoryError, Version};
pub use shipment::{Shipment, ShipmentError, ShipmentEvent, ShipmentPlan, ShipmentStatus};
