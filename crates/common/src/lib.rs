//! Identifiers and value objects shared by every fulfillment service.

pub mod money;
pub mod types;

pub use money::{Money, MoneyError};
pub use types::{ChargeId, ClientId, DispatchId, OrderId, ProductId, ShipmentId};
