//! Read model views for operators.

pub mod fulfillment;

pub use fulfillment::{FulfillmentStage, FulfillmentView, OrderFulfillment};
