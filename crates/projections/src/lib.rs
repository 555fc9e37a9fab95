//! Read models built from the messages the saga publishes.
//!
//! The services never query these views. They exist so operators can see
//! where each order stands without touching four databases:
//! - [`Projection`] trait for folding published envelopes into a read model
//! - [`ReadModel`] trait for query access to denormalized data
//! - [`ProjectionProcessor`] for tailing the bus's message log
//! - [`FulfillmentView`] with the milestones of every order

pub mod error;
pub mod processor;
pub mod projection;
pub mod read_model;
pub mod views;

pub use error::{ProjectionError, Result};
pub use processor::ProjectionProcessor;
pub use projection::{Projection, ProjectionPosition};
pub use read_model::ReadModel;
pub use views::{FulfillmentStage, FulfillmentView, OrderFulfillment};
