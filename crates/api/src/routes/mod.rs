//! HTTP handlers, one module per saga service.

pub mod charges;
pub mod dispatches;
pub mod health;
pub mod metrics;
pub mod orders;
pub mod shipments;

use std::str::FromStr;
use std::sync::Arc;

use messaging::InMemoryBus;
use projections::{FulfillmentView, ProjectionProcessor};
use saga::Platform;

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub platform: Platform,
    pub fulfillment: FulfillmentView,
    pub projection_processor: Arc<ProjectionProcessor<InMemoryBus>>,
}

/// Parses a path segment into a typed identifier.
pub(crate) fn parse_id<T: FromStr>(kind: &str, raw: &str) -> Result<T, ApiError>
where
    T::Err: std::fmt::Display,
{
    raw.parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid {kind} id: {e}")))
}
