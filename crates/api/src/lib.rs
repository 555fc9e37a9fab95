//! HTTP surface of the order fulfillment saga.
//!
//! Exposes the order, payment, dispatch and shipment services over REST,
//! the fulfillment read model for operators, structured logging (tracing)
//! and Prometheus metrics. The saga itself runs in the background consumers
//! started by the binary; handlers only start or inspect it.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use metrics_exporter_prometheus::PrometheusHandle;
use projections::{FulfillmentView, Projection, ProjectionProcessor};
use saga::Platform;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use config::Config;
pub use error::ApiError;
pub use routes::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(routes::metrics::MetricsState {
            handle: metrics_handle,
            app: state.clone(),
        });

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/orders", post(routes::orders::create).get(routes::orders::list))
        .route("/orders/count", get(routes::orders::count))
        .route(
            "/orders/{id}",
            get(routes::orders::get).patch(routes::orders::update),
        )
        .route("/orders/{id}/cancel", post(routes::orders::cancel))
        .route("/orders/{id}/fulfillment", get(routes::orders::fulfillment))
        .route(
            "/charges",
            post(routes::charges::create).get(routes::charges::list),
        )
        .route(
            "/charges/{id}",
            get(routes::charges::get).patch(routes::charges::amend),
        )
        .route(
            "/dispatches",
            post(routes::dispatches::create).get(routes::dispatches::list),
        )
        .route("/dispatches/{id}", get(routes::dispatches::get))
        .route(
            "/dispatches/by-order/{order_id}",
            get(routes::dispatches::get_by_order),
        )
        .route(
            "/dispatches/{id}/schedule",
            put(routes::dispatches::schedule),
        )
        .route("/shipments/{id}", get(routes::shipments::get))
        .route(
            "/shipments/by-dispatch/{dispatch_id}",
            get(routes::shipments::get_by_dispatch),
        )
        .route("/shipments/{id}/deliver", post(routes::shipments::deliver))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Wraps a wired platform with the fulfillment read model fed from its bus.
pub fn create_state(platform: Platform) -> Arc<AppState> {
    let fulfillment = FulfillmentView::new();

    let mut processor = ProjectionProcessor::new(platform.bus.clone());
    processor.register(Box::new(fulfillment.clone()) as Box<dyn Projection>);

    Arc::new(AppState {
        platform,
        fulfillment,
        projection_processor: Arc::new(processor),
    })
}
