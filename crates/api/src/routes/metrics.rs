//! Prometheus metrics endpoint.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use metrics_exporter_prometheus::PrometheusHandle;

use super::AppState;

/// State for the scrape route: the recorder handle plus the bus whose
/// queue depths are sampled on every scrape.
#[derive(Clone)]
pub struct MetricsState {
    pub handle: PrometheusHandle,
    pub app: Arc<AppState>,
}

/// GET /metrics: saga counters plus current queue depths.
pub async fn get(State(metrics): State<MetricsState>) -> impl IntoResponse {
    let bus = &metrics.app.platform.bus;
    for queue in bus.queue_names().await {
        let ready = bus.ready_count(&queue).await;
        let unacked = bus.unacked_count(&queue).await;
        let dead = bus.dead_letters(&queue).await.len();
        metrics::gauge!("queue_ready_messages", "queue" => queue.clone()).set(ready as f64);
        metrics::gauge!("queue_unacked_messages", "queue" => queue.clone()).set(unacked as f64);
        metrics::gauge!("queue_dead_letters", "queue" => queue).set(dead as f64);
    }

    (
        StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        metrics.handle.render(),
    )
}
