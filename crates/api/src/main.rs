//! API server entry point.

use std::sync::Arc;

use api::Config;
use messaging::{InMemoryLedger, PostgresLedger};
use saga::{LogNotifier, Platform, Repositories};
use sqlx::PgPool;
use tokio::signal;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

/// Builds the platform on PostgreSQL when `DATABASE_URL` is set, in memory otherwise.
async fn build_platform(config: &Config) -> Platform {
    let settings = config.saga_settings();

    match &config.database_url {
        Some(url) => {
            let pool = PgPool::connect(url)
                .await
                .expect("failed to connect to PostgreSQL");
            domain::run_migrations(&pool)
                .await
                .expect("failed to run migrations");
            tracing::info!("using PostgreSQL repositories and idempotency ledger");

            Platform::new(
                Repositories::postgres(pool.clone()),
                Arc::new(PostgresLedger::new(pool)),
                Arc::new(LogNotifier),
                settings,
            )
            .await
            .expect("failed to wire platform")
        }
        None => {
            tracing::warn!("DATABASE_URL not set, state is kept in memory");
            Platform::new(
                Repositories::in_memory(),
                Arc::new(InMemoryLedger::new()),
                Arc::new(LogNotifier),
                settings,
            )
            .await
            .expect("failed to wire platform")
        }
    }
}

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    // 1. Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 2. Install Prometheus metrics recorder
    let prometheus_builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    let metrics_handle = prometheus_builder
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Wire the saga services, queues and consumers
    let platform = build_platform(&config).await;
    if config.seed_demo_catalog {
        platform.seed_demo_catalog().await;
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut background = platform.spawn_consumers(config.consumer_poll(), shutdown_rx.clone());
    background.push(platform.spawn_shipment_sweeper(config.shipment_sweep_interval(), shutdown_rx));
    tracing::info!(tasks = background.len(), "background workers started");

    // 4. Build the application and catch the read model up
    let state = api::create_state(platform);
    state
        .projection_processor
        .run_catch_up()
        .await
        .expect("catch-up failed");
    let app = api::create_app(state, metrics_handle);

    // 5. Start server
    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    // 6. Stop consumers; unacked deliveries go back to their queues
    let _ = shutdown_tx.send(true);
    for task in background {
        if let Err(error) = task.await {
            tracing::warn!(%error, "background task ended abnormally");
        }
    }

    tracing::info!("server shut down gracefully");
}
