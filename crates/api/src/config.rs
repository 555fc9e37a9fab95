//! Application configuration loaded from environment variables.

use std::time::Duration;

use saga::{OutboundPolicy, SagaSettings};

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default `"0.0.0.0"`)
/// - `PORT`: listen port (default `3000`)
/// - `RUST_LOG`: tracing filter directive
/// - `DATABASE_URL`: PostgreSQL connection string; in-memory storage when unset
/// - `COLLABORATOR_TIMEOUT_MS`, `COLLABORATOR_MAX_ATTEMPTS`, `COLLABORATOR_BACKOFF_MS`:
///   bounds on every outbound lookup
/// - `MAX_DELIVERIES`: deliveries before a failing message is dead-lettered
/// - `CONSUMER_POLL_MS`: how long an idle consumer waits before polling again
/// - `SHIPMENT_SWEEP_INTERVAL_SECS`: period of the release sweep for future-dated shipments
/// - `SEED_DEMO_CATALOG`: load the demo client and product at startup
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub database_url: Option<String>,
    pub collaborator_timeout_ms: u64,
    pub collaborator_max_attempts: u32,
    pub collaborator_backoff_ms: u64,
    pub max_deliveries: u32,
    pub consumer_poll_ms: u64,
    pub shipment_sweep_interval_secs: u64,
    pub seed_demo_catalog: bool,
}

/// Reads and parses a variable, falling back when it is unset or malformed.
fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("HOST").unwrap_or(defaults.host),
            port: env_or("PORT", defaults.port),
            log_level: std::env::var("RUST_LOG").unwrap_or(defaults.log_level),
            database_url: std::env::var("DATABASE_URL")
                .ok()
                .filter(|url| !url.trim().is_empty()),
            collaborator_timeout_ms: env_or(
                "COLLABORATOR_TIMEOUT_MS",
                defaults.collaborator_timeout_ms,
            ),
            collaborator_max_attempts: env_or(
                "COLLABORATOR_MAX_ATTEMPTS",
                defaults.collaborator_max_attempts,
            ),
            collaborator_backoff_ms: env_or(
                "COLLABORATOR_BACKOFF_MS",
                defaults.collaborator_backoff_ms,
            ),
            max_deliveries: env_or("MAX_DELIVERIES", defaults.max_deliveries),
            consumer_poll_ms: env_or("CONSUMER_POLL_MS", defaults.consumer_poll_ms),
            shipment_sweep_interval_secs: env_or(
                "SHIPMENT_SWEEP_INTERVAL_SECS",
                defaults.shipment_sweep_interval_secs,
            ),
            seed_demo_catalog: env_or("SEED_DEMO_CATALOG", defaults.seed_demo_catalog),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Saga tuning derived from the collaborator and delivery settings.
    pub fn saga_settings(&self) -> SagaSettings {
        SagaSettings {
            outbound: OutboundPolicy::new(
                Duration::from_millis(self.collaborator_timeout_ms),
                self.collaborator_max_attempts,
                Duration::from_millis(self.collaborator_backoff_ms),
            ),
            max_deliveries: self.max_deliveries.max(1),
        }
    }

    pub fn consumer_poll(&self) -> Duration {
        Duration::from_millis(self.consumer_poll_ms.max(1))
    }

    pub fn shipment_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.shipment_sweep_interval_secs.max(1))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info,saga=debug,api=debug,tower_http=debug".to_string(),
            database_url: None,
            collaborator_timeout_ms: 2000,
            collaborator_max_attempts: 3,
            collaborator_backoff_ms: 100,
            max_deliveries: 5,
            consumer_poll_ms: 250,
            shipment_sweep_interval_secs: 30,
            seed_demo_catalog: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert!(config.database_url.is_none());
        assert_eq!(config.collaborator_timeout_ms, 2000);
        assert_eq!(config.collaborator_max_attempts, 3);
        assert_eq!(config.max_deliveries, 5);
        assert_eq!(config.consumer_poll_ms, 250);
        assert_eq!(config.shipment_sweep_interval_secs, 30);
        assert!(!config.seed_demo_catalog);
    }

    #[test]
    fn test_addr_formatting() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..Config::default()
        };
        assert_eq!(config.addr(), "127.0.0.1:8080");
    }

    #[test]
    fn test_addr_default() {
        let config = Config::default();
        assert_eq!(config.addr(), "0.0.0.0:3000");
    }

    #[test]
    fn test_saga_settings_follow_collaborator_bounds() {
        let config = Config {
            collaborator_timeout_ms: 500,
            collaborator_max_attempts: 0,
            max_deliveries: 7,
            ..Config::default()
        };
        let settings = config.saga_settings();
        assert_eq!(settings.outbound.timeout, Duration::from_millis(500));
        assert_eq!(settings.outbound.max_attempts, 1);
        assert_eq!(settings.max_deliveries, 7);
    }

    #[test]
    fn test_intervals_are_never_zero() {
        let config = Config {
            consumer_poll_ms: 0,
            shipment_sweep_interval_secs: 0,
            ..Config::default()
        };
        assert_eq!(config.consumer_poll(), Duration::from_millis(1));
        assert_eq!(config.shipment_sweep_interval(), Duration::from_secs(1));
    }
}
