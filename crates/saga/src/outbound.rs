//! Bounded outbound calls to collaborators.
//!
//! Every lookup gets its own timeout and a short, capped backoff between
//! attempts. This loop is independent of broker redelivery: once the
//! attempts are spent the call fails and the caller's message goes back to
//! the broker.

use std::future::Future;
use std::time::{Duration, Instant};

use crate::collaborators::CollaboratorError;

#[derive(Debug, Clone)]
pub struct OutboundPolicy {
    /// Deadline for a single attempt.
    pub timeout: Duration,

    /// Attempts including the first one.
    pub max_attempts: u32,

    pub initial_backoff: Duration,

    pub max_backoff: Duration,

    pub multiplier: f64,
}

impl Default for OutboundPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(2000),
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(2),
            multiplier: 2.0,
        }
    }
}

impl OutboundPolicy {
    pub fn new(timeout: Duration, max_attempts: u32, initial_backoff: Duration) -> Self {
        Self {
            timeout,
            max_attempts: max_attempts.max(1),
            initial_backoff,
            ..Self::default()
        }
    }

    /// Same timeout, a single attempt. Used where a failed lookup must surface
    /// immediately.
    pub fn single_attempt(&self) -> Self {
        Self {
            max_attempts: 1,
            ..self.clone()
        }
    }

    /// Runs `call` under the policy. `NotFound` is returned at once; timeouts
    /// and unavailability are retried until the attempts run out.
    pub async fn call<T, F, Fut>(&self, collaborator: &'static str, mut call: F) -> Result<T, CollaboratorError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CollaboratorError>>,
    {
        let mut attempt = 0;
        let mut delay = self.initial_backoff;

        loop {
            attempt += 1;
            let started = Instant::now();
            let result = match tokio::time::timeout(self.timeout, call()).await {
                Ok(result) => result,
                Err(_) => Err(CollaboratorError::Timeout {
                    collaborator,
                    after_ms: self.timeout.as_millis() as u64,
                }),
            };
            metrics::histogram!("outbound_call_duration_seconds", "collaborator" => collaborator)
                .record(started.elapsed().as_secs_f64());

            match result {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::info!(collaborator, attempt, "outbound call succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(error) if !error.is_transient() => return Err(error),
                Err(error) => {
                    metrics::counter!("outbound_call_failures_total", "collaborator" => collaborator)
                        .increment(1);
                    if attempt >= self.max_attempts {
                        tracing::warn!(collaborator, attempt, %error, "outbound call failed");
                        return Err(error);
                    }

                    tracing::debug!(
                        collaborator,
                        attempt,
                        %error,
                        delay_ms = delay.as_millis() as u64,
                        "outbound call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    delay = Duration::from_millis((delay.as_millis() as f64 * self.multiplier) as u64)
                        .min(self.max_backoff);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> OutboundPolicy {
        OutboundPolicy::new(Duration::from_millis(50), max_attempts, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn retries_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result = fast_policy(3)
            .call("clients", || {
                let counter = Arc::clone(&counter);
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(CollaboratorError::Unavailable {
                            collaborator: "clients",
                            reason: "down".to_string(),
                        })
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn not_found_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result: Result<(), _> = fast_policy(3)
            .call("orders", || {
                counter.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(CollaboratorError::NotFound {
                        resource: "Order",
                        id: "1".to_string(),
                    })
                }
            })
            .await;

        assert!(matches!(result, Err(CollaboratorError::NotFound { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn slow_calls_time_out() {
        let result: Result<(), _> = fast_policy(2)
            .call("dispatches", || async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;

        assert!(matches!(
            result,
            Err(CollaboratorError::Timeout {
                collaborator: "dispatches",
                after_ms: 50
            })
        ));
    }

    #[tokio::test]
    async fn single_attempt_gives_up_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result: Result<(), _> = fast_policy(5)
            .single_attempt()
            .call("dispatches", || {
                counter.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(CollaboratorError::Unavailable {
                        collaborator: "dispatches",
                        reason: "down".to_string(),
                    })
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
