//! Queue consumers.
//!
//! A worker takes one delivery at a time from its queue, skips messages its
//! ledger has already seen, and settles every delivery exactly once: ack on
//! success, otherwise whatever the handler's error calls for.

use std::sync::Arc;
use std::time::Duration;

use messaging::{Delivery, IdempotencyLedger, MessageBus};
use tokio::sync::watch;

use crate::error::{Disposition, Result};
use crate::handlers::MessageHandler;

/// What happened to the delivery a worker took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumeOutcome {
    /// The queue was empty.
    Idle,

    /// Handled and acknowledged.
    Handled,

    /// Already processed by this consumer; acknowledged without handling.
    Duplicate,

    /// Rejected as a conflict; acknowledged with state unchanged.
    Discarded,

    /// Handed back to the broker for redelivery.
    Requeued,

    /// Parked in the dead-letter store.
    DeadLettered,
}

impl ConsumeOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsumeOutcome::Idle => "idle",
            ConsumeOutcome::Handled => "handled",
            ConsumeOutcome::Duplicate => "duplicate",
            ConsumeOutcome::Discarded => "discarded",
            ConsumeOutcome::Requeued => "requeued",
            ConsumeOutcome::DeadLettered => "dead_lettered",
        }
    }
}

#[derive(Clone)]
pub struct ConsumerWorker {
    queue: String,
    bus: Arc<dyn MessageBus>,
    ledger: Arc<dyn IdempotencyLedger>,
    handler: Arc<dyn MessageHandler>,
    max_deliveries: u32,
}

impl ConsumerWorker {
    pub fn new(
        queue: impl Into<String>,
        bus: Arc<dyn MessageBus>,
        ledger: Arc<dyn IdempotencyLedger>,
        handler: Arc<dyn MessageHandler>,
        max_deliveries: u32,
    ) -> Self {
        Self {
            queue: queue.into(),
            bus,
            ledger,
            handler,
            max_deliveries: max_deliveries.max(1),
        }
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Takes and settles the next delivery, if any.
    pub async fn process_next(&self) -> Result<ConsumeOutcome> {
        let Some(delivery) = self.bus.receive(&self.queue).await? else {
            return Ok(ConsumeOutcome::Idle);
        };

        match self.settle(&delivery).await {
            Ok(outcome) => {
                metrics::counter!(
                    "messages_consumed_total",
                    "queue" => self.queue.clone(),
                    "outcome" => outcome.as_str()
                )
                .increment(1);
                Ok(outcome)
            }
            Err(error) => {
                // Ledger or broker trouble: give the message back untouched.
                if let Err(nack_error) = self.bus.nack(&delivery, true).await {
                    tracing::error!(queue = %self.queue, error = %nack_error, "nack failed");
                }
                Err(error)
            }
        }
    }

    #[tracing::instrument(
        skip(self, delivery),
        fields(
            queue = %self.queue,
            message_id = %delivery.envelope.message_id,
            event_type = %delivery.envelope.event_type,
            delivery_count = delivery.delivery_count
        )
    )]
    async fn settle(&self, delivery: &Delivery) -> Result<ConsumeOutcome> {
        let message_id = delivery.envelope.message_id;
        if self.ledger.is_processed(&self.queue, message_id).await? {
            tracing::debug!("duplicate delivery skipped");
            self.bus.ack(delivery).await?;
            return Ok(ConsumeOutcome::Duplicate);
        }

        let error = match self.handler.handle(&delivery.envelope).await {
            Ok(()) => {
                self.ledger.mark_processed(&self.queue, message_id).await?;
                self.bus.ack(delivery).await?;
                return Ok(ConsumeOutcome::Handled);
            }
            Err(error) => error,
        };

        match error.disposition() {
            Disposition::Ack => {
                tracing::info!(%error, "message rejected, state unchanged");
                self.ledger.mark_processed(&self.queue, message_id).await?;
                self.bus.ack(delivery).await?;
                Ok(ConsumeOutcome::Discarded)
            }
            Disposition::Retry if delivery.delivery_count < self.max_deliveries => {
                tracing::warn!(%error, kind = error.kind(), "handler failed, requeueing");
                self.bus.nack(delivery, true).await?;
                Ok(ConsumeOutcome::Requeued)
            }
            Disposition::Retry | Disposition::DeadLetter => {
                tracing::error!(%error, kind = error.kind(), "message dead-lettered");
                self.bus
                    .dead_letter(delivery, &format!("{}: {error}", error.kind()))
                    .await?;
                metrics::counter!("messages_dead_lettered_total", "queue" => self.queue.clone())
                    .increment(1);
                Ok(ConsumeOutcome::DeadLettered)
            }
        }
    }

    /// Drains the queue until it is empty.
    pub async fn drain(&self) -> Result<usize> {
        let mut settled = 0;
        while self.process_next().await? != ConsumeOutcome::Idle {
            settled += 1;
        }
        Ok(settled)
    }

    /// Consumes until `shutdown` turns true, sleeping `poll` whenever the
    /// queue is empty or the broker fails.
    pub async fn run(self, poll: Duration, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(queue = %self.queue, "consumer started");
        while !*shutdown.borrow() {
            let wait = match self.process_next().await {
                Ok(ConsumeOutcome::Idle) => true,
                Ok(_) => false,
                Err(error) => {
                    tracing::warn!(queue = %self.queue, %error, "consumer iteration failed");
                    true
                }
            };
            if wait {
                tokio::select! {
                    () = tokio::time::sleep(poll) => {}
                    _ = shutdown.changed() => {}
                }
            }
        }
        tracing::info!(queue = %self.queue, "consumer stopped");
    }
}
