//! Projection processor for feeding logged messages to projections.

use futures_util::StreamExt;
use messaging::{Envelope, MessageLog};
use tokio::sync::Mutex;

use crate::Result;
use crate::projection::Projection;

/// Tails the bus's published-message log and delivers each message to the
/// registered projections.
///
/// The processor supports:
/// - Catch-up: reads the log from the slowest projection's position onward
/// - Single message delivery: hands one envelope to every projection
/// - Rebuild: resets all projections and replays the log from the start
///
/// Catch-up and rebuild never overlap, so a message is handed to each
/// projection once even when several readers trigger catch-up at the same time.
pub struct ProjectionProcessor<L: MessageLog> {
    log: L,
    projections: Vec<Box<dyn Projection>>,
    catch_up: Mutex<()>,
}

impl<L: MessageLog> ProjectionProcessor<L> {
    /// Creates a new processor over the given message log.
    pub fn new(log: L) -> Self {
        Self {
            log,
            projections: Vec::new(),
            catch_up: Mutex::new(()),
        }
    }

    /// Registers a projection with this processor.
    pub fn register(&mut self, projection: Box<dyn Projection>) {
        self.projections.push(projection);
    }

    /// Returns the number of registered projections.
    pub fn projection_count(&self) -> usize {
        self.projections.len()
    }

    /// Streams the log from the lowest position any projection has reached
    /// and delivers each message to the projections that have not seen it.
    ///
    /// Returns the number of log entries read.
    #[tracing::instrument(skip(self))]
    pub async fn run_catch_up(&self) -> Result<u64> {
        let _guard = self.catch_up.lock().await;
        self.catch_up_from_positions().await
    }

    async fn catch_up_from_positions(&self) -> Result<u64> {
        let mut start = u64::MAX;
        for projection in &self.projections {
            start = start.min(projection.position().await.messages_processed);
        }
        if start == u64::MAX {
            return Ok(0);
        }

        let mut stream = self.log.stream_published(start as usize).await?;
        let mut log_index = start;
        let mut read = 0;

        while let Some(result) = stream.next().await {
            let envelope = result?;
            log_index += 1;
            read += 1;

            for projection in &self.projections {
                let pos = projection.position().await;
                if pos.messages_processed < log_index {
                    projection.handle(&envelope).await?;
                    metrics::counter!("projections_messages_processed", "projection" => projection.name())
                        .increment(1);
                }
            }
        }

        if read > 0 {
            tracing::debug!(from = start, messages_read = read, "catch-up complete");
        }

        Ok(read)
    }

    /// Delivers a single message to all registered projections.
    #[tracing::instrument(skip(self, envelope), fields(event_type = %envelope.event_type))]
    pub async fn process_event(&self, envelope: &Envelope) -> Result<()> {
        for projection in &self.projections {
            projection.handle(envelope).await?;
        }
        Ok(())
    }

    /// Resets all projections and replays the whole log.
    #[tracing::instrument(skip(self))]
    pub async fn rebuild_all(&self) -> Result<u64> {
        let _guard = self.catch_up.lock().await;
        for projection in &self.projections {
            projection.reset().await?;
        }
        let read = self.catch_up_from_positions().await?;
        tracing::info!(messages_read = read, "projections rebuilt");
        Ok(read)
    }
}
