//! Core projection trait and position tracking.

use async_trait::async_trait;
use messaging::Envelope;

use crate::Result;

/// How far into the published-message log a projection has read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProjectionPosition {
    /// Number of logged messages seen, handled or skipped.
    pub messages_processed: u64,
}

impl ProjectionPosition {
    /// Creates a new position at zero.
    pub fn zero() -> Self {
        Self {
            messages_processed: 0,
        }
    }

    /// Advances the position by one message.
    pub fn advance(&self) -> Self {
        Self {
            messages_processed: self.messages_processed + 1,
        }
    }

    /// Offset into the log of the next message to read.
    pub fn offset(&self) -> usize {
        self.messages_processed as usize
    }
}

impl std::fmt::Display for ProjectionPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "position({})", self.messages_processed)
    }
}

/// A projection that folds published messages into a read model.
///
/// Every message handed to `handle` must advance the position, including
/// messages the projection has no interest in. Otherwise catch-up would
/// deliver them again.
#[async_trait]
pub trait Projection: Send + Sync {
    /// Returns the name of this projection.
    fn name(&self) -> &'static str;

    /// Handles a single message, updating the projection's read model.
    async fn handle(&self, envelope: &Envelope) -> Result<()>;

    /// Returns the current position of this projection.
    async fn position(&self) -> ProjectionPosition;

    /// Resets the projection to its initial state.
    async fn reset(&self) -> Result<()>;
}
