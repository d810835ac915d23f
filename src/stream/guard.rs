//! Bound on consecutive unrecognized frames.

use super::event::TypedEvent;
use crate::error::StreamError;
use tracing::warn;

pub const DEFAULT_EMPTY_MESSAGES_LIMIT: usize = 300;

/// Counts consecutive [`TypedEvent::Unrecognized`] frames and fails once
/// the count goes past `limit`. Any recognized event, `ping` included,
/// resets the count.
#[derive(Debug, Clone)]
pub struct EmptyFrameGuard {
    limit: usize,
    count: usize,
}

impl Default for EmptyFrameGuard {
    fn default() -> Self {
        Self::new(DEFAULT_EMPTY_MESSAGES_LIMIT)
    }
}

impl EmptyFrameGuard {
    pub fn new(limit: usize) -> Self {
        Self { limit, count: 0 }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn observe(&mut self, event: &TypedEvent) -> Result<(), StreamError> {
        if event.is_recognized() {
            self.count = 0;
            return Ok(());
        }
        self.count += 1;
        if self.count > self.limit {
            warn!(
                "Aborting stream after {} consecutive unrecognized frames",
                self.count
            );
            return Err(StreamError::EmptyMessageLimitExceeded { limit: self.limit });
        }
        Ok(())
    }
}
