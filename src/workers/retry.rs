use crate::common::error::PipelineError;
use std::time::Duration;

/// Longest a message waits between two attempts.
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(300);

/// How a delivery is settled once its handler has run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Remove from the queue.
    Ack,
    /// Republish as the next attempt, visible again after the delay, then
    /// remove the original.
    Retry(Duration),
    /// Reject without requeue so the broker moves it to the dead-letter queue.
    DeadLetter,
}

/// Bounds redelivery of transiently failing messages and spaces the
/// attempts with capped exponential back-off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    pub fn disposition(&self, error: &PipelineError, attempt: u32) -> Disposition {
        if !error.is_retryable() || attempt >= self.max_attempts {
            Disposition::DeadLetter
        } else {
            Disposition::Retry(self.delay_after(attempt))
        }
    }

    /// Wait before the attempt following `attempt`: the base delay doubled
    /// once per earlier attempt.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(MAX_RETRY_DELAY)
            .min(MAX_RETRY_DELAY)
    }
}
