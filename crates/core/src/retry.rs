//! Bounded-count, fixed-delay retry policy.
//!
//! One policy instance is shared by the bootstrap and reconnect paths of a
//! session episode: the counter increments on each retryable failure
//! regardless of which path failed, resets on any success, and turns
//! terminal once the bound is exceeded. The delay is fixed, not
//! exponential.

use std::time::Duration;

/// Default maximum number of retryable failures per episode.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default fixed delay before a retry attempt.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// What to do after a retryable failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Schedule another attempt after the given delay.
    RetryAfter(Duration),
    /// The bound is exhausted; treat the failure as terminal.
    GiveUp,
}

/// Retry counter shared across bootstrap and reconnect attempts.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    delay: Duration,
    attempts: u32,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, delay: Duration) -> Self {
        Self {
            max_retries,
            delay,
            attempts: 0,
        }
    }

    /// Records a retryable failure and decides whether to try again.
    pub fn next_attempt(&mut self) -> RetryDecision {
        if self.attempts < self.max_retries {
            self.attempts += 1;
            RetryDecision::RetryAfter(self.delay)
        } else {
            RetryDecision::GiveUp
        }
    }

    /// Resets the counter after any success.
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    /// Number of retryable failures recorded since the last reset.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY)
    }
}
