//! Bounded retry policy for outbound notifications.

use std::time::Duration;

/// Backoff strategy between delivery attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackoffStrategy {
    /// Same delay before every retry
    Fixed,
    /// base * 2^(retry - 1), capped at `max_delay`
    #[default]
    Exponential,
}

/// How many times a failed delivery is retried, and how long to wait between tries.
///
/// The default performs no retries: a failed delivery is logged and dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt (0 = deliver once)
    pub max_retries: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    pub strategy: BackoffStrategy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::no_retry()
    }
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            strategy: BackoffStrategy::Exponential,
        }
    }

    pub fn fixed(max_retries: u32, delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay: delay,
            max_delay: delay,
            strategy: BackoffStrategy::Fixed,
        }
    }

    pub fn exponential(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay,
            strategy: BackoffStrategy::Exponential,
        }
    }

    /// Delay before retry number `retry` (1-indexed). Zero for `retry == 0`.
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }

        let delay = match self.strategy {
            BackoffStrategy::Fixed => self.base_delay,
            BackoffStrategy::Exponential => {
                let factor = 2u32.saturating_pow(retry - 1);
                self.base_delay.saturating_mul(factor)
            }
        };
        delay.min(self.max_delay)
    }

    /// Whether another retry is allowed after `retries_done` retries.
    pub fn should_retry(&self, retries_done: u32) -> bool {
        retries_done < self.max_retries
    }
}
