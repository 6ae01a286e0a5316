//! Retry budget applied beneath a single logical probe

use std::time::Duration;

pub const RETRY_TOTAL: u32 = 3;
pub const RETRY_BACKOFF_FACTOR: Duration = Duration::from_secs(1);
pub const RETRY_BACKOFF_MAX: Duration = Duration::from_secs(120);
pub const RETRY_STATUS_CODES: [u16; 5] = [429, 500, 502, 503, 504];

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub backoff_factor: Duration,
    pub max_backoff: Duration,
    pub retry_on_status: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: RETRY_TOTAL,
            backoff_factor: RETRY_BACKOFF_FACTOR,
            max_backoff: RETRY_BACKOFF_MAX,
            retry_on_status: RETRY_STATUS_CODES.to_vec(),
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Same statuses as the default, with a custom budget and factor.
    pub fn exponential(max_retries: u32, backoff_factor: Duration) -> Self {
        Self {
            max_retries,
            backoff_factor,
            ..Self::default()
        }
    }

    pub fn should_retry_status(&self, status: u16) -> bool {
        self.retry_on_status.contains(&status)
    }

    /// Whether another attempt is allowed after `retries_done` retries.
    pub fn has_budget(&self, retries_done: u32) -> bool {
        retries_done < self.max_retries
    }

    /// Delay before retry number `retry` (1-based).
    ///
    /// The first retry is immediate, later ones wait `factor * 2^(retry - 1)`
    /// up to `max_backoff`.
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        if retry <= 1 {
            return Duration::ZERO;
        }
        let multiplier = 2f64.powi(retry as i32 - 1);
        let delay = Duration::from_secs_f64(self.backoff_factor.as_secs_f64() * multiplier);
        delay.min(self.max_backoff)
    }
}
