//! Exponential backoff with jitter between upstream retry rounds.

use std::time::Duration;
use rand::Rng;

use crate::config::RetryConfig;

/// Delay schedule derived from [`RetryConfig`].
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    base_ms: u64,
    max_ms: u64,
}

impl BackoffPolicy {
    pub fn new(base_ms: u64, max_ms: u64) -> Self {
        Self { base_ms, max_ms: max_ms.max(base_ms) }
    }

    /// Delay to wait after `round` (1-based) failed.
    pub fn delay(&self, round: u32) -> Duration {
        calculate_backoff(round, self.base_ms, self.max_ms)
    }
}

impl From<&RetryConfig> for BackoffPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self::new(config.base_delay_ms, config.max_delay_ms)
    }
}

/// Calculate exponential backoff delay with up to 10% jitter on top.
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let exponent = (attempt - 1).min(32);
    let capped = base_ms.saturating_mul(1u64 << exponent).min(max_ms);

    let jitter_range = capped / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped + jitter)
}
