//! Retry policy for transient engine failures

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Bounded exponential backoff.
///
/// Retry `n` (1-based) waits `initial_backoff * backoff_multiplier^(n-1)`,
/// capped at `max_backoff`, plus up to 10% random jitter when enabled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_retries: u32,
    #[serde(with = "humantime_serde")]
    pub initial_backoff: Duration,
    pub backoff_multiplier: f64,
    #[serde(with = "humantime_serde")]
    pub max_backoff: Duration,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_secs(1),
            backoff_multiplier: 2.0,
            max_backoff: Duration::from_secs(30),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// No retries at all
    pub fn none() -> Self {
        Self { max_retries: 0, ..Self::default() }
    }

    /// Delay before retry number `attempt` (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let base_ms = self.initial_backoff.as_millis() as f64 * self.backoff_multiplier.max(1.0).powi(exponent);
        let cap_ms = self.max_backoff.as_millis() as f64;
        let mut delay_ms = base_ms.min(cap_ms);

        if self.jitter && delay_ms > 0.0 {
            delay_ms += rand::random::<f64>() * delay_ms * 0.1;
            delay_ms = delay_ms.min(cap_ms);
        }

        Duration::from_millis(delay_ms as u64)
    }
}
