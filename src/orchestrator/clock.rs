//! Time source for the orchestrator
//!
//! Phase timing, poll intervals and timeouts all go through `Clock`, so tests
//! can drive elapsed time without real delays.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::time::Instant;

#[async_trait]
pub trait Clock: Send + Sync {
    /// Monotonic instant for measuring durations
    fn now(&self) -> Instant;

    /// Calendar time for run timestamps
    fn wall_clock(&self) -> DateTime<Utc>;

    /// Suspend the caller for `duration`
    async fn sleep(&self, duration: Duration);
}

/// Clock backed by the tokio timer.
///
/// Honors `tokio::time::pause`, which is how the tests fast-forward polling.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn wall_clock(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
