//! Clock abstraction (§2 component 1: "monotonic now(), scheduled timers,
//! deterministic under test").
//!
//! `TokioClock` derives wall-clock time from a fixed `(Instant, DateTime<Utc>)`
//! anchor plus `Instant::elapsed()`, using `tokio::time::Instant` rather than
//! `std::time::Instant` — only the tokio type tracks the paused/advanced
//! virtual clock under `#[tokio::test(start_paused = true)]`, so tests can
//! fast-forward through the 15-minute fast-poll window or the 24-hour expiry
//! deadline with `tokio::time::advance` instead of sleeping for real.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::time::Instant;

#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

pub struct TokioClock {
    anchor_instant: Instant,
    anchor_utc: DateTime<Utc>,
}

impl TokioClock {
    pub fn new() -> Self {
        Self {
            anchor_instant: Instant::now(),
            anchor_utc: Utc::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = self.anchor_instant.elapsed();
        self.anchor_utc
            + chrono::Duration::from_std(elapsed).unwrap_or_else(|_| chrono::Duration::zero())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn clock_advances_with_tokio_virtual_time() {
        let clock = TokioClock::new();
        let t0 = clock.now();
        tokio::time::advance(Duration::from_secs(900)).await;
        let t1 = clock.now();
        assert!((t1 - t0).num_seconds() >= 900);
    }
}
