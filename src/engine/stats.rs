//! `Stats()` (§6: `{runs, processed, errors, uptime, lastRunAt,
//! lastRunDurationMs, isRunning}`).
//!
//! No metrics crate in the dependency stack for this domain, so the worker
//! loop's counters are exposed as a plain snapshot struct instead of a
//! `metrics::counter!`/`metrics::gauge!` surface.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Mutex;

#[derive(Debug, Clone)]
pub struct EngineStatsSnapshot {
    pub runs: u64,
    pub processed: u64,
    pub errors: u64,
    pub uptime_secs: i64,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_run_duration_ms: u64,
    pub is_running: bool,
}

pub struct EngineStats {
    runs: AtomicU64,
    processed: AtomicU64,
    errors: AtomicU64,
    last_run_at: AtomicI64,
    last_run_duration_ms: AtomicU64,
    is_running: AtomicBool,
    started_at: Mutex<Option<DateTime<Utc>>>,
}

impl EngineStats {
    pub fn new() -> Self {
        Self {
            runs: AtomicU64::new(0),
            processed: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            last_run_at: AtomicI64::new(0),
            last_run_duration_ms: AtomicU64::new(0),
            is_running: AtomicBool::new(false),
            started_at: Mutex::new(None),
        }
    }

    pub fn mark_started(&self, now: DateTime<Utc>) {
        self.is_running.store(true, Ordering::SeqCst);
        *self.started_at.lock().unwrap() = Some(now);
    }

    pub fn mark_stopped(&self) {
        self.is_running.store(false, Ordering::SeqCst);
    }

    pub fn record_tick(&self, now: DateTime<Utc>, duration_ms: u64, processed: u64, errors: u64) {
        self.runs.fetch_add(1, Ordering::SeqCst);
        self.processed.fetch_add(processed, Ordering::SeqCst);
        self.errors.fetch_add(errors, Ordering::SeqCst);
        self.last_run_at.store(now.timestamp_millis(), Ordering::SeqCst);
        self.last_run_duration_ms.store(duration_ms, Ordering::SeqCst);
    }

    pub fn snapshot(&self, now: DateTime<Utc>) -> EngineStatsSnapshot {
        let started_at = *self.started_at.lock().unwrap();
        let uptime_secs = started_at.map(|s| (now - s).num_seconds()).unwrap_or(0);
        let last_run_millis = self.last_run_at.load(Ordering::SeqCst);
        let last_run_at = if last_run_millis == 0 {
            None
        } else {
            DateTime::from_timestamp_millis(last_run_millis)
        };
        EngineStatsSnapshot {
            runs: self.runs.load(Ordering::SeqCst),
            processed: self.processed.load(Ordering::SeqCst),
            errors: self.errors.load(Ordering::SeqCst),
            uptime_secs,
            last_run_at,
            last_run_duration_ms: self.last_run_duration_ms.load(Ordering::SeqCst),
            is_running: self.is_running.load(Ordering::SeqCst),
        }
    }
}

impl Default for EngineStats {
    fn default() -> Self {
        Self::new()
    }
}
