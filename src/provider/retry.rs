//! Exponential backoff wrapper around any `ProviderClient` (§4.7, §6 retry
//! knobs).
//!
//! A `loop` around a single attempt, retrying only the transient case and
//! giving up once `retry_max_attempts` is spent, with `retry`/`backoff_ms`
//! fields logged on every retry.

use super::{ClearanceOutcome, ClearanceQuery, ProviderClient};
use crate::error::ProviderError;
use async_trait::async_trait;
use std::time::Duration;
use tracing::warn;

pub struct RetryingProviderClient<C> {
    inner: C,
    initial: Duration,
    multiplier: f64,
    cap: Duration,
    max_attempts: u32,
}

impl<C> RetryingProviderClient<C> {
    pub fn new(inner: C, initial: Duration, multiplier: f64, cap: Duration, max_attempts: u32) -> Self {
        Self {
            inner,
            initial,
            multiplier,
            cap,
            max_attempts,
        }
    }

    fn backoff_for(&self, attempt: u32) -> Duration {
        let millis = self.initial.as_millis() as f64 * self.multiplier.powi(attempt as i32);
        let capped = millis.min(self.cap.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }
}

#[async_trait]
impl<C: ProviderClient> ProviderClient for RetryingProviderClient<C> {
    async fn check_clearance(&self, query: &ClearanceQuery) -> Result<ClearanceOutcome, ProviderError> {
        let mut attempt = 0;
        loop {
            match self.inner.check_clearance(query).await {
                Ok(outcome) => return Ok(outcome),
                Err(e) if is_transient(&e) && attempt + 1 < self.max_attempts => {
                    let backoff = self.backoff_for(attempt);
                    warn!(
                        provider_ref = %query.provider_ref,
                        retry = attempt + 1,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "transient provider error, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn is_transient(e: &ProviderError) -> bool {
    matches!(e, ProviderError::Network(_) | ProviderError::Timeout)
}
