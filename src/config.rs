//! Engine configuration (§6 "Configuration (environment-driven, enumerated)").
//!
//! A plain struct with a `Default` impl matching the documented defaults,
//! an `from_env()` constructor that only overrides fields present in the
//! environment, and a `validate()` that is the single fatal-at-`Start()`
//! path (§7 "Configuration").

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub fast_poll_interval: Duration,
    pub fast_poll_max_duration: Duration,
    pub slow_sweep_interval: Duration,
    pub slow_sweep_buffer: Duration,
    pub slow_sweep_batch_size: i64,
    pub slow_sweep_inter_row_delay: Duration,
    pub lease_stale: Duration,
    pub provider_timeout: Duration,
    pub webhook_timeout: Duration,
    pub retry_initial: Duration,
    pub retry_multiplier: f64,
    pub retry_cap: Duration,
    pub retry_max_attempts: u32,
    pub expiry_window: Duration,
    pub stop_grace_period: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fast_poll_interval: Duration::from_millis(3_000),
            fast_poll_max_duration: Duration::from_millis(900_000),
            slow_sweep_interval: Duration::from_millis(300_000),
            slow_sweep_buffer: Duration::from_millis(60_000),
            slow_sweep_batch_size: 100,
            slow_sweep_inter_row_delay: Duration::from_millis(100),
            lease_stale: Duration::from_millis(60_000),
            provider_timeout: Duration::from_millis(10_000),
            webhook_timeout: Duration::from_millis(8_000),
            retry_initial: Duration::from_millis(1_000),
            retry_multiplier: 2.0,
            retry_cap: Duration::from_millis(30_000),
            retry_max_attempts: 3,
            expiry_window: Duration::from_secs(24 * 60 * 60),
            stop_grace_period: Duration::from_secs(10),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        cfg.fast_poll_interval = env_millis("FAST_POLL_INTERVAL_MS", cfg.fast_poll_interval);
        cfg.fast_poll_max_duration =
            env_millis("FAST_POLL_MAX_DURATION_MS", cfg.fast_poll_max_duration);
        cfg.slow_sweep_interval = env_millis("SLOW_SWEEP_INTERVAL_MS", cfg.slow_sweep_interval);
        cfg.slow_sweep_buffer = env_millis("SLOW_SWEEP_BUFFER_MS", cfg.slow_sweep_buffer);
        cfg.slow_sweep_batch_size = std::env::var("SLOW_SWEEP_BATCH_SIZE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(cfg.slow_sweep_batch_size);
        cfg.slow_sweep_inter_row_delay = env_millis(
            "SLOW_SWEEP_INTER_ROW_DELAY_MS",
            cfg.slow_sweep_inter_row_delay,
        );
        cfg.lease_stale = env_millis("LEASE_STALE_MS", cfg.lease_stale);
        cfg.provider_timeout = env_millis("PROVIDER_TIMEOUT_MS", cfg.provider_timeout);
        cfg.webhook_timeout = env_millis("WEBHOOK_TIMEOUT_MS", cfg.webhook_timeout);
        cfg.retry_initial = env_millis("RETRY_INITIAL_MS", cfg.retry_initial);
        cfg.retry_multiplier = std::env::var("RETRY_MULTIPLIER")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(cfg.retry_multiplier);
        cfg.retry_cap = env_millis("RETRY_CAP_MS", cfg.retry_cap);
        cfg.retry_max_attempts = std::env::var("RETRY_MAX_ATTEMPTS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(cfg.retry_max_attempts);
        cfg.expiry_window = std::env::var("EXPIRY_WINDOW_HOURS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(|h| Duration::from_secs(h * 60 * 60))
            .unwrap_or(cfg.expiry_window);

        cfg
    }

    /// §7 "Configuration" — fatal at `Start()` if invalid.
    pub fn validate(&self) -> Result<(), crate::error::EngineError> {
        if self.slow_sweep_batch_size <= 0 || self.slow_sweep_batch_size > 100 {
            return Err(crate::error::EngineError::Config(format!(
                "slow_sweep_batch_size must be in 1..=100, got {}",
                self.slow_sweep_batch_size
            )));
        }
        if self.retry_max_attempts == 0 {
            return Err(crate::error::EngineError::Config(
                "retry_max_attempts must be at least 1".into(),
            ));
        }
        if self.retry_multiplier < 1.0 {
            return Err(crate::error::EngineError::Config(
                "retry_multiplier must be >= 1.0".into(),
            ));
        }
        Ok(())
    }
}

fn env_millis(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.fast_poll_interval, Duration::from_secs(3));
        assert_eq!(cfg.fast_poll_max_duration, Duration::from_secs(900));
        assert_eq!(cfg.slow_sweep_interval, Duration::from_secs(300));
        assert_eq!(cfg.slow_sweep_batch_size, 100);
        assert_eq!(cfg.lease_stale, Duration::from_secs(60));
        assert_eq!(cfg.retry_max_attempts, 3);
        assert_eq!(cfg.expiry_window, Duration::from_secs(24 * 60 * 60));
    }

    #[test]
    fn validate_rejects_oversized_batch() {
        let mut cfg = EngineConfig::default();
        cfg.slow_sweep_batch_size = 101;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_accepts_defaults() {
        assert!(EngineConfig::default().validate().is_ok());
    }
}
