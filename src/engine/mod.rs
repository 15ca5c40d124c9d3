//! `VerificationEngine` (§2 component 6, §4.1) — the public surface.
//!
//! Composition happens at construction time per §9: the engine owns its
//! five collaborators through one `Arc<EngineContext>`, cloned into every
//! spawned task. The poller map is the authoritative record of "is a
//! FastPoller running for this reference" (§9 design note); removal from
//! the map, not any flag, is what "task ended" means.

mod confirmation;
mod context;
mod fast_poller;
mod slow_sweeper;
pub mod stats;

pub use context::EngineContext;
pub use stats::EngineStatsSnapshot;

use crate::audit::AuditLog;
use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::domain::{AuditAction, AuditEvent, Currency, PaymentType, Transaction};
use crate::error::{EngineError, ValidationError};
use crate::notify::NotifySink;
use crate::provider::ProviderClient;
use crate::store::{StartVerificationInput, StartVerificationOutcome, TxStore};
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// §4.1 `StartVerification` input payload.
#[derive(Debug, Clone)]
pub struct StartVerificationPayload {
    pub sender_name: Option<String>,
    pub sender_phone: Option<String>,
    pub sender_email: Option<String>,
    pub currency: Currency,
    pub provider_tx_id: String,
    pub payment_type: PaymentType,
    pub amount: BigDecimal,
    pub success_url: Option<String>,
    pub payment_link_id: Uuid,
}

/// §4.1's `{phase, pollInterval, maxDuration}` descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct VerificationSchedule {
    pub phase: &'static str,
    pub poll_interval: Duration,
    pub max_duration: Duration,
}

/// §4.1's `GetStatus` read model.
#[derive(Debug, Clone)]
pub struct StatusSnapshot {
    pub state: crate::domain::TransactionState,
    pub amount: BigDecimal,
    pub currency: Currency,
    pub provider_ref: Option<String>,
    pub sender_name: Option<String>,
    pub sender_email: Option<String>,
    pub sender_phone: Option<String>,
    pub verification_started_at: Option<DateTime<Utc>>,
    pub last_verification_check: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
}

impl From<Transaction> for StatusSnapshot {
    fn from(tx: Transaction) -> Self {
        Self {
            state: tx.state,
            amount: tx.amount,
            currency: tx.currency,
            provider_ref: tx.provider_ref,
            sender_name: tx.payer.name,
            sender_email: tx.payer.email,
            sender_phone: tx.payer.phone,
            verification_started_at: tx.verification_started_at,
            last_verification_check: tx.last_verification_check,
            expires_at: tx.expires_at,
        }
    }
}

struct EngineRuntime {
    pollers: Mutex<HashMap<String, JoinHandle<()>>>,
    slow_sweeper: Mutex<Option<JoinHandle<()>>>,
    shutdown_tx: watch::Sender<bool>,
}

pub struct VerificationEngine {
    ctx: Arc<EngineContext>,
    runtime: Arc<EngineRuntime>,
}

impl Clone for VerificationEngine {
    fn clone(&self) -> Self {
        Self {
            ctx: self.ctx.clone(),
            runtime: self.runtime.clone(),
        }
    }
}

impl VerificationEngine {
    pub fn new(
        clock: Arc<dyn Clock>,
        store: Arc<dyn TxStore>,
        provider: Arc<dyn ProviderClient>,
        notify: Arc<dyn NotifySink>,
        audit: Arc<dyn AuditLog>,
        config: EngineConfig,
        engine_id: impl Into<String>,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            ctx: Arc::new(EngineContext {
                clock,
                store,
                provider,
                notify,
                audit,
                config,
                engine_id: engine_id.into(),
                stats: stats::EngineStats::new(),
            }),
            runtime: Arc::new(EngineRuntime {
                pollers: Mutex::new(HashMap::new()),
                slow_sweeper: Mutex::new(None),
                shutdown_tx,
            }),
        }
    }

    /// Crash-recovery sweep (§4.6) then starts the SlowSweeper ticker
    /// (§4.4). Fatal config errors (§7 "Configuration") abort before either
    /// runs.
    #[instrument(skip(self), fields(engine_id = %self.ctx.engine_id))]
    pub async fn start(&self) -> Result<(), EngineError> {
        self.ctx.config.validate()?;

        let now = self.ctx.clock.now();
        let stale_before = now
            - chrono::Duration::from_std(self.ctx.config.lease_stale).unwrap_or_default();
        match self.ctx.store.clear_stale_leases(now, stale_before).await {
            Ok(reclaimed) => {
                for tx in &reclaimed {
                    if let Err(e) = self
                        .ctx
                        .audit
                        .record(AuditEvent::new(
                            tx.reference.clone(),
                            AuditAction::LeaseStolen,
                            json!({ "previousOwner": tx.processing_owner }),
                            json!({}),
                            now,
                            Uuid::new_v4().to_string(),
                        ))
                        .await
                    {
                        warn!(reference = %tx.reference, error = %e, "failed to write LEASE_STOLEN audit");
                    }
                }
                info!(reclaimed = reclaimed.len(), "crash recovery sweep complete");
            }
            Err(e) => {
                warn!(error = %e, "crash recovery sweep failed to query stale leases");
            }
        }

        let shutdown_rx = self.runtime.shutdown_tx.subscribe();
        let ctx = self.ctx.clone();
        let handle = tokio::spawn(slow_sweeper::run(ctx, shutdown_rx));
        *self.runtime.slow_sweeper.lock().unwrap() = Some(handle);

        self.ctx.stats.mark_started(now);
        Ok(())
    }

    /// Signals shutdown, waits up to `stopGracePeriod` for in-flight tasks,
    /// then returns. Anything still running past the grace period is
    /// abandoned; its lease is reclaimed by the next `start()`'s staleness
    /// sweep (§5 "Cancellation & timeouts").
    pub async fn stop(&self) -> Result<(), EngineError> {
        let _ = self.runtime.shutdown_tx.send(true);

        let handles: Vec<JoinHandle<()>> = {
            let mut pollers = self.runtime.pollers.lock().unwrap();
            pollers.drain().map(|(_, h)| h).collect()
        };
        let sweeper = self.runtime.slow_sweeper.lock().unwrap().take();

        let grace = self.ctx.config.stop_grace_period;
        let _ = tokio::time::timeout(grace, futures::future::join_all(handles)).await;
        if let Some(sweeper) = sweeper {
            let _ = tokio::time::timeout(grace, sweeper).await;
        }

        self.ctx.stats.mark_stopped();
        Ok(())
    }

    /// §4.1 `StartVerification`. Idempotent: a reference with an
    /// already-running poller (or an already-stamped
    /// `verificationStartedAt`) returns the existing descriptor instead of
    /// spawning a second task.
    #[instrument(skip(self, payload), fields(reference = %reference))]
    pub async fn start_verification(
        &self,
        reference: &str,
        payload: StartVerificationPayload,
    ) -> Result<VerificationSchedule, EngineError> {
        let now = self.ctx.clock.now();
        let input = StartVerificationInput {
            sender_name: payload.sender_name,
            sender_phone: payload.sender_phone,
            sender_email: payload.sender_email,
            currency: payload.currency,
            provider_tx_id: payload.provider_tx_id,
            payment_type: payload.payment_type,
            amount: payload.amount,
            success_url: payload.success_url,
        };

        let outcome = self.ctx.store.start_verification(reference, input, now).await?;

        match outcome {
            StartVerificationOutcome::Started(tx) => {
                if let Err(e) = self
                    .ctx
                    .audit
                    .record(AuditEvent::new(
                        tx.reference.clone(),
                        AuditAction::VerificationStarted,
                        json!({ "providerRef": tx.provider_ref }),
                        json!({}),
                        now,
                        Uuid::new_v4().to_string(),
                    ))
                    .await
                {
                    warn!(reference = %tx.reference, error = %e, "failed to write VERIFICATION_STARTED audit");
                }
                self.spawn_fast_poller_if_absent(&tx);
            }
            StartVerificationOutcome::AlreadyStarted(_) => {}
            StartVerificationOutcome::NotFound => {
                return Err(ValidationError::NotFound {
                    reference: reference.to_string(),
                }
                .into());
            }
            StartVerificationOutcome::InvalidState(state) => {
                return Err(ValidationError::InvalidState {
                    reference: reference.to_string(),
                    state: state.as_str().to_string(),
                }
                .into());
            }
            StartVerificationOutcome::CurrencyMismatch { expected, actual } => {
                return Err(ValidationError::CurrencyMismatch {
                    expected: expected.as_str().to_string(),
                    actual: actual.as_str().to_string(),
                }
                .into());
            }
            StartVerificationOutcome::AmountMismatch { expected, actual } => {
                return Err(ValidationError::AmountMismatch {
                    expected: expected.to_string(),
                    actual: actual.to_string(),
                }
                .into());
            }
        };

        Ok(VerificationSchedule {
            phase: "immediate",
            poll_interval: self.ctx.config.fast_poll_interval,
            max_duration: self.ctx.config.fast_poll_max_duration,
        })
    }

    /// §4.1 `GetStatus`. Read-only.
    pub async fn get_status(&self, reference: &str) -> Result<StatusSnapshot, EngineError> {
        let tx = self
            .ctx
            .store
            .get_by_reference(reference)
            .await?
            .ok_or_else(|| ValidationError::NotFound {
                reference: reference.to_string(),
            })?;
        Ok(tx.into())
    }

    pub fn stats(&self) -> EngineStatsSnapshot {
        self.ctx.stats.snapshot(self.ctx.clock.now())
    }

    fn spawn_fast_poller_if_absent(&self, tx: &Transaction) {
        let mut pollers = self.runtime.pollers.lock().unwrap();
        if pollers.contains_key(&tx.reference) {
            return;
        }

        let ctx = self.ctx.clone();
        let tx_id = tx.id;
        let reference = tx.reference.clone();
        let shutdown_rx = self.runtime.shutdown_tx.subscribe();
        let runtime = self.runtime.clone();
        let reference_for_cleanup = reference.clone();

        let handle = tokio::spawn(async move {
            fast_poller::run(ctx, tx_id, shutdown_rx).await;
            runtime.pollers.lock().unwrap().remove(&reference_for_cleanup);
        });

        pollers.insert(reference, handle);
    }
}
