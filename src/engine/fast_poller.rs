//! FastPoller (§4.3) — one cooperative task per transaction.
//!
//! A `select!` loop over a shutdown signal and a fixed tick interval,
//! narrowed to a single transaction rather than a shared ticker. Per §9
//! this runs as a task keyed by `reference` in the engine's poller map; the
//! caller in `engine::mod` removes the map entry once this function
//! returns, following the design note "key removal is authoritative".

use super::confirmation;
use super::context::EngineContext;
use crate::domain::{AuditAction, AuditEvent, TransactionState};
use crate::provider::{ClearanceOutcome, ClearanceQuery};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

pub async fn run(ctx: Arc<EngineContext>, tx_id: Uuid, mut shutdown_rx: watch::Receiver<bool>) {
    let start_instant = Instant::now();

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                debug!(tx_id = %tx_id, "fast poller stopping on shutdown signal");
                return;
            }
            _ = ctx.clock.sleep(ctx.config.fast_poll_interval) => {}
        }

        if *shutdown_rx.borrow() {
            return;
        }

        if start_instant.elapsed() >= ctx.config.fast_poll_max_duration {
            debug!(tx_id = %tx_id, "fast poll window elapsed, handing off to slow sweeper");
            return;
        }

        let tx = match ctx.store.get_by_id(tx_id).await {
            Ok(Some(tx)) => tx,
            Ok(None) => return,
            Err(e) => {
                warn!(tx_id = %tx_id, error = %e, "fast poller could not re-read transaction");
                continue;
            }
        };

        if !matches!(tx.state, TransactionState::Pending | TransactionState::Initialized) {
            return;
        }

        let now = ctx.clock.now();
        let _ = ctx.store.touch_last_check(tx_id, now).await;

        let provider_ref = match &tx.provider_ref {
            Some(r) => r.clone(),
            None => continue,
        };
        let payment_type = tx.payment_type.unwrap_or(crate::domain::PaymentType::Bank);

        let query = ClearanceQuery {
            currency: tx.currency,
            provider_ref,
            payment_type,
        };

        match ctx.provider.check_clearance(&query).await {
            Ok(outcome) => {
                let confirmed = matches!(outcome, ClearanceOutcome::Confirmed);
                if let Err(audit_err) = ctx
                    .audit
                    .record(AuditEvent::new(
                        tx.reference.clone(),
                        AuditAction::ProviderQueryOk,
                        json!({ "outcome": if confirmed { "confirmed" } else { "not_yet" } }),
                        json!({ "phase": "fast" }),
                        now,
                        Uuid::new_v4().to_string(),
                    ))
                    .await
                {
                    warn!(reference = %tx.reference, error = %audit_err, "failed to write PROVIDER_QUERY_OK audit");
                }

                if confirmed {
                    confirmation::confirm(&ctx, tx_id).await;
                    return;
                }
            }
            Err(e) => {
                if let Err(audit_err) = ctx
                    .audit
                    .record(AuditEvent::new(
                        tx.reference.clone(),
                        AuditAction::ProviderQueryFail,
                        json!({ "error": e.to_string() }),
                        json!({ "phase": "fast" }),
                        now,
                        Uuid::new_v4().to_string(),
                    ))
                    .await
                {
                    warn!(reference = %tx.reference, error = %audit_err, "failed to write PROVIDER_QUERY_FAIL audit");
                }
            }
        }
    }
}
