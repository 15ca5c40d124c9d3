//! SlowSweeper & ExpirySweeper (§4.4, §4.6) — one ticker per engine
//! instance.
//!
//! A `tokio::select!` ticker/shutdown loop whose batch body follows the
//! usual "query a bounded batch, loop sequentially, mutate one row at a
//! time" shape.

use super::confirmation;
use super::context::EngineContext;
use crate::domain::{AuditAction, AuditEvent};
use crate::provider::{ClearanceOutcome, ClearanceQuery};
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub async fn run(ctx: Arc<EngineContext>, mut shutdown_rx: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(ctx.config.slow_sweep_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let busy = Arc::new(AtomicBool::new(false));

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                debug!("slow sweeper stopping on shutdown signal");
                return;
            }
            _ = ticker.tick() => {
                if busy.swap(true, Ordering::SeqCst) {
                    warn!("slow sweeper tick coalesced: previous tick still running");
                    continue;
                }
                let ctx = ctx.clone();
                let busy = busy.clone();
                let mut shutdown_rx = shutdown_rx.clone();
                tokio::spawn(async move {
                    run_one_tick(&ctx, &mut shutdown_rx).await;
                    busy.store(false, Ordering::SeqCst);
                });
            }
        }
    }
}

async fn run_one_tick(ctx: &EngineContext, shutdown_rx: &mut watch::Receiver<bool>) {
    let tick_start = ctx.clock.now();
    let mut processed = 0u64;
    let mut errors = 0u64;

    let now = ctx.clock.now();
    let started_before = now - chrono::Duration::from_std(ctx.config.fast_poll_max_duration + ctx.config.slow_sweep_buffer).unwrap_or_default();
    let checked_before = now - chrono::Duration::from_std(ctx.config.slow_sweep_interval).unwrap_or_default();
    let stale_before = now - chrono::Duration::from_std(ctx.config.lease_stale).unwrap_or_default();

    let batch = match ctx
        .store
        .query_slow_sweep_batch(now, started_before, checked_before, stale_before, ctx.config.slow_sweep_batch_size)
        .await
    {
        Ok(batch) => batch,
        Err(e) => {
            warn!(error = %e, "slow sweeper batch query failed, aborting this tick");
            ctx.stats.record_tick(ctx.clock.now(), elapsed_ms(&ctx, tick_start), 0, 1);
            return;
        }
    };

    info!(batch_size = batch.len(), "slow sweeper batch starting");

    for tx in batch {
        if *shutdown_rx.borrow() {
            break;
        }

        let now = ctx.clock.now();
        let stale_before = now - chrono::Duration::from_std(ctx.config.lease_stale).unwrap_or_default();

        let leased = match ctx.store.acquire_lease(tx.id, &ctx.engine_id, now, stale_before).await {
            Ok(Some(tx)) => tx,
            Ok(None) => continue,
            Err(e) => {
                warn!(reference = %tx.reference, error = %e, "lease acquisition failed");
                errors += 1;
                continue;
            }
        };

        if let Err(e) = ctx
            .audit
            .record(AuditEvent::new(
                leased.reference.clone(),
                AuditAction::LeaseAcquired,
                json!({ "owner": ctx.engine_id }),
                json!({}),
                now,
                Uuid::new_v4().to_string(),
            ))
            .await
        {
            warn!(reference = %leased.reference, error = %e, "failed to write LEASE_ACQUIRED audit");
        }

        let provider_ref = match &leased.provider_ref {
            Some(r) => r.clone(),
            None => {
                let _ = ctx.store.release_lease(leased.id, &ctx.engine_id).await;
                continue;
            }
        };
        let payment_type = leased.payment_type.unwrap_or(crate::domain::PaymentType::Bank);

        let query = ClearanceQuery {
            currency: leased.currency,
            provider_ref,
            payment_type,
        };

        match ctx.provider.check_clearance(&query).await {
            Ok(outcome) => {
                let confirmed = matches!(outcome, ClearanceOutcome::Confirmed);
                if let Err(audit_err) = ctx
                    .audit
                    .record(AuditEvent::new(
                        leased.reference.clone(),
                        AuditAction::ProviderQueryOk,
                        json!({ "outcome": if confirmed { "confirmed" } else { "not_yet" } }),
                        json!({ "phase": "slow" }),
                        ctx.clock.now(),
                        Uuid::new_v4().to_string(),
                    ))
                    .await
                {
                    warn!(reference = %leased.reference, error = %audit_err, "failed to write PROVIDER_QUERY_OK audit");
                }

                if confirmed {
                    confirmation::confirm(ctx, leased.id).await;
                } else {
                    release_lease_and_audit(ctx, &leased.reference, leased.id).await;
                }
                processed += 1;
            }
            Err(e) => {
                if let Err(audit_err) = ctx
                    .audit
                    .record(AuditEvent::new(
                        leased.reference.clone(),
                        AuditAction::ProviderQueryFail,
                        json!({ "error": e.to_string() }),
                        json!({ "phase": "slow" }),
                        ctx.clock.now(),
                        Uuid::new_v4().to_string(),
                    ))
                    .await
                {
                    warn!(reference = %leased.reference, error = %audit_err, "failed to write PROVIDER_QUERY_FAIL audit");
                }
                release_lease_and_audit(ctx, &leased.reference, leased.id).await;
                errors += 1;
            }
        }

        ctx.clock.sleep(ctx.config.slow_sweep_inter_row_delay).await;
    }

    run_expiry_sweep(ctx).await;

    ctx.stats
        .record_tick(ctx.clock.now(), elapsed_ms(ctx, tick_start), processed, errors);
}

async fn release_lease_and_audit(ctx: &EngineContext, reference: &str, tx_id: Uuid) {
    if let Err(e) = ctx.store.release_lease(tx_id, &ctx.engine_id).await {
        warn!(reference = %reference, error = %e, "failed to release lease");
        return;
    }
    if let Err(e) = ctx
        .audit
        .record(AuditEvent::new(
            reference.to_string(),
            AuditAction::LeaseReleased,
            json!({ "owner": ctx.engine_id }),
            json!({}),
            ctx.clock.now(),
            Uuid::new_v4().to_string(),
        ))
        .await
    {
        warn!(reference = %reference, error = %e, "failed to write LEASE_RELEASED audit");
    }
}

async fn run_expiry_sweep(ctx: &EngineContext) {
    let now = ctx.clock.now();
    let expired = match ctx.store.query_expired(now, ctx.config.slow_sweep_batch_size).await {
        Ok(rows) => rows,
        Err(e) => {
            warn!(error = %e, "expiry sweep query failed");
            return;
        }
    };

    info!(expired_count = expired.len(), "expiry sweep starting");

    for tx in expired {
        confirmation::expire(ctx, tx.id).await;
    }
}

fn elapsed_ms(ctx: &EngineContext, tick_start: chrono::DateTime<chrono::Utc>) -> u64 {
    (ctx.clock.now() - tick_start).num_milliseconds().max(0) as u64
}
