//! ConfirmationHandler & expiry handler (§4.5, §4.6 ExpirySweeper).
//!
//! Both handlers share the same shape: one CAS, one audit, at most one
//! email, at most one webhook for confirmation (none for expiry). The CAS
//! result being `None` means the row was no longer in a live state when this
//! attempt ran — either another owner already drove it to PAID/PAYOUT_FAILED
//! first, or it wasn't found at all. Per §4.2 that's a rejected transition
//! and gets a `STATE_TRANSITION_REJECTED` audit rather than being
//! swallowed; it is still not an error, since the winning attempt (if any)
//! already recorded its own `PAYMENT_CONFIRMED`/`TRANSACTION_EXPIRED`.

use super::context::EngineContext;
use crate::domain::{AuditAction, AuditEvent};
use crate::notify::{EmailKind, WebhookOutcome, WebhookPayload};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

/// Runs the full §4.5 algorithm for one transaction once the provider has
/// reported it cleared. Safe to call from both FastPoller and SlowSweeper.
pub async fn confirm(ctx: &EngineContext, tx_id: Uuid) {
    let now = ctx.clock.now();
    let correlation_id = Uuid::new_v4().to_string();

    let tx = match ctx.store.confirm_payment(tx_id, now).await {
        Ok(Some(tx)) => tx,
        Ok(None) => {
            record_rejected_transition(ctx, tx_id, "paid", now, &correlation_id).await;
            return;
        }
        Err(e) => {
            warn!(tx_id = %tx_id, error = %e, "confirm_payment store call failed");
            return;
        }
    };

    info!(reference = %tx.reference, "payment confirmed");

    if let Err(e) = ctx
        .audit
        .record(AuditEvent::new(
            tx.reference.clone(),
            AuditAction::PaymentConfirmed,
            json!({ "state": "paid", "paidAt": tx.paid_at }),
            json!({}),
            now,
            correlation_id.clone(),
        ))
        .await
    {
        warn!(reference = %tx.reference, error = %e, "failed to write PAYMENT_CONFIRMED audit");
    }

    if tx.payer.email.is_some() {
        match ctx.notify.email(EmailKind::Confirm, &tx).await {
            Ok(()) => {
                record_audit(
                    ctx,
                    &tx.reference,
                    AuditAction::EmailSent,
                    json!({ "kind": "confirm" }),
                    now,
                    &correlation_id,
                )
                .await;
            }
            Err(e) => {
                record_audit(
                    ctx,
                    &tx.reference,
                    AuditAction::EmailFailed,
                    json!({ "kind": "confirm", "error": e.to_string() }),
                    now,
                    &correlation_id,
                )
                .await;
            }
        }
    }

    if let Some(url) = tx.success_url.clone() {
        let payload = WebhookPayload::for_confirmation(&tx, now);
        match ctx.notify.webhook(&url, &payload).await {
            WebhookOutcome::Sent => {
                record_audit(
                    ctx,
                    &tx.reference,
                    AuditAction::WebhookSent,
                    json!({ "url": url }),
                    now,
                    &correlation_id,
                )
                .await;
            }
            WebhookOutcome::Failed { status, error } => {
                record_audit(
                    ctx,
                    &tx.reference,
                    AuditAction::WebhookFailed,
                    json!({ "url": url, "status": status, "error": error }),
                    now,
                    &correlation_id,
                )
                .await;
            }
        }
    }
}

/// Runs the §4.6 ExpirySweeper algorithm for one transaction.
pub async fn expire(ctx: &EngineContext, tx_id: Uuid) {
    let now = ctx.clock.now();
    let correlation_id = Uuid::new_v4().to_string();

    let tx = match ctx.store.expire(tx_id, now).await {
        Ok(Some(tx)) => tx,
        Ok(None) => {
            record_rejected_transition(ctx, tx_id, "payout_failed", now, &correlation_id).await;
            return;
        }
        Err(e) => {
            warn!(tx_id = %tx_id, error = %e, "expire store call failed");
            return;
        }
    };

    info!(reference = %tx.reference, "transaction expired");

    record_audit(
        ctx,
        &tx.reference,
        AuditAction::TransactionExpired,
        json!({ "state": "payout_failed", "expiresAt": tx.expires_at }),
        now,
        &correlation_id,
    )
    .await;

    if tx.payer.email.is_some() {
        match ctx.notify.email(EmailKind::Expire, &tx).await {
            Ok(()) => {
                record_audit(
                    ctx,
                    &tx.reference,
                    AuditAction::EmailSent,
                    json!({ "kind": "expire" }),
                    now,
                    &correlation_id,
                )
                .await;
            }
            Err(e) => {
                record_audit(
                    ctx,
                    &tx.reference,
                    AuditAction::EmailFailed,
                    json!({ "kind": "expire", "error": e.to_string() }),
                    now,
                    &correlation_id,
                )
                .await;
            }
        }
    }
}

/// Looks the row back up to report what state it actually ended up in, then
/// writes the `STATE_TRANSITION_REJECTED` audit. Silent if the row is gone
/// entirely — there is no entity left to attach the event to.
async fn record_rejected_transition(
    ctx: &EngineContext,
    tx_id: Uuid,
    attempted: &str,
    now: chrono::DateTime<chrono::Utc>,
    correlation_id: &str,
) {
    let reference = match ctx.store.get_by_id(tx_id).await {
        Ok(Some(tx)) => tx.reference,
        Ok(None) => return,
        Err(e) => {
            warn!(tx_id = %tx_id, error = %e, "could not look up transaction for rejected-transition audit");
            return;
        }
    };
    record_audit(
        ctx,
        &reference,
        AuditAction::StateTransitionRejected,
        json!({ "attempted": attempted }),
        now,
        correlation_id,
    )
    .await;
}

async fn record_audit(
    ctx: &EngineContext,
    reference: &str,
    action: AuditAction,
    changes: serde_json::Value,
    now: chrono::DateTime<chrono::Utc>,
    correlation_id: &str,
) {
    if let Err(e) = ctx
        .audit
        .record(AuditEvent::new(
            reference.to_string(),
            action,
            changes,
            json!({}),
            now,
            correlation_id.to_string(),
        ))
        .await
    {
        warn!(reference = %reference, action = ?action, error = %e, "failed to write audit event");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::stats::EngineStats;
    use crate::audit::memory::InMemoryAuditLog;
    use crate::clock::TokioClock;
    use crate::config::EngineConfig;
    use crate::domain::{Currency, Payer, Transaction, TransactionState};
    use chrono::Utc;
    use crate::notify::memory::InMemoryNotifySink;
    use crate::provider::{ClearanceOutcome, ClearanceQuery, ProviderClient};
    use crate::store::memory::InMemoryTxStore;
    use crate::store::TxStore;
    use bigdecimal::BigDecimal;
    use std::str::FromStr;
    use std::sync::Arc;
    use uuid::Uuid;

    /// `confirm`/`expire` act directly on the store and never consult the
    /// provider, so this double only needs to satisfy the trait bound.
    struct UnusedProvider;

    #[async_trait::async_trait]
    impl ProviderClient for UnusedProvider {
        async fn check_clearance(
            &self,
            _query: &ClearanceQuery,
        ) -> Result<ClearanceOutcome, crate::error::ProviderError> {
            unreachable!("confirmation handlers never call the provider directly")
        }
    }

    fn ctx_with(store: Arc<InMemoryTxStore>) -> (EngineContext, Arc<InMemoryAuditLog>) {
        let audit = Arc::new(InMemoryAuditLog::new());
        let ctx = EngineContext {
            clock: Arc::new(TokioClock::new()),
            store,
            provider: Arc::new(UnusedProvider),
            notify: Arc::new(InMemoryNotifySink::new()),
            audit: audit.clone(),
            config: EngineConfig::default(),
            engine_id: "engine-test".into(),
            stats: EngineStats::new(),
        };
        (ctx, audit)
    }

    fn seed(now: chrono::DateTime<chrono::Utc>) -> Transaction {
        Transaction {
            id: Uuid::new_v4(),
            reference: "ref-confirm-test".into(),
            payment_link_id: Uuid::new_v4(),
            state: TransactionState::Pending,
            amount: BigDecimal::from_str("1.00").unwrap(),
            currency: Currency::USD,
            provider_ref: Some("provider-tx".into()),
            payment_type: Some(crate::domain::PaymentType::Bank),
            payer: Payer {
                email: Some("payer@example.com".into()),
                name: None,
                phone: None,
            },
            success_url: Some("https://merchant.example/callback".into()),
            created_at: now,
            verification_started_at: Some(now),
            last_verification_check: None,
            expires_at: now + chrono::Duration::hours(24),
            processing_owner: None,
            processing_started_at: None,
            paid_at: None,
            actual_amount_paid: None,
        }
    }

    /// Confirming an already-PAID row is a no-op, not a second audit.
    #[tokio::test]
    async fn confirm_is_idempotent_under_repeated_calls() {
        let store = Arc::new(InMemoryTxStore::new());
        let tx = seed(Utc::now());
        let id = tx.id;
        store.insert(tx);
        let (ctx, audit) = ctx_with(store.clone());

        confirm(&ctx, id).await;
        confirm(&ctx, id).await;

        assert_eq!(
            audit.count("ref-confirm-test", AuditAction::PaymentConfirmed),
            1
        );
        assert_eq!(
            audit.count("ref-confirm-test", AuditAction::StateTransitionRejected),
            1
        );
    }

    /// A rejected CAS (row already in a terminal state) is audited, not
    /// swallowed.
    #[tokio::test]
    async fn rejected_confirm_writes_state_transition_rejected() {
        let store = Arc::new(InMemoryTxStore::new());
        let mut tx = seed(Utc::now());
        tx.state = TransactionState::PayoutFailed;
        let id = tx.id;
        let reference = tx.reference.clone();
        store.insert(tx);
        let (ctx, audit) = ctx_with(store);

        confirm(&ctx, id).await;

        assert_eq!(audit.count(&reference, AuditAction::PaymentConfirmed), 0);
        assert_eq!(
            audit.count(&reference, AuditAction::StateTransitionRejected),
            1
        );
    }

    /// Confirmation with no payer email and no success_url sends neither
    /// an email nor a webhook, but still confirms and audits exactly once.
    #[tokio::test]
    async fn confirm_skips_notifications_with_no_contact_info() {
        let store = Arc::new(InMemoryTxStore::new());
        let mut tx = seed(Utc::now());
        tx.payer.email = None;
        tx.success_url = None;
        let id = tx.id;
        let reference = tx.reference.clone();
        store.insert(tx);
        let (ctx, audit) = ctx_with(store.clone());

        confirm(&ctx, id).await;

        let tx = store.get_by_reference(&reference).await.unwrap().unwrap();
        assert_eq!(tx.state, TransactionState::Paid);
        assert_eq!(audit.count(&reference, AuditAction::PaymentConfirmed), 1);
        assert_eq!(audit.count(&reference, AuditAction::EmailSent), 0);
        assert_eq!(audit.count(&reference, AuditAction::WebhookSent), 0);
    }
}
