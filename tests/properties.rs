//! Targeted coverage for the engine's cross-cutting correctness guarantees
//! (poller halt-on-state-change, bounded time to a terminal state, crash
//! recovery reclaiming every stale lease at once) that aren't already
//! exercised incidentally by the `scenarios.rs` end-to-end tests.

mod common;

use common::{drain, seed_tx, start_payload, AlwaysNotYet, ConfirmAfter};
use offramp_verify::audit::memory::InMemoryAuditLog;
use offramp_verify::clock::{Clock, TokioClock};
use offramp_verify::config::EngineConfig;
use offramp_verify::domain::{AuditAction, Currency, TransactionState};
use offramp_verify::notify::memory::InMemoryNotifySink;
use offramp_verify::store::memory::InMemoryTxStore;
use offramp_verify::store::TxStore;
use offramp_verify::VerificationEngine;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

const EMAIL: &str = "payer@example.com";
const SUCCESS_URL: &str = "https://merchant.example/callback";

/// A FastPoller that wakes up and finds its row already moved out of
/// PENDING (by something other than itself) halts immediately, without
/// calling the provider or emitting a provider-query audit.
#[tokio::test(start_paused = true)]
async fn fast_poller_halts_on_externally_observed_state_change() {
    let clock = Arc::new(TokioClock::new());
    let store = Arc::new(InMemoryTxStore::new());
    let audit = Arc::new(InMemoryAuditLog::new());
    let notify = Arc::new(InMemoryNotifySink::new());

    let now = clock.now();
    let tx = seed_tx("ref-halt-1", Currency::USD, "5.00", now);
    let reference = tx.reference.clone();
    store.insert(tx);

    // Never actually confirms; any call at all would register here.
    let provider = Arc::new(ConfirmAfter {
        clock: clock.clone(),
        at: now + chrono::Duration::days(365),
        calls: AtomicUsize::new(0),
    });

    let engine = VerificationEngine::new(
        clock.clone(),
        store.clone(),
        provider.clone(),
        notify,
        audit.clone(),
        EngineConfig::default(),
        "engine-a",
    );
    engine.start().await.unwrap();

    engine
        .start_verification(
            &reference,
            start_payload(Currency::USD, "5.00", Some(EMAIL), Some(SUCCESS_URL)),
        )
        .await
        .unwrap();

    // Something outside the poller (e.g. a webhook-driven out-of-band
    // settlement) moves the row to COMPLETED before the poller's first tick.
    let mut tx = store.get_by_reference(&reference).await.unwrap().unwrap();
    tx.state = TransactionState::Completed;
    store.insert(tx);

    tokio::time::advance(StdDuration::from_secs(30)).await;
    drain().await;

    assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    assert_eq!(audit.count(&reference, AuditAction::ProviderQueryFail), 0);

    let tx = store.get_by_reference(&reference).await.unwrap().unwrap();
    assert_eq!(tx.state, TransactionState::Completed);
}

/// A transaction left PENDING all the way to its expiry deadline is
/// guaranteed to land in a terminal state within
/// fastPollMaxDuration + slowSweepInterval + slowSweepBuffer of expiresAt,
/// even with a provider that never confirms.
#[tokio::test(start_paused = true)]
async fn pending_transaction_always_reaches_terminal_state_by_deadline() {
    let clock = Arc::new(TokioClock::new());
    let store = Arc::new(InMemoryTxStore::new());
    let audit = Arc::new(InMemoryAuditLog::new());
    let notify = Arc::new(InMemoryNotifySink::new());

    let now = clock.now();
    let mut tx = seed_tx("ref-deadline-1", Currency::USD, "5.00", now);
    tx.payer.email = Some(EMAIL.into());
    tx.verification_started_at = Some(now);
    tx.expires_at = now + chrono::Duration::minutes(10);
    let reference = tx.reference.clone();
    store.insert(tx);

    let engine = VerificationEngine::new(
        clock.clone(),
        store.clone(),
        Arc::new(AlwaysNotYet),
        notify,
        audit,
        EngineConfig::default(),
        "engine-a",
    );
    engine.start().await.unwrap();

    let cfg = EngineConfig::default();
    let bound = cfg.fast_poll_max_duration + cfg.slow_sweep_interval + cfg.slow_sweep_buffer;
    tokio::time::advance(bound + StdDuration::from_secs(1)).await;
    drain().await;

    let tx = store.get_by_reference(&reference).await.unwrap().unwrap();
    assert!(matches!(
        tx.state,
        TransactionState::Paid | TransactionState::PayoutFailed
    ));
}

/// An engine restarted after a crash reclaims every stale lease in one
/// sweep and makes progress on all of them, not just one.
#[tokio::test(start_paused = true)]
async fn restart_reclaims_all_stale_leases_not_just_one() {
    let clock = Arc::new(TokioClock::new());
    let store = Arc::new(InMemoryTxStore::new());
    let audit = Arc::new(InMemoryAuditLog::new());
    let notify = Arc::new(InMemoryNotifySink::new());

    let now = clock.now();
    let mut references = Vec::new();
    for i in 0..3 {
        let mut tx = seed_tx(&format!("ref-crash-multi-{i}"), Currency::USD, "5.00", now);
        tx.payer.email = Some(EMAIL.into());
        tx.verification_started_at = Some(now - chrono::Duration::minutes(20));
        tx.last_verification_check = Some(now - chrono::Duration::minutes(20));
        tx.processing_owner = Some("engine-dead".into());
        tx.processing_started_at = Some(now - chrono::Duration::seconds(61));
        references.push(tx.reference.clone());
        store.insert(tx);
    }

    let provider = Arc::new(ConfirmAfter {
        clock: clock.clone(),
        at: now,
        calls: AtomicUsize::new(0),
    });

    let engine = VerificationEngine::new(
        clock.clone(),
        store.clone(),
        provider,
        notify,
        audit.clone(),
        EngineConfig::default(),
        "engine-b",
    );
    engine.start().await.unwrap();

    drain().await;
    tokio::time::advance(StdDuration::from_secs(2)).await;
    drain().await;

    for reference in &references {
        assert_eq!(audit.count(reference, AuditAction::LeaseStolen), 1);
        let tx = store.get_by_reference(reference).await.unwrap().unwrap();
        assert_eq!(tx.state, TransactionState::Paid);
    }
}
