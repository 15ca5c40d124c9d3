//! Shared fixtures for the end-to-end scenario tests (§8).

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use offramp_verify::clock::Clock;
use offramp_verify::domain::{Currency, Payer, PaymentType, Transaction, TransactionState};
use offramp_verify::engine::StartVerificationPayload;
use offramp_verify::error::ProviderError;
use offramp_verify::provider::{ClearanceOutcome, ClearanceQuery, ProviderClient};
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Returns `Confirmed` once `clock.now() >= at`, `NotYet` until then.
/// Driven off the shared clock rather than a call counter so tests stay
/// correct regardless of exactly how many fast-poll ticks land before the
/// threshold.
pub struct ConfirmAfter {
    pub clock: Arc<dyn Clock>,
    pub at: DateTime<Utc>,
    pub calls: AtomicUsize,
}

#[async_trait]
impl ProviderClient for ConfirmAfter {
    async fn check_clearance(&self, _query: &ClearanceQuery) -> Result<ClearanceOutcome, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.clock.now() >= self.at {
            Ok(ClearanceOutcome::Confirmed)
        } else {
            Ok(ClearanceOutcome::NotYet)
        }
    }
}

pub struct AlwaysNotYet;

#[async_trait]
impl ProviderClient for AlwaysNotYet {
    async fn check_clearance(&self, _query: &ClearanceQuery) -> Result<ClearanceOutcome, ProviderError> {
        Ok(ClearanceOutcome::NotYet)
    }
}

pub fn seed_tx(reference: &str, currency: Currency, amount: &str, now: DateTime<Utc>) -> Transaction {
    Transaction {
        id: Uuid::new_v4(),
        reference: reference.to_string(),
        payment_link_id: Uuid::new_v4(),
        state: TransactionState::Pending,
        amount: BigDecimal::from_str(amount).unwrap(),
        currency,
        provider_ref: None,
        payment_type: None,
        payer: Payer::default(),
        success_url: None,
        created_at: now,
        verification_started_at: None,
        last_verification_check: None,
        expires_at: now + chrono::Duration::hours(24),
        processing_owner: None,
        processing_started_at: None,
        paid_at: None,
        actual_amount_paid: None,
    }
}

pub fn start_payload(
    currency: Currency,
    amount: &str,
    email: Option<&str>,
    success_url: Option<&str>,
) -> StartVerificationPayload {
    StartVerificationPayload {
        sender_name: Some("Jane Payer".into()),
        sender_phone: None,
        sender_email: email.map(|s| s.to_string()),
        currency,
        provider_tx_id: "provider-tx-1".into(),
        payment_type: PaymentType::Bank,
        amount: BigDecimal::from_str(amount).unwrap(),
        success_url: success_url.map(|s| s.to_string()),
        payment_link_id: Uuid::new_v4(),
    }
}

/// Gives spawned tasks woken by a `tokio::time::advance` a chance to run to
/// completion before the test asserts on shared state.
pub async fn drain() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}
