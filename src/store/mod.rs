//! `TxStore` — durable persistence with atomic compare-and-update (§2
//! component 2).
//!
//! Every mutating method here either applies under a CAS guard and returns
//! the updated row, or returns `Ok(None)` to mean "another owner already won
//! this race" — per §7 that is normal control flow, not an error. Only
//! genuine connectivity/decode failures surface as `Err(StoreError)`.

pub mod memory;
pub mod postgres;

use crate::domain::{Currency, PaymentType, Transaction, TransactionState};
use crate::error::StoreError;
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// `payload` fields from §4.1's `StartVerification` contract, minus
/// `reference` (the lookup key) and `paymentLinkId` (immutable after
/// creation, not re-set here).
#[derive(Debug, Clone)]
pub struct StartVerificationInput {
    pub sender_name: Option<String>,
    pub sender_phone: Option<String>,
    pub sender_email: Option<String>,
    pub currency: Currency,
    pub provider_tx_id: String,
    pub payment_type: PaymentType,
    pub amount: BigDecimal,
    pub success_url: Option<String>,
}

/// Result of attempting `StartVerification`'s atomic update. Distinguishing
/// `AlreadyStarted` from `Started` lets the engine skip spawning a second
/// `FastPoller` for an idempotent re-call, without needing a second round
/// trip to the store.
#[derive(Debug, Clone)]
pub enum StartVerificationOutcome {
    Started(Transaction),
    AlreadyStarted(Transaction),
    NotFound,
    InvalidState(TransactionState),
    CurrencyMismatch { expected: Currency, actual: Currency },
    AmountMismatch { expected: BigDecimal, actual: BigDecimal },
}

#[async_trait]
pub trait TxStore: Send + Sync {
    async fn get_by_reference(&self, reference: &str) -> Result<Option<Transaction>, StoreError>;

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Transaction>, StoreError>;

    /// One atomic update per §4.1: validates currency/amount, patches payer
    /// and `providerRef`, stamps `verificationStartedAt` only the first time.
    async fn start_verification(
        &self,
        reference: &str,
        input: StartVerificationInput,
        now: DateTime<Utc>,
    ) -> Result<StartVerificationOutcome, StoreError>;

    /// Updates `lastVerificationCheck` unconditionally on owner but only if
    /// `state` is still `Pending` (§4.3). Returns whether the row still
    /// qualified (i.e. was still Pending).
    async fn touch_last_check(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool, StoreError>;

    /// CAS `state: Pending -> Paid`, `paidAt = now`, copies
    /// `actualAmountPaid`, clears the lease (§4.5 step 1). `Ok(None)` means
    /// another owner already confirmed it.
    async fn confirm_payment(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<Transaction>, StoreError>;

    /// CAS `state: Pending -> PayoutFailed` (§4.6 ExpirySweeper).
    async fn expire(&self, id: Uuid, now: DateTime<Utc>) -> Result<Option<Transaction>, StoreError>;

    /// CAS lease acquisition guarded on `state = Pending AND (no owner OR
    /// owner's processingStartedAt < stale_before)` (§4.4 step 2).
    async fn acquire_lease(
        &self,
        id: Uuid,
        owner: &str,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> Result<Option<Transaction>, StoreError>;

    /// Clears `processingOwner`/`processingStartedAt` unconditionally; used
    /// when a held lease's provider query comes back "not yet" (§4.4 step 2).
    async fn release_lease(&self, id: Uuid, owner: &str) -> Result<(), StoreError>;

    /// Clears every lease older than `stale_before`, regardless of owner
    /// (§4.6 crash recovery). Returns the rows that were reclaimed so the
    /// caller can emit one `LEASE_STOLEN` audit per row.
    async fn clear_stale_leases(
        &self,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> Result<Vec<Transaction>, StoreError>;

    /// §4.4 step 1's batch query: `state=Pending AND expiresAt>now AND
    /// verificationStartedAt<started_before AND (lastVerificationCheck<
    /// checked_before OR NULL) AND` lease free, FIFO by
    /// `verificationStartedAt`, capped to `limit` and never more than 100
    /// regardless of what the caller asks for.
    async fn query_slow_sweep_batch(
        &self,
        now: DateTime<Utc>,
        started_before: DateTime<Utc>,
        checked_before: DateTime<Utc>,
        stale_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Transaction>, StoreError>;

    /// §4.6 ExpirySweeper's query: `state=Pending AND expiresAt<now`.
    async fn query_expired(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<Transaction>, StoreError>;
}
