//! In-memory `TxStore` for deterministic tests (§8).
//!
//! A `Mutex<HashMap<Uuid, Transaction>>` plus a secondary reference index.
//! Every method re-acquires the lock for the whole read-modify-write so the
//! CAS guards are genuinely atomic with respect to concurrent callers in the
//! same process, the same way two engine instances racing over one Postgres
//! row would serialize on its `UPDATE ... WHERE` guard.

use super::{StartVerificationInput, StartVerificationOutcome, TxStore};
use crate::domain::{Transaction, TransactionState};
use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

pub struct InMemoryTxStore {
    rows: Mutex<HashMap<Uuid, Transaction>>,
}

impl InMemoryTxStore {
    pub fn new() -> Self {
        Self {
            rows: Mutex::new(HashMap::new()),
        }
    }

    /// Test/seed helper, not part of the `TxStore` contract.
    pub fn insert(&self, tx: Transaction) {
        self.rows.lock().unwrap().insert(tx.id, tx);
    }

    fn find_by_reference(&self, reference: &str) -> Option<Transaction> {
        self.rows
            .lock()
            .unwrap()
            .values()
            .find(|t| t.reference == reference)
            .cloned()
    }
}

impl Default for InMemoryTxStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TxStore for InMemoryTxStore {
    async fn get_by_reference(&self, reference: &str) -> Result<Option<Transaction>, StoreError> {
        Ok(self.find_by_reference(reference))
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Transaction>, StoreError> {
        Ok(self.rows.lock().unwrap().get(&id).cloned())
    }

    async fn start_verification(
        &self,
        reference: &str,
        input: StartVerificationInput,
        now: DateTime<Utc>,
    ) -> Result<StartVerificationOutcome, StoreError> {
        let mut rows = self.rows.lock().unwrap();
        let id = match rows.values().find(|t| t.reference == reference).map(|t| t.id) {
            Some(id) => id,
            None => return Ok(StartVerificationOutcome::NotFound),
        };
        let tx = rows.get_mut(&id).unwrap();

        if tx.currency != input.currency {
            return Ok(StartVerificationOutcome::CurrencyMismatch {
                expected: tx.currency,
                actual: input.currency,
            });
        }
        if tx.amount != input.amount {
            return Ok(StartVerificationOutcome::AmountMismatch {
                expected: tx.amount.clone(),
                actual: input.amount,
            });
        }

        if tx.verification_started_at.is_some() {
            return Ok(StartVerificationOutcome::AlreadyStarted(tx.clone()));
        }
        if !matches!(tx.state, TransactionState::Pending | TransactionState::Initialized) {
            return Ok(StartVerificationOutcome::InvalidState(tx.state));
        }

        tx.payer.name = input.sender_name;
        tx.payer.phone = input.sender_phone;
        tx.payer.email = input.sender_email;
        tx.provider_ref = Some(input.provider_tx_id);
        tx.payment_type = Some(input.payment_type);
        tx.success_url = input.success_url.or_else(|| tx.success_url.clone());
        tx.verification_started_at = Some(now);

        Ok(StartVerificationOutcome::Started(tx.clone()))
    }

    async fn touch_last_check(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool, StoreError> {
        let mut rows = self.rows.lock().unwrap();
        match rows.get_mut(&id) {
            Some(tx) if tx.state == TransactionState::Pending || tx.state == TransactionState::Initialized => {
                tx.last_verification_check = Some(now);
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Ok(false),
        }
    }

    async fn confirm_payment(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<Transaction>, StoreError> {
        let mut rows = self.rows.lock().unwrap();
        match rows.get_mut(&id) {
            Some(tx) if matches!(tx.state, TransactionState::Pending | TransactionState::Initialized) => {
                tx.state = TransactionState::Paid;
                tx.paid_at = Some(now);
                tx.actual_amount_paid = Some(tx.amount.clone());
                tx.processing_owner = None;
                tx.processing_started_at = None;
                Ok(Some(tx.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn expire(&self, id: Uuid, now: DateTime<Utc>) -> Result<Option<Transaction>, StoreError> {
        let mut rows = self.rows.lock().unwrap();
        match rows.get_mut(&id) {
            Some(tx) if tx.state == TransactionState::Pending || tx.state == TransactionState::Initialized => {
                tx.state = TransactionState::PayoutFailed;
                let _ = now;
                tx.processing_owner = None;
                tx.processing_started_at = None;
                Ok(Some(tx.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn acquire_lease(
        &self,
        id: Uuid,
        owner: &str,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> Result<Option<Transaction>, StoreError> {
        let mut rows = self.rows.lock().unwrap();
        match rows.get_mut(&id) {
            Some(tx)
                if matches!(tx.state, TransactionState::Pending | TransactionState::Initialized)
                    && (tx.processing_owner.is_none()
                        || tx
                            .processing_started_at
                            .map(|started| started < stale_before)
                            .unwrap_or(true)) =>
            {
                tx.processing_owner = Some(owner.to_string());
                tx.processing_started_at = Some(now);
                Ok(Some(tx.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn release_lease(&self, id: Uuid, owner: &str) -> Result<(), StoreError> {
        let mut rows = self.rows.lock().unwrap();
        if let Some(tx) = rows.get_mut(&id) {
            if tx.processing_owner.as_deref() == Some(owner) {
                tx.processing_owner = None;
                tx.processing_started_at = None;
            }
        }
        Ok(())
    }

    async fn clear_stale_leases(
        &self,
        _now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> Result<Vec<Transaction>, StoreError> {
        let mut rows = self.rows.lock().unwrap();
        let mut reclaimed = Vec::new();
        for tx in rows.values_mut() {
            if tx.processing_owner.is_some()
                && tx
                    .processing_started_at
                    .map(|started| started < stale_before)
                    .unwrap_or(false)
            {
                tx.processing_owner = None;
                tx.processing_started_at = None;
                reclaimed.push(tx.clone());
            }
        }
        Ok(reclaimed)
    }

    async fn query_slow_sweep_batch(
        &self,
        now: DateTime<Utc>,
        started_before: DateTime<Utc>,
        checked_before: DateTime<Utc>,
        stale_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Transaction>, StoreError> {
        let rows = self.rows.lock().unwrap();
        let mut candidates: Vec<Transaction> = rows
            .values()
            .filter(|tx| {
                matches!(tx.state, TransactionState::Pending | TransactionState::Initialized)
                    && tx.expires_at > now
                    && (tx.processing_owner.is_none()
                        || tx
                            .processing_started_at
                            .map(|started| started < stale_before)
                            .unwrap_or(false))
                    && tx
                        .verification_started_at
                        .map(|started| started < started_before)
                        .unwrap_or(false)
                    && tx
                        .last_verification_check
                        .map(|checked| checked < checked_before)
                        .unwrap_or(true)
            })
            .cloned()
            .collect();
        candidates.sort_by_key(|tx| tx.verification_started_at);
        candidates.truncate(limit.clamp(0, 100) as usize);
        Ok(candidates)
    }

    async fn query_expired(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<Transaction>, StoreError> {
        let rows = self.rows.lock().unwrap();
        let mut candidates: Vec<Transaction> = rows
            .values()
            .filter(|tx| {
                matches!(tx.state, TransactionState::Pending | TransactionState::Initialized)
                    && tx.expires_at <= now
            })
            .cloned()
            .collect();
        candidates.sort_by_key(|tx| tx.expires_at);
        candidates.truncate(limit.max(0) as usize);
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Currency, Payer};
    use bigdecimal::BigDecimal;
    use std::str::FromStr;

    fn seed(state: TransactionState) -> Transaction {
        let now = Utc::now();
        Transaction {
            id: Uuid::new_v4(),
            reference: "ref_1".to_string(),
            payment_link_id: Uuid::new_v4(),
            state,
            amount: BigDecimal::from_str("100.00").unwrap(),
            currency: Currency::NGN,
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

    #[tokio::test]
    async fn confirm_payment_is_cas_guarded() {
        let store = InMemoryTxStore::new();
        let tx = seed(TransactionState::Pending);
        let id = tx.id;
        store.insert(tx);

        let now = Utc::now();
        let first = store.confirm_payment(id, now).await.unwrap();
        assert!(first.is_some());
        assert_eq!(first.unwrap().state, TransactionState::Paid);

        let second = store.confirm_payment(id, now).await.unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn acquire_lease_rejects_second_owner_until_stale() {
        let store = InMemoryTxStore::new();
        let tx = seed(TransactionState::Pending);
        let id = tx.id;
        store.insert(tx);

        let now = Utc::now();
        let stale_before = now - chrono::Duration::minutes(1);
        let first = store.acquire_lease(id, "owner-a", now, stale_before).await.unwrap();
        assert!(first.is_some());

        let second = store.acquire_lease(id, "owner-b", now, stale_before).await.unwrap();
        assert!(second.is_none());

        let later = now + chrono::Duration::minutes(2);
        let steal_threshold = later - chrono::Duration::minutes(1);
        let stolen = store
            .acquire_lease(id, "owner-b", later, steal_threshold)
            .await
            .unwrap();
        assert!(stolen.is_some());
        assert_eq!(stolen.unwrap().processing_owner.as_deref(), Some("owner-b"));
    }

    #[tokio::test]
    async fn slow_sweep_excludes_row_at_exactly_fifteen_minutes() {
        // The 16 min cushion means a row started exactly 15 min ago is
        // not yet eligible.
        let store = InMemoryTxStore::new();
        let now = Utc::now();
        let mut tx = seed(TransactionState::Pending);
        tx.verification_started_at = Some(now - chrono::Duration::minutes(15));
        store.insert(tx);

        let started_before = now - chrono::Duration::minutes(16);
        let checked_before = now - chrono::Duration::minutes(5);
        let stale_before = now - chrono::Duration::minutes(1);
        let batch = store
            .query_slow_sweep_batch(now, started_before, checked_before, stale_before, 100)
            .await
            .unwrap();
        assert!(batch.is_empty());
    }

    #[tokio::test]
    async fn expiry_includes_row_with_expires_at_exactly_now() {
        // expiresAt == now counts as expired.
        let store = InMemoryTxStore::new();
        let now = Utc::now();
        let mut tx = seed(TransactionState::Pending);
        tx.expires_at = now;
        store.insert(tx);

        let expired = store.query_expired(now, 100).await.unwrap();
        assert_eq!(expired.len(), 1);
    }

    #[tokio::test]
    async fn slow_sweep_batch_is_capped_at_one_hundred() {
        // Even if asked for more, the batch never exceeds 100 rows.
        let store = InMemoryTxStore::new();
        let now = Utc::now();
        for _ in 0..150 {
            let mut tx = seed(TransactionState::Pending);
            tx.id = Uuid::new_v4();
            tx.verification_started_at = Some(now - chrono::Duration::minutes(20));
            store.insert(tx);
        }

        let started_before = now - chrono::Duration::minutes(16);
        let checked_before = now - chrono::Duration::minutes(5);
        let stale_before = now - chrono::Duration::minutes(1);
        let batch = store
            .query_slow_sweep_batch(now, started_before, checked_before, stale_before, 500)
            .await
            .unwrap();
        assert_eq!(batch.len(), 100);
    }

    #[tokio::test]
    async fn slow_sweep_excludes_row_with_fresh_lease_held_by_another_owner() {
        let store = InMemoryTxStore::new();
        let now = Utc::now();
        let mut tx = seed(TransactionState::Pending);
        tx.verification_started_at = Some(now - chrono::Duration::minutes(20));
        tx.processing_owner = Some("engine-a".into());
        tx.processing_started_at = Some(now - chrono::Duration::seconds(10));
        store.insert(tx);

        let started_before = now - chrono::Duration::minutes(16);
        let checked_before = now - chrono::Duration::minutes(5);
        let stale_before = now - chrono::Duration::minutes(1);
        let batch = store
            .query_slow_sweep_batch(now, started_before, checked_before, stale_before, 100)
            .await
            .unwrap();
        assert!(batch.is_empty());
    }

    #[tokio::test]
    async fn slow_sweep_includes_row_with_stale_lease() {
        let store = InMemoryTxStore::new();
        let now = Utc::now();
        let mut tx = seed(TransactionState::Pending);
        tx.verification_started_at = Some(now - chrono::Duration::minutes(20));
        tx.processing_owner = Some("engine-dead".into());
        tx.processing_started_at = Some(now - chrono::Duration::minutes(2));
        store.insert(tx);

        let started_before = now - chrono::Duration::minutes(16);
        let checked_before = now - chrono::Duration::minutes(5);
        let stale_before = now - chrono::Duration::minutes(1);
        let batch = store
            .query_slow_sweep_batch(now, started_before, checked_before, stale_before, 100)
            .await
            .unwrap();
        assert_eq!(batch.len(), 1);
    }

    #[tokio::test]
    async fn slow_sweep_excludes_already_expired_row() {
        let store = InMemoryTxStore::new();
        let now = Utc::now();
        let mut tx = seed(TransactionState::Pending);
        tx.verification_started_at = Some(now - chrono::Duration::minutes(20));
        tx.expires_at = now - chrono::Duration::minutes(1);
        store.insert(tx);

        let started_before = now - chrono::Duration::minutes(16);
        let checked_before = now - chrono::Duration::minutes(5);
        let stale_before = now - chrono::Duration::minutes(1);
        let batch = store
            .query_slow_sweep_batch(now, started_before, checked_before, stale_before, 100)
            .await
            .unwrap();
        assert!(batch.is_empty());
    }
}
