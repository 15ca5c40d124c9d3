//! Postgres-backed `TxStore`.
//!
//! Runtime-checked `sqlx::query(...)` for both reads and writes, with
//! optimistic-locking `UPDATE ... WHERE state IN (...)` guards that add
//! `RETURNING *` and read back the affected row rather than trusting a
//! separate read, since two engine instances can race on the same row
//! between a read and a write.

use super::{StartVerificationInput, StartVerificationOutcome, TxStore};
use crate::domain::{Currency, PaymentType, Payer, Transaction, TransactionState};
use crate::error::StoreError;
use crate::middleware::logging::log_database_query;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, PgPool, Row};
use uuid::Uuid;

pub struct PostgresTxStore {
    pool: PgPool,
}

impl PostgresTxStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn row_to_transaction(row: PgRow) -> Result<Transaction, StoreError> {
    let state_str: String = row.try_get("state").map_err(StoreError::from)?;
    let state = TransactionState::from_str(&state_str)
        .ok_or_else(|| StoreError::Decode(format!("unknown state '{state_str}'")))?;

    let currency_str: String = row.try_get("currency").map_err(StoreError::from)?;
    let currency = Currency::from_str(&currency_str)
        .ok_or_else(|| StoreError::Decode(format!("unknown currency '{currency_str}'")))?;

    let payment_type = row
        .try_get::<Option<String>, _>("payment_type")
        .map_err(StoreError::from)?
        .and_then(|s| PaymentType::from_str(&s));

    Ok(Transaction {
        id: row.try_get("id").map_err(StoreError::from)?,
        reference: row.try_get("reference").map_err(StoreError::from)?,
        payment_link_id: row.try_get("payment_link_id").map_err(StoreError::from)?,
        state,
        amount: row.try_get("amount").map_err(StoreError::from)?,
        currency,
        provider_ref: row.try_get("provider_ref").map_err(StoreError::from)?,
        payment_type,
        payer: Payer {
            email: row.try_get("payer_email").map_err(StoreError::from)?,
            name: row.try_get("payer_name").map_err(StoreError::from)?,
            phone: row.try_get("payer_phone").map_err(StoreError::from)?,
        },
        success_url: row.try_get("success_url").map_err(StoreError::from)?,
        created_at: row.try_get("created_at").map_err(StoreError::from)?,
        verification_started_at: row
            .try_get("verification_started_at")
            .map_err(StoreError::from)?,
        last_verification_check: row
            .try_get("last_verification_check")
            .map_err(StoreError::from)?,
        expires_at: row.try_get("expires_at").map_err(StoreError::from)?,
        processing_owner: row.try_get("processing_owner").map_err(StoreError::from)?,
        processing_started_at: row
            .try_get("processing_started_at")
            .map_err(StoreError::from)?,
        paid_at: row.try_get("paid_at").map_err(StoreError::from)?,
        actual_amount_paid: row.try_get("actual_amount_paid").map_err(StoreError::from)?,
    })
}

#[async_trait]
impl TxStore for PostgresTxStore {
    async fn get_by_reference(&self, reference: &str) -> Result<Option<Transaction>, StoreError> {
        let row = sqlx::query("SELECT * FROM transactions WHERE reference = $1")
            .bind(reference)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::from)?;
        row.map(row_to_transaction).transpose()
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Transaction>, StoreError> {
        let row = sqlx::query("SELECT * FROM transactions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::from)?;
        row.map(row_to_transaction).transpose()
    }

    async fn start_verification(
        &self,
        reference: &str,
        input: StartVerificationInput,
        now: DateTime<Utc>,
    ) -> Result<StartVerificationOutcome, StoreError> {
        let existing = self.get_by_reference(reference).await?;
        let tx = match existing {
            Some(tx) => tx,
            None => return Ok(StartVerificationOutcome::NotFound),
        };

        if tx.currency != input.currency {
            return Ok(StartVerificationOutcome::CurrencyMismatch {
                expected: tx.currency,
                actual: input.currency,
            });
        }
        if tx.amount != input.amount {
            return Ok(StartVerificationOutcome::AmountMismatch {
                expected: tx.amount,
                actual: input.amount,
            });
        }
        if tx.verification_started_at.is_some() {
            return Ok(StartVerificationOutcome::AlreadyStarted(tx));
        }
        if !matches!(tx.state, TransactionState::Pending | TransactionState::Initialized) {
            return Ok(StartVerificationOutcome::InvalidState(tx.state));
        }

        let row = sqlx::query(
            r#"
            UPDATE transactions
            SET payer_name = COALESCE($2, payer_name),
                payer_phone = COALESCE($3, payer_phone),
                payer_email = COALESCE($4, payer_email),
                provider_ref = $5,
                payment_type = $6,
                success_url = COALESCE($7, success_url),
                verification_started_at = $8
            WHERE id = $1
              AND verification_started_at IS NULL
            RETURNING *
            "#,
        )
        .bind(tx.id)
        .bind(input.sender_name)
        .bind(input.sender_phone)
        .bind(input.sender_email)
        .bind(input.provider_tx_id)
        .bind(input.payment_type.as_str())
        .bind(input.success_url)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from)?;

        match row {
            Some(row) => Ok(StartVerificationOutcome::Started(row_to_transaction(row)?)),
            None => {
                let refreshed = self
                    .get_by_id(tx.id)
                    .await?
                    .ok_or_else(|| StoreError::Query("row disappeared mid-start".into()))?;
                Ok(StartVerificationOutcome::AlreadyStarted(refreshed))
            }
        }
    }

    async fn touch_last_check(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE transactions
            SET last_verification_check = $2
            WHERE id = $1 AND state IN ('pending', 'initialized')
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?;
        Ok(result.rows_affected() > 0)
    }

    async fn confirm_payment(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<Transaction>, StoreError> {
        let row = log_database_query("UPDATE transactions SET state = 'paid' ...", async {
            sqlx::query(
                r#"
                UPDATE transactions
                SET state = 'paid',
                    paid_at = $2,
                    actual_amount_paid = amount,
                    processing_owner = NULL,
                    processing_started_at = NULL
                WHERE id = $1 AND state IN ('pending', 'initialized')
                RETURNING *
                "#,
            )
            .bind(id)
            .bind(now)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::from)
        })
        .await?;
        row.map(row_to_transaction).transpose()
    }

    async fn expire(&self, id: Uuid, _now: DateTime<Utc>) -> Result<Option<Transaction>, StoreError> {
        let row = sqlx::query(
            r#"
            UPDATE transactions
            SET state = 'payout_failed',
                processing_owner = NULL,
                processing_started_at = NULL
            WHERE id = $1 AND state IN ('pending', 'initialized')
            RETURNING *
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from)?;
        row.map(row_to_transaction).transpose()
    }

    async fn acquire_lease(
        &self,
        id: Uuid,
        owner: &str,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> Result<Option<Transaction>, StoreError> {
        let row = sqlx::query(
            r#"
            UPDATE transactions
            SET processing_owner = $2,
                processing_started_at = $3
            WHERE id = $1
              AND state IN ('pending', 'initialized')
              AND (processing_owner IS NULL OR processing_started_at < $4)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(owner)
        .bind(now)
        .bind(stale_before)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from)?;
        row.map(row_to_transaction).transpose()
    }

    async fn release_lease(&self, id: Uuid, owner: &str) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE transactions
            SET processing_owner = NULL, processing_started_at = NULL
            WHERE id = $1 AND processing_owner = $2
            "#,
        )
        .bind(id)
        .bind(owner)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?;
        Ok(())
    }

    async fn clear_stale_leases(
        &self,
        _now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> Result<Vec<Transaction>, StoreError> {
        let rows = sqlx::query(
            r#"
            UPDATE transactions
            SET processing_owner = NULL, processing_started_at = NULL
            WHERE processing_owner IS NOT NULL AND processing_started_at < $1
            RETURNING *
            "#,
        )
        .bind(stale_before)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from)?;
        rows.into_iter().map(row_to_transaction).collect()
    }

    async fn query_slow_sweep_batch(
        &self,
        now: DateTime<Utc>,
        started_before: DateTime<Utc>,
        checked_before: DateTime<Utc>,
        stale_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Transaction>, StoreError> {
        let rows = log_database_query("SELECT * FROM transactions WHERE ... slow sweep batch", async {
            sqlx::query(
                r#"
                SELECT * FROM transactions
                WHERE state IN ('pending', 'initialized')
                  AND expires_at > $1
                  AND (processing_owner IS NULL OR processing_started_at < $2)
                  AND verification_started_at < $3
                  AND (last_verification_check IS NULL OR last_verification_check < $4)
                ORDER BY verification_started_at ASC
                LIMIT $5
                "#,
            )
            .bind(now)
            .bind(stale_before)
            .bind(started_before)
            .bind(checked_before)
            .bind(limit.clamp(0, 100))
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::from)
        })
        .await?;
        rows.into_iter().map(row_to_transaction).collect()
    }

    async fn query_expired(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<Transaction>, StoreError> {
        let rows = log_database_query("SELECT * FROM transactions WHERE expires_at <= $1", async {
            sqlx::query(
                r#"
                SELECT * FROM transactions
                WHERE state IN ('pending', 'initialized') AND expires_at <= $1
                ORDER BY expires_at ASC
                LIMIT $2
                "#,
            )
            .bind(now)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::from)
        })
        .await?;
        rows.into_iter().map(row_to_transaction).collect()
    }
}
