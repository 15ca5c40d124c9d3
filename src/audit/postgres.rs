//! Postgres-backed `AuditLog`, append-only insert — same `sqlx::query`
//! style as `store::postgres`.

use super::AuditLog;
use crate::domain::AuditEvent;
use crate::error::StoreError;
use async_trait::async_trait;
use sqlx::PgPool;

pub struct PostgresAuditLog {
    pool: PgPool,
}

impl PostgresAuditLog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditLog for PostgresAuditLog {
    async fn record(&self, event: AuditEvent) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO audit_events
                (id, entity_type, entity_id, action, changes, metadata, timestamp, correlation_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(event.id)
        .bind(event.entity_type)
        .bind(event.entity_id)
        .bind(event.action.as_str())
        .bind(event.changes)
        .bind(event.metadata)
        .bind(event.timestamp)
        .bind(event.correlation_id)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?;
        Ok(())
    }
}
