//! Append-only audit events (§3 "AuditEvent").
//!
//! The `tx_id`, `provider`, `attempt`, `reason`-shaped structured fields
//! that would otherwise only live in a `tracing` call site become the
//! durable `changes`/`metadata` payload of a first-class event type here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Closed set of actions the engine ever emits (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    VerificationStarted,
    ProviderQueryOk,
    ProviderQueryFail,
    PaymentConfirmed,
    TransactionExpired,
    WebhookSent,
    WebhookFailed,
    EmailSent,
    EmailFailed,
    LeaseAcquired,
    LeaseReleased,
    LeaseStolen,
    StateTransitionRejected,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::VerificationStarted => "VERIFICATION_STARTED",
            AuditAction::ProviderQueryOk => "PROVIDER_QUERY_OK",
            AuditAction::ProviderQueryFail => "PROVIDER_QUERY_FAIL",
            AuditAction::PaymentConfirmed => "PAYMENT_CONFIRMED",
            AuditAction::TransactionExpired => "TRANSACTION_EXPIRED",
            AuditAction::WebhookSent => "WEBHOOK_SENT",
            AuditAction::WebhookFailed => "WEBHOOK_FAILED",
            AuditAction::EmailSent => "EMAIL_SENT",
            AuditAction::EmailFailed => "EMAIL_FAILED",
            AuditAction::LeaseAcquired => "LEASE_ACQUIRED",
            AuditAction::LeaseReleased => "LEASE_RELEASED",
            AuditAction::LeaseStolen => "LEASE_STOLEN",
            AuditAction::StateTransitionRejected => "STATE_TRANSITION_REJECTED",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: Uuid,
    pub entity_type: String,
    pub entity_id: String,
    pub action: AuditAction,
    pub changes: JsonValue,
    pub metadata: JsonValue,
    pub timestamp: DateTime<Utc>,
    pub correlation_id: String,
}

impl AuditEvent {
    pub fn new(
        entity_id: impl Into<String>,
        action: AuditAction,
        changes: JsonValue,
        metadata: JsonValue,
        timestamp: DateTime<Utc>,
        correlation_id: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            entity_type: "transaction".to_string(),
            entity_id: entity_id.into(),
            action,
            changes,
            metadata,
            timestamp,
            correlation_id: correlation_id.into(),
        }
    }
}
