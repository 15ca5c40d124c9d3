//! `NotifySink` — the single interface behind which email delivery and
//! merchant webhooks are isolated (§2 component 4, §9 "isolate NotifySink
//! behind one interface so email/webhook providers can be swapped without
//! touching scheduling code").

pub mod http;
pub mod memory;

use crate::domain::Transaction;
use crate::error::NotifyError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Which confirmation template to send (§4.5 step 3, §4.6 expiration email).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailKind {
    Confirm,
    Expire,
}

/// The exact webhook body from §6, serialized verbatim.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookPayload {
    pub event: &'static str,
    #[serde(rename = "paymentLinkId")]
    pub payment_link_id: String,
    #[serde(rename = "transactionId")]
    pub transaction_id: String,
    pub amount: String,
    pub currency: String,
    #[serde(rename = "senderName")]
    pub sender_name: Option<String>,
    #[serde(rename = "senderPhone")]
    pub sender_phone: Option<String>,
    #[serde(rename = "senderEmail")]
    pub sender_email: Option<String>,
    #[serde(rename = "paymentMethod")]
    pub payment_method: String,
    pub status: &'static str,
    #[serde(rename = "paidAt")]
    pub paid_at: DateTime<Utc>,
    pub timestamp: DateTime<Utc>,
}

impl WebhookPayload {
    pub fn for_confirmation(tx: &Transaction, now: DateTime<Utc>) -> Self {
        Self {
            event: "payment.confirmed",
            payment_link_id: tx.payment_link_id.to_string(),
            transaction_id: tx.reference.clone(),
            amount: tx.amount.to_string(),
            currency: tx.currency.as_str().to_string(),
            sender_name: tx.payer.name.clone(),
            sender_phone: tx.payer.phone.clone(),
            sender_email: tx.payer.email.clone(),
            payment_method: tx
                .payment_type
                .map(|p| p.as_str().to_string())
                .unwrap_or_default(),
            status: "completed",
            paid_at: tx.paid_at.unwrap_or(now),
            timestamp: now,
        }
    }
}

/// Best-effort delivery result; the caller turns both into an audit event
/// but never propagates a failure out of the confirmation/expiry handlers
/// (§7 "Sink failures").
#[derive(Debug, Clone)]
pub enum WebhookOutcome {
    Sent,
    Failed { status: Option<u16>, error: String },
}

#[async_trait]
pub trait NotifySink: Send + Sync {
    /// `payer.email` presence is checked by the caller; a missing address
    /// is a no-op, not a call into this trait (§6: "MissingPayerEmail is
    /// not an error").
    async fn email(&self, kind: EmailKind, tx: &Transaction) -> Result<(), NotifyError>;

    async fn webhook(&self, url: &str, payload: &WebhookPayload) -> WebhookOutcome;
}
