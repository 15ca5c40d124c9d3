//! In-memory `NotifySink` that records every call, for asserting
//! at-most-one-attempt semantics in tests (§8 scenarios).

use super::{EmailKind, NotifySink, WebhookOutcome, WebhookPayload};
use crate::domain::Transaction;
use crate::error::NotifyError;
use async_trait::async_trait;
use std::sync::Mutex;

#[derive(Debug, Clone)]
pub struct RecordedEmail {
    pub kind: EmailKind,
    pub to: String,
}

pub struct InMemoryNotifySink {
    emails: Mutex<Vec<RecordedEmail>>,
    webhooks: Mutex<Vec<WebhookPayload>>,
    fail_emails: bool,
    fail_webhooks: bool,
}

impl InMemoryNotifySink {
    pub fn new() -> Self {
        Self {
            emails: Mutex::new(Vec::new()),
            webhooks: Mutex::new(Vec::new()),
            fail_emails: false,
            fail_webhooks: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            emails: Mutex::new(Vec::new()),
            webhooks: Mutex::new(Vec::new()),
            fail_emails: true,
            fail_webhooks: true,
        }
    }

    pub fn emails_sent(&self) -> Vec<RecordedEmail> {
        self.emails.lock().unwrap().clone()
    }

    pub fn webhooks_sent(&self) -> Vec<WebhookPayload> {
        self.webhooks.lock().unwrap().clone()
    }
}

impl Default for InMemoryNotifySink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotifySink for InMemoryNotifySink {
    async fn email(&self, kind: EmailKind, tx: &Transaction) -> Result<(), NotifyError> {
        if self.fail_emails {
            return Err(NotifyError::Email("simulated failure".into()));
        }
        let to = tx
            .payer
            .email
            .clone()
            .ok_or_else(|| NotifyError::Email("no payer email on transaction".into()))?;
        self.emails.lock().unwrap().push(RecordedEmail { kind, to });
        Ok(())
    }

    async fn webhook(&self, _url: &str, payload: &WebhookPayload) -> WebhookOutcome {
        if self.fail_webhooks {
            return WebhookOutcome::Failed {
                status: Some(500),
                error: "simulated failure".into(),
            };
        }
        self.webhooks.lock().unwrap().push(payload.clone());
        WebhookOutcome::Sent
    }
}
