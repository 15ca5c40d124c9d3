//! `HttpNotifySink` — webhook delivery per the exact contract in §6, and
//! email delivery via a generic HTTP email provider (grounded on the same
//! `reqwest::Client` + fixed-timeout pattern as `provider::http`).

use super::{EmailKind, NotifySink, WebhookOutcome, WebhookPayload};
use crate::domain::Transaction;
use crate::error::NotifyError;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

const USER_AGENT_SUFFIX: &str = "-Webhook/1.0";

pub struct HttpNotifySink {
    client: Client,
    webhook_client: Client,
    email_endpoint: String,
    email_api_key: String,
    service_name: String,
}

impl HttpNotifySink {
    pub fn new(
        email_endpoint: impl Into<String>,
        email_api_key: impl Into<String>,
        service_name: impl Into<String>,
        webhook_timeout: Duration,
    ) -> Self {
        let webhook_client = Client::builder()
            .timeout(webhook_timeout)
            .build()
            .expect("reqwest client builder accepts a plain timeout");
        Self {
            client: Client::new(),
            webhook_client,
            email_endpoint: email_endpoint.into(),
            email_api_key: email_api_key.into(),
            service_name: service_name.into(),
        }
    }
}

#[derive(Serialize)]
struct EmailRequest<'a> {
    to: &'a str,
    template: &'static str,
    #[serde(rename = "reference")]
    reference: &'a str,
    amount: String,
    currency: &'a str,
}

#[async_trait]
impl NotifySink for HttpNotifySink {
    async fn email(&self, kind: EmailKind, tx: &Transaction) -> Result<(), NotifyError> {
        let to = tx
            .payer
            .email
            .as_deref()
            .ok_or_else(|| NotifyError::Email("no payer email on transaction".into()))?;

        let template = match kind {
            EmailKind::Confirm => "payment_confirmed",
            EmailKind::Expire => "payment_expired",
        };

        let body = EmailRequest {
            to,
            template,
            reference: &tx.reference,
            amount: tx.amount.to_string(),
            currency: tx.currency.as_str(),
        };

        let response = self
            .client
            .post(&self.email_endpoint)
            .bearer_auth(&self.email_api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| NotifyError::Email(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(NotifyError::Email(format!(
                "email provider returned {}",
                response.status()
            )))
        }
    }

    async fn webhook(&self, url: &str, payload: &WebhookPayload) -> WebhookOutcome {
        let user_agent = format!("{}{}", self.service_name, USER_AGENT_SUFFIX);
        let result = self
            .webhook_client
            .post(url)
            .header("User-Agent", user_agent)
            .json(payload)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => WebhookOutcome::Sent,
            Ok(response) => WebhookOutcome::Failed {
                status: Some(response.status().as_u16()),
                error: format!("non-2xx status {}", response.status()),
            },
            Err(e) => WebhookOutcome::Failed {
                status: None,
                error: e.to_string(),
            },
        }
    }
}
