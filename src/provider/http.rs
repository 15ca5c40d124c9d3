//! `HttpProviderClient` — binds the `ProviderClient` trait to the wire
//! contract in §6: a `reqwest::Client` with a fixed timeout and structured
//! error mapping on every call.

use super::{ClearanceOutcome, ClearanceQuery, ProviderClient};
use crate::error::ProviderError;
use crate::middleware::logging::log_external_call;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::time::Duration;

#[derive(Serialize)]
struct QueryParam {
    name: &'static str,
    value: String,
}

#[derive(Serialize)]
struct QueryClearanceRequest {
    op: &'static str,
    params: Vec<QueryParam>,
}

pub struct HttpProviderClient {
    client: Client,
    endpoint: String,
    admin_id: String,
    admin_secret: String,
}

impl HttpProviderClient {
    pub fn new(
        endpoint: impl Into<String>,
        admin_id: impl Into<String>,
        admin_secret: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client builder accepts a plain timeout");
        Self {
            client,
            endpoint: endpoint.into(),
            admin_id: admin_id.into(),
            admin_secret: admin_secret.into(),
        }
    }
}

/// §6: "success when body.result == true OR body.success == true OR
/// body.status == 'success' OR body.result.status == 'completed'".
fn is_confirmed(payload: &JsonValue) -> bool {
    payload.get("result").and_then(JsonValue::as_bool) == Some(true)
        || payload.get("success").and_then(JsonValue::as_bool) == Some(true)
        || payload.get("status").and_then(JsonValue::as_str) == Some("success")
        || payload
            .get("result")
            .and_then(|r| r.get("status"))
            .and_then(JsonValue::as_str)
            == Some("completed")
}

#[async_trait]
impl ProviderClient for HttpProviderClient {
    async fn check_clearance(&self, query: &ClearanceQuery) -> Result<ClearanceOutcome, ProviderError> {
        let body = QueryClearanceRequest {
            op: "queryClearance",
            params: vec![
                QueryParam {
                    name: "currency",
                    value: query.currency.as_str().to_string(),
                },
                QueryParam {
                    name: "txid",
                    value: query.provider_ref.clone(),
                },
                QueryParam {
                    name: "paymenttype",
                    value: query.payment_type.as_str().to_string(),
                },
            ],
        };

        let payload = log_external_call("payment-provider", "queryClearance", async {
            let response = self
                .client
                .post(&self.endpoint)
                .header("admin", &self.admin_id)
                .header("adminpwd", &self.admin_secret)
                .json(&body)
                .send()
                .await
                .map_err(|e| {
                    if e.is_timeout() {
                        ProviderError::Timeout
                    } else {
                        ProviderError::Network(e.to_string())
                    }
                })?;

            let status = response.status();
            if !status.is_success() {
                return Err(ProviderError::UnexpectedStatus {
                    status: status.as_u16(),
                });
            }

            response
                .json::<JsonValue>()
                .await
                .map_err(|e| ProviderError::Malformed(e.to_string()))
        })
        .await?;

        if is_confirmed(&payload) {
            Ok(ClearanceOutcome::Confirmed)
        } else {
            Ok(ClearanceOutcome::NotYet)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn recognizes_all_four_confirmation_shapes() {
        assert!(is_confirmed(&json!({"result": true})));
        assert!(is_confirmed(&json!({"success": true})));
        assert!(is_confirmed(&json!({"status": "success"})));
        assert!(is_confirmed(&json!({"result": {"status": "completed"}})));
        assert!(!is_confirmed(&json!({"result": false})));
        assert!(!is_confirmed(&json!({})));
    }
}
