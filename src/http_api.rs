//! Thin axum boundary for the two operations the engine exposes publicly
//! (§4.1 `StartVerification`, `GetStatus`). Out of the engine's own scope
//! per §1, but every caller needs *some* surface to drive it from: a
//! `State<Arc<_>>`-extracted service type, `Json` request/response bodies,
//! and an `ErrorResponse` wrapper keyed off the domain error's own status
//! mapping.

use crate::domain::{Currency, PaymentType};
use crate::engine::{StartVerificationPayload, StatusSnapshot, VerificationEngine};
use crate::error::EngineError;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

pub fn router(engine: Arc<VerificationEngine>) -> Router {
    Router::new()
        .route("/verify/{reference}", post(start_verification).get(get_status))
        .with_state(engine)
}

#[derive(Debug, Deserialize)]
pub struct StartVerificationRequest {
    pub sender_name: Option<String>,
    pub sender_phone: Option<String>,
    pub sender_email: Option<String>,
    pub currency: Currency,
    pub provider_tx_id: String,
    pub payment_type: PaymentType,
    pub amount: BigDecimal,
    pub success_url: Option<String>,
    pub payment_link_id: uuid::Uuid,
}

#[derive(Debug, Serialize)]
pub struct StartVerificationResponse {
    pub phase: &'static str,
    pub poll_interval_secs: u64,
    pub max_duration_secs: u64,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub state: &'static str,
    pub amount: BigDecimal,
    pub currency: &'static str,
    pub provider_ref: Option<String>,
    pub sender_name: Option<String>,
    pub sender_email: Option<String>,
    pub sender_phone: Option<String>,
    pub verification_started_at: Option<DateTime<Utc>>,
    pub last_verification_check: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
}

impl From<StatusSnapshot> for StatusResponse {
    fn from(s: StatusSnapshot) -> Self {
        Self {
            state: s.state.as_str(),
            amount: s.amount,
            currency: s.currency.as_str(),
            provider_ref: s.provider_ref,
            sender_name: s.sender_name,
            sender_email: s.sender_email,
            sender_phone: s.sender_phone,
            verification_started_at: s.verification_started_at,
            last_verification_check: s.last_verification_check,
            expires_at: s.expires_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub message: String,
    pub retryable: bool,
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorResponse {
            error: ErrorDetail {
                message: self.to_string(),
                retryable: self.is_retryable(),
            },
        };
        (status, Json(body)).into_response()
    }
}

async fn start_verification(
    State(engine): State<Arc<VerificationEngine>>,
    Path(reference): Path<String>,
    Json(request): Json<StartVerificationRequest>,
) -> Result<Json<StartVerificationResponse>, EngineError> {
    info!(reference = %reference, "POST /verify/:reference");

    let payload = StartVerificationPayload {
        sender_name: request.sender_name,
        sender_phone: request.sender_phone,
        sender_email: request.sender_email,
        currency: request.currency,
        provider_tx_id: request.provider_tx_id,
        payment_type: request.payment_type,
        amount: request.amount,
        success_url: request.success_url,
        payment_link_id: request.payment_link_id,
    };

    let schedule = engine.start_verification(&reference, payload).await?;

    Ok(Json(StartVerificationResponse {
        phase: schedule.phase,
        poll_interval_secs: schedule.poll_interval.as_secs(),
        max_duration_secs: schedule.max_duration.as_secs(),
    }))
}

async fn get_status(
    State(engine): State<Arc<VerificationEngine>>,
    Path(reference): Path<String>,
) -> Result<Json<StatusResponse>, EngineError> {
    match engine.get_status(&reference).await {
        Ok(snapshot) => Ok(Json(snapshot.into())),
        Err(e) => {
            warn!(reference = %reference, error = %e, "GET /verify/:reference failed");
            Err(e)
        }
    }
}
