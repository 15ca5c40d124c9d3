//! Error taxonomy (§7).
//!
//! Closed `thiserror::Error` enums with `#[from]` conversions and a single
//! `Internal(String)` catch-all, plus a blanket `From<anyhow::Error>` for
//! glue code that hasn't been classified yet.

use thiserror::Error;

/// Caller input was invalid; never changes engine state (§7 "Validation").
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("transaction not found: {reference}")]
    NotFound { reference: String },

    #[error("transaction {reference} is not pending or initialized (state: {state})")]
    InvalidState { reference: String, state: String },

    #[error("currency mismatch: expected {expected}, got {actual}")]
    CurrencyMismatch { expected: String, actual: String },

    #[error("amount mismatch: expected {expected}, got {actual}")]
    AmountMismatch { expected: String, actual: String },
}

/// Transport/protocol failures talking to the payment provider (§4.7, §7
/// "Transient provider"). Every variant here is retryable by the wrapper in
/// `provider::retry`; classification into Confirmed/NotYet/Error happens one
/// layer up, in the `ProviderClient` impl itself.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("network error: {0}")]
    Network(String),

    #[error("provider call timed out")]
    Timeout,

    #[error("provider returned unexpected status {status}")]
    UnexpectedStatus { status: u16 },

    #[error("malformed provider response: {0}")]
    Malformed(String),
}

/// Store-layer failures. CAS conflicts are NOT represented here — they are
/// normal control flow (§7 "Transient store") expressed as `Ok(None)` from
/// the relevant `TxStore` method.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store connection error: {0}")]
    Connection(String),

    #[error("store query error: {0}")]
    Query(String),

    #[error("row failed to decode: {0}")]
    Decode(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                StoreError::Connection(e.to_string())
            }
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                StoreError::Decode(e.to_string())
            }
            other => StoreError::Query(other.to_string()),
        }
    }
}

/// Best-effort notification sink failures (§7 "Sink failures"). Never
/// propagated out of the engine; always downgraded to an audited warning.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("email delivery failed: {0}")]
    Email(String),

    #[error("webhook delivery failed: {0}")]
    Webhook(String),

    #[error("webhook returned non-2xx status {status}")]
    WebhookStatus { status: u16 },
}

/// Top-level engine error, returned from the public API (§6) and mapped to
/// HTTP status codes at the (out-of-scope) caller boundary.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<anyhow::Error> for EngineError {
    fn from(e: anyhow::Error) -> Self {
        EngineError::Internal(e.to_string())
    }
}

impl EngineError {
    /// HTTP status mapping per §7: "400 for validation, 404 for NotFound,
    /// 500 only for unhandled hard errors."
    pub fn status_code(&self) -> u16 {
        match self {
            EngineError::Validation(ValidationError::NotFound { .. }) => 404,
            EngineError::Validation(_) => 400,
            _ => 500,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::Provider(_) | EngineError::Store(StoreError::Connection(_))
        )
    }
}
