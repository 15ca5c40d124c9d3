//! `ProviderClient` — the read-only clearance query against the payment
//! provider (§2 component 3).
//!
//! An inner single-attempt call wrapped by a `loop` that retries transient
//! failures with growing backoff and gives up after a fixed attempt count,
//! logging `retry`/`backoff` fields at each step.

pub mod http;
pub mod retry;

use crate::domain::{Currency, PaymentType};
use crate::error::ProviderError;
use async_trait::async_trait;

/// Outcome of one clearance query (§4.3/§4.4). A provider-side "not yet
/// cleared" is success, not an error — only transport/protocol failures are
/// `Err`. `actualAmountPaid` is copied from the transaction's own `amount`
/// at confirmation time (§4.5 step 1), not read off the provider response,
/// so `Confirmed` carries no payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearanceOutcome {
    Confirmed,
    NotYet,
}

/// The three fields the wire contract (§6) requires per query, bundled so
/// the retry wrapper doesn't need to know the request shape.
#[derive(Debug, Clone)]
pub struct ClearanceQuery {
    pub currency: Currency,
    pub provider_ref: String,
    pub payment_type: PaymentType,
}

#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Queries clearance status for one transaction (§4.3 step 2).
    async fn check_clearance(&self, query: &ClearanceQuery) -> Result<ClearanceOutcome, ProviderError>;
}
