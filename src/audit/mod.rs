//! `AuditLog` — append-only record of engine events (§2 component 5).
//!
//! Fire-and-forget from the engine's perspective per §9 "Design Notes":
//! every state CAS is followed by exactly one audit write, but a failed
//! audit write never unwinds the state change that preceded it.

pub mod memory;
pub mod postgres;

use crate::domain::AuditEvent;
use crate::error::StoreError;
use async_trait::async_trait;

#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn record(&self, event: AuditEvent) -> Result<(), StoreError>;
}
