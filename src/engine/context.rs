//! Shared collaborator handles used by every engine subsystem.
//!
//! Grounded on §9's "explicit `VerificationEngine` value owning its
//! collaborators" note: a single `Arc<EngineContext>` is cloned into every
//! spawned task instead of closing over individual fields, so `Stop()` and
//! the poller map stay reachable from both the public API and the
//! background loops.

use super::stats::EngineStats;
use crate::audit::AuditLog;
use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::notify::NotifySink;
use crate::provider::ProviderClient;
use crate::store::TxStore;
use std::sync::Arc;

pub struct EngineContext {
    pub clock: Arc<dyn Clock>,
    pub store: Arc<dyn TxStore>,
    pub provider: Arc<dyn ProviderClient>,
    pub notify: Arc<dyn NotifySink>,
    pub audit: Arc<dyn AuditLog>,
    pub config: EngineConfig,
    pub engine_id: String,
    pub stats: EngineStats,
}
