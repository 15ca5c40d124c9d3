//! In-memory `AuditLog` for deterministic tests — keeps every event so test
//! assertions can count occurrences of a given `AuditAction` per entity
//! (§8's "exactly one X audit" assertions).

use super::AuditLog;
use crate::domain::AuditEvent;
use crate::error::StoreError;
use async_trait::async_trait;
use std::sync::Mutex;

pub struct InMemoryAuditLog {
    events: Mutex<Vec<AuditEvent>>,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, entity_id: &str, action: crate::domain::AuditAction) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.entity_id == entity_id && e.action == action)
            .count()
    }
}

impl Default for InMemoryAuditLog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuditLog for InMemoryAuditLog {
    async fn record(&self, event: AuditEvent) -> Result<(), StoreError> {
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}
