//! In-memory audit trail for testing

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use crate::traits::*;
use crate::types::*;

/// Audit sink that keeps events in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryAuditLog {
    events: Arc<RwLock<Vec<AuditEvent>>>,
    fail_next: Arc<AtomicBool>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `record` call fail without storing the event
    pub fn fail_next_record(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// Snapshot of all recorded events, oldest first
    pub fn events(&self) -> TrustResult<Vec<AuditEvent>> {
        self.events
            .read()
            .map(|events| events.clone())
            .map_err(|_| TrustError::Persistence("audit log lock poisoned".to_string()))
    }

    /// Events of one kind
    pub fn events_of(&self, action: AuditAction) -> TrustResult<Vec<AuditEvent>> {
        Ok(self
            .events()?
            .into_iter()
            .filter(|e| e.action == action)
            .collect())
    }
}

#[async_trait]
impl AuditSink for MemoryAuditLog {
    async fn record(&self, event: AuditEvent) -> TrustResult<()> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(TrustError::Persistence("audit sink unavailable".to_string()));
        }
        self.events
            .write()
            .map_err(|_| TrustError::Persistence("audit log lock poisoned".to_string()))?
            .push(event);
        Ok(())
    }
}
