use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::model::OutcomeStatus;

const CHANNEL_CAPACITY: usize = 256;

/// Fire-and-forget summary of an executed bulk run, consumed by the external
/// audit-log collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub tenant_id: String,
    pub operation: String,
    pub status: OutcomeStatus,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Broadcast hub for audit events, one channel per tenant. `send` never
/// blocks and never fails the batch that produced the event.
pub struct AuditHub {
    channels: DashMap<String, broadcast::Sender<AuditEvent>>,
}

impl Default for AuditHub {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to audit events for a tenant. Creates the channel if needed.
    pub fn subscribe(&self, tenant_id: &str) -> broadcast::Receiver<AuditEvent> {
        let sender = self
            .channels
            .entry(tenant_id.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Emit an event. No-op if nobody is listening.
    pub fn send(&self, event: AuditEvent) {
        if let Some(sender) = self.channels.get(&event.tenant_id) {
            let _ = sender.send(event);
        }
    }

    /// Remove a tenant's channel (e.g. on tenant teardown).
    pub fn remove(&self, tenant_id: &str) {
        self.channels.remove(tenant_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(tenant: &str) -> AuditEvent {
        AuditEvent {
            tenant_id: tenant.into(),
            operation: "bulk_create_shifts".into(),
            status: OutcomeStatus::Completed,
            total: 3,
            succeeded: 3,
            failed: 0,
            skipped: 0,
        }
    }

    #[tokio::test]
    async fn subscribe_and_receive() {
        let hub = AuditHub::new();
        let mut rx = hub.subscribe("acme");
        hub.send(event("acme"));
        let received = rx.recv().await.unwrap();
        assert_eq!(received.succeeded, 3);
    }

    #[tokio::test]
    async fn send_without_subscribers_is_noop() {
        let hub = AuditHub::new();
        // No subscriber — should not panic or block
        hub.send(event("nobody"));
    }

    #[tokio::test]
    async fn tenants_have_separate_channels() {
        let hub = AuditHub::new();
        let mut rx_a = hub.subscribe("a");
        let _rx_b = hub.subscribe("b");
        hub.send(event("b"));
        assert!(rx_a.try_recv().is_err());
    }
}
