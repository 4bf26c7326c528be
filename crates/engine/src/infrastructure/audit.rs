//! Audit sink implementations.

use crate::infrastructure::ports::{AuditEntry, AuditPort};

/// Writes audit entries as structured `tracing` events.
#[derive(Debug, Default)]
pub struct TracingAuditLog;

impl TracingAuditLog {
    pub fn new() -> Self {
        Self
    }
}

impl AuditPort for TracingAuditLog {
    fn record(&self, entry: AuditEntry) {
        tracing::info!(
            target: "plotgraph::audit",
            audit_id = %entry.id,
            decision = %entry.decision_kind,
            actor = %entry.actor,
            context = %entry.context,
            "{}",
            entry.rationale
        );
    }
}

/// Discards every entry.
#[derive(Debug, Default)]
pub struct NoopAuditLog;

impl AuditPort for NoopAuditLog {
    fn record(&self, _entry: AuditEntry) {}
}
