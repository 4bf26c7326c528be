//! Audit port - one-way sink for externally significant decisions.
//!
//! Recording is fire-and-forget: implementations must not fail the caller and
//! the core never reads back what was recorded.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Kind of decision being recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionKind {
    BranchCreated,
    BranchSwitched,
    BranchSaved,
    BranchDeleted,
    BranchMerged,
    MergeRejected,
    MirrorSynchronized,
}

impl std::fmt::Display for DecisionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::BranchCreated => "branch_created",
            Self::BranchSwitched => "branch_switched",
            Self::BranchSaved => "branch_saved",
            Self::BranchDeleted => "branch_deleted",
            Self::BranchMerged => "branch_merged",
            Self::MergeRejected => "merge_rejected",
            Self::MirrorSynchronized => "mirror_synchronized",
        };
        write!(f, "{}", label)
    }
}

/// A `(decisionKind, rationale, actor, context)` record
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub id: Uuid,
    pub recorded_at: DateTime<Utc>,
    pub decision_kind: DecisionKind,
    pub rationale: String,
    pub actor: String,
    pub context: serde_json::Value,
}

impl AuditEntry {
    pub fn new(
        decision_kind: DecisionKind,
        rationale: impl Into<String>,
        actor: impl Into<String>,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            recorded_at,
            decision_kind,
            rationale: rationale.into(),
            actor: actor.into(),
            context: serde_json::Value::Null,
        }
    }

    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = context;
        self
    }
}

#[cfg_attr(test, mockall::automock)]
pub trait AuditPort: Send + Sync {
    fn record(&self, entry: AuditEntry);
}
