//! Branch manager - named snapshots of a graph store.
//!
//! Branches never track live mutations. `save` is the explicit commit step;
//! `switch` and `merge` replace the live store wholesale via
//! [`GraphStore::load_snapshot`].

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use plotgraph_domain::{
    ArcId, Character, CharacterId, DomainError, GraphSnapshot, Scene, SceneId, SnapshotMetadata,
    StoryArc,
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::infrastructure::ports::{AuditEntry, AuditPort, ClockPort, DecisionKind};
use crate::stores::GraphStore;

/// The protected default branch.
pub const MAIN_BRANCH: &str = "main";

const AUDIT_ACTOR: &str = "branch-manager";

#[derive(Debug, Error)]
pub enum BranchError {
    #[error("Branch name '{0}' is reserved")]
    Reserved(String),

    #[error("Branch '{0}' already exists")]
    AlreadyExists(String),

    #[error("Branch not found: {0}")]
    NotFound(String),

    #[error("Branch '{0}' is protected and cannot be deleted")]
    Protected(String),

    #[error("Branch '{0}' is checked out and cannot be deleted")]
    CheckedOut(String),

    #[error("Cannot merge branch '{0}' into itself")]
    SelfMerge(String),

    #[error(transparent)]
    Domain(#[from] DomainError),
}

// =============================================================================
// Branch records
// =============================================================================

struct Branch {
    snapshot: GraphSnapshot,
    parent: Option<String>,
    protected: bool,
    metadata: BTreeMap<String, String>,
    created_at: DateTime<Utc>,
    saved_at: DateTime<Utc>,
}

/// Read-only view of a branch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchInfo {
    pub name: String,
    pub parent: Option<String>,
    pub protected: bool,
    pub current: bool,
    pub metadata: BTreeMap<String, String>,
    pub version: u64,
    pub scene_count: usize,
    pub arc_count: usize,
    pub character_count: usize,
    pub created_at: DateTime<Utc>,
    pub saved_at: DateTime<Utc>,
}

// =============================================================================
// Merge results
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    SceneModified,
    SceneDeleted,
    ArcModified,
    ArcDeleted,
    CharacterModified,
    CharacterDeleted,
}

/// One entity the merge could not reconcile.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeConflict {
    pub kind: ConflictKind,
    pub entity_id: Uuid,
    /// Content fields that differ; empty for delete-vs-keep conflicts
    pub fields: Vec<&'static str>,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeOutcome {
    pub source: String,
    pub target: String,
    pub merged: bool,
    pub conflicts: Vec<MergeConflict>,
    pub added_scenes: Vec<SceneId>,
    pub added_arcs: Vec<ArcId>,
    pub added_characters: Vec<CharacterId>,
}

impl MergeOutcome {
    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }
}

// =============================================================================
// Manager
// =============================================================================

pub struct BranchManager {
    branches: HashMap<String, Branch>,
    order: Vec<String>,
    current: String,
    clock: Arc<dyn ClockPort>,
    audit: Arc<dyn AuditPort>,
}

impl BranchManager {
    /// Start with a protected `main` branch holding a snapshot of `store`.
    pub fn new(store: &GraphStore, clock: Arc<dyn ClockPort>, audit: Arc<dyn AuditPort>) -> Self {
        let now = clock.now();
        let main = Branch {
            snapshot: store.create_snapshot(),
            parent: None,
            protected: true,
            metadata: BTreeMap::new(),
            created_at: now,
            saved_at: now,
        };
        let mut branches = HashMap::new();
        branches.insert(MAIN_BRANCH.to_string(), main);
        Self {
            branches,
            order: vec![MAIN_BRANCH.to_string()],
            current: MAIN_BRANCH.to_string(),
            clock,
            audit,
        }
    }

    pub fn current(&self) -> &str {
        &self.current
    }

    pub fn get(&self, name: &str) -> Result<BranchInfo, BranchError> {
        let branch = self.branch(name)?;
        Ok(self.info(name, branch))
    }

    /// Branches in creation order.
    pub fn list(&self) -> Vec<BranchInfo> {
        self.order
            .iter()
            .filter_map(|name| self.branches.get(name).map(|b| self.info(name, b)))
            .collect()
    }

    /// The snapshot a branch currently holds.
    pub fn snapshot(&self, name: &str) -> Result<&GraphSnapshot, BranchError> {
        Ok(&self.branch(name)?.snapshot)
    }

    fn branch(&self, name: &str) -> Result<&Branch, BranchError> {
        self.branches
            .get(name)
            .ok_or_else(|| BranchError::NotFound(name.to_string()))
    }

    fn info(&self, name: &str, branch: &Branch) -> BranchInfo {
        BranchInfo {
            name: name.to_string(),
            parent: branch.parent.clone(),
            protected: branch.protected,
            current: name == self.current,
            metadata: branch.metadata.clone(),
            version: branch.snapshot.metadata().version,
            scene_count: branch.snapshot.scenes().len(),
            arc_count: branch.snapshot.arcs().len(),
            character_count: branch.snapshot.characters().len(),
            created_at: branch.created_at,
            saved_at: branch.saved_at,
        }
    }

    fn record(&self, kind: DecisionKind, rationale: String, context: serde_json::Value) {
        self.audit.record(
            AuditEntry::new(kind, rationale, AUDIT_ACTOR, self.clock.now()).with_context(context),
        );
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Create a branch from a snapshot of `store`, parented on the current
    /// branch. The current branch does not change.
    pub fn create(&mut self, name: &str, store: &GraphStore) -> Result<BranchInfo, BranchError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(DomainError::validation("Branch", "name", "cannot be empty").into());
        }
        if name == MAIN_BRANCH {
            return Err(BranchError::Reserved(name.to_string()));
        }
        if self.branches.contains_key(name) {
            return Err(BranchError::AlreadyExists(name.to_string()));
        }

        let now = self.clock.now();
        let branch = Branch {
            snapshot: store.create_snapshot(),
            parent: Some(self.current.clone()),
            protected: false,
            metadata: BTreeMap::new(),
            created_at: now,
            saved_at: now,
        };
        self.branches.insert(name.to_string(), branch);
        self.order.push(name.to_string());

        tracing::info!(branch = %name, parent = %self.current, "Created branch");
        self.record(
            DecisionKind::BranchCreated,
            format!("Created branch '{}' from '{}'", name, self.current),
            json!({ "branch": name, "parent": self.current }),
        );
        self.get(name)
    }

    /// Load the branch's snapshot into `store` and make it current. Unsaved
    /// changes in `store` are discarded.
    pub fn switch(&mut self, name: &str, store: &mut GraphStore) -> Result<(), BranchError> {
        let branch = self.branch(name)?;
        store.load_snapshot(&branch.snapshot)?;
        let previous = std::mem::replace(&mut self.current, name.to_string());

        tracing::info!(from = %previous, to = %name, "Switched branch");
        self.record(
            DecisionKind::BranchSwitched,
            format!("Switched from '{}' to '{}'", previous, name),
            json!({ "from": previous, "to": name }),
        );
        Ok(())
    }

    /// Commit `store` to the current branch.
    pub fn save(&mut self, store: &GraphStore) -> Result<BranchInfo, BranchError> {
        let now = self.clock.now();
        let snapshot = store.create_snapshot();
        let version = snapshot.metadata().version;
        let branch = self
            .branches
            .get_mut(&self.current)
            .ok_or_else(|| BranchError::NotFound(self.current.clone()))?;
        branch.snapshot = snapshot;
        branch.saved_at = now;

        let name = self.current.clone();
        tracing::info!(branch = %name, version, "Saved branch");
        self.record(
            DecisionKind::BranchSaved,
            format!("Saved branch '{}' at version {}", name, version),
            json!({ "branch": name, "version": version }),
        );
        self.get(&name)
    }

    pub fn delete(&mut self, name: &str) -> Result<(), BranchError> {
        let branch = self.branch(name)?;
        if branch.protected {
            return Err(BranchError::Protected(name.to_string()));
        }
        if name == self.current {
            return Err(BranchError::CheckedOut(name.to_string()));
        }
        self.branches.remove(name);
        self.order.retain(|b| b != name);

        tracing::info!(branch = %name, "Deleted branch");
        self.record(
            DecisionKind::BranchDeleted,
            format!("Deleted branch '{}'", name),
            json!({ "branch": name }),
        );
        Ok(())
    }

    pub fn set_metadata(
        &mut self,
        name: &str,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), BranchError> {
        let key = key.into();
        if key.trim().is_empty() {
            return Err(DomainError::validation("Branch", "metadata", "key cannot be empty").into());
        }
        let branch = self
            .branches
            .get_mut(name)
            .ok_or_else(|| BranchError::NotFound(name.to_string()))?;
        branch.metadata.insert(key, value.into());
        Ok(())
    }

    // =========================================================================
    // Merge
    // =========================================================================

    /// Merge `source` into the current branch.
    ///
    /// Conflicts abort the merge with nothing applied; they are returned in
    /// the outcome rather than as an error. On success the union is loaded
    /// into `store` and saved as the current branch.
    pub fn merge(
        &mut self,
        source: &str,
        store: &mut GraphStore,
    ) -> Result<MergeOutcome, BranchError> {
        if source == self.current {
            return Err(BranchError::SelfMerge(source.to_string()));
        }
        let incoming = &self.branch(source)?.snapshot;
        let base = &self.branch(&self.current)?.snapshot;

        let conflicts = diff_snapshots(incoming, base);
        let mut outcome = MergeOutcome {
            source: source.to_string(),
            target: self.current.clone(),
            merged: false,
            conflicts,
            added_scenes: Vec::new(),
            added_arcs: Vec::new(),
            added_characters: Vec::new(),
        };

        if outcome.has_conflicts() {
            tracing::warn!(
                source = %source,
                target = %self.current,
                conflicts = outcome.conflicts.len(),
                "Merge rejected"
            );
            self.record(
                DecisionKind::MergeRejected,
                format!(
                    "Merge of '{}' into '{}' rejected with {} conflict(s)",
                    source,
                    self.current,
                    outcome.conflicts.len()
                ),
                json!({
                    "source": source,
                    "target": self.current,
                    "conflicts": outcome.conflicts,
                }),
            );
            return Ok(outcome);
        }

        let union = union_snapshots(base, incoming, &mut outcome, self.clock.now());
        store.load_snapshot(&union)?;
        store.rebuild_presence();
        self.save(store)?;

        outcome.merged = true;
        tracing::info!(
            source = %source,
            target = %self.current,
            scenes = outcome.added_scenes.len(),
            arcs = outcome.added_arcs.len(),
            characters = outcome.added_characters.len(),
            "Merged branch"
        );
        self.record(
            DecisionKind::BranchMerged,
            format!("Merged '{}' into '{}'", source, self.current),
            json!({
                "source": source,
                "target": self.current,
                "addedScenes": outcome.added_scenes.len(),
                "addedArcs": outcome.added_arcs.len(),
                "addedCharacters": outcome.added_characters.len(),
            }),
        );
        Ok(outcome)
    }
}

/// Fields compared for characters during a merge. Presence is derived from
/// scenes and re-established after the union.
fn character_fields(ours: &Character, theirs: &Character) -> Vec<&'static str> {
    ours.differing_fields(theirs)
        .into_iter()
        .filter(|field| *field != "scenes")
        .collect()
}

fn diff_snapshots(incoming: &GraphSnapshot, base: &GraphSnapshot) -> Vec<MergeConflict> {
    let mut conflicts = Vec::new();

    for scene in base.scenes() {
        match incoming.scene(scene.id()) {
            None => conflicts.push(MergeConflict {
                kind: ConflictKind::SceneDeleted,
                entity_id: scene.id().to_uuid(),
                fields: Vec::new(),
                description: format!(
                    "Scene '{}' exists on the target but not on the source",
                    scene.title()
                ),
            }),
            Some(theirs) => {
                let fields = scene.differing_fields(theirs);
                if !fields.is_empty() {
                    conflicts.push(MergeConflict {
                        kind: ConflictKind::SceneModified,
                        entity_id: scene.id().to_uuid(),
                        description: format!(
                            "Scene '{}' differs in {}",
                            scene.title(),
                            fields.join(", ")
                        ),
                        fields,
                    });
                }
            }
        }
    }

    for arc in base.arcs() {
        match incoming.arc(arc.id()) {
            None => conflicts.push(MergeConflict {
                kind: ConflictKind::ArcDeleted,
                entity_id: arc.id().to_uuid(),
                fields: Vec::new(),
                description: format!(
                    "Arc '{}' exists on the target but not on the source",
                    arc.intent()
                ),
            }),
            Some(theirs) => {
                let fields = arc.differing_fields(theirs);
                if !fields.is_empty() {
                    conflicts.push(MergeConflict {
                        kind: ConflictKind::ArcModified,
                        entity_id: arc.id().to_uuid(),
                        description: format!(
                            "Arc '{}' differs in {}",
                            arc.intent(),
                            fields.join(", ")
                        ),
                        fields,
                    });
                }
            }
        }
    }

    for character in base.characters() {
        match incoming.character(character.id()) {
            None => conflicts.push(MergeConflict {
                kind: ConflictKind::CharacterDeleted,
                entity_id: character.id().to_uuid(),
                fields: Vec::new(),
                description: format!(
                    "Character '{}' exists on the target but not on the source",
                    character.name()
                ),
            }),
            Some(theirs) => {
                let fields = character_fields(character, theirs);
                if !fields.is_empty() {
                    conflicts.push(MergeConflict {
                        kind: ConflictKind::CharacterModified,
                        entity_id: character.id().to_uuid(),
                        description: format!(
                            "Character '{}' differs in {}",
                            character.name(),
                            fields.join(", ")
                        ),
                        fields,
                    });
                }
            }
        }
    }

    conflicts
}

/// Base entities in base order followed by source-only entities in source
/// order.
fn union_snapshots(
    base: &GraphSnapshot,
    incoming: &GraphSnapshot,
    outcome: &mut MergeOutcome,
    now: DateTime<Utc>,
) -> GraphSnapshot {
    let mut scenes: Vec<Scene> = base.scenes().to_vec();
    for scene in incoming.scenes() {
        if base.scene(scene.id()).is_none() {
            outcome.added_scenes.push(scene.id());
            scenes.push(scene.clone());
        }
    }
    let mut arcs: Vec<StoryArc> = base.arcs().to_vec();
    for arc in incoming.arcs() {
        if base.arc(arc.id()).is_none() {
            outcome.added_arcs.push(arc.id());
            arcs.push(arc.clone());
        }
    }
    let mut characters: Vec<Character> = base.characters().to_vec();
    for character in incoming.characters() {
        if base.character(character.id()).is_none() {
            outcome.added_characters.push(character.id());
            characters.push(character.clone());
        }
    }

    let version = base.metadata().version.max(incoming.metadata().version) + 1;
    GraphSnapshot::new(
        scenes,
        arcs,
        characters,
        SnapshotMetadata {
            version,
            timestamp: now,
        },
    )
}
