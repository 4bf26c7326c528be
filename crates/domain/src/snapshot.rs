//! Graph snapshots - immutable whole-state copies of a narrative graph
//!
//! A snapshot is the unit of branching, rollback and divergence comparison.
//! The serialized layout is
//! `{ scenes: [...], arcs: [...], characters: [...], metadata: { version, timestamp } }`.

use std::collections::HashSet;
use std::hash::Hash;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entities::{Character, Scene, StoryArc};
use crate::error::DomainError;
use crate::{ArcId, CharacterId, SceneId};

/// Metadata about a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotMetadata {
    /// Store revision the snapshot was taken at
    pub version: u64,
    pub timestamp: DateTime<Utc>,
}

/// Complete, deep-copied projection of a graph store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphSnapshot {
    scenes: Vec<Scene>,
    arcs: Vec<StoryArc>,
    characters: Vec<Character>,
    metadata: SnapshotMetadata,
}

impl GraphSnapshot {
    pub fn new(
        scenes: Vec<Scene>,
        arcs: Vec<StoryArc>,
        characters: Vec<Character>,
        metadata: SnapshotMetadata,
    ) -> Self {
        Self {
            scenes,
            arcs,
            characters,
            metadata,
        }
    }

    pub fn empty(timestamp: DateTime<Utc>) -> Self {
        Self::new(
            Vec::new(),
            Vec::new(),
            Vec::new(),
            SnapshotMetadata {
                version: 0,
                timestamp,
            },
        )
    }

    pub fn scenes(&self) -> &[Scene] {
        &self.scenes
    }

    pub fn arcs(&self) -> &[StoryArc] {
        &self.arcs
    }

    pub fn characters(&self) -> &[Character] {
        &self.characters
    }

    pub fn metadata(&self) -> SnapshotMetadata {
        self.metadata
    }

    pub fn scene(&self, id: SceneId) -> Option<&Scene> {
        self.scenes.iter().find(|s| s.id() == id)
    }

    pub fn arc(&self, id: ArcId) -> Option<&StoryArc> {
        self.arcs.iter().find(|a| a.id() == id)
    }

    pub fn character(&self, id: CharacterId) -> Option<&Character> {
        self.characters.iter().find(|c| c.id() == id)
    }

    pub fn entity_count(&self) -> usize {
        self.scenes.len() + self.arcs.len() + self.characters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entity_count() == 0
    }

    /// True when both snapshots hold identical entities in identical order,
    /// regardless of metadata.
    pub fn same_entities(&self, other: &GraphSnapshot) -> bool {
        self.scenes == other.scenes
            && self.arcs == other.arcs
            && self.characters == other.characters
    }

    /// Reject snapshots that carry the same identifier twice within a kind.
    pub fn check_unique_ids(&self) -> Result<(), DomainError> {
        first_duplicate(self.scenes.iter().map(Scene::id))
            .map_or(Ok(()), |id| Err(duplicate("Scene", id)))?;
        first_duplicate(self.arcs.iter().map(StoryArc::id))
            .map_or(Ok(()), |id| Err(duplicate("Arc", id)))?;
        first_duplicate(self.characters.iter().map(Character::id))
            .map_or(Ok(()), |id| Err(duplicate("Character", id)))
    }

    pub fn into_parts(self) -> (Vec<Scene>, Vec<StoryArc>, Vec<Character>, SnapshotMetadata) {
        (self.scenes, self.arcs, self.characters, self.metadata)
    }
}

fn first_duplicate<T: Eq + Hash + Copy>(ids: impl Iterator<Item = T>) -> Option<T> {
    let mut seen = HashSet::new();
    ids.into_iter().find(|id| !seen.insert(*id))
}

fn duplicate(entity_type: &'static str, id: impl std::fmt::Display) -> DomainError {
    DomainError::validation(
        "Snapshot",
        entity_type_field(entity_type),
        format!("duplicate {} id {}", entity_type, id),
    )
}

fn entity_type_field(entity_type: &'static str) -> &'static str {
    match entity_type {
        "Scene" => "scenes",
        "Arc" => "arcs",
        _ => "characters",
    }
}
