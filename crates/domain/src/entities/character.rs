//! Character entity - a participant in scenes with typed relationships
//!
//! `scenes` is the inverse of `Scene::characters`. Relationships are directed
//! and keyed by target: a character holds at most one relationship per target.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value_objects::{CharacterName, Relationship};
use crate::{CharacterId, SceneId};

/// A moment in a character's arc anchored to a scene
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurningPoint {
    pub scene: SceneId,
    #[serde(default)]
    pub description: String,
}

impl TurningPoint {
    pub fn new(scene: SceneId, description: impl Into<String>) -> Self {
        Self {
            scene,
            description: description.into(),
        }
    }
}

/// Personal arc of a character
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterArc {
    #[serde(default)]
    pub starting_state: String,
    #[serde(default)]
    pub current_state: String,
    #[serde(default)]
    pub desired_state: String,
    #[serde(default)]
    pub turning_points: Vec<TurningPoint>,
}

/// A character in the narrative graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Character {
    id: CharacterId,
    name: CharacterName,
    #[serde(default)]
    description: String,
    #[serde(default)]
    role: String,
    #[serde(default)]
    scenes: BTreeSet<SceneId>,
    #[serde(default)]
    relationships: Vec<Relationship>,
    #[serde(default)]
    arc: Option<CharacterArc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Character {
    pub fn new(name: CharacterName, now: DateTime<Utc>) -> Self {
        Self {
            id: CharacterId::new(),
            name,
            description: String::new(),
            role: String::new(),
            scenes: BTreeSet::new(),
            relationships: Vec::new(),
            arc: None,
            created_at: now,
            updated_at: now,
        }
    }

    // Read accessors
    pub fn id(&self) -> CharacterId {
        self.id
    }

    pub fn name(&self) -> &CharacterName {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn role(&self) -> &str {
        &self.role
    }

    pub fn scenes(&self) -> &BTreeSet<SceneId> {
        &self.scenes
    }

    pub fn relationships(&self) -> &[Relationship] {
        &self.relationships
    }

    pub fn relationship_with(&self, target: CharacterId) -> Option<&Relationship> {
        self.relationships.iter().find(|r| r.target == target)
    }

    pub fn arc(&self) -> Option<&CharacterArc> {
        self.arc.as_ref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn appears_in(&self, scene: SceneId) -> bool {
        self.scenes.contains(&scene)
    }

    // Builder methods
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = role.into();
        self
    }

    // Setter methods
    pub fn set_name(&mut self, name: CharacterName, now: DateTime<Utc>) {
        self.name = name;
        self.updated_at = now;
    }

    pub fn set_description(&mut self, description: impl Into<String>, now: DateTime<Utc>) {
        self.description = description.into();
        self.updated_at = now;
    }

    pub fn set_role(&mut self, role: impl Into<String>, now: DateTime<Utc>) {
        self.role = role.into();
        self.updated_at = now;
    }

    pub fn set_arc(&mut self, arc: Option<CharacterArc>, now: DateTime<Utc>) {
        self.arc = arc;
        self.updated_at = now;
    }

    pub fn add_scene(&mut self, scene: SceneId, now: DateTime<Utc>) -> bool {
        let inserted = self.scenes.insert(scene);
        if inserted {
            self.updated_at = now;
        }
        inserted
    }

    pub fn remove_scene(&mut self, scene: SceneId, now: DateTime<Utc>) -> bool {
        let removed = self.scenes.remove(&scene);
        if removed {
            self.updated_at = now;
        }
        removed
    }

    /// Insert or replace the relationship toward `relationship.target`.
    /// Returns true if an existing relationship was replaced.
    pub fn set_relationship(&mut self, relationship: Relationship, now: DateTime<Utc>) -> bool {
        self.updated_at = now;
        match self
            .relationships
            .iter_mut()
            .find(|r| r.target == relationship.target)
        {
            Some(existing) => {
                *existing = relationship;
                true
            }
            None => {
                self.relationships.push(relationship);
                false
            }
        }
    }

    pub fn remove_relationship(&mut self, target: CharacterId, now: DateTime<Utc>) -> bool {
        let before = self.relationships.len();
        self.relationships.retain(|r| r.target != target);
        let removed = self.relationships.len() != before;
        if removed {
            self.updated_at = now;
        }
        removed
    }

    /// Drop turning points anchored to `scene`. Returns true if any were removed.
    pub fn forget_turning_points(&mut self, scene: SceneId, now: DateTime<Utc>) -> bool {
        let Some(arc) = self.arc.as_mut() else {
            return false;
        };
        let before = arc.turning_points.len();
        arc.turning_points.retain(|tp| tp.scene != scene);
        let removed = arc.turning_points.len() != before;
        if removed {
            self.updated_at = now;
        }
        removed
    }

    pub fn overwrite_from(&mut self, other: &Character) {
        self.name = other.name.clone();
        self.description = other.description.clone();
        self.role = other.role.clone();
        self.scenes = other.scenes.clone();
        self.relationships = other.relationships.clone();
        self.arc = other.arc.clone();
        self.updated_at = other.updated_at;
    }

    /// Names of the content fields that differ from `other` (timestamps ignored).
    pub fn differing_fields(&self, other: &Character) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.name != other.name {
            fields.push("name");
        }
        if self.description != other.description {
            fields.push("description");
        }
        if self.role != other.role {
            fields.push("role");
        }
        if self.scenes != other.scenes {
            fields.push("scenes");
        }
        if self.relationships != other.relationships {
            fields.push("relationships");
        }
        if self.arc != other.arc {
            fields.push("arc");
        }
        fields
    }

    pub fn same_content(&self, other: &Character) -> bool {
        self.differing_fields(other).is_empty()
    }
}
