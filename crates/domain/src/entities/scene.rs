//! Scene entity - a node in the directed causal/sequence graph
//!
//! Outgoing links form an ordered set (no duplicates, order significant).
//! Character presence is a set and must mirror `Character::scenes`; only the
//! graph store should call the presence mutators so both sides move together.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value_objects::{SceneCost, SceneTitle};
use crate::{CharacterId, SceneId};

/// A scene in the narrative graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scene {
    id: SceneId,
    title: SceneTitle,
    /// What happens
    #[serde(default)]
    premise: String,
    /// Why it matters to the story
    #[serde(default)]
    why: String,
    /// How it plays out
    #[serde(default)]
    how: String,
    #[serde(default)]
    cost: SceneCost,
    #[serde(default)]
    links: Vec<SceneId>,
    #[serde(default)]
    characters: BTreeSet<CharacterId>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Scene {
    pub fn new(title: SceneTitle, now: DateTime<Utc>) -> Self {
        Self {
            id: SceneId::new(),
            title,
            premise: String::new(),
            why: String::new(),
            how: String::new(),
            cost: SceneCost::default(),
            links: Vec::new(),
            characters: BTreeSet::new(),
            created_at: now,
            updated_at: now,
        }
    }

    // Read accessors
    pub fn id(&self) -> SceneId {
        self.id
    }

    pub fn title(&self) -> &SceneTitle {
        &self.title
    }

    pub fn premise(&self) -> &str {
        &self.premise
    }

    pub fn why(&self) -> &str {
        &self.why
    }

    pub fn how(&self) -> &str {
        &self.how
    }

    pub fn cost(&self) -> SceneCost {
        self.cost
    }

    pub fn links(&self) -> &[SceneId] {
        &self.links
    }

    pub fn characters(&self) -> &BTreeSet<CharacterId> {
        &self.characters
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn links_to(&self, target: SceneId) -> bool {
        self.links.contains(&target)
    }

    pub fn has_character(&self, character: CharacterId) -> bool {
        self.characters.contains(&character)
    }

    // Builder methods
    pub fn with_premise(mut self, premise: impl Into<String>) -> Self {
        self.premise = premise.into();
        self
    }

    pub fn with_why(mut self, why: impl Into<String>) -> Self {
        self.why = why.into();
        self
    }

    pub fn with_how(mut self, how: impl Into<String>) -> Self {
        self.how = how.into();
        self
    }

    pub fn with_cost(mut self, cost: SceneCost) -> Self {
        self.cost = cost;
        self
    }

    // Setter methods
    pub fn set_title(&mut self, title: SceneTitle, now: DateTime<Utc>) {
        self.title = title;
        self.updated_at = now;
    }

    pub fn set_premise(&mut self, premise: impl Into<String>, now: DateTime<Utc>) {
        self.premise = premise.into();
        self.updated_at = now;
    }

    pub fn set_why(&mut self, why: impl Into<String>, now: DateTime<Utc>) {
        self.why = why.into();
        self.updated_at = now;
    }

    pub fn set_how(&mut self, how: impl Into<String>, now: DateTime<Utc>) {
        self.how = how.into();
        self.updated_at = now;
    }

    pub fn set_cost(&mut self, cost: SceneCost, now: DateTime<Utc>) {
        self.cost = cost;
        self.updated_at = now;
    }

    /// Append an outgoing link. Returns false if the link already exists.
    pub fn add_link(&mut self, target: SceneId, now: DateTime<Utc>) -> bool {
        if self.links.contains(&target) {
            return false;
        }
        self.links.push(target);
        self.updated_at = now;
        true
    }

    pub fn remove_link(&mut self, target: SceneId, now: DateTime<Utc>) -> bool {
        let before = self.links.len();
        self.links.retain(|l| *l != target);
        if self.links.len() != before {
            self.updated_at = now;
            true
        } else {
            false
        }
    }

    pub fn add_character(&mut self, character: CharacterId, now: DateTime<Utc>) -> bool {
        let inserted = self.characters.insert(character);
        if inserted {
            self.updated_at = now;
        }
        inserted
    }

    pub fn remove_character(&mut self, character: CharacterId, now: DateTime<Utc>) -> bool {
        let removed = self.characters.remove(&character);
        if removed {
            self.updated_at = now;
        }
        removed
    }

    /// Replace every attribute except identity and creation time with `other`'s.
    pub fn overwrite_from(&mut self, other: &Scene) {
        self.title = other.title.clone();
        self.premise = other.premise.clone();
        self.why = other.why.clone();
        self.how = other.how.clone();
        self.cost = other.cost;
        self.links = other.links.clone();
        self.characters = other.characters.clone();
        self.updated_at = other.updated_at;
    }

    /// Names of the content fields that differ from `other` (timestamps ignored).
    pub fn differing_fields(&self, other: &Scene) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.title != other.title {
            fields.push("title");
        }
        if self.premise != other.premise {
            fields.push("premise");
        }
        if self.why != other.why {
            fields.push("why");
        }
        if self.how != other.how {
            fields.push("how");
        }
        if self.cost != other.cost {
            fields.push("cost");
        }
        if self.links != other.links {
            fields.push("links");
        }
        if self.characters != other.characters {
            fields.push("characters");
        }
        fields
    }

    pub fn same_content(&self, other: &Scene) -> bool {
        self.differing_fields(other).is_empty()
    }
}
