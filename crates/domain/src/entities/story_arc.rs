//! StoryArc entity - an ordered path of scenes with a lifecycle
//!
//! Named `StoryArc` rather than `Arc` so it never shadows `std::sync::Arc`.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::{ArcId, SceneId};

/// Maximum number of key beats in an arc's phase partition
pub const MAX_KEY_BEATS: usize = 5;

/// Lifecycle status of an arc
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArcStatus {
    #[default]
    Draft,
    Active,
    Completed,
    Archived,
}

impl std::fmt::Display for ArcStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Draft => write!(f, "draft"),
            Self::Active => write!(f, "active"),
            Self::Completed => write!(f, "completed"),
            Self::Archived => write!(f, "archived"),
        }
    }
}

impl std::str::FromStr for ArcStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "draft" => Ok(Self::Draft),
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            "archived" => Ok(Self::Archived),
            _ => Err(DomainError::parse(format!("Unknown arc status: {}", s))),
        }
    }
}

/// A named band grouping some of an arc's scenes (e.g. "setup", "confrontation")
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseBand {
    pub name: String,
    pub scenes: Vec<SceneId>,
}

impl PhaseBand {
    pub fn new(name: impl Into<String>, scenes: Vec<SceneId>) -> Self {
        Self {
            name: name.into(),
            scenes,
        }
    }
}

/// Optional partition of an arc into bands plus its key-beat subsequence
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArcPhases {
    #[serde(default)]
    pub bands: Vec<PhaseBand>,
    /// Up to five scenes, in arc order
    #[serde(default)]
    pub key_beats: Vec<SceneId>,
}

impl ArcPhases {
    /// Check the partition against the arc's scene sequence.
    ///
    /// Bands must have unique non-empty names and may only group member scenes,
    /// each scene in at most one band. Key beats must be members, at most
    /// five, and follow arc order.
    pub fn validate(&self, arc_scenes: &[SceneId]) -> Result<(), DomainError> {
        let mut names = HashSet::new();
        let mut banded = HashSet::new();
        for band in &self.bands {
            let name = band.name.trim();
            if name.is_empty() {
                return Err(DomainError::validation(
                    "Arc",
                    "phases.bands.name",
                    "cannot be empty",
                ));
            }
            if !names.insert(name.to_string()) {
                return Err(DomainError::validation(
                    "Arc",
                    "phases.bands.name",
                    format!("duplicate band name '{}'", name),
                ));
            }
            for scene in &band.scenes {
                if !arc_scenes.contains(scene) {
                    return Err(DomainError::validation(
                        "Arc",
                        "phases.bands.scenes",
                        format!("scene {} is not part of the arc", scene),
                    ));
                }
                if !banded.insert(*scene) {
                    return Err(DomainError::validation(
                        "Arc",
                        "phases.bands.scenes",
                        format!("scene {} appears in more than one band", scene),
                    ));
                }
            }
        }

        if self.key_beats.len() > MAX_KEY_BEATS {
            return Err(DomainError::validation(
                "Arc",
                "phases.keyBeats",
                format!(
                    "at most {} key beats allowed, got {}",
                    MAX_KEY_BEATS,
                    self.key_beats.len()
                ),
            ));
        }
        let mut last_index: Option<usize> = None;
        for beat in &self.key_beats {
            let Some(index) = arc_scenes.iter().position(|s| s == beat) else {
                return Err(DomainError::validation(
                    "Arc",
                    "phases.keyBeats",
                    format!("scene {} is not part of the arc", beat),
                ));
            };
            if last_index.is_some_and(|last| index <= last) {
                return Err(DomainError::validation(
                    "Arc",
                    "phases.keyBeats",
                    format!("scene {} is out of arc order", beat),
                ));
            }
            last_index = Some(index);
        }
        Ok(())
    }

    /// Drop every reference to `scene`. Returns true if anything changed.
    pub fn forget_scene(&mut self, scene: SceneId) -> bool {
        let mut changed = false;
        for band in &mut self.bands {
            let before = band.scenes.len();
            band.scenes.retain(|s| *s != scene);
            changed |= band.scenes.len() != before;
        }
        let before = self.key_beats.len();
        self.key_beats.retain(|s| *s != scene);
        changed | (self.key_beats.len() != before)
    }
}

/// A story arc: intent plus an ordered sequence of scenes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryArc {
    id: ArcId,
    intent: String,
    #[serde(default)]
    scenes: Vec<SceneId>,
    #[serde(default)]
    status: ArcStatus,
    #[serde(default)]
    phases: Option<ArcPhases>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl StoryArc {
    pub fn new(intent: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: ArcId::new(),
            intent: intent.into(),
            scenes: Vec::new(),
            status: ArcStatus::Draft,
            phases: None,
            created_at: now,
            updated_at: now,
        }
    }

    // Read accessors
    pub fn id(&self) -> ArcId {
        self.id
    }

    pub fn intent(&self) -> &str {
        &self.intent
    }

    pub fn scenes(&self) -> &[SceneId] {
        &self.scenes
    }

    pub fn status(&self) -> ArcStatus {
        self.status
    }

    pub fn phases(&self) -> Option<&ArcPhases> {
        self.phases.as_ref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn contains_scene(&self, scene: SceneId) -> bool {
        self.scenes.contains(&scene)
    }

    // Builder methods
    pub fn with_status(mut self, status: ArcStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_scenes(mut self, scenes: Vec<SceneId>) -> Self {
        self.scenes = scenes;
        self
    }

    // Setter methods
    pub fn set_intent(&mut self, intent: impl Into<String>, now: DateTime<Utc>) {
        self.intent = intent.into();
        self.updated_at = now;
    }

    pub fn set_status(&mut self, status: ArcStatus, now: DateTime<Utc>) {
        self.status = status;
        self.updated_at = now;
    }

    /// Replace the ordered member list. Callers validate phases against the
    /// new list first.
    pub fn set_scenes(&mut self, scenes: Vec<SceneId>, now: DateTime<Utc>) {
        self.scenes = scenes;
        self.updated_at = now;
    }

    pub fn set_phases(&mut self, phases: Option<ArcPhases>, now: DateTime<Utc>) {
        self.phases = phases;
        self.updated_at = now;
    }

    /// Insert a scene at `position` (appends when `None` or past the end).
    /// Returns false if the scene is already a member.
    pub fn insert_scene(
        &mut self,
        scene: SceneId,
        position: Option<usize>,
        now: DateTime<Utc>,
    ) -> bool {
        if self.scenes.contains(&scene) {
            return false;
        }
        match position {
            Some(pos) if pos <= self.scenes.len() => self.scenes.insert(pos, scene),
            _ => self.scenes.push(scene),
        }
        self.updated_at = now;
        true
    }

    /// Remove a scene from the sequence and from the phase partition.
    pub fn remove_scene(&mut self, scene: SceneId, now: DateTime<Utc>) -> bool {
        let before = self.scenes.len();
        self.scenes.retain(|s| *s != scene);
        let mut changed = self.scenes.len() != before;
        if let Some(phases) = self.phases.as_mut() {
            changed |= phases.forget_scene(scene);
        }
        if changed {
            self.updated_at = now;
        }
        changed
    }

    pub fn overwrite_from(&mut self, other: &StoryArc) {
        self.intent = other.intent.clone();
        self.scenes = other.scenes.clone();
        self.status = other.status;
        self.phases = other.phases.clone();
        self.updated_at = other.updated_at;
    }

    /// Names of the content fields that differ from `other` (timestamps ignored).
    pub fn differing_fields(&self, other: &StoryArc) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.intent != other.intent {
            fields.push("intent");
        }
        if self.scenes != other.scenes {
            fields.push("scenes");
        }
        if self.status != other.status {
            fields.push("status");
        }
        if self.phases != other.phases {
            fields.push("phases");
        }
        fields
    }

    pub fn same_content(&self, other: &StoryArc) -> bool {
        self.differing_fields(other).is_empty()
    }
}
