//! Timeline entity - an ordered placement of scenes on a relative time axis
//!
//! Timestamps are integer ticks relative to the timeline's own origin. Points
//! are kept sorted by timestamp; points sharing a timestamp keep insertion
//! order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::value_objects::TimelineName;
use crate::{SceneId, TimelineId};

/// Kind of timeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimelineKind {
    Main,
    Flashback,
    FlashForward,
    Alternate,
    Dream,
    Parallel,
}

impl std::fmt::Display for TimelineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Main => write!(f, "main"),
            Self::Flashback => write!(f, "flashback"),
            Self::FlashForward => write!(f, "flash_forward"),
            Self::Alternate => write!(f, "alternate"),
            Self::Dream => write!(f, "dream"),
            Self::Parallel => write!(f, "parallel"),
        }
    }
}

impl std::str::FromStr for TimelineKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "main" => Ok(Self::Main),
            "flashback" => Ok(Self::Flashback),
            "flash_forward" | "flashforward" => Ok(Self::FlashForward),
            "alternate" => Ok(Self::Alternate),
            "dream" => Ok(Self::Dream),
            "parallel" => Ok(Self::Parallel),
            _ => Err(DomainError::parse(format!("Unknown timeline kind: {}", s))),
        }
    }
}

/// A scene placed at a relative timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimePoint {
    pub scene: SceneId,
    pub at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timeline {
    id: TimelineId,
    name: TimelineName,
    kind: TimelineKind,
    points: Vec<TimePoint>,
    parent: Option<TimelineId>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Timeline {
    pub fn new(name: TimelineName, kind: TimelineKind, now: DateTime<Utc>) -> Self {
        Self {
            id: TimelineId::new(),
            name,
            kind,
            points: Vec::new(),
            parent: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn id(&self) -> TimelineId {
        self.id
    }

    pub fn name(&self) -> &TimelineName {
        &self.name
    }

    pub fn kind(&self) -> TimelineKind {
        self.kind
    }

    pub fn points(&self) -> &[TimePoint] {
        &self.points
    }

    pub fn parent(&self) -> Option<TimelineId> {
        self.parent
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn with_parent(mut self, parent: Option<TimelineId>) -> Self {
        self.parent = parent;
        self
    }

    pub fn contains_scene(&self, scene: SceneId) -> bool {
        self.points.iter().any(|p| p.scene == scene)
    }

    pub fn point_for(&self, scene: SceneId) -> Option<&TimePoint> {
        self.points.iter().find(|p| p.scene == scene)
    }

    /// Insert a point keeping timestamp order. Returns false if the scene is
    /// already placed on this timeline.
    pub fn insert_point(&mut self, scene: SceneId, at: i64, now: DateTime<Utc>) -> bool {
        if self.contains_scene(scene) {
            return false;
        }
        let index = self.points.partition_point(|p| p.at <= at);
        self.points.insert(index, TimePoint { scene, at });
        self.updated_at = now;
        true
    }

    pub fn remove_point(&mut self, scene: SceneId, now: DateTime<Utc>) -> bool {
        let before = self.points.len();
        self.points.retain(|p| p.scene != scene);
        let removed = self.points.len() != before;
        if removed {
            self.updated_at = now;
        }
        removed
    }
}
