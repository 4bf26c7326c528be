//! Plotgraph domain: identifiers, narrative entities, value objects and
//! whole-graph snapshots.

extern crate self as plotgraph_domain;

pub mod entities;
pub mod error;
pub mod ids;
pub mod snapshot;
pub mod value_objects;

pub use entities::{
    ArcPhases, ArcStatus, Character, CharacterArc, PhaseBand, Scene, StoryArc, TimePoint,
    Timeline, TimelineKind, TurningPoint, MAX_KEY_BEATS,
};

pub use error::DomainError;

pub use ids::{ArcId, CharacterId, SceneId, TimelineId};

pub use snapshot::{GraphSnapshot, SnapshotMetadata};

pub use value_objects::{
    CharacterName, Relationship, RelationshipKind, RelationshipStrength, SceneCost, SceneTitle,
    TimelineName, MAX_NAME_LENGTH,
};
