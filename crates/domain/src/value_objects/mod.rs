//! Value objects - Immutable objects defined by their attributes

mod measures;
mod names;
mod relationship;

pub use measures::{RelationshipStrength, SceneCost};
pub use names::{CharacterName, SceneTitle, TimelineName, MAX_NAME_LENGTH};
pub use relationship::{Relationship, RelationshipKind};
