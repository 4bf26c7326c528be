//! Domain entities - Narrative objects with identity

mod character;
mod scene;
mod story_arc;
mod timeline;

pub use character::{Character, CharacterArc, TurningPoint};
pub use scene::Scene;
pub use story_arc::{ArcPhases, ArcStatus, PhaseBand, StoryArc, MAX_KEY_BEATS};
pub use timeline::{TimePoint, Timeline, TimelineKind};
