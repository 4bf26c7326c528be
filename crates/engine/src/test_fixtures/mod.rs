//! Test fixtures and common test helpers.
//!
//! `StoreBuilder` populates a [`GraphStore`] from human-readable names and
//! remembers which identifier each name received.
//!
//! # Usage
//!
//! ```rust,ignore
//! use crate::test_fixtures::{fixed_clock, StoreBuilder};
//!
//! #[test]
//! fn test_quest_arc() {
//!     let (store, ids) = StoreBuilder::new(fixed_clock())
//!         .scene("A")
//!         .scene("B")
//!         .link("A", "B")
//!         .arc("Quest", &["A", "B"])
//!         .build_with_ids();
//!     let quest = store.get_arc(ids.arc("Quest")).unwrap();
//!     // ... test logic
//! }
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use proptest::collection::vec;
use proptest::prelude::*;
use plotgraph_domain::{ArcId, CharacterId, RelationshipKind, SceneId};

use crate::infrastructure::clock::FixedClock;
use crate::infrastructure::ports::ClockPort;
use crate::stores::{CreateArcInput, CreateCharacterInput, CreateSceneInput, GraphStore};

/// 2024-01-01T00:00:00Z, the instant every fixed clock reads.
pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

pub fn fixed_clock() -> Arc<dyn ClockPort> {
    Arc::new(FixedClock(epoch()))
}

// =============================================================================
// Name lookup
// =============================================================================

/// Identifiers assigned while building, keyed by fixture name.
#[derive(Debug, Clone, Default)]
pub struct FixtureIds {
    scenes: HashMap<String, SceneId>,
    characters: HashMap<String, CharacterId>,
    arcs: HashMap<String, ArcId>,
}

impl FixtureIds {
    /// # Panics
    ///
    /// Panics if no scene was built under `name`.
    pub fn scene(&self, name: &str) -> SceneId {
        *self
            .scenes
            .get(name)
            .unwrap_or_else(|| panic!("no fixture scene named '{}'", name))
    }

    pub fn character(&self, name: &str) -> CharacterId {
        *self
            .characters
            .get(name)
            .unwrap_or_else(|| panic!("no fixture character named '{}'", name))
    }

    pub fn arc(&self, name: &str) -> ArcId {
        *self
            .arcs
            .get(name)
            .unwrap_or_else(|| panic!("no fixture arc named '{}'", name))
    }
}

// =============================================================================
// StoreBuilder
// =============================================================================

/// Fluent builder for populated stores. Every step panics on failure; it is
/// only meant for tests.
pub struct StoreBuilder {
    store: GraphStore,
    ids: FixtureIds,
}

impl StoreBuilder {
    pub fn new(clock: Arc<dyn ClockPort>) -> Self {
        Self {
            store: GraphStore::new(clock),
            ids: FixtureIds::default(),
        }
    }

    pub fn scene(mut self, title: &str) -> Self {
        let id = self
            .store
            .create_scene(CreateSceneInput::titled(title))
            .unwrap_or_else(|e| panic!("fixture scene '{}': {}", title, e));
        self.ids.scenes.insert(title.to_string(), id);
        self
    }

    pub fn link(mut self, from: &str, to: &str) -> Self {
        let (from, to) = (self.ids.scene(from), self.ids.scene(to));
        self.store.link_scenes(from, to).unwrap();
        self
    }

    pub fn character(mut self, name: &str) -> Self {
        let id = self
            .store
            .create_character(CreateCharacterInput::named(name))
            .unwrap_or_else(|e| panic!("fixture character '{}': {}", name, e));
        self.ids.characters.insert(name.to_string(), id);
        self
    }

    /// Mark `character` as present in `scene` (both sides).
    pub fn present(mut self, character: &str, scene: &str) -> Self {
        let (character, scene) = (self.ids.character(character), self.ids.scene(scene));
        self.store.link_character(scene, character).unwrap();
        self
    }

    pub fn relationship(
        mut self,
        from: &str,
        to: &str,
        kind: RelationshipKind,
        strength: u8,
    ) -> Self {
        let (from, to) = (self.ids.character(from), self.ids.character(to));
        self.store
            .add_relationship(from, to, kind, strength)
            .unwrap();
        self
    }

    pub fn arc(mut self, intent: &str, scenes: &[&str]) -> Self {
        let scenes = scenes.iter().map(|s| self.ids.scene(s)).collect();
        let id = self
            .store
            .create_arc(CreateArcInput {
                intent: intent.to_string(),
                scenes,
                ..CreateArcInput::default()
            })
            .unwrap_or_else(|e| panic!("fixture arc '{}': {}", intent, e));
        self.ids.arcs.insert(intent.to_string(), id);
        self
    }

    pub fn build(self) -> GraphStore {
        self.store
    }

    pub fn build_with_ids(self) -> (GraphStore, FixtureIds) {
        (self.store, self.ids)
    }
}

// =============================================================================
// Random graphs
// =============================================================================

/// Index-based description of a graph, generated by [`graph_shape`] and
/// materialized with [`GraphShape::build`].
#[derive(Debug, Clone)]
pub struct GraphShape {
    pub scenes: usize,
    pub links: Vec<(usize, usize)>,
    pub characters: usize,
    /// (character, scene)
    pub presence: Vec<(usize, usize)>,
    pub relationships: Vec<(usize, usize)>,
    pub arcs: Vec<Vec<usize>>,
}

/// Graphs of 1..12 scenes and 1..5 characters with arbitrary links (cycles
/// and self-links included), presence, relationships and arcs.
pub fn graph_shape() -> impl Strategy<Value = GraphShape> {
    (1..12usize, 1..5usize).prop_flat_map(|(scenes, characters)| {
        (
            vec((0..scenes, 0..scenes), 0..24),
            vec((0..characters, 0..scenes), 0..10),
            vec((0..characters, 0..characters), 0..6),
            vec(vec(0..scenes, 0..5), 0..3),
        )
            .prop_map(move |(links, presence, relationships, arcs)| GraphShape {
                scenes,
                links,
                characters,
                presence,
                relationships,
                arcs,
            })
    })
}

impl GraphShape {
    pub fn build(&self, clock: Arc<dyn ClockPort>) -> (GraphStore, Vec<SceneId>) {
        let mut store = GraphStore::new(clock);
        let scenes: Vec<SceneId> = (0..self.scenes)
            .map(|i| {
                store
                    .create_scene(CreateSceneInput::titled(format!("S{}", i)))
                    .unwrap()
            })
            .collect();
        let characters: Vec<CharacterId> = (0..self.characters)
            .map(|i| {
                store
                    .create_character(CreateCharacterInput::named(format!("C{}", i)))
                    .unwrap()
            })
            .collect();
        for &(from, to) in &self.links {
            store.link_scenes(scenes[from], scenes[to]).unwrap();
        }
        for &(character, scene) in &self.presence {
            store
                .link_character(scenes[scene], characters[character])
                .unwrap();
        }
        for &(from, to) in &self.relationships {
            if from != to {
                store
                    .add_relationship(
                        characters[from],
                        characters[to],
                        RelationshipKind::Friendship,
                        50,
                    )
                    .unwrap();
            }
        }
        for (i, members) in self.arcs.iter().enumerate() {
            let mut seen = Vec::new();
            for &m in members {
                if !seen.contains(&scenes[m]) {
                    seen.push(scenes[m]);
                }
            }
            store
                .create_arc(CreateArcInput {
                    intent: format!("Arc {}", i),
                    scenes: seen,
                    ..CreateArcInput::default()
                })
                .unwrap();
        }
        (store, scenes)
    }
}
