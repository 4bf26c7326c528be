//! Graph store - authoritative in-memory mapping of scenes, arcs and characters.
//!
//! Every lookup is by identifier in a hash map; a per-kind insertion order list
//! keeps snapshots order preserving. All mutations validate first and touch the
//! store only after validation succeeded, so a rejected call leaves the store
//! exactly as it was.
//!
//! Character presence is kept symmetric by funnelling every change through
//! [`GraphStore::link_character`] / [`GraphStore::unlink_character`] (and the
//! cascades in the delete operations).

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use plotgraph_domain::{
    ArcId, ArcPhases, ArcStatus, Character, CharacterArc, CharacterId, CharacterName,
    DomainError, GraphSnapshot, Relationship, RelationshipKind, RelationshipStrength, Scene,
    SceneCost, SceneId, SceneTitle, SnapshotMetadata, StoryArc,
};

use crate::infrastructure::ports::ClockPort;

// =============================================================================
// Inputs
// =============================================================================

/// Input for creating a scene.
#[derive(Debug, Clone, Default)]
pub struct CreateSceneInput {
    pub title: String,
    pub premise: Option<String>,
    pub why: Option<String>,
    pub how: Option<String>,
    pub cost: Option<f64>,
    /// Outgoing links; every target must already exist
    pub links: Vec<SceneId>,
    /// Characters present; every character must already exist
    pub characters: Vec<CharacterId>,
}

impl CreateSceneInput {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }
}

/// Input for updating a scene. `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct UpdateSceneInput {
    pub title: Option<String>,
    pub premise: Option<String>,
    pub why: Option<String>,
    pub how: Option<String>,
    pub cost: Option<f64>,
    /// Replaces the outgoing links wholesale
    pub links: Option<Vec<SceneId>>,
}

/// Input for creating an arc.
#[derive(Debug, Clone, Default)]
pub struct CreateArcInput {
    pub intent: String,
    pub scenes: Vec<SceneId>,
    pub status: Option<ArcStatus>,
    pub phases: Option<ArcPhases>,
}

/// Input for updating an arc. `None` leaves a field untouched; `phases:
/// Some(None)` clears the phase partition.
#[derive(Debug, Clone, Default)]
pub struct UpdateArcInput {
    pub intent: Option<String>,
    pub scenes: Option<Vec<SceneId>>,
    pub status: Option<ArcStatus>,
    pub phases: Option<Option<ArcPhases>>,
}

/// Input for creating a character.
#[derive(Debug, Clone, Default)]
pub struct CreateCharacterInput {
    pub name: String,
    pub description: Option<String>,
    pub role: Option<String>,
}

impl CreateCharacterInput {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Input for updating a character. `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct UpdateCharacterInput {
    pub name: Option<String>,
    pub description: Option<String>,
    pub role: Option<String>,
}

/// Whether an upsert inserted a new entity or replaced an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Inserted,
    Replaced,
}

// =============================================================================
// Store
// =============================================================================

pub struct GraphStore {
    scenes: HashMap<SceneId, Scene>,
    scene_order: Vec<SceneId>,
    arcs: HashMap<ArcId, StoryArc>,
    arc_order: Vec<ArcId>,
    characters: HashMap<CharacterId, Character>,
    character_order: Vec<CharacterId>,
    revision: u64,
    clock: Arc<dyn ClockPort>,
}

impl std::fmt::Debug for GraphStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphStore")
            .field("scenes", &self.scenes.len())
            .field("arcs", &self.arcs.len())
            .field("characters", &self.characters.len())
            .field("revision", &self.revision)
            .finish()
    }
}

impl GraphStore {
    pub fn new(clock: Arc<dyn ClockPort>) -> Self {
        Self {
            scenes: HashMap::new(),
            scene_order: Vec::new(),
            arcs: HashMap::new(),
            arc_order: Vec::new(),
            characters: HashMap::new(),
            character_order: Vec::new(),
            revision: 0,
            clock,
        }
    }

    /// Build a store holding exactly the contents of `snapshot`.
    pub fn from_snapshot(
        snapshot: &GraphSnapshot,
        clock: Arc<dyn ClockPort>,
    ) -> Result<Self, DomainError> {
        let mut store = Self::new(clock);
        store.load_snapshot(snapshot)?;
        Ok(store)
    }

    pub fn clock(&self) -> &Arc<dyn ClockPort> {
        &self.clock
    }

    /// Monotonic mutation counter; snapshots are tagged with it.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    fn bump(&mut self) {
        self.revision += 1;
    }

    // =========================================================================
    // Read access
    // =========================================================================

    pub fn get_scene(&self, id: SceneId) -> Option<&Scene> {
        self.scenes.get(&id)
    }

    pub fn get_arc(&self, id: ArcId) -> Option<&StoryArc> {
        self.arcs.get(&id)
    }

    pub fn get_character(&self, id: CharacterId) -> Option<&Character> {
        self.characters.get(&id)
    }

    pub fn contains_scene(&self, id: SceneId) -> bool {
        self.scenes.contains_key(&id)
    }

    pub fn contains_arc(&self, id: ArcId) -> bool {
        self.arcs.contains_key(&id)
    }

    pub fn contains_character(&self, id: CharacterId) -> bool {
        self.characters.contains_key(&id)
    }

    /// Scenes in insertion order.
    pub fn scenes(&self) -> impl Iterator<Item = &Scene> + '_ {
        self.scene_order.iter().filter_map(|id| self.scenes.get(id))
    }

    /// Arcs in insertion order.
    pub fn arcs(&self) -> impl Iterator<Item = &StoryArc> + '_ {
        self.arc_order.iter().filter_map(|id| self.arcs.get(id))
    }

    /// Characters in insertion order.
    pub fn characters(&self) -> impl Iterator<Item = &Character> + '_ {
        self.character_order
            .iter()
            .filter_map(|id| self.characters.get(id))
    }

    pub fn scene_ids(&self) -> &[SceneId] {
        &self.scene_order
    }

    pub fn scene_count(&self) -> usize {
        self.scenes.len()
    }

    pub fn arc_count(&self) -> usize {
        self.arcs.len()
    }

    pub fn character_count(&self) -> usize {
        self.characters.len()
    }

    pub fn link_count(&self) -> usize {
        self.scenes.values().map(|s| s.links().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty() && self.arcs.is_empty() && self.characters.is_empty()
    }

    fn require_scene(&self, id: SceneId) -> Result<(), DomainError> {
        if self.scenes.contains_key(&id) {
            Ok(())
        } else {
            Err(DomainError::not_found("Scene", id))
        }
    }

    fn require_character(&self, id: CharacterId) -> Result<(), DomainError> {
        if self.characters.contains_key(&id) {
            Ok(())
        } else {
            Err(DomainError::not_found("Character", id))
        }
    }

    // =========================================================================
    // Scenes
    // =========================================================================

    pub fn create_scene(&mut self, input: CreateSceneInput) -> Result<SceneId, DomainError> {
        let title = SceneTitle::new(input.title)?;
        let cost = input.cost.map(SceneCost::new).transpose()?;
        for target in &input.links {
            self.require_scene(*target)?;
        }
        for character in &input.characters {
            self.require_character(*character)?;
        }

        let now = self.clock.now();
        let mut scene = Scene::new(title, now)
            .with_premise(input.premise.unwrap_or_default())
            .with_why(input.why.unwrap_or_default())
            .with_how(input.how.unwrap_or_default());
        if let Some(cost) = cost {
            scene = scene.with_cost(cost);
        }
        for target in input.links {
            scene.add_link(target, now);
        }
        let id = scene.id();
        for character_id in input.characters {
            scene.add_character(character_id, now);
            if let Some(character) = self.characters.get_mut(&character_id) {
                character.add_scene(id, now);
            }
        }

        self.scenes.insert(id, scene);
        self.scene_order.push(id);
        self.bump();
        tracing::debug!(scene_id = %id, revision = self.revision, "Created scene");
        Ok(id)
    }

    pub fn update_scene(
        &mut self,
        id: SceneId,
        input: UpdateSceneInput,
    ) -> Result<&Scene, DomainError> {
        self.require_scene(id)?;
        let title = input.title.map(SceneTitle::new).transpose()?;
        let cost = input.cost.map(SceneCost::new).transpose()?;
        if let Some(links) = &input.links {
            for target in links {
                self.require_scene(*target)?;
            }
        }

        let now = self.clock.now();
        let scene = self
            .scenes
            .get_mut(&id)
            .ok_or_else(|| DomainError::not_found("Scene", id))?;
        if let Some(title) = title {
            scene.set_title(title, now);
        }
        if let Some(premise) = input.premise {
            scene.set_premise(premise, now);
        }
        if let Some(why) = input.why {
            scene.set_why(why, now);
        }
        if let Some(how) = input.how {
            scene.set_how(how, now);
        }
        if let Some(cost) = cost {
            scene.set_cost(cost, now);
        }
        if let Some(links) = input.links {
            for existing in scene.links().to_vec() {
                scene.remove_link(existing, now);
            }
            for target in links {
                scene.add_link(target, now);
            }
        }
        self.revision += 1;
        tracing::debug!(scene_id = %id, revision = self.revision, "Updated scene");
        self.scenes
            .get(&id)
            .ok_or_else(|| DomainError::not_found("Scene", id))
    }

    /// Delete a scene and every reference to it: incoming links, arc
    /// membership (including phase bands and key beats), character presence
    /// and character turning points.
    pub fn delete_scene(&mut self, id: SceneId) -> Result<Scene, DomainError> {
        let scene = self
            .scenes
            .remove(&id)
            .ok_or_else(|| DomainError::not_found("Scene", id))?;
        self.scene_order.retain(|s| *s != id);

        let now = self.clock.now();
        let mut touched = 0usize;
        for other in self.scenes.values_mut() {
            touched += usize::from(other.remove_link(id, now));
        }
        for arc in self.arcs.values_mut() {
            touched += usize::from(arc.remove_scene(id, now));
        }
        for character in self.characters.values_mut() {
            let present = character.remove_scene(id, now);
            let turning = character.forget_turning_points(id, now);
            touched += usize::from(present || turning);
        }

        self.bump();
        tracing::debug!(
            scene_id = %id,
            cascaded = touched,
            revision = self.revision,
            "Deleted scene"
        );
        Ok(scene)
    }

    /// Add a directed link. Self-links are accepted; the coherence check
    /// reports them as cycles. Returns false if the link already existed.
    pub fn link_scenes(&mut self, from: SceneId, to: SceneId) -> Result<bool, DomainError> {
        self.require_scene(to)?;
        let now = self.clock.now();
        let scene = self
            .scenes
            .get_mut(&from)
            .ok_or_else(|| DomainError::not_found("Scene", from))?;
        let added = scene.add_link(to, now);
        if added {
            self.bump();
            tracing::debug!(from = %from, to = %to, "Linked scenes");
        }
        Ok(added)
    }

    pub fn unlink_scenes(&mut self, from: SceneId, to: SceneId) -> Result<bool, DomainError> {
        let now = self.clock.now();
        let scene = self
            .scenes
            .get_mut(&from)
            .ok_or_else(|| DomainError::not_found("Scene", from))?;
        let removed = scene.remove_link(to, now);
        if removed {
            self.bump();
        }
        Ok(removed)
    }

    // =========================================================================
    // Presence
    // =========================================================================

    /// Record that `character` is present in `scene`, on both sides.
    pub fn link_character(
        &mut self,
        scene_id: SceneId,
        character_id: CharacterId,
    ) -> Result<bool, DomainError> {
        self.require_scene(scene_id)?;
        self.require_character(character_id)?;
        let now = self.clock.now();
        let mut changed = false;
        if let Some(scene) = self.scenes.get_mut(&scene_id) {
            changed |= scene.add_character(character_id, now);
        }
        if let Some(character) = self.characters.get_mut(&character_id) {
            changed |= character.add_scene(scene_id, now);
        }
        if changed {
            self.bump();
            tracing::debug!(scene_id = %scene_id, character_id = %character_id, "Linked character");
        }
        Ok(changed)
    }

    pub fn unlink_character(
        &mut self,
        scene_id: SceneId,
        character_id: CharacterId,
    ) -> Result<bool, DomainError> {
        self.require_scene(scene_id)?;
        self.require_character(character_id)?;
        let now = self.clock.now();
        let mut changed = false;
        if let Some(scene) = self.scenes.get_mut(&scene_id) {
            changed |= scene.remove_character(character_id, now);
        }
        if let Some(character) = self.characters.get_mut(&character_id) {
            changed |= character.remove_scene(scene_id, now);
        }
        if changed {
            self.bump();
        }
        Ok(changed)
    }

    // =========================================================================
    // Arcs
    // =========================================================================

    fn validate_intent(intent: &str) -> Result<String, DomainError> {
        let trimmed = intent.trim();
        if trimmed.is_empty() {
            return Err(DomainError::validation("Arc", "intent", "cannot be empty"));
        }
        Ok(trimmed.to_string())
    }

    fn validate_arc_scenes(&self, scenes: &[SceneId]) -> Result<(), DomainError> {
        let mut seen = HashSet::new();
        for scene in scenes {
            self.require_scene(*scene)?;
            if !seen.insert(*scene) {
                return Err(DomainError::validation(
                    "Arc",
                    "scenes",
                    format!("scene {} listed more than once", scene),
                ));
            }
        }
        Ok(())
    }

    pub fn create_arc(&mut self, input: CreateArcInput) -> Result<ArcId, DomainError> {
        let intent = Self::validate_intent(&input.intent)?;
        self.validate_arc_scenes(&input.scenes)?;
        if let Some(phases) = &input.phases {
            phases.validate(&input.scenes)?;
        }

        let now = self.clock.now();
        let mut arc = StoryArc::new(intent, now)
            .with_scenes(input.scenes)
            .with_status(input.status.unwrap_or_default());
        if input.phases.is_some() {
            arc.set_phases(input.phases, now);
        }
        let id = arc.id();
        self.arcs.insert(id, arc);
        self.arc_order.push(id);
        self.bump();
        tracing::debug!(arc_id = %id, revision = self.revision, "Created arc");
        Ok(id)
    }

    pub fn update_arc(&mut self, id: ArcId, input: UpdateArcInput) -> Result<&StoryArc, DomainError> {
        let current = self
            .arcs
            .get(&id)
            .ok_or_else(|| DomainError::not_found("Arc", id))?;
        let intent = input
            .intent
            .as_deref()
            .map(Self::validate_intent)
            .transpose()?;
        if let Some(scenes) = &input.scenes {
            self.validate_arc_scenes(scenes)?;
        }
        let next_scenes = input
            .scenes
            .clone()
            .unwrap_or_else(|| current.scenes().to_vec());
        let next_phases = match &input.phases {
            Some(phases) => phases.clone(),
            None => current.phases().cloned(),
        };
        if let Some(phases) = &next_phases {
            phases.validate(&next_scenes)?;
        }

        let now = self.clock.now();
        let arc = self
            .arcs
            .get_mut(&id)
            .ok_or_else(|| DomainError::not_found("Arc", id))?;
        if let Some(intent) = intent {
            arc.set_intent(intent, now);
        }
        if let Some(status) = input.status {
            arc.set_status(status, now);
        }
        if input.scenes.is_some() {
            arc.set_scenes(next_scenes, now);
        }
        if input.phases.is_some() {
            arc.set_phases(next_phases, now);
        }
        self.revision += 1;
        tracing::debug!(arc_id = %id, revision = self.revision, "Updated arc");
        self.arcs
            .get(&id)
            .ok_or_else(|| DomainError::not_found("Arc", id))
    }

    /// Insert a scene into an arc at `position` (append when `None`).
    pub fn add_scene_to_arc(
        &mut self,
        arc_id: ArcId,
        scene_id: SceneId,
        position: Option<usize>,
    ) -> Result<bool, DomainError> {
        self.require_scene(scene_id)?;
        let now = self.clock.now();
        let arc = self
            .arcs
            .get_mut(&arc_id)
            .ok_or_else(|| DomainError::not_found("Arc", arc_id))?;
        let added = arc.insert_scene(scene_id, position, now);
        if added {
            self.bump();
        }
        Ok(added)
    }

    pub fn remove_scene_from_arc(
        &mut self,
        arc_id: ArcId,
        scene_id: SceneId,
    ) -> Result<bool, DomainError> {
        let now = self.clock.now();
        let arc = self
            .arcs
            .get_mut(&arc_id)
            .ok_or_else(|| DomainError::not_found("Arc", arc_id))?;
        let removed = arc.remove_scene(scene_id, now);
        if removed {
            self.bump();
        }
        Ok(removed)
    }

    pub fn set_arc_status(&mut self, arc_id: ArcId, status: ArcStatus) -> Result<(), DomainError> {
        let now = self.clock.now();
        let arc = self
            .arcs
            .get_mut(&arc_id)
            .ok_or_else(|| DomainError::not_found("Arc", arc_id))?;
        arc.set_status(status, now);
        self.bump();
        Ok(())
    }

    pub fn set_arc_phases(
        &mut self,
        arc_id: ArcId,
        phases: Option<ArcPhases>,
    ) -> Result<(), DomainError> {
        self.update_arc(
            arc_id,
            UpdateArcInput {
                phases: Some(phases),
                ..UpdateArcInput::default()
            },
        )
        .map(|_| ())
    }

    pub fn delete_arc(&mut self, id: ArcId) -> Result<StoryArc, DomainError> {
        let arc = self
            .arcs
            .remove(&id)
            .ok_or_else(|| DomainError::not_found("Arc", id))?;
        self.arc_order.retain(|a| *a != id);
        self.bump();
        tracing::debug!(arc_id = %id, revision = self.revision, "Deleted arc");
        Ok(arc)
    }

    // =========================================================================
    // Characters
    // =========================================================================

    pub fn create_character(
        &mut self,
        input: CreateCharacterInput,
    ) -> Result<CharacterId, DomainError> {
        let name = CharacterName::new(input.name)?;
        let now = self.clock.now();
        let character = Character::new(name, now)
            .with_description(input.description.unwrap_or_default())
            .with_role(input.role.unwrap_or_default());
        let id = character.id();
        self.characters.insert(id, character);
        self.character_order.push(id);
        self.bump();
        tracing::debug!(character_id = %id, revision = self.revision, "Created character");
        Ok(id)
    }

    pub fn update_character(
        &mut self,
        id: CharacterId,
        input: UpdateCharacterInput,
    ) -> Result<&Character, DomainError> {
        self.require_character(id)?;
        let name = input.name.map(CharacterName::new).transpose()?;
        let now = self.clock.now();
        let character = self
            .characters
            .get_mut(&id)
            .ok_or_else(|| DomainError::not_found("Character", id))?;
        if let Some(name) = name {
            character.set_name(name, now);
        }
        if let Some(description) = input.description {
            character.set_description(description, now);
        }
        if let Some(role) = input.role {
            character.set_role(role, now);
        }
        self.revision += 1;
        self.characters
            .get(&id)
            .ok_or_else(|| DomainError::not_found("Character", id))
    }

    /// Set or clear a character's personal arc. Turning points must reference
    /// existing scenes.
    pub fn set_character_arc(
        &mut self,
        id: CharacterId,
        arc: Option<CharacterArc>,
    ) -> Result<(), DomainError> {
        self.require_character(id)?;
        if let Some(arc) = &arc {
            for point in &arc.turning_points {
                if !self.scenes.contains_key(&point.scene) {
                    return Err(DomainError::not_found("Scene", point.scene));
                }
            }
        }
        let now = self.clock.now();
        if let Some(character) = self.characters.get_mut(&id) {
            character.set_arc(arc, now);
        }
        self.bump();
        Ok(())
    }

    /// Add or replace the relationship from `from` toward `to`.
    /// Returns true if an existing relationship was replaced.
    pub fn add_relationship(
        &mut self,
        from: CharacterId,
        to: CharacterId,
        kind: RelationshipKind,
        strength: u8,
    ) -> Result<bool, DomainError> {
        self.require_character(from)?;
        self.require_character(to)?;
        if from == to {
            return Err(DomainError::validation(
                "Character",
                "relationships",
                format!("character {} cannot have a relationship with itself", from),
            ));
        }
        let strength = RelationshipStrength::new(strength)?;
        let now = self.clock.now();
        let character = self
            .characters
            .get_mut(&from)
            .ok_or_else(|| DomainError::not_found("Character", from))?;
        let replaced = character.set_relationship(Relationship::new(to, kind, strength), now);
        self.bump();
        Ok(replaced)
    }

    pub fn remove_relationship(
        &mut self,
        from: CharacterId,
        to: CharacterId,
    ) -> Result<bool, DomainError> {
        let now = self.clock.now();
        let character = self
            .characters
            .get_mut(&from)
            .ok_or_else(|| DomainError::not_found("Character", from))?;
        let removed = character.remove_relationship(to, now);
        if removed {
            self.bump();
        }
        Ok(removed)
    }

    /// Delete a character, its presence in every scene, and every
    /// relationship other characters hold toward it.
    pub fn delete_character(&mut self, id: CharacterId) -> Result<Character, DomainError> {
        let character = self
            .characters
            .remove(&id)
            .ok_or_else(|| DomainError::not_found("Character", id))?;
        self.character_order.retain(|c| *c != id);

        let now = self.clock.now();
        for scene in self.scenes.values_mut() {
            scene.remove_character(id, now);
        }
        for other in self.characters.values_mut() {
            other.remove_relationship(id, now);
        }
        self.bump();
        tracing::debug!(character_id = %id, revision = self.revision, "Deleted character");
        Ok(character)
    }

    // =========================================================================
    // Reference checks
    // =========================================================================

    /// Human-readable list of everything that references `id`.
    pub fn scene_references(&self, id: SceneId) -> Vec<String> {
        let mut refs = Vec::new();
        for scene in self.scenes() {
            if scene.id() != id && scene.links_to(id) {
                refs.push(format!("scene {} links to it", scene.id()));
            }
        }
        for arc in self.arcs() {
            if arc.contains_scene(id) {
                refs.push(format!("arc {} contains it", arc.id()));
            }
        }
        for character in self.characters() {
            let in_turning_points = character
                .arc()
                .is_some_and(|a| a.turning_points.iter().any(|tp| tp.scene == id));
            if character.appears_in(id) || in_turning_points {
                refs.push(format!("character {} appears in it", character.id()));
            }
        }
        refs
    }

    pub fn character_references(&self, id: CharacterId) -> Vec<String> {
        let mut refs = Vec::new();
        for scene in self.scenes() {
            if scene.has_character(id) {
                refs.push(format!("scene {} features it", scene.id()));
            }
        }
        for character in self.characters() {
            if character.id() != id && character.relationship_with(id).is_some() {
                refs.push(format!("character {} has a relationship with it", character.id()));
            }
        }
        refs
    }

    // =========================================================================
    // Raw import (reconciliation)
    // =========================================================================

    /// Insert or overwrite a scene keeping its identifier. The entity is
    /// stored as given; presence symmetry is restored by
    /// [`GraphStore::rebuild_presence`] after a batch of upserts.
    pub fn upsert_scene(&mut self, scene: &Scene) -> Upsert {
        let id = scene.id();
        let outcome = match self.scenes.get_mut(&id) {
            Some(existing) => {
                existing.overwrite_from(scene);
                Upsert::Replaced
            }
            None => {
                self.scenes.insert(id, scene.clone());
                self.scene_order.push(id);
                Upsert::Inserted
            }
        };
        self.bump();
        outcome
    }

    pub fn upsert_arc(&mut self, arc: &StoryArc) -> Upsert {
        let id = arc.id();
        let outcome = match self.arcs.get_mut(&id) {
            Some(existing) => {
                existing.overwrite_from(arc);
                Upsert::Replaced
            }
            None => {
                self.arcs.insert(id, arc.clone());
                self.arc_order.push(id);
                Upsert::Inserted
            }
        };
        self.bump();
        outcome
    }

    pub fn upsert_character(&mut self, character: &Character) -> Upsert {
        let id = character.id();
        let outcome = match self.characters.get_mut(&id) {
            Some(existing) => {
                existing.overwrite_from(character);
                Upsert::Replaced
            }
            None => {
                self.characters.insert(id, character.clone());
                self.character_order.push(id);
                Upsert::Inserted
            }
        };
        self.bump();
        outcome
    }

    /// Re-derive every character's scene set from the scenes' character sets.
    /// Returns the number of characters whose presence changed.
    pub fn rebuild_presence(&mut self) -> usize {
        let mut derived: HashMap<CharacterId, BTreeSet<SceneId>> = HashMap::new();
        for scene in self.scenes.values() {
            for character in scene.characters() {
                derived.entry(*character).or_default().insert(scene.id());
            }
        }
        let now = self.clock.now();
        let mut changed = 0;
        for character in self.characters.values_mut() {
            let wanted = derived.remove(&character.id()).unwrap_or_default();
            if *character.scenes() == wanted {
                continue;
            }
            for scene in character.scenes().clone() {
                if !wanted.contains(&scene) {
                    character.remove_scene(scene, now);
                }
            }
            for scene in wanted {
                character.add_scene(scene, now);
            }
            changed += 1;
        }
        if changed > 0 {
            self.bump();
        }
        changed
    }

    // =========================================================================
    // Snapshots
    // =========================================================================

    /// Deep, order-preserving copy of every entity tagged with the current
    /// revision.
    pub fn create_snapshot(&self) -> GraphSnapshot {
        GraphSnapshot::new(
            self.scenes().cloned().collect(),
            self.arcs().cloned().collect(),
            self.characters().cloned().collect(),
            SnapshotMetadata {
                version: self.revision,
                timestamp: self.clock.now(),
            },
        )
    }

    /// Replace the whole store with the contents of `snapshot`.
    ///
    /// The replacement state is built completely before it is swapped in, so
    /// a rejected snapshot leaves the store untouched. The revision becomes the
    /// snapshot's version.
    pub fn load_snapshot(&mut self, snapshot: &GraphSnapshot) -> Result<(), DomainError> {
        snapshot.check_unique_ids()?;

        let scene_order: Vec<SceneId> = snapshot.scenes().iter().map(Scene::id).collect();
        let scenes = snapshot
            .scenes()
            .iter()
            .map(|s| (s.id(), s.clone()))
            .collect();
        let arc_order: Vec<ArcId> = snapshot.arcs().iter().map(StoryArc::id).collect();
        let arcs = snapshot.arcs().iter().map(|a| (a.id(), a.clone())).collect();
        let character_order: Vec<CharacterId> =
            snapshot.characters().iter().map(Character::id).collect();
        let characters = snapshot
            .characters()
            .iter()
            .map(|c| (c.id(), c.clone()))
            .collect();

        self.scenes = scenes;
        self.scene_order = scene_order;
        self.arcs = arcs;
        self.arc_order = arc_order;
        self.characters = characters;
        self.character_order = character_order;
        self.revision = snapshot.metadata().version;
        tracing::debug!(
            version = self.revision,
            scenes = self.scenes.len(),
            arcs = self.arcs.len(),
            characters = self.characters.len(),
            "Loaded snapshot"
        );
        Ok(())
    }
}
