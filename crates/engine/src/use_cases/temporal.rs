//! Temporal consistency - timelines over scenes and their validation.
//!
//! The validator owns timelines plus a secondary index from scene to the
//! timelines that place it. Scenes themselves live in a [`GraphStore`];
//! `validate` cross-checks the two.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use plotgraph_domain::{
    CharacterId, DomainError, SceneId, TimePoint, Timeline, TimelineId, TimelineKind,
    TimelineName,
};
use serde::Serialize;
use thiserror::Error;

use crate::infrastructure::ports::ClockPort;
use crate::stores::GraphStore;
use crate::use_cases::findings::Finding;

#[derive(Debug, Error)]
pub enum TimelineError {
    #[error("Timeline name '{0}' is already taken")]
    DuplicateName(String),

    #[error("Scene {scene} is already placed on timeline '{timeline}'")]
    DuplicatePoint { timeline: String, scene: SceneId },

    #[error(transparent)]
    Domain(#[from] DomainError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TemporalKind {
    MissingScene,
    SequenceViolation,
    SimultaneousPresence,
    MissingParent,
    Paradox,
    TimelineOverlap,
    UnplacedScenes,
}

pub type TemporalFinding = Finding<TemporalKind>;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TemporalReport {
    /// True iff `errors` is empty
    pub valid: bool,
    pub errors: Vec<TemporalFinding>,
    pub warnings: Vec<TemporalFinding>,
    pub timelines: usize,
    pub points: usize,
}

impl TemporalReport {
    pub fn errors_of(&self, kind: TemporalKind) -> impl Iterator<Item = &TemporalFinding> + '_ {
        self.errors.iter().filter(move |f| f.kind == kind)
    }

    pub fn warnings_of(&self, kind: TemporalKind) -> impl Iterator<Item = &TemporalFinding> + '_ {
        self.warnings.iter().filter(move |f| f.kind == kind)
    }
}

pub struct TemporalValidator {
    timelines: HashMap<TimelineId, Timeline>,
    order: Vec<TimelineId>,
    by_scene: HashMap<SceneId, Vec<TimelineId>>,
    clock: Arc<dyn ClockPort>,
}

impl TemporalValidator {
    pub fn new(clock: Arc<dyn ClockPort>) -> Self {
        Self {
            timelines: HashMap::new(),
            order: Vec::new(),
            by_scene: HashMap::new(),
            clock,
        }
    }

    // =========================================================================
    // Timelines
    // =========================================================================

    pub fn create_timeline(
        &mut self,
        name: &str,
        kind: TimelineKind,
        parent: Option<TimelineId>,
    ) -> Result<TimelineId, TimelineError> {
        let name = TimelineName::new(name)?;
        if self.get_by_name(name.as_str()).is_some() {
            return Err(TimelineError::DuplicateName(name.to_string()));
        }
        if let Some(parent) = parent {
            if !self.timelines.contains_key(&parent) {
                return Err(DomainError::not_found("Timeline", parent).into());
            }
        }

        let timeline = Timeline::new(name, kind, self.clock.now()).with_parent(parent);
        let id = timeline.id();
        tracing::debug!(timeline_id = %id, name = %timeline.name(), kind = %kind, "Created timeline");
        self.timelines.insert(id, timeline);
        self.order.push(id);
        Ok(id)
    }

    /// Remove a timeline. Children keep their parent reference and are
    /// reported by `validate` as missing their parent.
    pub fn delete_timeline(&mut self, id: TimelineId) -> Result<Timeline, TimelineError> {
        let timeline = self
            .timelines
            .remove(&id)
            .ok_or_else(|| DomainError::not_found("Timeline", id))?;
        self.order.retain(|t| *t != id);
        for point in timeline.points() {
            self.unindex(point.scene, id);
        }
        tracing::debug!(timeline_id = %id, "Deleted timeline");
        Ok(timeline)
    }

    pub fn get(&self, id: TimelineId) -> Option<&Timeline> {
        self.timelines.get(&id)
    }

    pub fn get_by_name(&self, name: &str) -> Option<&Timeline> {
        let name = name.trim();
        self.list().find(|t| t.name().as_str() == name)
    }

    /// Timelines in creation order.
    pub fn list(&self) -> impl Iterator<Item = &Timeline> + '_ {
        self.order.iter().filter_map(|id| self.timelines.get(id))
    }

    // =========================================================================
    // Points
    // =========================================================================

    /// Place `scene` at relative time `at`. Points with equal timestamps keep
    /// their insertion order.
    pub fn add_time_point(
        &mut self,
        timeline_id: TimelineId,
        scene: SceneId,
        at: i64,
    ) -> Result<(), TimelineError> {
        let now = self.clock.now();
        let timeline = self
            .timelines
            .get_mut(&timeline_id)
            .ok_or_else(|| DomainError::not_found("Timeline", timeline_id))?;
        if !timeline.insert_point(scene, at, now) {
            return Err(TimelineError::DuplicatePoint {
                timeline: timeline.name().to_string(),
                scene,
            });
        }
        self.by_scene.entry(scene).or_default().push(timeline_id);
        Ok(())
    }

    pub fn remove_time_point(
        &mut self,
        timeline_id: TimelineId,
        scene: SceneId,
    ) -> Result<bool, TimelineError> {
        let now = self.clock.now();
        let timeline = self
            .timelines
            .get_mut(&timeline_id)
            .ok_or_else(|| DomainError::not_found("Timeline", timeline_id))?;
        let removed = timeline.remove_point(scene, now);
        if removed {
            self.unindex(scene, timeline_id);
        }
        Ok(removed)
    }

    pub fn timelines_for_scene(&self, scene: SceneId) -> &[TimelineId] {
        self.by_scene.get(&scene).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Drop a deleted scene from every timeline. Returns how many timelines
    /// held it.
    pub fn forget_scene(&mut self, scene: SceneId) -> usize {
        let Some(timeline_ids) = self.by_scene.remove(&scene) else {
            return 0;
        };
        let now = self.clock.now();
        for id in &timeline_ids {
            if let Some(timeline) = self.timelines.get_mut(id) {
                timeline.remove_point(scene, now);
            }
        }
        timeline_ids.len()
    }

    fn unindex(&mut self, scene: SceneId, timeline: TimelineId) {
        if let Some(ids) = self.by_scene.get_mut(&scene) {
            ids.retain(|t| *t != timeline);
            if ids.is_empty() {
                self.by_scene.remove(&scene);
            }
        }
    }

    // =========================================================================
    // Validation
    // =========================================================================

    pub fn validate(&self, store: &GraphStore) -> TemporalReport {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        for timeline in self.list() {
            self.check_points(timeline, store, &mut errors, &mut warnings);
            check_presence(timeline, store, &mut errors);
            self.check_parent(timeline, store, &mut errors, &mut warnings);
        }
        self.check_overlaps(&mut warnings);

        let unplaced: Vec<SceneId> = store
            .scene_ids()
            .iter()
            .copied()
            .filter(|id| !self.by_scene.contains_key(id))
            .collect();
        if !unplaced.is_empty() {
            warnings.push(
                Finding::new(
                    TemporalKind::UnplacedScenes,
                    format!("{} scene(s) are not placed on any timeline", unplaced.len()),
                )
                .affecting_all(unplaced),
            );
        }

        let points = self.list().map(|t| t.points().len()).sum();
        tracing::debug!(
            errors = errors.len(),
            warnings = warnings.len(),
            timelines = self.order.len(),
            "Temporal validation finished"
        );
        TemporalReport {
            valid: errors.is_empty(),
            errors,
            warnings,
            timelines: self.order.len(),
            points,
        }
    }

    fn check_points(
        &self,
        timeline: &Timeline,
        store: &GraphStore,
        errors: &mut Vec<TemporalFinding>,
        warnings: &mut Vec<TemporalFinding>,
    ) {
        let mut previous: Option<&TimePoint> = None;
        for point in timeline.points() {
            if !store.contains_scene(point.scene) {
                errors.push(
                    Finding::new(
                        TemporalKind::MissingScene,
                        format!(
                            "Timeline '{}' places missing scene {}",
                            timeline.name(),
                            point.scene
                        ),
                    )
                    .affecting(timeline.id())
                    .affecting(point.scene),
                );
            }
            if let Some(prev) = previous {
                if point.at <= prev.at {
                    warnings.push(
                        Finding::new(
                            TemporalKind::SequenceViolation,
                            format!(
                                "Timeline '{}' has scene {} at {} not after scene {} at {}",
                                timeline.name(),
                                point.scene,
                                point.at,
                                prev.scene,
                                prev.at
                            ),
                        )
                        .affecting(timeline.id())
                        .affecting(prev.scene)
                        .affecting(point.scene),
                    );
                }
            }
            previous = Some(point);

            let Some(scene) = store.get_scene(point.scene) else {
                continue;
            };
            for target in scene.links() {
                if let Some(target_point) = timeline.point_for(*target) {
                    if target_point.at < point.at {
                        warnings.push(
                            Finding::new(
                                TemporalKind::SequenceViolation,
                                format!(
                                    "Scene '{}' links to scene {} which occurs earlier on timeline '{}'",
                                    scene.title(),
                                    target,
                                    timeline.name()
                                ),
                            )
                            .affecting(timeline.id())
                            .affecting(point.scene)
                            .affecting(*target),
                        );
                    }
                }
            }
        }
    }

    fn check_parent(
        &self,
        timeline: &Timeline,
        store: &GraphStore,
        errors: &mut Vec<TemporalFinding>,
        warnings: &mut Vec<TemporalFinding>,
    ) {
        let Some(parent_id) = timeline.parent() else {
            return;
        };
        let Some(parent) = self.timelines.get(&parent_id) else {
            errors.push(
                Finding::new(
                    TemporalKind::MissingParent,
                    format!(
                        "Timeline '{}' declares missing parent {}",
                        timeline.name(),
                        parent_id
                    ),
                )
                .affecting(timeline.id())
                .affecting(parent_id),
            );
            return;
        };
        if timeline.kind() != TimelineKind::Flashback {
            return;
        }

        let in_parent: HashSet<CharacterId> = characters_on(parent, store).into_iter().collect();
        for character in characters_on(timeline, store) {
            if !in_parent.contains(&character) {
                let name = store
                    .get_character(character)
                    .map(|c| c.name().to_string())
                    .unwrap_or_else(|| character.to_string());
                warnings.push(
                    Finding::new(
                        TemporalKind::Paradox,
                        format!(
                            "Flashback '{}' shows '{}' who never appears in '{}'",
                            timeline.name(),
                            name,
                            parent.name()
                        ),
                    )
                    .affecting(timeline.id())
                    .affecting(character),
                );
            }
        }
    }

    fn check_overlaps(&self, warnings: &mut Vec<TemporalFinding>) {
        let timelines: Vec<&Timeline> = self.list().collect();
        for (i, first) in timelines.iter().enumerate() {
            for second in &timelines[i + 1..] {
                if first.kind() != second.kind() {
                    continue;
                }
                let shared: Vec<SceneId> = first
                    .points()
                    .iter()
                    .map(|p| p.scene)
                    .filter(|scene| second.contains_scene(*scene))
                    .collect();
                if shared.is_empty() {
                    continue;
                }
                warnings.push(
                    Finding::new(
                        TemporalKind::TimelineOverlap,
                        format!(
                            "{} timelines '{}' and '{}' share {} scene(s)",
                            first.kind(),
                            first.name(),
                            second.name(),
                            shared.len()
                        ),
                    )
                    .affecting(first.id())
                    .affecting(second.id())
                    .affecting_all(shared),
                );
            }
        }
    }
}

/// Characters present in any existing scene of `timeline`, first-seen order.
fn characters_on(timeline: &Timeline, store: &GraphStore) -> Vec<CharacterId> {
    let mut seen = HashSet::new();
    let mut characters = Vec::new();
    for point in timeline.points() {
        if let Some(scene) = store.get_scene(point.scene) {
            for character in scene.characters() {
                if seen.insert(*character) {
                    characters.push(*character);
                }
            }
        }
    }
    characters
}

/// One error per character that occupies two different scenes at the same
/// timestamp.
fn check_presence(timeline: &Timeline, store: &GraphStore, errors: &mut Vec<TemporalFinding>) {
    for group in timeline.points().chunk_by(|a, b| a.at == b.at) {
        if group.len() < 2 {
            continue;
        }
        let mut occupied: BTreeMap<CharacterId, BTreeSet<SceneId>> = BTreeMap::new();
        for point in group {
            if let Some(scene) = store.get_scene(point.scene) {
                for character in scene.characters() {
                    occupied.entry(*character).or_default().insert(point.scene);
                }
            }
        }
        for (character, scenes) in occupied {
            if scenes.len() < 2 {
                continue;
            }
            let name = store
                .get_character(character)
                .map(|c| c.name().to_string())
                .unwrap_or_else(|| character.to_string());
            errors.push(
                Finding::new(
                    TemporalKind::SimultaneousPresence,
                    format!(
                        "'{}' appears in {} scenes at time {} on timeline '{}'",
                        name,
                        scenes.len(),
                        group[0].at,
                        timeline.name()
                    ),
                )
                .affecting(timeline.id())
                .affecting(character)
                .affecting_all(scenes),
            );
        }
    }
}
