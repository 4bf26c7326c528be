//! Coherence check over a graph store.
//!
//! Reports cycles in the scene-link graph, dangling references, orphaned
//! scenes, empty arcs and broken presence symmetry. The check only reads the
//! store; traversal state lives for a single run.

use std::collections::HashMap;

use plotgraph_domain::SceneId;
use serde::Serialize;

use crate::stores::GraphStore;
use crate::use_cases::findings::Finding;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CoherenceKind {
    CircularDependency,
    BrokenLink,
    OrphanScene,
    EmptyArc,
    BidirectionalMismatch,
    InvalidRelationship,
}

pub type CoherenceFinding = Finding<CoherenceKind>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphCounts {
    pub scenes: usize,
    pub arcs: usize,
    pub characters: usize,
    pub links: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoherenceReport {
    /// True iff `errors` is empty
    pub coherent: bool,
    pub errors: Vec<CoherenceFinding>,
    pub warnings: Vec<CoherenceFinding>,
    /// Closed paths: the first scene is repeated at the end
    pub cycles: Vec<Vec<SceneId>>,
    pub counts: GraphCounts,
}

impl CoherenceReport {
    pub fn errors_of(&self, kind: CoherenceKind) -> impl Iterator<Item = &CoherenceFinding> + '_ {
        self.errors.iter().filter(move |f| f.kind == kind)
    }

    pub fn warnings_of(&self, kind: CoherenceKind) -> impl Iterator<Item = &CoherenceFinding> + '_ {
        self.warnings.iter().filter(move |f| f.kind == kind)
    }
}

// =============================================================================
// Cycle detection
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Visit {
    Unvisited,
    InProgress,
    Done,
}

struct Frame {
    node: usize,
    next_edge: usize,
}

/// Find cycles in the scene-link relation.
///
/// Iterative depth-first traversal over an arena indexed by scene position.
/// Every unvisited scene (store order) starts a new traversal; at most one
/// cycle is reported per traversal root. Links to missing scenes are skipped.
pub fn detect_cycles(store: &GraphStore) -> Vec<Vec<SceneId>> {
    let ids = store.scene_ids();
    let index: HashMap<SceneId, usize> = ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();
    let edges: Vec<Vec<usize>> = store
        .scenes()
        .map(|scene| {
            scene
                .links()
                .iter()
                .filter_map(|target| index.get(target).copied())
                .collect()
        })
        .collect();

    let mut state = vec![Visit::Unvisited; ids.len()];
    let mut path_position: Vec<Option<usize>> = vec![None; ids.len()];
    let mut cycles = Vec::new();

    for root in 0..ids.len() {
        if state[root] != Visit::Unvisited {
            continue;
        }
        let mut found = false;
        let mut path: Vec<usize> = vec![root];
        let mut stack = vec![Frame {
            node: root,
            next_edge: 0,
        }];
        state[root] = Visit::InProgress;
        path_position[root] = Some(0);

        while let Some(frame) = stack.last_mut() {
            let node = frame.node;
            if let Some(&child) = edges[node].get(frame.next_edge) {
                frame.next_edge += 1;
                match state[child] {
                    Visit::Unvisited => {
                        state[child] = Visit::InProgress;
                        path_position[child] = Some(path.len());
                        path.push(child);
                        stack.push(Frame {
                            node: child,
                            next_edge: 0,
                        });
                    }
                    Visit::InProgress if !found => {
                        if let Some(start) = path_position[child] {
                            let mut cycle: Vec<SceneId> =
                                path[start..].iter().map(|i| ids[*i]).collect();
                            cycle.push(ids[child]);
                            cycles.push(cycle);
                            found = true;
                        }
                    }
                    _ => {}
                }
            } else {
                state[node] = Visit::Done;
                path_position[node] = None;
                path.pop();
                stack.pop();
            }
        }
    }

    cycles
}

// =============================================================================
// Solver
// =============================================================================

#[derive(Debug, Default, Clone, Copy)]
pub struct CoherenceSolver;

impl CoherenceSolver {
    pub fn new() -> Self {
        Self
    }

    pub fn check(&self, store: &GraphStore) -> CoherenceReport {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        let cycles = detect_cycles(store);
        for cycle in &cycles {
            let titles: Vec<String> = cycle
                .iter()
                .map(|id| {
                    store
                        .get_scene(*id)
                        .map(|s| s.title().to_string())
                        .unwrap_or_else(|| id.to_string())
                })
                .collect();
            errors.push(
                Finding::new(
                    CoherenceKind::CircularDependency,
                    format!("Circular dependency: {}", titles.join(" -> ")),
                )
                .affecting_all(cycle.iter().copied()),
            );
        }

        check_links(store, &mut errors);
        check_arcs(store, &mut errors, &mut warnings);
        check_presence(store, &mut errors);
        check_relationships(store, &mut errors);

        let counts = GraphCounts {
            scenes: store.scene_count(),
            arcs: store.arc_count(),
            characters: store.character_count(),
            links: store.link_count(),
        };
        tracing::debug!(
            errors = errors.len(),
            warnings = warnings.len(),
            cycles = cycles.len(),
            "Coherence check finished"
        );

        CoherenceReport {
            coherent: errors.is_empty(),
            errors,
            warnings,
            cycles,
            counts,
        }
    }
}

fn check_links(store: &GraphStore, errors: &mut Vec<CoherenceFinding>) {
    for scene in store.scenes() {
        for target in scene.links() {
            if !store.contains_scene(*target) {
                errors.push(
                    Finding::new(
                        CoherenceKind::BrokenLink,
                        format!("Scene '{}' links to missing scene {}", scene.title(), target),
                    )
                    .affecting(scene.id())
                    .affecting(*target),
                );
            }
        }
    }
}

fn check_arcs(
    store: &GraphStore,
    errors: &mut Vec<CoherenceFinding>,
    warnings: &mut Vec<CoherenceFinding>,
) {
    for arc in store.arcs() {
        if arc.scenes().is_empty() {
            warnings.push(
                Finding::new(
                    CoherenceKind::EmptyArc,
                    format!("Arc '{}' has no scenes", arc.intent()),
                )
                .affecting(arc.id()),
            );
        }
        for scene in arc.scenes() {
            if !store.contains_scene(*scene) {
                errors.push(
                    Finding::new(
                        CoherenceKind::BrokenLink,
                        format!("Arc '{}' lists missing scene {}", arc.intent(), scene),
                    )
                    .affecting(arc.id())
                    .affecting(*scene),
                );
            }
        }
    }

    for scene in store.scenes() {
        if !store.arcs().any(|arc| arc.contains_scene(scene.id())) {
            warnings.push(
                Finding::new(
                    CoherenceKind::OrphanScene,
                    format!("Scene '{}' belongs to no arc", scene.title()),
                )
                .affecting(scene.id()),
            );
        }
    }
}

fn check_presence(store: &GraphStore, errors: &mut Vec<CoherenceFinding>) {
    for scene in store.scenes() {
        for character_id in scene.characters() {
            let reciprocated = store
                .get_character(*character_id)
                .is_some_and(|c| c.appears_in(scene.id()));
            if !reciprocated {
                errors.push(
                    Finding::new(
                        CoherenceKind::BidirectionalMismatch,
                        format!(
                            "Scene '{}' lists character {} which does not list it back",
                            scene.title(),
                            character_id
                        ),
                    )
                    .affecting(scene.id())
                    .affecting(*character_id),
                );
            }
        }
    }

    for character in store.characters() {
        for scene_id in character.scenes() {
            let reciprocated = store
                .get_scene(*scene_id)
                .is_some_and(|s| s.has_character(character.id()));
            if !reciprocated {
                errors.push(
                    Finding::new(
                        CoherenceKind::BidirectionalMismatch,
                        format!(
                            "Character '{}' lists scene {} which does not list it back",
                            character.name(),
                            scene_id
                        ),
                    )
                    .affecting(character.id())
                    .affecting(*scene_id),
                );
            }
        }
        if let Some(arc) = character.arc() {
            for point in &arc.turning_points {
                if !store.contains_scene(point.scene) {
                    errors.push(
                        Finding::new(
                            CoherenceKind::BrokenLink,
                            format!(
                                "Character '{}' has a turning point in missing scene {}",
                                character.name(),
                                point.scene
                            ),
                        )
                        .affecting(character.id())
                        .affecting(point.scene),
                    );
                }
            }
        }
    }
}

fn check_relationships(store: &GraphStore, errors: &mut Vec<CoherenceFinding>) {
    for character in store.characters() {
        for relationship in character.relationships() {
            let reason = if relationship.target == character.id() {
                Some("points at itself")
            } else if !store.contains_character(relationship.target) {
                Some("points at a missing character")
            } else {
                None
            };
            if let Some(reason) = reason {
                errors.push(
                    Finding::new(
                        CoherenceKind::InvalidRelationship,
                        format!(
                            "Relationship of '{}' toward {} {}",
                            character.name(),
                            relationship.target,
                            reason
                        ),
                    )
                    .affecting(character.id())
                    .affecting(relationship.target),
                );
            }
        }
    }
}
