//! Weighted divergence between two graph stores.
//!
//! `source` is the reference side: an entity only in `source` is an addition,
//! one only in `target` is a removal. Timestamps never count; character
//! presence compares as a set, links and arc scenes compare in order.

use plotgraph_domain::{Character, Scene, StoryArc};
use serde::Serialize;
use uuid::Uuid;

use crate::infrastructure::settings::DivergenceWeights;
use crate::stores::GraphStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DifferenceKind {
    SceneAdded,
    SceneRemoved,
    SceneModified,
    ArcAdded,
    ArcRemoved,
    ArcModified,
    CharacterAdded,
    CharacterRemoved,
    CharacterModified,
}

impl DifferenceKind {
    pub fn is_removal(&self) -> bool {
        matches!(
            self,
            Self::SceneRemoved | Self::ArcRemoved | Self::CharacterRemoved
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Difference {
    pub kind: DifferenceKind,
    pub entity_id: Uuid,
    /// Title, intent or name of the entity
    pub label: String,
    /// Differing content fields (modifications only)
    pub fields: Vec<&'static str>,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DivergenceReport {
    /// Sum of weights, capped
    pub score: f64,
    /// Sum of weights before the cap
    pub raw_score: f64,
    pub differences: Vec<Difference>,
}

impl DivergenceReport {
    pub fn is_identical(&self) -> bool {
        self.differences.is_empty()
    }

    pub fn count(&self, kind: DifferenceKind) -> usize {
        self.differences.iter().filter(|d| d.kind == kind).count()
    }
}

fn scene_label(scene: &Scene) -> String {
    scene.title().to_string()
}

fn arc_label(arc: &StoryArc) -> String {
    arc.intent().to_string()
}

fn character_label(character: &Character) -> String {
    character.name().to_string()
}

pub fn compute_divergence(
    source: &GraphStore,
    target: &GraphStore,
    weights: &DivergenceWeights,
) -> DivergenceReport {
    let mut differences = Vec::new();

    for scene in source.scenes() {
        match target.get_scene(scene.id()) {
            None => differences.push(Difference {
                kind: DifferenceKind::SceneAdded,
                entity_id: scene.id().to_uuid(),
                label: scene_label(scene),
                fields: Vec::new(),
                weight: weights.scene_added_removed,
            }),
            Some(theirs) => {
                let fields = scene.differing_fields(theirs);
                if !fields.is_empty() {
                    differences.push(Difference {
                        kind: DifferenceKind::SceneModified,
                        entity_id: scene.id().to_uuid(),
                        label: scene_label(scene),
                        weight: DivergenceWeights::scaled(
                            weights.scene_modified_min,
                            weights.scene_modified_max,
                            fields.len(),
                        ),
                        fields,
                    });
                }
            }
        }
    }
    for scene in target.scenes() {
        if !source.contains_scene(scene.id()) {
            differences.push(Difference {
                kind: DifferenceKind::SceneRemoved,
                entity_id: scene.id().to_uuid(),
                label: scene_label(scene),
                fields: Vec::new(),
                weight: weights.scene_added_removed,
            });
        }
    }

    for arc in source.arcs() {
        match target.get_arc(arc.id()) {
            None => differences.push(Difference {
                kind: DifferenceKind::ArcAdded,
                entity_id: arc.id().to_uuid(),
                label: arc_label(arc),
                fields: Vec::new(),
                weight: weights.arc_added_removed,
            }),
            Some(theirs) => {
                let fields = arc.differing_fields(theirs);
                if !fields.is_empty() {
                    differences.push(Difference {
                        kind: DifferenceKind::ArcModified,
                        entity_id: arc.id().to_uuid(),
                        label: arc_label(arc),
                        weight: DivergenceWeights::scaled(
                            weights.arc_modified_min,
                            weights.arc_modified_max,
                            fields.len(),
                        ),
                        fields,
                    });
                }
            }
        }
    }
    for arc in target.arcs() {
        if !source.contains_arc(arc.id()) {
            differences.push(Difference {
                kind: DifferenceKind::ArcRemoved,
                entity_id: arc.id().to_uuid(),
                label: arc_label(arc),
                fields: Vec::new(),
                weight: weights.arc_added_removed,
            });
        }
    }

    for character in source.characters() {
        match target.get_character(character.id()) {
            None => differences.push(Difference {
                kind: DifferenceKind::CharacterAdded,
                entity_id: character.id().to_uuid(),
                label: character_label(character),
                fields: Vec::new(),
                weight: weights.character_added_removed,
            }),
            Some(theirs) => {
                let fields = character.differing_fields(theirs);
                if !fields.is_empty() {
                    differences.push(Difference {
                        kind: DifferenceKind::CharacterModified,
                        entity_id: character.id().to_uuid(),
                        label: character_label(character),
                        weight: DivergenceWeights::scaled(
                            weights.character_modified_min,
                            weights.character_modified_max,
                            fields.len(),
                        ),
                        fields,
                    });
                }
            }
        }
    }
    for character in target.characters() {
        if !source.contains_character(character.id()) {
            differences.push(Difference {
                kind: DifferenceKind::CharacterRemoved,
                entity_id: character.id().to_uuid(),
                label: character_label(character),
                fields: Vec::new(),
                weight: weights.character_added_removed,
            });
        }
    }

    // Empty `sum::<f64>()` is -0.0.
    let raw_score = differences.iter().fold(0.0, |acc, d| acc + d.weight);
    DivergenceReport {
        score: raw_score.min(weights.cap),
        raw_score,
        differences,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::{
        CreateArcInput, CreateCharacterInput, CreateSceneInput, UpdateArcInput,
        UpdateCharacterInput, UpdateSceneInput,
    };
    use plotgraph_domain::ArcStatus;
    use crate::test_fixtures::fixed_clock;

    fn weights() -> DivergenceWeights {
        DivergenceWeights::default()
    }

    fn pair() -> (GraphStore, GraphStore) {
        let source = crate::test_fixtures::StoreBuilder::new(fixed_clock())
            .scene("A")
            .scene("B")
            .link("A", "B")
            .character("Hero")
            .present("Hero", "A")
            .arc("Quest", &["A", "B"])
            .build();
        let target = GraphStore::from_snapshot(&source.create_snapshot(), fixed_clock()).unwrap();
        (source, target)
    }

    #[test]
    fn identical_stores_score_zero() {
        let (source, target) = pair();
        let report = compute_divergence(&source, &target, &weights());
        assert_eq!(report.score, 0.0);
        assert!(report.is_identical());
    }

    #[test]
    fn empty_score_serializes_as_positive_zero() {
        let (source, target) = pair();
        let report = compute_divergence(&source, &target, &weights());
        assert!(report.score.is_sign_positive());
        assert!(report.raw_score.is_sign_positive());
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["score"].to_string(), "0.0");
    }

    #[test]
    fn arc_addition_and_removal_weigh_five() {
        let (mut source, target) = pair();
        source
            .create_arc(CreateArcInput {
                intent: "Subplot".into(),
                ..Default::default()
            })
            .unwrap();

        let report = compute_divergence(&source, &target, &weights());
        assert_eq!(report.count(DifferenceKind::ArcAdded), 1);
        assert_eq!(report.score, 5.0);

        let reversed = compute_divergence(&target, &source, &weights());
        assert_eq!(reversed.count(DifferenceKind::ArcRemoved), 1);
        assert_eq!(reversed.score, 5.0);
    }

    #[test]
    fn arc_modification_weighs_three_to_five() {
        let (mut source, target) = pair();
        let quest = source.arcs().next().unwrap().id();
        source.set_arc_status(quest, ArcStatus::Active).unwrap();

        let report = compute_divergence(&source, &target, &weights());
        assert_eq!(report.count(DifferenceKind::ArcModified), 1);
        assert_eq!(report.differences[0].fields, vec!["status"]);
        assert_eq!(report.score, 3.0);

        let b = source.scene_ids()[1];
        source
            .update_arc(
                quest,
                UpdateArcInput {
                    intent: Some("Homecoming".into()),
                    scenes: Some(vec![b]),
                    ..Default::default()
                },
            )
            .unwrap();
        let report = compute_divergence(&source, &target, &weights());
        assert_eq!(report.differences[0].fields, vec!["intent", "scenes", "status"]);
        assert_eq!(report.score, 5.0);
    }

    #[test]
    fn character_addition_and_removal_weigh_four() {
        let (mut source, target) = pair();
        source
            .create_character(CreateCharacterInput::named("Rival"))
            .unwrap();

        let report = compute_divergence(&source, &target, &weights());
        assert_eq!(report.count(DifferenceKind::CharacterAdded), 1);
        assert_eq!(report.score, 4.0);

        let reversed = compute_divergence(&target, &source, &weights());
        assert_eq!(reversed.count(DifferenceKind::CharacterRemoved), 1);
        assert_eq!(reversed.score, 4.0);
    }

    #[test]
    fn character_modification_weighs_one_to_two() {
        let (mut source, target) = pair();
        let hero = source.characters().next().unwrap().id();
        source
            .update_character(
                hero,
                UpdateCharacterInput {
                    description: Some("reluctant".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        let report = compute_divergence(&source, &target, &weights());
        assert_eq!(report.count(DifferenceKind::CharacterModified), 1);
        assert_eq!(report.score, 1.0);

        source
            .update_character(
                hero,
                UpdateCharacterInput {
                    name: Some("Heroine".into()),
                    role: Some("lead".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        let report = compute_divergence(&source, &target, &weights());
        assert_eq!(report.differences[0].fields, vec!["name", "description", "role"]);
        assert_eq!(report.score, 2.0);
    }

    #[test]
    fn presence_compares_as_a_set() {
        let (mut source, target) = pair();
        let hero = source.characters().next().unwrap().id();
        let b = source.scene_ids()[1];
        source.link_character(b, hero).unwrap();

        let report = compute_divergence(&source, &target, &weights());
        // Scene B gains a character; Hero gains a scene.
        assert_eq!(report.count(DifferenceKind::SceneModified), 1);
        assert_eq!(report.count(DifferenceKind::CharacterModified), 1);
        assert_eq!(report.score, 2.0);
    }

    #[test]
    fn extra_scene_scores_the_scene_weight() {
        let (mut source, target) = pair();
        source.create_scene(CreateSceneInput::titled("C")).unwrap();

        let report = compute_divergence(&source, &target, &weights());
        assert_eq!(report.score, 5.0);
        assert_eq!(report.differences.len(), 1);
        assert_eq!(report.count(DifferenceKind::SceneAdded), 1);

        let reversed = compute_divergence(&target, &source, &weights());
        assert_eq!(reversed.score, 5.0);
        assert_eq!(reversed.count(DifferenceKind::SceneRemoved), 1);
    }

    #[test]
    fn modification_weight_scales_with_field_count() {
        let (mut source, target) = pair();
        let a = source.scene_ids()[0];
        source
            .update_scene(
                a,
                UpdateSceneInput {
                    premise: Some("p".into()),
                    why: Some("w".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        let report = compute_divergence(&source, &target, &weights());
        assert_eq!(report.differences.len(), 1);
        assert_eq!(report.differences[0].fields, vec!["premise", "why"]);
        assert_eq!(report.score, 2.0);

        source
            .update_scene(
                a,
                UpdateSceneInput {
                    how: Some("h".into()),
                    cost: Some(9.0),
                    ..Default::default()
                },
            )
            .unwrap();
        let report = compute_divergence(&source, &target, &weights());
        assert_eq!(report.score, 3.0);
    }

    #[test]
    fn timestamps_alone_do_not_diverge() {
        let (mut source, target) = pair();
        let a = source.scene_ids()[0];
        let title = source.get_scene(a).unwrap().title().to_string();
        source
            .update_scene(
                a,
                UpdateSceneInput {
                    title: Some(title),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(compute_divergence(&source, &target, &weights()).score, 0.0);
    }

    #[test]
    fn score_saturates_at_cap() {
        let mut source = GraphStore::new(fixed_clock());
        let target = GraphStore::new(fixed_clock());
        for i in 0..30 {
            source
                .create_scene(CreateSceneInput::titled(format!("S{}", i)))
                .unwrap();
        }
        let report = compute_divergence(&source, &target, &weights());
        assert_eq!(report.raw_score, 150.0);
        assert_eq!(report.score, 100.0);
    }

    mod properties {
        use super::*;
        use crate::test_fixtures::graph_shape;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn copies_score_zero_and_any_edit_scores_above_zero(
                shape in graph_shape(),
                edit in 0..4u8,
                pick in any::<prop::sample::Index>(),
            ) {
                let (source, scenes) = shape.build(fixed_clock());
                let mut target =
                    GraphStore::from_snapshot(&source.create_snapshot(), fixed_clock()).unwrap();
                let copy = compute_divergence(&source, &target, &weights());
                prop_assert_eq!(copy.score, 0.0);
                prop_assert!(copy.is_identical());

                let scene = scenes[pick.index(scenes.len())];
                match edit {
                    0 => {
                        target.create_scene(CreateSceneInput::titled("Extra")).unwrap();
                    }
                    1 => {
                        target
                            .update_scene(
                                scene,
                                UpdateSceneInput {
                                    premise: Some("rewritten".into()),
                                    ..Default::default()
                                },
                            )
                            .unwrap();
                    }
                    2 => {
                        target
                            .create_character(CreateCharacterInput::named("Stranger"))
                            .unwrap();
                    }
                    _ => {
                        target.delete_scene(scene).unwrap();
                    }
                }

                let edited = compute_divergence(&source, &target, &weights());
                prop_assert!(edited.score > 0.0);
                prop_assert!(!edited.is_identical());
            }
        }
    }
}
