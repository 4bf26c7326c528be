//! Mirror reconciliation between two independent graph stores.
//!
//! `compare` scores how far a target has drifted from a source;
//! `synchronize` replays the differences into the target under the configured
//! [`SyncPolicy`]. Removals never force-delete an entity that is still
//! referenced in the target.

mod divergence;
mod monitor;

use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::infrastructure::ports::{AuditEntry, AuditPort, ClockPort, DecisionKind};
use crate::infrastructure::settings::{DivergenceWeights, EngineSettings, SyncPolicy};
use crate::stores::{GraphStore, SharedGraphStore};

pub use divergence::{compute_divergence, Difference, DifferenceKind, DivergenceReport};
pub use monitor::{DivergenceMonitor, MonitorHandle};

const AUDIT_ACTOR: &str = "mirror-reconciler";

#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("Source and target are the same store")]
    SameStore,
    #[error("Monitor interval must be greater than zero")]
    ZeroInterval,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncConflictKind {
    /// Removal refused because the target still references the entity
    ReferencedEntity,
    /// Modification left for manual review
    ManualReview,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConflict {
    pub kind: SyncConflictKind,
    pub difference: Difference,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub policy: SyncPolicy,
    pub score_before: f64,
    pub score_after: f64,
    pub applied: Vec<Difference>,
    pub skipped: Vec<Difference>,
    pub conflicts: Vec<SyncConflict>,
}

enum Resolution {
    Applied,
    Skipped,
    Conflict(SyncConflictKind, String),
}

pub struct MirrorReconciler {
    policy: SyncPolicy,
    auto_sync_threshold: f64,
    weights: DivergenceWeights,
    clock: Arc<dyn ClockPort>,
    audit: Arc<dyn AuditPort>,
}

impl MirrorReconciler {
    pub fn new(
        settings: &EngineSettings,
        clock: Arc<dyn ClockPort>,
        audit: Arc<dyn AuditPort>,
    ) -> Self {
        Self {
            policy: settings.sync_policy,
            auto_sync_threshold: settings.auto_sync_threshold,
            weights: settings.divergence,
            clock,
            audit,
        }
    }

    pub fn policy(&self) -> SyncPolicy {
        self.policy
    }

    pub fn compare(&self, source: &GraphStore, target: &GraphStore) -> DivergenceReport {
        compute_divergence(source, target, &self.weights)
    }

    /// Whether a divergence is small enough to reconcile without review.
    pub fn should_auto_sync(&self, score: f64) -> bool {
        score < self.auto_sync_threshold
    }

    /// Replay every difference from `source` into `target`.
    ///
    /// Non-conflicting differences are applied even when others conflict.
    /// Character presence in the target is re-derived from its scenes
    /// afterwards.
    pub fn synchronize(&self, source: &GraphStore, target: &mut GraphStore) -> SyncReport {
        let before = self.compare(source, target);
        let mut report = SyncReport {
            policy: self.policy,
            score_before: before.score,
            score_after: before.score,
            applied: Vec::new(),
            skipped: Vec::new(),
            conflicts: Vec::new(),
        };

        // Removals go last so their reference checks see the target after
        // every addition and modification has landed.
        let (removals, changes): (Vec<_>, Vec<_>) = before
            .differences
            .into_iter()
            .partition(|d| d.kind.is_removal());
        for difference in changes {
            let resolution = self.resolve(&difference, source, target);
            record(&mut report, difference, resolution);
        }

        // A removal blocked by another removal (a link between two dropped
        // scenes, say) is retried until a pass makes no progress.
        let mut pending = removals;
        loop {
            let mut blocked = Vec::new();
            let mut progressed = false;
            for difference in pending {
                match self.resolve(&difference, source, target) {
                    Resolution::Conflict(SyncConflictKind::ReferencedEntity, reason) => {
                        blocked.push((difference, reason));
                    }
                    resolution => {
                        progressed = true;
                        record(&mut report, difference, resolution);
                    }
                }
            }
            if !progressed || blocked.is_empty() {
                for (difference, reason) in blocked {
                    record(
                        &mut report,
                        difference,
                        Resolution::Conflict(SyncConflictKind::ReferencedEntity, reason),
                    );
                }
                break;
            }
            pending = blocked.into_iter().map(|(difference, _)| difference).collect();
        }
        target.rebuild_presence();

        report.score_after = self.compare(source, target).score;
        tracing::info!(
            policy = %self.policy,
            before = report.score_before,
            after = report.score_after,
            applied = report.applied.len(),
            skipped = report.skipped.len(),
            conflicts = report.conflicts.len(),
            "Mirror synchronized"
        );
        self.audit.record(
            AuditEntry::new(
                DecisionKind::MirrorSynchronized,
                format!(
                    "Synchronized under {} policy: divergence {} -> {}",
                    self.policy, report.score_before, report.score_after
                ),
                AUDIT_ACTOR,
                self.clock.now(),
            )
            .with_context(json!({
                "policy": self.policy,
                "scoreBefore": report.score_before,
                "scoreAfter": report.score_after,
                "applied": report.applied.len(),
                "skipped": report.skipped.len(),
                "conflicts": report.conflicts.len(),
            })),
        );
        report
    }

    /// Lock both shared stores and synchronize. The source is held for reading
    /// and the target for writing for the whole pass.
    pub async fn synchronize_shared(
        &self,
        source: &SharedGraphStore,
        target: &SharedGraphStore,
    ) -> Result<SyncReport, MirrorError> {
        if Arc::ptr_eq(source, target) {
            return Err(MirrorError::SameStore);
        }
        let source = source.read().await;
        let mut target = target.write().await;
        Ok(self.synchronize(&source, &mut target))
    }

    pub async fn compare_shared(
        &self,
        source: &SharedGraphStore,
        target: &SharedGraphStore,
    ) -> DivergenceReport {
        if Arc::ptr_eq(source, target) {
            let store = source.read().await;
            return self.compare(&store, &store);
        }
        let source = source.read().await;
        let target = target.read().await;
        self.compare(&source, &target)
    }

    fn resolve(
        &self,
        difference: &Difference,
        source: &GraphStore,
        target: &mut GraphStore,
    ) -> Resolution {
        use DifferenceKind::*;

        let id = difference.entity_id;
        match difference.kind {
            SceneAdded => match source.get_scene(id.into()) {
                Some(scene) => {
                    target.upsert_scene(scene);
                    Resolution::Applied
                }
                None => Resolution::Skipped,
            },
            ArcAdded => match source.get_arc(id.into()) {
                Some(arc) => {
                    target.upsert_arc(arc);
                    Resolution::Applied
                }
                None => Resolution::Skipped,
            },
            CharacterAdded => match source.get_character(id.into()) {
                Some(character) => {
                    target.upsert_character(character);
                    Resolution::Applied
                }
                None => Resolution::Skipped,
            },

            SceneRemoved => {
                let refs = target.scene_references(id.into());
                if !refs.is_empty() {
                    return referenced(refs);
                }
                match target.delete_scene(id.into()) {
                    Ok(_) => Resolution::Applied,
                    Err(_) => Resolution::Skipped,
                }
            }
            ArcRemoved => match target.delete_arc(id.into()) {
                Ok(_) => Resolution::Applied,
                Err(_) => Resolution::Skipped,
            },
            CharacterRemoved => {
                let refs = target.character_references(id.into());
                if !refs.is_empty() {
                    return referenced(refs);
                }
                match target.delete_character(id.into()) {
                    Ok(_) => Resolution::Applied,
                    Err(_) => Resolution::Skipped,
                }
            }

            SceneModified => {
                let (Some(ours), Some(theirs)) =
                    (source.get_scene(id.into()), target.get_scene(id.into()))
                else {
                    return Resolution::Skipped;
                };
                if !self.source_wins(ours.updated_at(), theirs.updated_at()) {
                    return self.held_back(difference);
                }
                target.upsert_scene(ours);
                Resolution::Applied
            }
            ArcModified => {
                let (Some(ours), Some(theirs)) =
                    (source.get_arc(id.into()), target.get_arc(id.into()))
                else {
                    return Resolution::Skipped;
                };
                if !self.source_wins(ours.updated_at(), theirs.updated_at()) {
                    return self.held_back(difference);
                }
                target.upsert_arc(ours);
                Resolution::Applied
            }
            CharacterModified => {
                let (Some(ours), Some(theirs)) = (
                    source.get_character(id.into()),
                    target.get_character(id.into()),
                ) else {
                    return Resolution::Skipped;
                };
                if !self.source_wins(ours.updated_at(), theirs.updated_at()) {
                    return self.held_back(difference);
                }
                target.upsert_character(ours);
                Resolution::Applied
            }
        }
    }

    /// Whether a modification should overwrite the target under the policy.
    fn source_wins(
        &self,
        source_updated: chrono::DateTime<chrono::Utc>,
        target_updated: chrono::DateTime<chrono::Utc>,
    ) -> bool {
        match self.policy {
            SyncPolicy::PreferSource => true,
            SyncPolicy::NewestWins => source_updated > target_updated,
            SyncPolicy::Manual | SyncPolicy::PreferTarget => false,
        }
    }

    /// Outcome for a modification the policy did not apply.
    fn held_back(&self, difference: &Difference) -> Resolution {
        match self.policy {
            SyncPolicy::Manual => Resolution::Conflict(
                SyncConflictKind::ManualReview,
                format!(
                    "'{}' differs in {}; manual policy requires review",
                    difference.label,
                    difference.fields.join(", ")
                ),
            ),
            _ => Resolution::Skipped,
        }
    }
}

fn record(report: &mut SyncReport, difference: Difference, resolution: Resolution) {
    match resolution {
        Resolution::Applied => report.applied.push(difference),
        Resolution::Skipped => report.skipped.push(difference),
        Resolution::Conflict(kind, reason) => {
            tracing::warn!(
                entity_id = %difference.entity_id,
                kind = ?difference.kind,
                %reason,
                "Sync conflict"
            );
            report.conflicts.push(SyncConflict {
                kind,
                difference,
                reason,
            });
        }
    }
}

fn referenced(refs: Vec<String>) -> Resolution {
    Resolution::Conflict(
        SyncConflictKind::ReferencedEntity,
        format!("still referenced: {}", refs.join("; ")),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::audit::NoopAuditLog;
    use crate::infrastructure::clock::SteppingClock;
    use crate::infrastructure::ports::MockAuditPort;
    use crate::stores::{shared, CreateSceneInput, UpdateSceneInput};
    use crate::test_fixtures::{epoch, fixed_clock, FixtureIds, StoreBuilder};
    use plotgraph_domain::SceneId;

    fn reconciler(policy: SyncPolicy) -> MirrorReconciler {
        let settings = EngineSettings::default().with_sync_policy(policy);
        MirrorReconciler::new(&settings, fixed_clock(), Arc::new(NoopAuditLog))
    }

    /// Source and target start identical; both read a clock that advances
    /// so modification order is observable.
    fn mirrored() -> (GraphStore, GraphStore, FixtureIds) {
        let clock: Arc<dyn ClockPort> = Arc::new(SteppingClock::new(epoch()));
        let (source, ids) = StoreBuilder::new(clock.clone())
            .scene("A")
            .scene("B")
            .link("A", "B")
            .character("Hero")
            .present("Hero", "A")
            .arc("Quest", &["A", "B"])
            .build_with_ids();
        let target = GraphStore::from_snapshot(&source.create_snapshot(), clock).unwrap();
        (source, target, ids)
    }

    fn set_premise(store: &mut GraphStore, scene: SceneId, premise: &str) {
        store
            .update_scene(
                scene,
                UpdateSceneInput {
                    premise: Some(premise.into()),
                    ..Default::default()
                },
            )
            .unwrap();
    }

    #[test]
    fn auto_sync_threshold_is_exclusive() {
        let mirror = reconciler(SyncPolicy::Manual);
        assert!(mirror.should_auto_sync(24.9));
        assert!(!mirror.should_auto_sync(25.0));
    }

    #[test]
    fn additions_apply_under_every_policy() {
        for policy in [
            SyncPolicy::Manual,
            SyncPolicy::PreferSource,
            SyncPolicy::PreferTarget,
            SyncPolicy::NewestWins,
        ] {
            let (mut source, mut target, ids) = mirrored();
            let c = source
                .create_scene(CreateSceneInput {
                    title: "C".into(),
                    characters: vec![ids.character("Hero")],
                    ..Default::default()
                })
                .unwrap();

            let report = reconciler(policy).synchronize(&source, &mut target);

            // Scene added plus Hero's presence set.
            assert_eq!(report.score_before, 6.0, "{}", policy);
            assert!(report
                .applied
                .iter()
                .any(|d| d.kind == DifferenceKind::SceneAdded && d.entity_id == c.to_uuid()));
            assert!(target.contains_scene(c));
            assert!(target
                .get_character(ids.character("Hero"))
                .unwrap()
                .appears_in(c));
            assert_eq!(report.score_after, 0.0, "{}", policy);
        }
    }

    #[test]
    fn manual_policy_reports_modifications_as_conflicts() {
        let (mut source, mut target, ids) = mirrored();
        set_premise(&mut source, ids.scene("A"), "from source");

        let report = reconciler(SyncPolicy::Manual).synchronize(&source, &mut target);

        assert_eq!(report.conflicts.len(), 1);
        assert_eq!(report.conflicts[0].kind, SyncConflictKind::ManualReview);
        assert_eq!(target.get_scene(ids.scene("A")).unwrap().premise(), "");
        assert_eq!(report.score_after, report.score_before);
    }

    #[test]
    fn prefer_source_overwrites_target() {
        let (mut source, mut target, ids) = mirrored();
        set_premise(&mut source, ids.scene("A"), "from source");
        set_premise(&mut target, ids.scene("A"), "from target");

        let report = reconciler(SyncPolicy::PreferSource).synchronize(&source, &mut target);

        assert_eq!(report.applied.len(), 1);
        assert_eq!(
            target.get_scene(ids.scene("A")).unwrap().premise(),
            "from source"
        );
        assert_eq!(report.score_after, 0.0);
    }

    #[test]
    fn prefer_target_skips_modifications() {
        let (mut source, mut target, ids) = mirrored();
        set_premise(&mut source, ids.scene("A"), "from source");

        let report = reconciler(SyncPolicy::PreferTarget).synchronize(&source, &mut target);

        assert_eq!(report.skipped.len(), 1);
        assert!(report.conflicts.is_empty());
        assert_eq!(target.get_scene(ids.scene("A")).unwrap().premise(), "");
    }

    #[test]
    fn newest_wins_compares_modification_times() {
        let (mut source, mut target, ids) = mirrored();
        set_premise(&mut target, ids.scene("A"), "older");
        set_premise(&mut source, ids.scene("A"), "newer");
        let report = reconciler(SyncPolicy::NewestWins).synchronize(&source, &mut target);
        assert_eq!(report.applied.len(), 1);
        assert_eq!(target.get_scene(ids.scene("A")).unwrap().premise(), "newer");

        let (mut source, mut target, ids) = mirrored();
        set_premise(&mut source, ids.scene("A"), "older");
        set_premise(&mut target, ids.scene("A"), "newer");
        let report = reconciler(SyncPolicy::NewestWins).synchronize(&source, &mut target);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(target.get_scene(ids.scene("A")).unwrap().premise(), "newer");
    }

    #[test]
    fn referenced_removal_is_a_conflict_not_a_delete() {
        let (source, mut target, ids) = mirrored();
        let extra = target
            .create_scene(CreateSceneInput {
                title: "Extra".into(),
                links: vec![ids.scene("A")],
                characters: vec![ids.character("Hero")],
                ..Default::default()
            })
            .unwrap();
        let lonely = target
            .create_scene(CreateSceneInput::titled("Lonely"))
            .unwrap();

        let report = reconciler(SyncPolicy::PreferTarget).synchronize(&source, &mut target);

        // The target keeps its Hero, who still appears in Extra.
        assert!(target.contains_scene(extra));
        assert!(!target.contains_scene(lonely));
        assert!(report
            .conflicts
            .iter()
            .any(|c| c.kind == SyncConflictKind::ReferencedEntity
                && c.difference.entity_id == extra.to_uuid()));
    }

    #[test]
    fn prefer_source_drops_reference_before_removing() {
        let (source, mut target, ids) = mirrored();
        let extra = target
            .create_scene(CreateSceneInput {
                title: "Extra".into(),
                characters: vec![ids.character("Hero")],
                ..Default::default()
            })
            .unwrap();

        let report = reconciler(SyncPolicy::PreferSource).synchronize(&source, &mut target);

        assert!(report.conflicts.is_empty());
        assert!(!target.contains_scene(extra));
        assert_eq!(report.score_after, 0.0);
    }

    #[test]
    fn prefer_source_converges_when_arc_drops_a_scene() {
        let (source, mut target, ids) = mirrored();
        let quest = ids.arc("Quest");
        let x = target.create_scene(CreateSceneInput::titled("X")).unwrap();
        target.add_scene_to_arc(quest, x, None).unwrap();

        let report = reconciler(SyncPolicy::PreferSource).synchronize(&source, &mut target);

        assert!(report.conflicts.is_empty(), "{:?}", report.conflicts);
        assert!(!target.contains_scene(x));
        assert_eq!(
            target.get_arc(quest).unwrap().scenes(),
            &[ids.scene("A"), ids.scene("B")]
        );
        assert_eq!(report.score_after, 0.0);
        assert!(report.score_after.is_sign_positive());
    }

    #[test]
    fn removals_blocked_by_other_removals_are_retried() {
        let (source, mut target, _) = mirrored();
        // Y comes first in report order but is linked from X.
        let y = target.create_scene(CreateSceneInput::titled("Y")).unwrap();
        let x = target
            .create_scene(CreateSceneInput {
                title: "X".into(),
                links: vec![y],
                ..Default::default()
            })
            .unwrap();

        let report = reconciler(SyncPolicy::Manual).synchronize(&source, &mut target);

        assert!(report.conflicts.is_empty());
        assert!(!target.contains_scene(x));
        assert!(!target.contains_scene(y));
        assert_eq!(report.applied.len(), 2);
    }

    mod characters {
        use super::*;
        use crate::stores::CreateCharacterInput;
        use plotgraph_domain::RelationshipKind;

        #[test]
        fn unreferenced_character_is_removed() {
            let (source, mut target, _) = mirrored();
            let rival = target
                .create_character(CreateCharacterInput::named("Rival"))
                .unwrap();

            let report = reconciler(SyncPolicy::Manual).synchronize(&source, &mut target);

            assert!(!target.contains_character(rival));
            assert_eq!(report.applied.len(), 1);
            assert_eq!(report.applied[0].kind, DifferenceKind::CharacterRemoved);
            assert_eq!(report.score_after, 0.0);
        }

        #[test]
        fn relationship_keeps_character_unless_source_wins() {
            for (policy, kept) in [(SyncPolicy::PreferTarget, true), (SyncPolicy::PreferSource, false)]
            {
                let (source, mut target, ids) = mirrored();
                let mentor = target
                    .create_character(CreateCharacterInput::named("Mentor"))
                    .unwrap();
                target
                    .add_relationship(ids.character("Hero"), mentor, RelationshipKind::Mentorship, 70)
                    .unwrap();

                let report = reconciler(policy).synchronize(&source, &mut target);

                assert_eq!(target.contains_character(mentor), kept, "{}", policy);
                let conflicted = report.conflicts.iter().any(|c| {
                    c.kind == SyncConflictKind::ReferencedEntity
                        && c.difference.kind == DifferenceKind::CharacterRemoved
                });
                assert_eq!(conflicted, kept, "{}", policy);
            }
        }

        #[test]
        fn presence_keeps_character_unless_source_wins() {
            for (policy, kept) in [(SyncPolicy::PreferTarget, true), (SyncPolicy::PreferSource, false)]
            {
                let (source, mut target, ids) = mirrored();
                let ghost = target
                    .create_character(CreateCharacterInput::named("Ghost"))
                    .unwrap();
                target.link_character(ids.scene("A"), ghost).unwrap();

                let report = reconciler(policy).synchronize(&source, &mut target);

                assert_eq!(target.contains_character(ghost), kept, "{}", policy);
                if !kept {
                    assert!(!target.get_scene(ids.scene("A")).unwrap().has_character(ghost));
                    assert_eq!(report.score_after, 0.0);
                }
            }
        }

        #[test]
        fn added_character_is_inserted() {
            let (mut source, mut target, _) = mirrored();
            let sage = source
                .create_character(CreateCharacterInput::named("Sage"))
                .unwrap();

            let report = reconciler(SyncPolicy::Manual).synchronize(&source, &mut target);

            assert!(target.contains_character(sage));
            assert_eq!(report.applied[0].kind, DifferenceKind::CharacterAdded);
            assert_eq!(report.score_before, 4.0);
            assert_eq!(report.score_after, 0.0);
        }
    }

    mod arcs {
        use super::*;
        use crate::stores::CreateArcInput;

        #[test]
        fn added_arc_is_inserted() {
            let (mut source, mut target, ids) = mirrored();
            let subplot = source
                .create_arc(CreateArcInput {
                    intent: "Subplot".into(),
                    scenes: vec![ids.scene("B")],
                    ..Default::default()
                })
                .unwrap();

            let report = reconciler(SyncPolicy::PreferTarget).synchronize(&source, &mut target);

            assert_eq!(report.score_before, 5.0);
            assert_eq!(report.applied[0].kind, DifferenceKind::ArcAdded);
            assert_eq!(target.get_arc(subplot).unwrap().scenes(), &[ids.scene("B")]);
            assert_eq!(report.score_after, 0.0);
        }

        #[test]
        fn removed_arc_is_always_deleted() {
            let (source, mut target, ids) = mirrored();
            let detour = target
                .create_arc(CreateArcInput {
                    intent: "Detour".into(),
                    scenes: vec![ids.scene("A")],
                    ..Default::default()
                })
                .unwrap();

            let report = reconciler(SyncPolicy::Manual).synchronize(&source, &mut target);

            assert!(!target.contains_arc(detour));
            assert!(report.conflicts.is_empty());
            assert_eq!(report.applied[0].kind, DifferenceKind::ArcRemoved);
            assert!(target.contains_scene(ids.scene("A")));
            assert_eq!(report.score_after, 0.0);
        }
    }

    #[test]
    fn synchronize_records_audit_entry() {
        let (source, mut target, _) = mirrored();
        let mut audit = MockAuditPort::new();
        audit
            .expect_record()
            .withf(|entry| {
                entry.decision_kind == DecisionKind::MirrorSynchronized
                    && entry.context["policy"] == "prefer_source"
            })
            .times(1)
            .returning(|_| ());
        let settings = EngineSettings::default().with_sync_policy(SyncPolicy::PreferSource);
        let mirror = MirrorReconciler::new(&settings, fixed_clock(), Arc::new(audit));
        mirror.synchronize(&source, &mut target);
    }

    #[tokio::test]
    async fn shared_sync_rejects_same_store() {
        let store = shared(GraphStore::new(fixed_clock()));
        let result = reconciler(SyncPolicy::PreferSource)
            .synchronize_shared(&store, &store)
            .await;
        assert!(matches!(result, Err(MirrorError::SameStore)));
    }

    #[tokio::test]
    async fn shared_sync_converges() {
        let (mut source, target, _) = mirrored();
        source.create_scene(CreateSceneInput::titled("C")).unwrap();
        let (source, target) = (shared(source), shared(target));

        let mirror = reconciler(SyncPolicy::PreferSource);
        let report = mirror.synchronize_shared(&source, &target).await.unwrap();

        assert_eq!(report.score_before, 5.0);
        assert_eq!(mirror.compare_shared(&source, &target).await.score, 0.0);
    }
}
