//! Periodic divergence monitor.
//!
//! Recomputes divergence between two shared stores on a fixed interval and
//! synchronizes when the stores differ by less than the auto-sync threshold.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::stores::SharedGraphStore;
use crate::use_cases::mirror::{MirrorError, MirrorReconciler};

/// Handle to a running monitor. Dropping it cancels the monitor.
pub struct MonitorHandle {
    token: CancellationToken,
    join: Option<JoinHandle<()>>,
}

impl MonitorHandle {
    /// Stop the monitor. Calling this more than once is a no-op.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Cancel and wait for the monitor task to finish.
    pub async fn shutdown(mut self) {
        self.token.cancel();
        if let Some(join) = self.join.take() {
            if let Err(e) = join.await {
                tracing::warn!(error = %e, "Divergence monitor task ended abnormally");
            }
        }
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

pub struct DivergenceMonitor;

impl DivergenceMonitor {
    /// Spawn the monitor on the current tokio runtime.
    pub fn spawn(
        reconciler: Arc<MirrorReconciler>,
        source: SharedGraphStore,
        target: SharedGraphStore,
        interval: Duration,
    ) -> Result<MonitorHandle, MirrorError> {
        if Arc::ptr_eq(&source, &target) {
            return Err(MirrorError::SameStore);
        }
        if interval.is_zero() {
            return Err(MirrorError::ZeroInterval);
        }
        let token = CancellationToken::new();
        let join = tokio::spawn(run(reconciler, source, target, interval, token.clone()));
        Ok(MonitorHandle {
            token,
            join: Some(join),
        })
    }
}

async fn run(
    reconciler: Arc<MirrorReconciler>,
    source: SharedGraphStore,
    target: SharedGraphStore,
    interval: Duration,
    cancel_token: CancellationToken,
) {
    tracing::info!(interval_secs = interval.as_secs_f64(), "Starting divergence monitor");
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => {
                tracing::info!("Divergence monitor shutting down");
                break;
            }
            _ = ticker.tick() => {}
        }

        let report = reconciler.compare_shared(&source, &target).await;
        if report.score == 0.0 {
            continue;
        }
        if !reconciler.should_auto_sync(report.score) {
            tracing::warn!(
                score = report.score,
                differences = report.differences.len(),
                "Divergence above auto-sync threshold, waiting for review"
            );
            continue;
        }

        match reconciler.synchronize_shared(&source, &target).await {
            Ok(sync) => tracing::debug!(
                before = sync.score_before,
                after = sync.score_after,
                "Monitor synchronized mirror"
            ),
            Err(e) => tracing::error!(error = %e, "Monitor synchronization failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::audit::NoopAuditLog;
    use crate::infrastructure::settings::{EngineSettings, SyncPolicy};
    use crate::stores::{shared, CreateSceneInput, GraphStore};
    use crate::test_fixtures::fixed_clock;

    fn reconciler(threshold: f64) -> Arc<MirrorReconciler> {
        let settings = EngineSettings::default()
            .with_sync_policy(SyncPolicy::PreferSource)
            .with_auto_sync_threshold(threshold);
        Arc::new(MirrorReconciler::new(
            &settings,
            fixed_clock(),
            Arc::new(NoopAuditLog),
        ))
    }

    fn diverged() -> (SharedGraphStore, SharedGraphStore) {
        let mut source = GraphStore::new(fixed_clock());
        source.create_scene(CreateSceneInput::titled("A")).unwrap();
        (shared(source), shared(GraphStore::new(fixed_clock())))
    }

    #[tokio::test(start_paused = true)]
    async fn syncs_small_divergence_on_tick() {
        let (source, target) = diverged();
        let mirror = reconciler(25.0);
        let handle = DivergenceMonitor::spawn(
            mirror.clone(),
            source.clone(),
            target.clone(),
            Duration::from_secs(30),
        )
        .unwrap();

        // The first tick fires immediately; give the task a chance to run it.
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(target.read().await.scene_count(), 1);
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn leaves_large_divergence_alone() {
        let (source, target) = diverged();
        let handle = DivergenceMonitor::spawn(
            reconciler(5.0),
            source.clone(),
            target.clone(),
            Duration::from_secs(30),
        )
        .unwrap();

        tokio::time::sleep(Duration::from_secs(61)).await;

        assert_eq!(target.read().await.scene_count(), 0);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn cancel_is_idempotent_and_task_terminates() {
        let (source, target) = diverged();
        let handle = DivergenceMonitor::spawn(
            reconciler(25.0),
            source,
            target,
            Duration::from_millis(10),
        )
        .unwrap();

        handle.cancel();
        handle.cancel();
        assert!(handle.is_cancelled());
        tokio::time::timeout(Duration::from_secs(5), handle.shutdown())
            .await
            .expect("monitor did not stop");
    }

    #[tokio::test]
    async fn same_store_is_rejected() {
        let store = shared(GraphStore::new(fixed_clock()));
        let result =
            DivergenceMonitor::spawn(reconciler(25.0), store.clone(), store, Duration::from_secs(1));
        assert!(matches!(result, Err(MirrorError::SameStore)));
    }

    #[tokio::test]
    async fn zero_interval_is_rejected() {
        let (source, target) = diverged();
        let result = DivergenceMonitor::spawn(reconciler(25.0), source, target, Duration::ZERO);
        assert!(matches!(result, Err(MirrorError::ZeroInterval)));
    }
}
