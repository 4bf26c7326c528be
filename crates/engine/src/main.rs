//! Plotgraph - command line entry point.
//!
//! Works on snapshot files: coherence checks, divergence reports, mirror
//! synchronization and branch merges. Reports are printed as JSON on stdout;
//! logs go to stderr.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use plotgraph_engine::infrastructure::{
    audit::TracingAuditLog,
    clock::SystemClock,
    export::SnapshotFile,
    ports::{AuditPort, ClockPort},
    settings::EngineSettings,
};
use plotgraph_engine::stores::{BranchManager, GraphStore};
use plotgraph_engine::use_cases::{CoherenceSolver, MirrorReconciler};

const USAGE: &str = "Usage: plotgraph <command>

Commands:
  check <snapshot.json>                      Print the coherence report
  diff <source.json> <target.json>           Print divergence of target from source
  sync <source.json> <target.json> <out.json>
                                             Synchronize target from source, write result
  merge <base.json> <feature.json> [out.json]
                                             Merge feature into base";

fn main() -> anyhow::Result<()> {
    load_dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "plotgraph_engine=info,plotgraph=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let settings = EngineSettings::from_env();
    let clock: Arc<dyn ClockPort> = Arc::new(SystemClock::new());
    let audit: Arc<dyn AuditPort> = Arc::new(TracingAuditLog::new());

    let args: Vec<String> = std::env::args().skip(1).collect();
    let args: Vec<&str> = args.iter().map(String::as_str).collect();
    match args.as_slice() {
        ["check", snapshot] => check(snapshot, clock),
        ["diff", source, target] => diff(source, target, &settings, clock, audit),
        ["sync", source, target, out] => sync(source, target, out, &settings, clock, audit),
        ["merge", base, feature] => merge(base, feature, None, clock, audit),
        ["merge", base, feature, out] => merge(base, feature, Some(*out), clock, audit),
        [cmd, ..] => anyhow::bail!("Unknown or malformed command: {cmd}\n\n{USAGE}"),
        [] => anyhow::bail!(USAGE),
    }
}

/// Load `.env.local` then `.env` from the working directory, if present.
fn load_dotenv() {
    for filename in [".env.local", ".env"] {
        let path = Path::new(filename);
        if path.exists() {
            let _ = dotenvy::from_path(path);
        }
    }
}

fn load_store(path: &str, clock: &Arc<dyn ClockPort>) -> anyhow::Result<GraphStore> {
    let snapshot = SnapshotFile::read(path)?;
    GraphStore::from_snapshot(&snapshot, clock.clone())
        .with_context(|| format!("loading {path} into a graph store"))
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn check(path: &str, clock: Arc<dyn ClockPort>) -> anyhow::Result<()> {
    let store = load_store(path, &clock)?;
    let report = CoherenceSolver::new().check(&store);
    tracing::info!(
        coherent = report.coherent,
        errors = report.errors.len(),
        warnings = report.warnings.len(),
        "Checked {}",
        path
    );
    print_json(&report)
}

fn diff(
    source: &str,
    target: &str,
    settings: &EngineSettings,
    clock: Arc<dyn ClockPort>,
    audit: Arc<dyn AuditPort>,
) -> anyhow::Result<()> {
    let source = load_store(source, &clock)?;
    let target = load_store(target, &clock)?;
    let mirror = MirrorReconciler::new(settings, clock, audit);
    let report = mirror.compare(&source, &target);
    tracing::info!(
        score = report.score,
        auto_sync = mirror.should_auto_sync(report.score),
        "Computed divergence"
    );
    print_json(&report)
}

fn sync(
    source: &str,
    target: &str,
    out: &str,
    settings: &EngineSettings,
    clock: Arc<dyn ClockPort>,
    audit: Arc<dyn AuditPort>,
) -> anyhow::Result<()> {
    let source = load_store(source, &clock)?;
    let mut target = load_store(target, &clock)?;
    let mirror = MirrorReconciler::new(settings, clock, audit);
    let report = mirror.synchronize(&source, &mut target);
    SnapshotFile::write(out, &target.create_snapshot())?;
    print_json(&report)
}

fn merge(
    base: &str,
    feature: &str,
    out: Option<&str>,
    clock: Arc<dyn ClockPort>,
    audit: Arc<dyn AuditPort>,
) -> anyhow::Result<()> {
    let mut store = load_store(base, &clock)?;
    let feature_store = load_store(feature, &clock)?;

    let mut branches = BranchManager::new(&store, clock, audit);
    branches.create("feature", &feature_store)?;
    let outcome = branches.merge("feature", &mut store)?;

    if let Some(out) = out {
        if outcome.merged {
            SnapshotFile::write(out, &store.create_snapshot())?;
        } else {
            tracing::warn!("Merge had conflicts; {} was not written", out);
        }
    }
    print_json(&outcome)
}
