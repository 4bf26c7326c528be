//! Use cases - validation and reconciliation over graph stores.
//!
//! Each module owns one concern and reads stores through `GraphStore`'s API.

pub mod coherence;
pub mod findings;
pub mod mirror;
pub mod temporal;

pub use coherence::{CoherenceKind, CoherenceReport, CoherenceSolver};
pub use findings::Finding;
pub use mirror::{
    DifferenceKind, DivergenceMonitor, DivergenceReport, MirrorError, MirrorReconciler,
    MonitorHandle, SyncConflictKind, SyncReport,
};
pub use temporal::{TemporalKind, TemporalReport, TemporalValidator, TimelineError};
