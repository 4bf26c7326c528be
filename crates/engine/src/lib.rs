//! Plotgraph Engine library.
//!
//! A versioned, branchable store for narrative graphs with consistency
//! validators and mirror reconciliation.
//!
//! ## Structure
//!
//! - `stores/` - the graph store and the branch manager
//! - `use_cases/` - coherence, temporal validation, mirror reconciliation
//! - `infrastructure/` - ports, clock, audit sinks, settings, snapshot files

pub mod infrastructure;
pub mod stores;
pub mod use_cases;

/// Test fixtures module for unit tests.
#[cfg(test)]
pub mod test_fixtures;

pub use stores::{BranchManager, GraphStore, SharedGraphStore};
pub use use_cases::{CoherenceSolver, MirrorReconciler, TemporalValidator};
