//! In-memory state storage modules.
//!
//! - `GraphStore` - the authoritative scene/arc/character graph
//! - `BranchManager` - named snapshots of a graph store with merge

pub mod branches;
pub mod graph_store;

use std::sync::Arc;

use tokio::sync::RwLock;

pub use branches::{
    BranchError, BranchInfo, BranchManager, ConflictKind, MergeConflict, MergeOutcome,
    MAIN_BRANCH,
};
pub use graph_store::{
    CreateArcInput, CreateCharacterInput, CreateSceneInput, GraphStore, UpdateArcInput,
    UpdateCharacterInput, UpdateSceneInput, Upsert,
};

/// Graph store shared between request handlers and the divergence monitor.
pub type SharedGraphStore = Arc<RwLock<GraphStore>>;

pub fn shared(store: GraphStore) -> SharedGraphStore {
    Arc::new(RwLock::new(store))
}
