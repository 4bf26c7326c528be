//! Snapshot import/export.

mod snapshot_file;

pub use snapshot_file::{SnapshotFile, SnapshotFileError};
