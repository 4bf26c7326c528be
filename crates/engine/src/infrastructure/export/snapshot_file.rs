//! JSON snapshot files
//!
//! Exports complete graph snapshots in the documented layout and reads them
//! back. Reading validates identifier uniqueness so a file that would not load
//! into a store is rejected up front.

use std::path::{Path, PathBuf};

use plotgraph_domain::{DomainError, GraphSnapshot};

#[derive(Debug, thiserror::Error)]
pub enum SnapshotFileError {
    #[error("Failed to access snapshot file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed snapshot JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid snapshot in {path}: {source}")]
    Invalid {
        path: PathBuf,
        #[source]
        source: DomainError,
    },
}

/// Reads and writes snapshot JSON files.
pub struct SnapshotFile;

impl SnapshotFile {
    pub fn read(path: impl AsRef<Path>) -> Result<GraphSnapshot, SnapshotFileError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| SnapshotFileError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let snapshot = Self::parse(&text).map_err(|source| SnapshotFileError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        snapshot
            .check_unique_ids()
            .map_err(|source| SnapshotFileError::Invalid {
                path: path.to_path_buf(),
                source,
            })?;
        tracing::debug!(
            path = %path.display(),
            version = snapshot.metadata().version,
            entities = snapshot.entity_count(),
            "Read snapshot"
        );
        Ok(snapshot)
    }

    pub fn write(path: impl AsRef<Path>, snapshot: &GraphSnapshot) -> Result<(), SnapshotFileError> {
        let path = path.as_ref();
        let text = Self::render(snapshot).map_err(|source| SnapshotFileError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        std::fs::write(path, text).map_err(|source| SnapshotFileError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "Wrote snapshot");
        Ok(())
    }

    pub fn parse(text: &str) -> Result<GraphSnapshot, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn render(snapshot: &GraphSnapshot) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(snapshot)
    }
}
