//! Diagnostic findings shared by the validators.
//!
//! Findings are data, never errors: a report lists them and the caller decides
//! what to do.

use serde::Serialize;
use uuid::Uuid;

/// One diagnostic with the identifiers it concerns.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding<K> {
    pub kind: K,
    pub message: String,
    /// Unique, in first-seen order
    pub affected: Vec<Uuid>,
}

impl<K> Finding<K> {
    pub fn new(kind: K, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            affected: Vec::new(),
        }
    }

    pub fn affecting(mut self, id: impl Into<Uuid>) -> Self {
        let id = id.into();
        if !self.affected.contains(&id) {
            self.affected.push(id);
        }
        self
    }

    pub fn affecting_all<I>(self, ids: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Uuid>,
    {
        ids.into_iter().fold(self, Finding::affecting)
    }
}
