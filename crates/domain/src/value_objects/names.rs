//! Validated name newtypes for narrative entities
//!
//! These newtypes ensure that names are valid by construction:
//! - Non-empty
//! - Within length limits
//! - Trimmed of leading/trailing whitespace

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::DomainError;

/// Maximum length for name fields (SceneTitle, CharacterName, TimelineName)
pub const MAX_NAME_LENGTH: usize = 200;

fn validated(
    entity_type: &'static str,
    field: &'static str,
    value: String,
) -> Result<String, DomainError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(DomainError::validation(entity_type, field, "cannot be empty"));
    }
    let len = trimmed.chars().count();
    if len > MAX_NAME_LENGTH {
        return Err(DomainError::validation(
            entity_type,
            field,
            format!("cannot exceed {} characters, got {}", MAX_NAME_LENGTH, len),
        ));
    }
    Ok(trimmed.to_string())
}

// ============================================================================
// SceneTitle
// ============================================================================

/// A validated scene title (non-empty, <=200 chars, trimmed)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SceneTitle(String);

impl SceneTitle {
    /// Create a new validated scene title.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the title is empty after trimming
    /// or exceeds 200 characters.
    pub fn new(title: impl Into<String>) -> Result<Self, DomainError> {
        validated("Scene", "title", title.into()).map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SceneTitle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for SceneTitle {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<SceneTitle> for String {
    fn from(title: SceneTitle) -> String {
        title.0
    }
}

// ============================================================================
// CharacterName
// ============================================================================

/// A validated character name (non-empty, <=200 chars, trimmed)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CharacterName(String);

impl CharacterName {
    /// Create a new validated character name.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the name is empty after trimming
    /// or exceeds 200 characters.
    pub fn new(name: impl Into<String>) -> Result<Self, DomainError> {
        validated("Character", "name", name.into()).map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CharacterName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for CharacterName {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<CharacterName> for String {
    fn from(name: CharacterName) -> String {
        name.0
    }
}

// ============================================================================
// TimelineName
// ============================================================================

/// A validated timeline name (non-empty, <=200 chars, trimmed)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimelineName(String);

impl TimelineName {
    pub fn new(name: impl Into<String>) -> Result<Self, DomainError> {
        validated("Timeline", "name", name.into()).map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TimelineName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for TimelineName {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<TimelineName> for String {
    fn from(name: TimelineName) -> String {
        name.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod scene_title {
        use super::*;

        #[test]
        fn trims_whitespace() {
            let title = SceneTitle::new("  The Ambush  ").unwrap();
            assert_eq!(title.as_str(), "The Ambush");
        }

        #[test]
        fn rejects_blank_title() {
            let err = SceneTitle::new("   ").unwrap_err();
            assert_eq!(
                err,
                DomainError::validation("Scene", "title", "cannot be empty")
            );
        }

        #[test]
        fn rejects_overlong_title() {
            let err = SceneTitle::new("x".repeat(MAX_NAME_LENGTH + 1)).unwrap_err();
            assert!(err.to_string().contains("201"));
        }

        #[test]
        fn deserialization_validates() {
            let result: Result<SceneTitle, _> = serde_json::from_str("\"\"");
            assert!(result.is_err());
        }
    }

    mod character_name {
        use super::*;

        #[test]
        fn accepts_max_length() {
            let name = CharacterName::new("a".repeat(MAX_NAME_LENGTH)).unwrap();
            assert_eq!(name.as_str().len(), MAX_NAME_LENGTH);
        }

        #[test]
        fn reports_field_on_failure() {
            let err = CharacterName::new("").unwrap_err();
            assert!(err.to_string().contains("Character.name"));
        }
    }
}
