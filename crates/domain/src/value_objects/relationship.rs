//! Typed, weighted relationships between characters

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::value_objects::RelationshipStrength;
use crate::CharacterId;

/// A directed relationship from the owning character to `target`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relationship {
    pub target: CharacterId,
    pub kind: RelationshipKind,
    pub strength: RelationshipStrength,
}

impl Relationship {
    pub fn new(target: CharacterId, kind: RelationshipKind, strength: RelationshipStrength) -> Self {
        Self {
            target,
            kind,
            strength,
        }
    }
}

/// Types of relationships between characters
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipKind {
    Family,
    Romantic,
    Professional,
    Rivalry,
    Friendship,
    Mentorship,
    Enmity,
    Alliance,
    Custom(String),
}

impl fmt::Display for RelationshipKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Family => write!(f, "family"),
            Self::Romantic => write!(f, "romantic"),
            Self::Professional => write!(f, "professional"),
            Self::Rivalry => write!(f, "rivalry"),
            Self::Friendship => write!(f, "friendship"),
            Self::Mentorship => write!(f, "mentorship"),
            Self::Enmity => write!(f, "enmity"),
            Self::Alliance => write!(f, "alliance"),
            Self::Custom(s) => write!(f, "{}", s),
        }
    }
}

impl std::str::FromStr for RelationshipKind {
    type Err = String;

    /// Parse a relationship kind from a string (case-insensitive)
    ///
    /// Supports the basic kinds, a few aliases ("friend", "mentor", "enemy",
    /// "ally", family terms like "sibling"), and maps anything else to
    /// `Custom(original_string)`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.to_lowercase().replace(['_', ' '], "");

        Ok(match normalized.as_str() {
            "" => return Err("Relationship kind cannot be empty".to_string()),
            "family" | "parent" | "child" | "sibling" | "spouse" | "cousin" => Self::Family,
            "romantic" | "lover" => Self::Romantic,
            "professional" | "colleague" => Self::Professional,
            "rivalry" | "rival" => Self::Rivalry,
            "friendship" | "friend" => Self::Friendship,
            "mentorship" | "mentor" => Self::Mentorship,
            "enmity" | "enemy" => Self::Enmity,
            "alliance" | "ally" => Self::Alliance,
            _ => Self::Custom(s.trim().to_string()),
        })
    }
}
