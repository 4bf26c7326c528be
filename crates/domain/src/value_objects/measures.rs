//! Bounded numeric value objects.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::DomainError;

/// Complexity weight of a scene (finite, 0.0..=10.0).
///
/// Typical authored values sit between 0.1 and 10.0; zero is accepted for
/// placeholder scenes.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct SceneCost(f64);

impl SceneCost {
    pub const MIN: f64 = 0.0;
    pub const MAX: f64 = 10.0;

    pub fn new(value: f64) -> Result<Self, DomainError> {
        if !value.is_finite() || !(Self::MIN..=Self::MAX).contains(&value) {
            return Err(DomainError::validation(
                "Scene",
                "cost",
                format!(
                    "must be between {} and {}, got {}",
                    Self::MIN,
                    Self::MAX,
                    value
                ),
            ));
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> f64 {
        self.0
    }
}

impl Default for SceneCost {
    fn default() -> Self {
        Self(1.0)
    }
}

impl fmt::Display for SceneCost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<f64> for SceneCost {
    type Error = DomainError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SceneCost> for f64 {
    fn from(cost: SceneCost) -> f64 {
        cost.0
    }
}

/// Weight of a character relationship (1..=10).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct RelationshipStrength(u8);

impl RelationshipStrength {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 10;

    pub fn new(value: u8) -> Result<Self, DomainError> {
        if !(Self::MIN..=Self::MAX).contains(&value) {
            return Err(DomainError::validation(
                "Character",
                "relationship.strength",
                format!(
                    "must be between {} and {}, got {}",
                    Self::MIN,
                    Self::MAX,
                    value
                ),
            ));
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for RelationshipStrength {
    type Error = DomainError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RelationshipStrength> for u8 {
    fn from(strength: RelationshipStrength) -> u8 {
        strength.0
    }
}
