//! Unified error types for the domain layer
//!
//! Every rejection names the entity, the offending identifier or field, and the
//! bound that was violated, so callers can render an actionable message.

use thiserror::Error;

/// Unified error type for domain operations
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DomainError {
    /// Malformed input (empty required field, out-of-range number)
    #[error("Validation failed for {entity_type}.{field}: {message}")]
    Validation {
        entity_type: &'static str,
        field: &'static str,
        message: String,
    },

    /// Invalid ID format
    #[error("Invalid ID format: {0}")]
    InvalidId(String),

    /// Operation on an identifier that does not exist
    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound {
        entity_type: &'static str,
        id: String,
    },

    /// Disallowed structural operation
    #[error("Policy violation: {0}")]
    Policy(String),

    /// Parse error (for value objects)
    #[error("Parse error: {0}")]
    Parse(String),
}

impl DomainError {
    /// Creates a validation error for a specific entity field.
    ///
    /// Use this when input is rejected before any mutation takes place:
    /// - Required fields are empty or missing
    /// - Values are outside allowed ranges
    ///
    /// # Example
    /// ```ignore
    /// if title.trim().is_empty() {
    ///     return Err(DomainError::validation("Scene", "title", "cannot be empty"));
    /// }
    /// ```
    pub fn validation(
        entity_type: &'static str,
        field: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self::Validation {
            entity_type,
            field,
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(entity_type: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity_type,
            id: id.to_string(),
        }
    }

    /// Create a policy violation error
    pub fn policy(msg: impl Into<String>) -> Self {
        Self::Policy(msg.into())
    }

    /// Create an invalid ID error
    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    /// Creates a parse error for string-to-type conversion failures.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error() {
        let err = DomainError::validation("Scene", "cost", "must be between 0 and 10, got 11");
        assert!(err.is_validation());
        assert_eq!(
            err.to_string(),
            "Validation failed for Scene.cost: must be between 0 and 10, got 11"
        );
    }

    #[test]
    fn test_not_found_error() {
        let err = DomainError::not_found("Character", "123e4567-e89b-12d3-a456-426614174000");
        assert!(err.is_not_found());
        assert!(err.to_string().contains("Character"));
        assert!(err.to_string().contains("123e4567"));
    }

    #[test]
    fn test_policy_error() {
        let err = DomainError::policy("scene already linked");
        assert!(matches!(err, DomainError::Policy(_)));
        assert_eq!(err.to_string(), "Policy violation: scene already linked");
    }
}
