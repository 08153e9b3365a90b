//! Error types for the assessment domain.
//!
//! Every failure that leaves the evaluation core is one of four kinds:
//! validation (malformed input caught before I/O), not-found (a confirmed
//! lookup miss), repository (a wrapped storage fault), or the catch-all
//! domain error used when nothing more specific applies.

use crate::validation::ValidationIssue;
use std::collections::BTreeMap;

/// Top-level error type of the evaluation core
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Input failed validation
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Operation targeted an entity that does not exist
    #[error("Not found: {0}")]
    NotFound(#[from] EntityNotFoundError),

    /// Storage layer failure
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// Catch-all domain failure
    #[error("Domain error: {0}")]
    Domain(String),
}

impl AppError {
    /// Stable machine-readable code for this error kind
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::NotFound(_) => "ENTITY_NOT_FOUND",
            Self::Repository(_) => "REPOSITORY_ERROR",
            Self::Domain(_) => "DOMAIN_ERROR",
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Repository(err) if err.transient)
    }

    /// Shorthand for a validation failure on a single field
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation(ValidationError::field(field, message))
    }

    /// Whether this is a validation failure
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Whether this is a not-found failure
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Whether this is a repository failure
    pub fn is_repository(&self) -> bool {
        matches!(self, Self::Repository(_))
    }
}

/// Malformed or out-of-range input, detected before any I/O
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct ValidationError {
    /// Summary message
    pub message: String,

    /// Field-level errors reported by the schema validator
    pub validation_errors: Vec<ValidationIssue>,
}

impl ValidationError {
    /// Create a validation error carrying a list of field-level issues
    pub fn new(message: impl Into<String>, validation_errors: Vec<ValidationIssue>) -> Self {
        Self {
            message: message.into(),
            validation_errors,
        }
    }

    /// Create a validation error for a single field
    pub fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        let field = field.into();
        let message = message.into();
        Self {
            message: format!("{}: {}", field, message),
            validation_errors: vec![ValidationIssue::error(field, message)],
        }
    }

    /// Names of the fields that failed
    pub fn fields(&self) -> Vec<&str> {
        self.validation_errors
            .iter()
            .map(|issue| issue.path.as_str())
            .collect()
    }
}

/// A confirmed lookup miss
#[derive(Debug, Clone, thiserror::Error)]
#[error("{entity} not found: {id}")]
pub struct EntityNotFoundError {
    /// Entity kind, e.g. "Evaluation"
    pub entity: String,

    /// Identifier that was looked up
    pub id: String,
}

impl EntityNotFoundError {
    /// Create a not-found error for an entity kind and id
    pub fn new(entity: impl Into<String>, id: impl ToString) -> Self {
        Self {
            entity: entity.into(),
            id: id.to_string(),
        }
    }
}

/// Wrapped storage fault
///
/// Always carries the operation that failed, and the original cause when one
/// exists.
#[derive(Debug, thiserror::Error)]
#[error("{operation} failed: {message}")]
pub struct RepositoryError {
    /// Repository operation name, e.g. "create_evaluation"
    pub operation: String,

    /// Human readable description of the fault
    pub message: String,

    /// Whether the underlying fault is transient
    pub transient: bool,

    /// Operation metadata (entity id, table, SQLSTATE, ...)
    pub metadata: BTreeMap<String, String>,

    /// Original cause
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl RepositoryError {
    /// Create a repository error for an operation
    pub fn new(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            message: message.into(),
            transient: false,
            metadata: BTreeMap::new(),
            source: None,
        }
    }

    /// Attach the original cause
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Mark the fault as transient
    pub fn transient(mut self, transient: bool) -> Self {
        self.transient = transient;
        self
    }

    /// Attach a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Application-wide result type
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_error_codes() {
        let err = AppError::NotFound(EntityNotFoundError::new("Evaluation", "abc"));
        assert_eq!(err.error_code(), "ENTITY_NOT_FOUND");
        assert_eq!(err.to_string(), "Not found: Evaluation not found: abc");

        let err = AppError::validation("score", "must be between 0 and 100");
        assert_eq!(err.error_code(), "VALIDATION_ERROR");
    }

    #[test]
    fn test_retryable() {
        let err = AppError::Repository(RepositoryError::new("get", "timeout").transient(true));
        assert!(err.is_retryable());

        let err = AppError::Repository(RepositoryError::new("get", "bad row"));
        assert!(!err.is_retryable());

        let err = AppError::validation("score", "bad");
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_repository_error_keeps_cause() {
        let cause = std::io::Error::new(std::io::ErrorKind::Other, "disk on fire");
        let err = RepositoryError::new("create_evaluation", "insert failed")
            .with_source(cause)
            .with_metadata("table", "evaluations");

        assert_eq!(err.metadata.get("table").map(String::as_str), Some("evaluations"));
        assert_eq!(err.source().unwrap().to_string(), "disk on fire");
    }
}
