//! Validation results collected by the schema validator and the entity.
//!
//! Validators report every problem they find instead of stopping at the
//! first one. A result becomes a [`ValidationError`] at the repository
//! boundary; warnings are logged and never block a write.

use crate::errors::ValidationError;
use serde::{Deserialize, Serialize};

/// Issues found while validating one input
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationResult {
    /// False once any error has been recorded
    pub valid: bool,
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationResult {
    pub fn success() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// A failed result with one error at `path`
    pub fn error(path: impl Into<String>, message: impl Into<String>) -> Self {
        let mut result = Self::success();
        result.add_error(path, message);
        result
    }

    pub fn add_error(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.valid = false;
        self.errors.push(ValidationIssue::new(path, message, IssueSeverity::Error));
    }

    pub fn add_warning(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.warnings
            .push(ValidationIssue::new(path, message, IssueSeverity::Warning));
    }

    /// Fold another result's issues into this one
    pub fn merge(&mut self, other: ValidationResult) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
        self.valid = self.errors.is_empty();
    }

    /// `Err` carrying every recorded error, `Ok` when there are none
    pub fn into_result(self, message: impl Into<String>) -> Result<(), ValidationError> {
        if self.valid {
            Ok(())
        } else {
            Err(ValidationError::new(message, self.errors))
        }
    }
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::success()
    }
}

/// One problem with one field
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationIssue {
    /// camelCase field path, e.g. `categoryScores.clarity` or
    /// `improvementPlans[0].area`
    pub path: String,
    pub message: String,
    pub severity: IssueSeverity,
}

impl ValidationIssue {
    pub fn new(path: impl Into<String>, message: impl Into<String>, severity: IssueSeverity) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            severity,
        }
    }

    pub fn error(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(path, message, IssueSeverity::Error)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    Error,
    Warning,
}

/// Path of a map entry, e.g. `categoryScores.clarity`
pub fn key_path(field: &str, key: &str) -> String {
    format!("{}.{}", field, key)
}

/// Path of a field inside a list element, e.g. `improvementPlans[0].area`
pub fn index_path(field: &str, index: usize, member: &str) -> String {
    format!("{}[{}].{}", field, index, member)
}
