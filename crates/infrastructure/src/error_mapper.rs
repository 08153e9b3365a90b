//! Translation of infrastructure errors into the domain error taxonomy.

use assessment_domain::{AppError, EntityNotFoundError, RepositoryError, ValidationError, ValidationIssue};
use sqlx::postgres::PgDatabaseError;

use crate::rows::{to_entity_field, EVALUATIONS_TABLE};
use crate::Error;

/// SQLSTATE for `check_violation`
const CHECK_VIOLATION: &str = "23514";

/// SQLSTATE for `not_null_violation`
const NOT_NULL_VIOLATION: &str = "23502";

const ENTITY: &str = "Evaluation";

/// Map an infrastructure error raised by `operation` to an [`AppError`].
///
/// Constraint violations that describe bad input become validation errors;
/// bus and configuration faults become domain errors; everything else is a
/// [`RepositoryError`] carrying the original cause.
pub fn map_error(operation: &str, err: Error) -> AppError {
    match err {
        Error::NotFound(id) => EntityNotFoundError::new(ENTITY, id).into(),
        Error::Configuration(message) => {
            AppError::Domain(format!("{} failed: configuration: {}", operation, message))
        }
        Error::Messaging(message) => {
            AppError::Domain(format!("{} failed: messaging: {}", operation, message))
        }
        Error::Redis(e) => AppError::Domain(format!("{} failed: event bus: {}", operation, e)),
        Error::Database(sqlx::Error::Database(db)) if is_constraint_violation(db.code()) => {
            constraint_violation(db.as_ref()).into()
        }
        other => repository_error(operation, other).into(),
    }
}

fn is_constraint_violation(code: Option<std::borrow::Cow<'_, str>>) -> bool {
    matches!(code.as_deref(), Some(CHECK_VIOLATION) | Some(NOT_NULL_VIOLATION))
}

fn constraint_violation(db: &dyn sqlx::error::DatabaseError) -> ValidationError {
    let column = db
        .try_downcast_ref::<PgDatabaseError>()
        .and_then(PgDatabaseError::column)
        .map(str::to_string)
        .or_else(|| db.constraint().and_then(column_from_constraint));

    let path = column
        .as_deref()
        .map(|c| to_entity_field(c).map(str::to_string).unwrap_or_else(|| c.to_string()))
        .unwrap_or_else(|| "evaluation".to_string());

    ValidationError::new(
        "Evaluation violates a storage constraint",
        vec![ValidationIssue::error(path, db.message())],
    )
}

/// `evaluations_score_check` -> `score`
fn column_from_constraint(constraint: &str) -> Option<String> {
    constraint
        .strip_prefix(EVALUATIONS_TABLE)
        .and_then(|rest| rest.strip_prefix('_'))
        .and_then(|rest| rest.strip_suffix("_check"))
        .map(str::to_string)
}

fn repository_error(operation: &str, err: Error) -> RepositoryError {
    let mut mapped = RepositoryError::new(operation, err.to_string())
        .transient(err.is_retryable())
        .with_metadata("kind", err.kind());

    if let Error::Database(sqlx::Error::Database(db)) = &err {
        if let Some(code) = db.code() {
            mapped = mapped.with_metadata("sqlstate", code);
        }
        if let Some(table) = db.table() {
            mapped = mapped.with_metadata("table", table);
        }
        if let Some(constraint) = db.constraint() {
            mapped = mapped.with_metadata("constraint", constraint);
        }
    }

    mapped.with_source(err)
}
