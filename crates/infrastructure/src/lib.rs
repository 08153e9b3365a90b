//! Infrastructure layer for the evaluation core
//!
//! This crate provides implementations for:
//! - Database access (PostgreSQL with sqlx)
//! - Row mapping between storage columns and the evaluation aggregate
//! - Event publication (Redis pub/sub and in-process broadcast)
//! - The evaluation repository and the middleware it is composed from
//!
//! ## Usage
//!
//! ```rust,ignore
//! use assessment_infrastructure::{
//!     database::{DatabaseConfig, DatabasePool},
//!     messaging::{MessagingConfig, RedisEventBus},
//!     repositories::{EvaluationRepository, RepositoryConfig},
//!     store::PgEvaluationStore,
//! };
//!
//! let pool = DatabasePool::connect(&DatabaseConfig::from_env()?).await?;
//! let bus = RedisEventBus::new(MessagingConfig::from_env()?).await?;
//!
//! let repository = EvaluationRepository::new(
//!     std::sync::Arc::new(PgEvaluationStore::new(pool.pool().clone())),
//!     std::sync::Arc::new(bus),
//! );
//! ```

pub mod database;
pub mod error_mapper;
pub mod messaging;
pub mod middleware;
pub mod repositories;
pub mod rows;
pub mod store;

pub use database::{DatabaseConfig, DatabasePool};
pub use error_mapper::map_error;
pub use messaging::{EventBus, InMemoryEventBus, MessagingConfig, RedisEventBus};
pub use repositories::{EvaluationRepository, FindOptions, RepositoryConfig};
pub use rows::{EvaluationRow, RowPatch, FIELD_MAPPINGS};
pub use store::{EvaluationStore, EvaluationTransaction, PgEvaluationStore, PgEvaluationTransaction};

pub type Result<T> = std::result::Result<T, Error>;

/// Infrastructure-level errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Database errors from sqlx
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Redis errors from the event bus
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Messaging errors
    #[error("Messaging error: {0}")]
    Messaging(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Resource not found errors
    #[error("Not found: {0}")]
    NotFound(String),

    /// A stored row could not be turned back into an evaluation
    #[error("Invalid row: {0}")]
    InvalidRow(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// SQLSTATE classes that describe transient conditions
const TRANSIENT_SQLSTATE_PREFIXES: &[&str] = &["08", "40", "53", "57P"];

impl Error {
    /// Check if the error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Database(err) => is_transient_sqlx(err),
            Error::Redis(err) => err.is_timeout() || err.is_connection_dropped(),
            _ => false,
        }
    }

    /// Short machine-readable name of the variant
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Database(_) => "database",
            Error::Redis(_) => "redis",
            Error::Messaging(_) => "messaging",
            Error::Serialization(_) => "serialization",
            Error::NotFound(_) => "not_found",
            Error::InvalidRow(_) => "invalid_row",
            Error::Configuration(_) => "configuration",
        }
    }
}

fn is_transient_sqlx(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => true,
        sqlx::Error::Database(db) => db
            .code()
            .map(|code| {
                TRANSIENT_SQLSTATE_PREFIXES
                    .iter()
                    .any(|prefix| code.starts_with(prefix))
            })
            .unwrap_or(false),
        _ => false,
    }
}
