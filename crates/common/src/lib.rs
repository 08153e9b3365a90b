//! Shared utilities for the evaluation service.
//!
//! - Configuration management
//! - Structured logging setup
//! - Retry logic with backoff

pub mod config;
pub mod retry;
pub mod telemetry;

pub use config::{AppConfig, DatabaseConfig, RedisConfig, RepositoryConfig, RetrySettings, TelemetryConfig};
pub use retry::{retry_with_predicate, RetryConfig};
pub use telemetry::init_tracing;

/// Common error type used throughout the crate
pub type Result<T> = std::result::Result<T, anyhow::Error>;
