//! Configuration management for the evaluation service.
//!
//! Settings are layered from configuration files and environment variables.
//!
//! ## Example Configuration
//!
//! ```toml
//! [database]
//! url = "postgres://localhost:5432/assessment"
//! pool_size = 10
//!
//! [redis]
//! url = "redis://localhost:6379"
//! channel_prefix = "assessment"
//!
//! [repository.read_retry]
//! max_attempts = 3
//! initial_delay_ms = 100
//!
//! [telemetry]
//! json_logging = true
//! log_level = "info"
//! ```

use crate::retry::RetryConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    #[serde(default)]
    pub repository: RepositoryConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database connection URL
    pub url: String,

    /// Connection pool size
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_db_timeout")]
    pub timeout_seconds: u64,

    /// Apply the evaluations schema on startup
    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

/// Redis configuration for the event bus
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL
    pub url: String,

    /// Prefix for event channels
    #[serde(default = "default_channel_prefix")]
    pub channel_prefix: String,
}

/// Repository behaviour
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// Retry policy for idempotent reads
    #[serde(default)]
    pub read_retry: RetrySettings,
}

/// Serializable form of [`RetryConfig`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Total number of attempts, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

impl RetrySettings {
    /// Build the runtime retry policy
    pub fn to_retry_config(&self) -> RetryConfig {
        RetryConfig::new(self.max_attempts, Duration::from_millis(self.initial_delay_ms))
            .with_max_delay(Duration::from_millis(self.max_delay_ms))
            .with_backoff_multiplier(self.backoff_multiplier)
    }
}

/// Telemetry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Enable JSON logging format
    #[serde(default)]
    pub json_logging: bool,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            json_logging: false,
            log_level: default_log_level(),
        }
    }
}

// Default value functions
fn default_pool_size() -> u32 {
    10
}

fn default_db_timeout() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

fn default_channel_prefix() -> String {
    "assessment".to_string()
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    100
}

fn default_max_delay_ms() -> u64 {
    2_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_service_name() -> String {
    "evaluation-core".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from configuration files and the environment.
    ///
    /// Later sources override earlier ones:
    /// 1. config/default.toml (if exists)
    /// 2. config/{environment}.toml (if exists, where environment is from APP_ENV)
    /// 3. Environment variables prefixed with APP, e.g. `APP_DATABASE__URL`
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use assessment_common::config::AppConfig;
    ///
    /// let config = AppConfig::load().expect("Failed to load configuration");
    /// println!("Connecting to {}", config.database.url);
    /// ```
    pub fn load() -> Result<Self> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{}", env)).required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let app_config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        app_config.validate()?;

        Ok(app_config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.database.url.is_empty() {
            anyhow::bail!("Database URL is required");
        }

        if self.database.pool_size == 0 {
            anyhow::bail!("Database pool size must be greater than 0");
        }

        if self.database.timeout_seconds == 0 {
            anyhow::bail!("Database timeout must be greater than 0");
        }

        if self.redis.url.is_empty() {
            anyhow::bail!("Redis URL is required");
        }

        let retry = &self.repository.read_retry;
        if retry.max_attempts == 0 {
            anyhow::bail!("Read retry must allow at least one attempt");
        }

        if retry.backoff_multiplier < 1.0 {
            anyhow::bail!("Backoff multiplier must be at least 1.0");
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.telemetry.log_level.as_str()) {
            anyhow::bail!(
                "Invalid log level '{}'. Must be one of: {}",
                self.telemetry.log_level,
                valid_log_levels.join(", ")
            );
        }

        Ok(())
    }

    /// Get the database connection timeout as a Duration
    pub fn database_timeout(&self) -> Duration {
        Duration::from_secs(self.database.timeout_seconds)
    }

    /// Create a development configuration with sensible defaults
    pub fn development() -> Self {
        Self {
            database: DatabaseConfig {
                url: "postgres://localhost:5432/assessment_dev".to_string(),
                pool_size: 5,
                timeout_seconds: 30,
                run_migrations: true,
            },
            redis: RedisConfig {
                url: "redis://localhost:6379".to_string(),
                channel_prefix: default_channel_prefix(),
            },
            repository: RepositoryConfig::default(),
            telemetry: TelemetryConfig {
                service_name: "evaluation-core-dev".to_string(),
                json_logging: false,
                log_level: "debug".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_validation() {
        let mut config = AppConfig::development();
        assert!(config.validate().is_ok());

        config.database.url = String::new();
        assert!(config.validate().is_err());
        config.database.url = "postgres://localhost/test".to_string();

        config.repository.read_retry.max_attempts = 0;
        assert!(config.validate().is_err());
        config.repository.read_retry.max_attempts = 3;

        config.telemetry.log_level = "invalid".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_retry_settings_convert() {
        let retry = RetrySettings::default().to_retry_config();
        assert_eq!(retry.max_attempts, 3);
        assert_eq!(retry.initial_delay, Duration::from_millis(100));
        assert_eq!(retry.max_delay, Duration::from_millis(2_000));
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let config: AppConfig = config::Config::builder()
            .add_source(config::File::from_str(
                r#"
                [database]
                url = "postgres://db/assessment"

                [redis]
                url = "redis://cache"
                "#,
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.database.pool_size, 10);
        assert!(config.database.run_migrations);
        assert_eq!(config.redis.channel_prefix, "assessment");
        assert_eq!(config.repository.read_retry.max_attempts, 3);
        assert_eq!(config.telemetry.log_level, "info");
        assert!(config.validate().is_ok());
    }
}
