//! Test database setup for integration tests against PostgreSQL.
//!
//! Tests using [`TestDatabase`] are `#[ignore]`d by default and read the
//! connection string from `TEST_DATABASE_URL`.

use assessment_infrastructure::{DatabaseConfig, DatabasePool};
use sqlx::PgPool;

/// Environment variable holding the test database URL
pub const TEST_DATABASE_URL: &str = "TEST_DATABASE_URL";

/// Migrated test database with table cleanup
pub struct TestDatabase {
    pool: DatabasePool,
}

impl TestDatabase {
    /// Connect using `TEST_DATABASE_URL`
    pub async fn from_env() -> anyhow::Result<Self> {
        let url = std::env::var(TEST_DATABASE_URL)
            .map_err(|_| anyhow::anyhow!("{} is not set", TEST_DATABASE_URL))?;
        Self::new_with_url(&url).await
    }

    /// Connect and apply the evaluation migrations
    pub async fn new_with_url(connection_string: &str) -> anyhow::Result<Self> {
        let config = DatabaseConfig::test_config(connection_string.to_string());
        let pool = DatabasePool::connect(&config).await?;
        Ok(Self { pool })
    }

    /// Get a reference to the database pool
    pub fn pool(&self) -> &PgPool {
        self.pool.pool()
    }

    pub fn database(&self) -> &DatabasePool {
        &self.pool
    }

    /// Remove all evaluations for test isolation
    pub async fn clean(&self) -> anyhow::Result<()> {
        sqlx::query("TRUNCATE TABLE evaluations")
            .execute(self.pool())
            .await?;
        Ok(())
    }
}
