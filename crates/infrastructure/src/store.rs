//! Storage abstraction for evaluations.
//!
//! [`EvaluationStore`] covers reads and the non-transactional partial update;
//! every other write goes through an [`EvaluationTransaction`] obtained from
//! [`EvaluationStore::begin`]. A transaction that is dropped without
//! [`commit`](EvaluationTransaction::commit) is rolled back.

use assessment_domain::{ChallengeId, EvaluationId, UserId};
use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{debug, instrument};

use crate::rows::{column_list, EvaluationRow, RowPatch, EVALUATIONS_TABLE};
use crate::{Error, Result};

/// Persistent storage for evaluation rows
#[async_trait]
pub trait EvaluationStore: Send + Sync {
    /// Transaction handle type
    type Tx: EvaluationTransaction + Send;

    /// Open a transaction
    async fn begin(&self) -> Result<Self::Tx>;

    async fn find_by_id(&self, id: EvaluationId) -> Result<Option<EvaluationRow>>;

    /// Evaluations of a user, newest first
    async fn find_by_user(
        &self,
        user_id: &UserId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<EvaluationRow>>;

    /// Evaluations of a challenge, optionally for one user, newest first
    async fn find_by_challenge(
        &self,
        challenge_id: &ChallengeId,
        user_id: Option<&UserId>,
    ) -> Result<Vec<EvaluationRow>>;

    /// Write the columns in `patch`, returning the updated row
    ///
    /// Returns `None` when no row has the given id.
    async fn update(&self, id: EvaluationId, patch: &RowPatch) -> Result<Option<EvaluationRow>>;
}

/// Unit of work over the evaluations table
#[async_trait]
pub trait EvaluationTransaction: Send {
    async fn insert(&mut self, row: &EvaluationRow) -> Result<()>;

    /// Replace every mutable column; `false` if the row does not exist
    async fn update(&mut self, row: &EvaluationRow) -> Result<bool>;

    /// `false` if the row does not exist
    async fn delete(&mut self, id: EvaluationId) -> Result<bool>;

    async fn find_by_id(&mut self, id: EvaluationId) -> Result<Option<EvaluationRow>>;

    async fn commit(self) -> Result<()>;

    async fn rollback(self) -> Result<()>;
}

/// PostgreSQL implementation of [`EvaluationStore`]
#[derive(Clone)]
pub struct PgEvaluationStore {
    pool: PgPool,
}

impl PgEvaluationStore {
    /// Create a new PostgreSQL evaluation store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl std::fmt::Debug for PgEvaluationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgEvaluationStore")
            .field("pool_size", &self.pool.size())
            .finish()
    }
}

#[async_trait]
impl EvaluationStore for PgEvaluationStore {
    type Tx = PgEvaluationTransaction;

    #[instrument(skip(self))]
    async fn begin(&self) -> Result<Self::Tx> {
        debug!("Beginning evaluation transaction");
        let tx = self.pool.begin().await.map_err(Error::Database)?;
        Ok(PgEvaluationTransaction { tx })
    }

    #[instrument(skip(self))]
    async fn find_by_id(&self, id: EvaluationId) -> Result<Option<EvaluationRow>> {
        let query = format!(
            "SELECT {} FROM {} WHERE id = $1",
            column_list(),
            EVALUATIONS_TABLE
        );
        sqlx::query_as::<_, EvaluationRow>(&query)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)
    }

    #[instrument(skip(self), fields(user_id = %user_id))]
    async fn find_by_user(
        &self,
        user_id: &UserId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<EvaluationRow>> {
        let query = format!(
            r#"
            SELECT {} FROM {}
            WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "#,
            column_list(),
            EVALUATIONS_TABLE
        );
        let rows = sqlx::query_as::<_, EvaluationRow>(&query)
            .bind(user_id.as_str())
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        debug!(count = rows.len(), "Fetched evaluations for user");
        Ok(rows)
    }

    #[instrument(skip(self), fields(challenge_id = %challenge_id))]
    async fn find_by_challenge(
        &self,
        challenge_id: &ChallengeId,
        user_id: Option<&UserId>,
    ) -> Result<Vec<EvaluationRow>> {
        let query = format!(
            r#"
            SELECT {} FROM {}
            WHERE challenge_id = $1 AND ($2::text IS NULL OR user_id = $2)
            ORDER BY created_at DESC, id DESC
            "#,
            column_list(),
            EVALUATIONS_TABLE
        );
        sqlx::query_as::<_, EvaluationRow>(&query)
            .bind(challenge_id.as_str())
            .bind(user_id.map(UserId::as_str))
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)
    }

    #[instrument(skip(self, patch), fields(columns = patch.len()))]
    async fn update(&self, id: EvaluationId, patch: &RowPatch) -> Result<Option<EvaluationRow>> {
        if patch.is_empty() {
            return self.find_by_id(id).await;
        }

        // Column names come from the static mapping table, never from input.
        let assignments = patch
            .columns()
            .map(|column| format!("{column} = p.{column}"))
            .collect::<Vec<_>>()
            .join(", ");
        let returning = crate::rows::columns()
            .map(|column| format!("e.{}", column))
            .collect::<Vec<_>>()
            .join(", ");
        let query = format!(
            r#"
            UPDATE {table} AS e SET {assignments}
            FROM jsonb_populate_record(NULL::{table}, $2) AS p
            WHERE e.id = $1
            RETURNING {returning}
            "#,
            table = EVALUATIONS_TABLE,
            assignments = assignments,
            returning = returning,
        );

        sqlx::query_as::<_, EvaluationRow>(&query)
            .bind(id.as_uuid())
            .bind(patch.to_json())
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)
    }
}

/// PostgreSQL transaction over the evaluations table
pub struct PgEvaluationTransaction {
    tx: Transaction<'static, Postgres>,
}

impl std::fmt::Debug for PgEvaluationTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgEvaluationTransaction").finish_non_exhaustive()
    }
}

#[async_trait]
impl EvaluationTransaction for PgEvaluationTransaction {
    #[instrument(skip(self, row), fields(evaluation_id = %row.id))]
    async fn insert(&mut self, row: &EvaluationRow) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO evaluations (
                id, user_id, challenge_id, score, category_scores,
                overall_feedback, strengths, strength_analysis,
                areas_for_improvement, improvement_plans, next_steps,
                recommended_resources, recommended_challenges,
                user_context, challenge_context, growth_metrics,
                relevant_categories, response_id, thread_id, metadata,
                created_at, updated_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11,
                $12, $13, $14, $15, $16, $17, $18, $19, $20, $21, $22
            )
            "#,
        )
        .bind(row.id)
        .bind(&row.user_id)
        .bind(&row.challenge_id)
        .bind(row.score)
        .bind(&row.category_scores)
        .bind(&row.overall_feedback)
        .bind(&row.strengths)
        .bind(&row.strength_analysis)
        .bind(&row.areas_for_improvement)
        .bind(&row.improvement_plans)
        .bind(&row.next_steps)
        .bind(&row.recommended_resources)
        .bind(&row.recommended_challenges)
        .bind(&row.user_context)
        .bind(&row.challenge_context)
        .bind(&row.growth_metrics)
        .bind(&row.relevant_categories)
        .bind(&row.response_id)
        .bind(&row.thread_id)
        .bind(&row.metadata)
        .bind(row.created_at)
        .bind(row.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(Error::Database)?;

        debug!("Evaluation inserted");
        Ok(())
    }

    #[instrument(skip(self, row), fields(evaluation_id = %row.id))]
    async fn update(&mut self, row: &EvaluationRow) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE evaluations SET
                score = $2,
                category_scores = $3,
                overall_feedback = $4,
                strengths = $5,
                strength_analysis = $6,
                areas_for_improvement = $7,
                improvement_plans = $8,
                next_steps = $9,
                recommended_resources = $10,
                recommended_challenges = $11,
                user_context = $12,
                challenge_context = $13,
                growth_metrics = $14,
                relevant_categories = $15,
                response_id = $16,
                thread_id = $17,
                metadata = $18,
                updated_at = $19
            WHERE id = $1
            "#,
        )
        .bind(row.id)
        .bind(row.score)
        .bind(&row.category_scores)
        .bind(&row.overall_feedback)
        .bind(&row.strengths)
        .bind(&row.strength_analysis)
        .bind(&row.areas_for_improvement)
        .bind(&row.improvement_plans)
        .bind(&row.next_steps)
        .bind(&row.recommended_resources)
        .bind(&row.recommended_challenges)
        .bind(&row.user_context)
        .bind(&row.challenge_context)
        .bind(&row.growth_metrics)
        .bind(&row.relevant_categories)
        .bind(&row.response_id)
        .bind(&row.thread_id)
        .bind(&row.metadata)
        .bind(row.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(Error::Database)?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn delete(&mut self, id: EvaluationId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM evaluations WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(Error::Database)?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn find_by_id(&mut self, id: EvaluationId) -> Result<Option<EvaluationRow>> {
        let query = format!(
            "SELECT {} FROM {} WHERE id = $1 FOR UPDATE",
            column_list(),
            EVALUATIONS_TABLE
        );
        sqlx::query_as::<_, EvaluationRow>(&query)
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(Error::Database)
    }

    async fn commit(self) -> Result<()> {
        self.tx.commit().await.map_err(Error::Database)
    }

    async fn rollback(self) -> Result<()> {
        self.tx.rollback().await.map_err(Error::Database)
    }
}
