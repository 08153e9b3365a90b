//! Evaluation repository implementation.
//!
//! Every write validates first, runs inside a transaction and publishes its
//! lifecycle events only once the transaction has committed. Reads are
//! retried on transient storage failures.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, instrument};

use assessment_common::retry::RetryConfig;
use assessment_domain::{
    AppError, AppResult, ChallengeId, DefaultSchemaValidator, DomainEvent, EntityNotFoundError,
    Evaluation, EvaluationEventPayload, EvaluationEventType, EvaluationId, EvaluationUpdate,
    NewEvaluation, SchemaValidator, UserId,
};

use crate::error_mapper::map_error;
use crate::messaging::EventBus;
use crate::middleware::{
    publish_events, with_error_mapping, with_retry, with_transaction, with_validation,
};
use crate::rows::{EvaluationRow, RowPatch};
use crate::store::{EvaluationStore, EvaluationTransaction};

const ENTITY: &str = "Evaluation";

/// Default page size for user listings
pub const DEFAULT_PAGE_SIZE: i64 = 50;

/// Repository behaviour.
#[derive(Debug, Clone, Default)]
pub struct RepositoryConfig {
    /// Retry policy for reads
    pub read_retry: RetryConfig,
}

impl From<&assessment_common::RepositoryConfig> for RepositoryConfig {
    fn from(config: &assessment_common::RepositoryConfig) -> Self {
        Self {
            read_retry: config.read_retry.to_retry_config(),
        }
    }
}

/// Pagination for list queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FindOptions {
    pub limit: i64,
    pub offset: i64,
}

impl Default for FindOptions {
    fn default() -> Self {
        Self {
            limit: DEFAULT_PAGE_SIZE,
            offset: 0,
        }
    }
}

impl FindOptions {
    pub fn new(limit: i64, offset: i64) -> Self {
        Self { limit, offset }
    }
}

/// Persistence and event publication for evaluations.
pub struct EvaluationRepository<S: EvaluationStore> {
    store: Arc<S>,
    bus: Arc<dyn EventBus>,
    validator: Arc<dyn SchemaValidator>,
    config: RepositoryConfig,
}

impl<S: EvaluationStore> Clone for EvaluationRepository<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            bus: Arc::clone(&self.bus),
            validator: Arc::clone(&self.validator),
            config: self.config.clone(),
        }
    }
}

impl<S: EvaluationStore> std::fmt::Debug for EvaluationRepository<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvaluationRepository")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<S: EvaluationStore> EvaluationRepository<S> {
    /// Create a repository with the default schema validator.
    pub fn new(store: Arc<S>, bus: Arc<dyn EventBus>) -> Self {
        Self {
            store,
            bus,
            validator: Arc::new(DefaultSchemaValidator::new()),
            config: RepositoryConfig::default(),
        }
    }

    /// Replace the schema validator.
    pub fn with_validator(mut self, validator: Arc<dyn SchemaValidator>) -> Self {
        self.validator = validator;
        self
    }

    /// Replace the repository configuration.
    pub fn with_config(mut self, config: RepositoryConfig) -> Self {
        self.config = config;
        self
    }

    /// Validate and persist a new evaluation, then publish `evaluation_created`.
    #[instrument(skip(self, input), fields(user_id = %input.user_id, challenge_id = %input.challenge_id))]
    pub async fn create_evaluation(&self, input: NewEvaluation) -> AppResult<Evaluation> {
        const OP: &str = "create_evaluation";

        let validation = self.validator.validate_create(&input);
        with_validation(validation, "Invalid evaluation data", || async move {
            let mut evaluation = Evaluation::new(input)?;
            evaluation.record_event(EvaluationEventType::EvaluationCreated)?;
            let events = evaluation.take_domain_events();
            let row = EvaluationRow::from_entity(&evaluation).map_err(|e| map_error(OP, e))?;

            let created = with_transaction(self.store.as_ref(), self.bus.as_ref(), OP, move |tx| {
                Box::pin(async move {
                    with_error_mapping(OP, tx.insert(&row)).await?;
                    evaluation.mark_persisted();
                    Ok::<_, AppError>((evaluation, events))
                })
            })
            .await?;

            info!(evaluation_id = %created.id(), score = created.score(), "Evaluation created");
            Ok::<_, AppError>(created)
        })
        .await
    }

    /// Fetch an evaluation by id.
    ///
    /// A miss is `Ok(None)` unless `throw_if_not_found` is set, in which case
    /// it is [`AppError::NotFound`].
    #[instrument(skip(self))]
    pub async fn get_evaluation_by_id(
        &self,
        id: EvaluationId,
        throw_if_not_found: bool,
    ) -> AppResult<Option<Evaluation>> {
        const OP: &str = "get_evaluation_by_id";

        match self.fetch_row(OP, id).await? {
            Some(row) => Ok(Some(to_entity(OP, row)?)),
            None if throw_if_not_found => Err(not_found(id)),
            None => Ok(None),
        }
    }

    /// Apply a partial update and publish `evaluation_updated`.
    ///
    /// Fields absent from `update` keep their stored values. A failed
    /// publication is logged and does not fail the update.
    #[instrument(skip(self, update))]
    pub async fn update_evaluation(
        &self,
        id: EvaluationId,
        update: EvaluationUpdate,
    ) -> AppResult<Evaluation> {
        const OP: &str = "update_evaluation";

        let validation = self.validator.validate_update(&update);
        with_validation(validation, "Invalid evaluation update", || async move {
            let current = self.fetch_row(OP, id).await?.ok_or_else(|| not_found(id))?;
            let mut evaluation = to_entity(OP, current)?;
            evaluation.update(update.clone())?;

            let merged = EvaluationRow::from_entity(&evaluation).map_err(|e| map_error(OP, e))?;
            let patch = RowPatch::from_update(&update)
                .and_then(|patch| patch.with_derived(&merged))
                .map_err(|e| map_error(OP, e))?;
            debug!(columns = patch.len(), "Writing evaluation patch");

            let row = with_error_mapping(OP, self.store.update(id, &patch))
                .await?
                .ok_or_else(|| not_found(id))?;
            let updated = to_entity(OP, row)?;

            let event = updated
                .event_payload()
                .into_event(EvaluationEventType::EvaluationUpdated);
            publish_events(self.bus.as_ref(), OP, std::slice::from_ref(&event)).await;

            info!(evaluation_id = %id, "Evaluation updated");
            Ok::<_, AppError>(updated)
        })
        .await
    }

    /// Delete an evaluation and publish `evaluation_deleted`.
    #[instrument(skip(self))]
    pub async fn delete_evaluation(&self, id: EvaluationId) -> AppResult<()> {
        const OP: &str = "delete_evaluation";

        with_transaction(self.store.as_ref(), self.bus.as_ref(), OP, move |tx| {
            Box::pin(async move {
                let row = with_error_mapping(OP, tx.find_by_id(id))
                    .await?
                    .ok_or_else(|| not_found(id))?;
                if !with_error_mapping(OP, tx.delete(id)).await? {
                    return Err(not_found(id));
                }
                Ok(((), vec![deleted_event(row)]))
            })
        })
        .await?;

        info!(evaluation_id = %id, "Evaluation deleted");
        Ok(())
    }

    /// Evaluations of a user, newest first.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn find_evaluations_for_user(
        &self,
        user_id: &UserId,
        options: FindOptions,
    ) -> AppResult<Vec<Evaluation>> {
        const OP: &str = "find_evaluations_for_user";

        let limit = options.limit.max(0);
        let offset = options.offset.max(0);
        let rows = with_retry(&self.config.read_retry, OP, || {
            with_error_mapping(OP, self.store.find_by_user(user_id, limit, offset))
        })
        .await?;

        to_entities(OP, rows)
    }

    /// Evaluations of a challenge, newest first, optionally for one user.
    #[instrument(skip(self), fields(challenge_id = %challenge_id))]
    pub async fn find_evaluations_for_challenge(
        &self,
        challenge_id: &ChallengeId,
        user_id: Option<&UserId>,
    ) -> AppResult<Vec<Evaluation>> {
        const OP: &str = "find_evaluations_for_challenge";

        let rows = with_retry(&self.config.read_retry, OP, || {
            with_error_mapping(OP, self.store.find_by_challenge(challenge_id, user_id))
        })
        .await?;

        to_entities(OP, rows)
    }

    /// The most recent evaluation of a user for a challenge.
    pub async fn find_by_user_and_challenge(
        &self,
        user_id: &UserId,
        challenge_id: &ChallengeId,
    ) -> AppResult<Option<Evaluation>> {
        let evaluations = self
            .find_evaluations_for_challenge(challenge_id, Some(user_id))
            .await?;
        Ok(evaluations.into_iter().next())
    }

    /// Insert or update an evaluation built in memory.
    ///
    /// Events staged on the entity are taken once the row is built and
    /// published after commit, followed by `evaluation_created` or
    /// `evaluation_updated`. A rejection before the transaction leaves them
    /// staged; if the transaction fails they are discarded.
    #[instrument(skip(self, evaluation), fields(evaluation_id = %evaluation.id()))]
    pub async fn save_evaluation(&self, evaluation: &mut Evaluation) -> AppResult<()> {
        const OP: &str = "save_evaluation";

        let validation = self.validator.validate_entity(evaluation);
        with_validation(validation, "Invalid evaluation", || async move {
            let id = evaluation.id();
            let row = EvaluationRow::from_entity(evaluation).map_err(|e| map_error(OP, e))?;
            let mut events = evaluation.take_domain_events();

            if evaluation.is_persisted() {
                events.push(
                    evaluation
                        .event_payload()
                        .into_event(EvaluationEventType::EvaluationUpdated),
                );
                with_transaction(self.store.as_ref(), self.bus.as_ref(), OP, move |tx| {
                    Box::pin(async move {
                        if with_error_mapping(OP, tx.find_by_id(id)).await?.is_none() {
                            return Err(not_found(id));
                        }
                        if !with_error_mapping(OP, tx.update(&row)).await? {
                            return Err(not_found(id));
                        }
                        Ok(((), events))
                    })
                })
                .await?;
                info!("Evaluation saved (update)");
            } else {
                events.push(
                    evaluation
                        .event_payload()
                        .into_event(EvaluationEventType::EvaluationCreated),
                );
                with_transaction(self.store.as_ref(), self.bus.as_ref(), OP, move |tx| {
                    Box::pin(async move {
                        with_error_mapping(OP, tx.insert(&row)).await?;
                        Ok::<_, AppError>(((), events))
                    })
                })
                .await?;
                evaluation.mark_persisted();
                info!("Evaluation saved (insert)");
            }
            Ok::<_, AppError>(())
        })
        .await
    }

    async fn fetch_row(&self, op: &'static str, id: EvaluationId) -> AppResult<Option<EvaluationRow>> {
        with_retry(&self.config.read_retry, op, || {
            with_error_mapping(op, self.store.find_by_id(id))
        })
        .await
    }
}

fn not_found(id: EvaluationId) -> AppError {
    EntityNotFoundError::new(ENTITY, id).into()
}

fn to_entity(op: &str, row: EvaluationRow) -> AppResult<Evaluation> {
    row.into_entity().map_err(|e| map_error(op, e))
}

fn to_entities(op: &str, rows: Vec<EvaluationRow>) -> AppResult<Vec<Evaluation>> {
    rows.into_iter().map(|row| to_entity(op, row)).collect()
}

/// Built from the row so that rows which no longer decode can still be deleted
fn deleted_event(row: EvaluationRow) -> DomainEvent {
    EvaluationEventPayload {
        evaluation_id: EvaluationId::from_uuid(row.id),
        user_id: UserId::new(row.user_id),
        challenge_id: ChallengeId::new(row.challenge_id),
        score: row.score,
        timestamp: Utc::now(),
        performance_level: None,
    }
    .into_event(EvaluationEventType::EvaluationDeleted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_options_default() {
        let options = FindOptions::default();
        assert_eq!(options.limit, 50);
        assert_eq!(options.offset, 0);
    }

    #[test]
    fn test_repository_config_from_settings() {
        let settings = assessment_common::RepositoryConfig::default();
        let config = RepositoryConfig::from(&settings);
        assert_eq!(config.read_retry.max_attempts, 3);
    }

    #[test]
    fn test_deleted_event_payload() {
        let id = EvaluationId::new();
        let row = EvaluationRow {
            id: *id.as_uuid(),
            user_id: "user-1".to_string(),
            challenge_id: "challenge-1".to_string(),
            score: 72.0,
            category_scores: serde_json::json!({}),
            overall_feedback: String::new(),
            strengths: serde_json::json!([]),
            strength_analysis: serde_json::json!([]),
            areas_for_improvement: serde_json::json!([]),
            improvement_plans: serde_json::json!([]),
            next_steps: String::new(),
            recommended_resources: serde_json::json!([]),
            recommended_challenges: serde_json::json!([]),
            user_context: None,
            challenge_context: None,
            growth_metrics: serde_json::json!({}),
            relevant_categories: serde_json::json!([]),
            response_id: None,
            thread_id: None,
            metadata: serde_json::json!({}),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let event = deleted_event(row);
        assert_eq!(event.event_type, "evaluation_deleted");
        assert_eq!(event.aggregate_id, id.to_string());
        assert_eq!(event.payload["evaluationId"], serde_json::json!(id.to_string()));
        assert_eq!(event.payload["userId"], "user-1");
        assert_eq!(event.payload["score"], 72.0);
    }
}
