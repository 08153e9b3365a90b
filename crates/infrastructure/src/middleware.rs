//! Composable wrappers for repository operations.
//!
//! Each repository method is assembled from these at the call site, keeping the
//! order validate, transaction, persist, commit, publish.

use assessment_common::retry::{retry_with_predicate, RetryConfig};
use assessment_domain::{AppError, AppResult, DomainEvent, ValidationResult};
use futures::future::BoxFuture;
use std::future::Future;
use tracing::{debug, warn};

use crate::error_mapper::map_error;
use crate::messaging::EventBus;
use crate::store::{EvaluationStore, EvaluationTransaction};

/// Run `work` only if `result` carries no errors.
///
/// Validation failure becomes [`AppError::Validation`] and `work` is never
/// called.
pub async fn with_validation<T, F, Fut>(
    result: ValidationResult,
    message: &str,
    work: F,
) -> AppResult<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    for warning in &result.warnings {
        debug!(path = %warning.path, message = %warning.message, "Validation warning");
    }
    result.into_result(message)?;
    work().await
}

/// Retry `op` while it fails with a retryable error.
pub async fn with_retry<T, F, Fut>(config: &RetryConfig, operation: &str, op: F) -> AppResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    retry_with_predicate(config.clone(), op, |err: &AppError| {
        let retryable = err.is_retryable();
        if retryable {
            warn!(operation, error = %err, "Transient storage failure");
        }
        retryable
    })
    .await
}

/// Await a storage call, translating its error.
pub async fn with_error_mapping<T, Fut>(operation: &str, fut: Fut) -> AppResult<T>
where
    Fut: Future<Output = crate::Result<T>>,
{
    fut.await.map_err(|err| map_error(operation, err))
}

/// Run `work` inside a transaction and publish its events after commit.
///
/// `work` returns its value together with the events to publish. If it fails
/// the transaction is rolled back and no event is published. Publication
/// failures after a successful commit are logged and do not fail the call.
pub async fn with_transaction<S, T, F>(
    store: &S,
    bus: &dyn EventBus,
    operation: &str,
    work: F,
) -> AppResult<T>
where
    S: EvaluationStore + ?Sized,
    F: for<'t> FnOnce(&'t mut S::Tx) -> BoxFuture<'t, AppResult<(T, Vec<DomainEvent>)>>,
{
    let mut tx = with_error_mapping(operation, store.begin()).await?;

    let (value, events) = match work(&mut tx).await {
        Ok(outcome) => outcome,
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!(operation, error = %rollback_err, "Rollback failed");
            }
            debug!(operation, error = %err, "Transaction rolled back");
            return Err(err);
        }
    };

    with_error_mapping(operation, tx.commit()).await?;
    publish_events(bus, operation, &events).await;

    Ok(value)
}

/// Publish committed events in order, logging failures.
pub async fn publish_events(bus: &dyn EventBus, operation: &str, events: &[DomainEvent]) {
    for event in events {
        if let Err(err) = bus.publish(event).await {
            warn!(
                operation,
                event_type = %event.event_type,
                aggregate_id = %event.aggregate_id,
                error = %err,
                "Failed to publish event"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::InMemoryEventBus;
    use assessment_domain::RepositoryError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn fast_retry(attempts: u32) -> RetryConfig {
        RetryConfig::linear(attempts, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_validation_failure_skips_work() {
        let called = AtomicU32::new(0);
        let result = with_validation(
            ValidationResult::error("score", "out of range"),
            "Invalid evaluation data",
            || async {
                called.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
        )
        .await;

        assert!(result.unwrap_err().is_validation());
        assert_eq!(called.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_validation_warnings_do_not_block() {
        let mut result = ValidationResult::success();
        result.add_warning("overallFeedback", "empty");

        let value = with_validation(result, "Invalid evaluation data", || async { Ok(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_retry_stops_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: AppResult<()> = with_retry(&fast_retry(3), "get_evaluation_by_id", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(RepositoryError::new("get_evaluation_by_id", "connection reset")
                .transient(true)
                .into())
        })
        .await;

        assert!(result.unwrap_err().is_repository());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_does_not_repeat_permanent_errors() {
        let calls = AtomicU32::new(0);
        let result: AppResult<()> = with_retry(&fast_retry(3), "get_evaluation_by_id", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(AppError::validation("id", "malformed"))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_recovers() {
        let calls = AtomicU32::new(0);
        let value = with_retry(&fast_retry(3), "find_evaluations_for_user", || async {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(RepositoryError::new("find", "timeout").transient(true).into())
            } else {
                Ok("rows")
            }
        })
        .await
        .unwrap();

        assert_eq!(value, "rows");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_error_mapping_translates() {
        let result: AppResult<()> = with_error_mapping("delete_evaluation", async {
            Err(crate::Error::NotFound("missing".to_string()))
        })
        .await;
        assert!(result.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_publish_events_in_order() {
        let bus = InMemoryEventBus::new();
        let mut receiver = bus.subscribe();
        let events = vec![
            DomainEvent::new("evaluation_created", "a", serde_json::Value::Null),
            DomainEvent::new("evaluation_updated", "a", serde_json::Value::Null),
        ];

        publish_events(&bus, "save_evaluation", &events).await;

        assert_eq!(receiver.recv().await.unwrap().event_type, "evaluation_created");
        assert_eq!(receiver.recv().await.unwrap().event_type, "evaluation_updated");
    }
}
