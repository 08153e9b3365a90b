//! Repository implementations for data persistence.
//!
//! Repositories combine an [`EvaluationStore`](crate::store::EvaluationStore),
//! an [`EventBus`](crate::messaging::EventBus) and a schema validator into the
//! operations exposed to application code.

mod evaluation_repository;

pub use evaluation_repository::*;
