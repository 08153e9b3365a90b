//! Assessment Domain Types
//!
//! This crate provides the core domain model for scoring evaluations: the
//! [`Evaluation`] aggregate, the metrics engine that derives analytics from
//! its scores, domain events, schema validation and the error taxonomy shared
//! with the persistence layer.
//!
//! ## Architecture
//!
//! - **identifiers**: Evaluation ids and opaque user/challenge references
//! - **evaluation**: The evaluation aggregate and its input types
//! - **metrics**: Pure, deterministic metrics computation
//! - **events**: Domain events and the pending-event buffer
//! - **schema**: Schema validation run before persistence
//! - **errors**: Error kinds with codes and HTTP status mapping
//! - **validation**: Validation result types
//!
//! ## Usage
//!
//! ```rust
//! use assessment_domain::{Evaluation, NewEvaluation, PerformanceLevel};
//!
//! let evaluation = Evaluation::new(NewEvaluation {
//!     user_id: "user-1".into(),
//!     challenge_id: "challenge-1".into(),
//!     score: 82.0,
//!     category_scores: [("clarity".to_string(), 82.0)].into_iter().collect(),
//!     ..Default::default()
//! })
//! .unwrap();
//!
//! assert_eq!(evaluation.metrics().performance_level, PerformanceLevel::VeryGood);
//! ```

#![warn(clippy::all)]

pub mod errors;
pub mod evaluation;
pub mod events;
pub mod identifiers;
pub mod metrics;
pub mod schema;
pub mod validation;

pub use errors::{AppError, AppResult, EntityNotFoundError, RepositoryError, ValidationError};
pub use evaluation::{
    ChallengeContext, Evaluation, EvaluationRecord, EvaluationUpdate, GrowthMetrics,
    ImprovementPlan, NewEvaluation, PersonalizedFeedback, RecommendedChallenge,
    RecommendedResource, StrengthAnalysis, UserContext,
};
pub use events::{DomainEvent, EvaluationEventPayload, EvaluationEventType, EventBuffer};
pub use identifiers::*;
pub use metrics::{EvaluationMetrics, GrowthInsights, ImprovementMetrics, PerformanceLevel};
pub use schema::{DefaultSchemaValidator, SchemaValidator};
pub use validation::{index_path, key_path, IssueSeverity, ValidationIssue, ValidationResult};
