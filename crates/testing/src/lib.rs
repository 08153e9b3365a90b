//! Testing utilities for the evaluation core
//!
//! This crate provides:
//! - Test fixtures with randomized but valid evaluation data
//! - A builder for hand-crafted evaluations
//! - In-memory mocks of the evaluation store and the event bus
//! - Test database setup for PostgreSQL integration tests
//!
//! # Examples
//!
//! ```
//! use assessment_testing::{builders::*, fixtures::*};
//!
//! let input = create_test_new_evaluation();
//! assert!(!input.category_scores.is_empty());
//!
//! let evaluation = EvaluationBuilder::new()
//!     .with_score(82.0)
//!     .with_category("clarity", 82.0)
//!     .build();
//! assert_eq!(evaluation.score_percent(), 82);
//! ```

pub mod builders;
pub mod database;
pub mod fixtures;
pub mod mocks;

// Re-export commonly used types
pub use builders::*;
pub use fixtures::*;
pub use mocks::*;

// Re-export testing dependencies for convenience
pub use fake;
pub use proptest;
