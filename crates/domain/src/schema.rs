//! Schema validation for evaluation inputs.
//!
//! The repository runs a [`SchemaValidator`] over every create and update
//! before it opens a transaction, so malformed input never reaches storage.
//! Field paths in the reported issues use the camelCase names of the wire
//! format.

use crate::evaluation::{Evaluation, EvaluationUpdate, NewEvaluation, MAX_SCORE, MIN_SCORE};
use crate::validation::{index_path, key_path, ValidationResult};
use std::collections::BTreeMap;
use validator::Validate;

/// Validates evaluation payloads before persistence
pub trait SchemaValidator: Send + Sync {
    /// Validate input for a new evaluation
    fn validate_create(&self, input: &NewEvaluation) -> ValidationResult;

    /// Validate a partial update
    fn validate_update(&self, update: &EvaluationUpdate) -> ValidationResult;

    /// Validate a complete entity before it is saved
    fn validate_entity(&self, evaluation: &Evaluation) -> ValidationResult;
}

/// Convert `validator` derive errors into a [`ValidationResult`]
pub trait ValidatorExt {
    fn to_validation_result(&self) -> ValidationResult;
}

impl<T: Validate> ValidatorExt for T {
    fn to_validation_result(&self) -> ValidationResult {
        let mut result = ValidationResult::success();
        if let Err(errors) = self.validate() {
            // field_errors() is a HashMap; sort for stable reporting.
            let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
            fields.sort_by_key(|(field, _)| *field);

            for (field, field_errors) in fields {
                for error in field_errors {
                    let message = error
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| error.code.to_string());
                    result.add_error(camel_case(field), message);
                }
            }
        }
        result
    }
}

/// `category_scores` -> `categoryScores`
pub fn camel_case(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let mut upper = false;
    for ch in field.chars() {
        if ch == '_' {
            upper = true;
        } else if upper {
            out.extend(ch.to_uppercase());
            upper = false;
        } else {
            out.push(ch);
        }
    }
    out
}

/// Validator enforcing the evaluation schema
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultSchemaValidator;

impl DefaultSchemaValidator {
    pub fn new() -> Self {
        Self
    }

    fn check_finite(field: &str, score: f64, result: &mut ValidationResult) {
        // validator's range check lets NaN through.
        if !score.is_finite() {
            result.add_error(field, "Score must be a finite number");
        }
    }

    fn check_category_scores(scores: &BTreeMap<String, f64>, result: &mut ValidationResult) {
        if scores.is_empty() {
            result.add_error("categoryScores", "At least one category score is required");
        }
        for (category, score) in scores {
            let path = key_path("categoryScores", category);
            if category.trim().is_empty() {
                result.add_error("categoryScores", "Category name cannot be empty");
            }
            if !score.is_finite() {
                result.add_error(path, "Score must be a finite number");
            } else if !(MIN_SCORE..=MAX_SCORE).contains(score) {
                result.add_error(path, "Score must be between 0 and 100");
            }
        }
    }

    fn check_improvement_plans(
        plans: &[crate::evaluation::ImprovementPlan],
        result: &mut ValidationResult,
    ) {
        for (index, plan) in plans.iter().enumerate() {
            if plan.area.trim().is_empty() {
                result.add_error(
                    index_path("improvementPlans", index, "area"),
                    "Improvement plan must have an area",
                );
            }
        }
    }
}

impl SchemaValidator for DefaultSchemaValidator {
    fn validate_create(&self, input: &NewEvaluation) -> ValidationResult {
        let mut result = ValidationResult::success();
        if input.user_id.is_blank() {
            result.add_error("userId", "User ID is required");
        }
        if input.challenge_id.is_blank() {
            result.add_error("challengeId", "Challenge ID is required");
        }
        Self::check_finite("score", input.score, &mut result);
        result.merge(input.to_validation_result());
        Self::check_category_scores(&input.category_scores, &mut result);
        Self::check_improvement_plans(&input.improvement_plans, &mut result);

        if input.overall_feedback.trim().is_empty() {
            result.add_warning("overallFeedback", "Overall feedback is empty");
        }
        result
    }

    fn validate_update(&self, update: &EvaluationUpdate) -> ValidationResult {
        let mut result = ValidationResult::success();
        if update.id.is_some() {
            result.add_error("id", "ID cannot be changed");
        }
        if update.user_id.is_some() {
            result.add_error("userId", "User ID cannot be changed");
        }
        if update.challenge_id.is_some() {
            result.add_error("challengeId", "Challenge ID cannot be changed");
        }
        if update.created_at.is_some() {
            result.add_error("createdAt", "Creation time cannot be changed");
        }
        if let Some(score) = update.score {
            if !score.is_finite() {
                result.add_error("score", "Score must be a finite number");
            } else if !(MIN_SCORE..=MAX_SCORE).contains(&score) {
                result.add_error("score", "Score must be between 0 and 100");
            }
        }
        if let Some(ref scores) = update.category_scores {
            Self::check_category_scores(scores, &mut result);
        }
        if let Some(ref plans) = update.improvement_plans {
            Self::check_improvement_plans(plans, &mut result);
        }
        result
    }

    fn validate_entity(&self, evaluation: &Evaluation) -> ValidationResult {
        let mut result = ValidationResult::success();
        if !evaluation.is_valid() {
            result.add_error("evaluation", "Evaluation is missing required fields");
        }
        if evaluation.score() > MAX_SCORE {
            result.add_error("score", "Score must be between 0 and 100");
        }
        Self::check_category_scores(evaluation.category_scores(), &mut result);
        Self::check_improvement_plans(evaluation.improvement_plans(), &mut result);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluation::ImprovementPlan;
    use crate::identifiers::{ChallengeId, EvaluationId, UserId};

    fn valid_input() -> NewEvaluation {
        NewEvaluation {
            user_id: UserId::new("u-1"),
            challenge_id: ChallengeId::new("c-1"),
            score: 72.0,
            category_scores: [("clarity".to_string(), 72.0)].into_iter().collect(),
            overall_feedback: "Solid answer".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_camel_case() {
        assert_eq!(camel_case("category_scores"), "categoryScores");
        assert_eq!(camel_case("score"), "score");
        assert_eq!(camel_case("next_steps"), "nextSteps");
    }

    #[test]
    fn test_valid_create_passes() {
        let result = DefaultSchemaValidator.validate_create(&valid_input());
        assert!(result.valid);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_score_boundaries() {
        for score in [0.0, 100.0] {
            let input = NewEvaluation { score, ..valid_input() };
            assert!(DefaultSchemaValidator.validate_create(&input).valid);
        }
        for score in [-0.1, 100.1, f64::NAN, f64::INFINITY] {
            let input = NewEvaluation { score, ..valid_input() };
            let result = DefaultSchemaValidator.validate_create(&input);
            assert!(!result.valid, "score {} should be rejected", score);
            assert!(result.errors.iter().all(|issue| issue.path == "score"));
        }
    }

    #[test]
    fn test_create_reports_every_problem() {
        let input = NewEvaluation {
            user_id: UserId::new(""),
            category_scores: BTreeMap::new(),
            improvement_plans: vec![ImprovementPlan::default()],
            overall_feedback: String::new(),
            ..valid_input()
        };
        let result = DefaultSchemaValidator.validate_create(&input);

        let paths: Vec<_> = result.errors.iter().map(|issue| issue.path.as_str()).collect();
        assert_eq!(
            paths,
            vec!["userId", "categoryScores", "improvementPlans[0].area"]
        );
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn test_update_rejects_identity_changes() {
        let update = EvaluationUpdate {
            user_id: Some(UserId::new("other")),
            challenge_id: Some(ChallengeId::new("other")),
            ..Default::default()
        };
        let result = DefaultSchemaValidator.validate_update(&update);
        assert_eq!(result.errors.len(), 2);

        let update = EvaluationUpdate {
            id: Some(EvaluationId::new()),
            next_steps: Some("Practice".to_string()),
            ..Default::default()
        };
        let result = DefaultSchemaValidator.validate_update(&update);
        assert!(!result.valid);
        let paths: Vec<_> = result.errors.iter().map(|issue| issue.path.as_str()).collect();
        assert_eq!(paths, vec!["id"]);
    }

    #[test]
    fn test_update_checks_scores() {
        let update = EvaluationUpdate {
            score: Some(101.0),
            category_scores: Some([("a".to_string(), -5.0)].into_iter().collect()),
            ..Default::default()
        };
        let result = DefaultSchemaValidator.validate_update(&update);
        let paths: Vec<_> = result.errors.iter().map(|issue| issue.path.as_str()).collect();
        assert_eq!(paths, vec!["score", "categoryScores.a"]);
    }

    #[test]
    fn test_entity_validation() {
        let evaluation = Evaluation::new(valid_input()).unwrap();
        assert!(DefaultSchemaValidator.validate_entity(&evaluation).valid);
    }
}
