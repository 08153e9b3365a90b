//! Fluent builder for constructing evaluation test data.

use assessment_domain::{
    ChallengeContext, ChallengeId, Evaluation, EvaluationId, ImprovementPlan, NewEvaluation,
    UserContext, UserId, ValidationError,
};
use serde_json::Value;
use std::collections::BTreeMap;

/// Builder for [`NewEvaluation`] and [`Evaluation`] test instances
#[derive(Clone)]
pub struct EvaluationBuilder {
    input: NewEvaluation,
}

impl EvaluationBuilder {
    /// Minimal valid evaluation: one category, score 75
    pub fn new() -> Self {
        let mut category_scores = BTreeMap::new();
        category_scores.insert("clarity".to_string(), 75.0);
        Self {
            input: NewEvaluation {
                user_id: UserId::new("user-test"),
                challenge_id: ChallengeId::new("challenge-test"),
                score: 75.0,
                category_scores,
                overall_feedback: "Solid answer".to_string(),
                ..Default::default()
            },
        }
    }

    pub fn with_id(mut self, id: EvaluationId) -> Self {
        self.input.id = Some(id);
        self
    }

    pub fn with_user(mut self, user_id: impl Into<UserId>) -> Self {
        self.input.user_id = user_id.into();
        self
    }

    pub fn with_challenge(mut self, challenge_id: impl Into<ChallengeId>) -> Self {
        self.input.challenge_id = challenge_id.into();
        self
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.input.score = score;
        self
    }

    /// Add (or replace) one category score
    pub fn with_category(mut self, name: impl Into<String>, score: f64) -> Self {
        self.input.category_scores.insert(name.into(), score);
        self
    }

    /// Replace all category scores
    pub fn with_categories(mut self, scores: &[(&str, f64)]) -> Self {
        self.input.category_scores = scores
            .iter()
            .map(|(name, score)| (name.to_string(), *score))
            .collect();
        self
    }

    pub fn without_categories(mut self) -> Self {
        self.input.category_scores.clear();
        self
    }

    pub fn with_feedback(mut self, feedback: impl Into<String>) -> Self {
        self.input.overall_feedback = feedback.into();
        self
    }

    pub fn with_strengths(mut self, strengths: &[&str]) -> Self {
        self.input.strengths = strengths.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_areas_for_improvement(mut self, areas: &[&str]) -> Self {
        self.input.areas_for_improvement = areas.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_improvement_plan(mut self, plan: ImprovementPlan) -> Self {
        self.input.improvement_plans.push(plan);
        self
    }

    pub fn with_user_context(mut self, context: UserContext) -> Self {
        self.input.user_context = Some(context);
        self
    }

    pub fn with_challenge_context(mut self, context: ChallengeContext) -> Self {
        self.input.challenge_context = Some(context);
        self
    }

    /// Previous scores keyed by category, plus `overall`
    pub fn with_previous_scores(mut self, scores: &[(&str, f64)]) -> Self {
        let context = self.input.user_context.get_or_insert_with(UserContext::default);
        context.previous_scores = scores
            .iter()
            .map(|(name, score)| (name.to_string(), *score))
            .collect();
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.input.metadata.insert(key.into(), value);
        self
    }

    /// The input, without validation
    pub fn build_input(self) -> NewEvaluation {
        self.input
    }

    /// Construct the evaluation, panicking on invalid input
    pub fn build(self) -> Evaluation {
        Evaluation::new(self.input).expect("builder input is valid")
    }

    /// Construct the evaluation, returning validation failures
    pub fn try_build(self) -> Result<Evaluation, ValidationError> {
        Evaluation::new(self.input)
    }
}

impl Default for EvaluationBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evaluation_builder() {
        let evaluation = EvaluationBuilder::new()
            .with_user("user-42")
            .with_score(80.0)
            .with_categories(&[("a", 80.0), ("b", 60.0)])
            .build();

        assert_eq!(evaluation.user_id().as_str(), "user-42");
        assert_eq!(evaluation.score_percent(), 80);
        assert_eq!(evaluation.category_scores().len(), 2);
    }

    #[test]
    fn test_builder_rejects_empty_categories() {
        let result = EvaluationBuilder::new().without_categories().try_build();
        assert!(result.is_err());
    }

    #[test]
    fn test_previous_scores_create_context() {
        let input = EvaluationBuilder::new()
            .with_previous_scores(&[("overall", 60.0)])
            .build_input();
        let context = input.user_context.unwrap();
        assert_eq!(context.previous_scores.get("overall"), Some(&60.0));
    }
}
