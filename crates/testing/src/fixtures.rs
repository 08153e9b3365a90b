//! Test fixtures for generating evaluation data with realistic content.
//!
//! Identity and free text are randomized with `fake`; scores are randomized
//! within the valid range so that every fixture passes schema validation.

use assessment_domain::{
    ChallengeContext, ChallengeId, Evaluation, EvaluationUpdate, ImprovementPlan, NewEvaluation,
    RecommendedResource, StrengthAnalysis, UserContext, UserId,
};
use assessment_infrastructure::EvaluationRow;
use fake::{
    faker::lorem::en::{Sentence, Word, Words},
    Fake,
};
use std::collections::BTreeMap;

/// Categories used by the fixtures
pub const TEST_CATEGORIES: &[&str] = &["clarity", "structure", "accuracy"];

/// Create a random user reference
pub fn create_test_user_id() -> UserId {
    UserId::new(format!("user-{}", (1000..9999).fake::<u32>()))
}

/// Create a random challenge reference
pub fn create_test_challenge_id() -> ChallengeId {
    ChallengeId::new(format!("challenge-{}", (1000..9999).fake::<u32>()))
}

/// Random category scores for [`TEST_CATEGORIES`]
pub fn create_test_category_scores() -> BTreeMap<String, f64> {
    TEST_CATEGORIES
        .iter()
        .map(|category| (category.to_string(), (40..=95).fake::<u32>() as f64))
        .collect()
}

/// Create valid input for a new evaluation
pub fn create_test_new_evaluation() -> NewEvaluation {
    create_test_new_evaluation_for(create_test_user_id(), create_test_challenge_id())
}

/// Create valid input for a new evaluation of a given user and challenge
pub fn create_test_new_evaluation_for(user_id: UserId, challenge_id: ChallengeId) -> NewEvaluation {
    let strength: String = Word().fake();
    NewEvaluation {
        user_id,
        challenge_id,
        score: (40..=95).fake::<u32>() as f64,
        category_scores: create_test_category_scores(),
        overall_feedback: Sentence(5..12).fake(),
        strengths: vec![strength.clone()],
        strength_analysis: vec![StrengthAnalysis {
            strength,
            description: Sentence(4..8).fake(),
            impact: Some("high".to_string()),
        }],
        areas_for_improvement: Words(1..3).fake(),
        improvement_plans: vec![create_test_improvement_plan()],
        next_steps: Sentence(4..10).fake(),
        recommended_resources: vec![create_test_resource()],
        relevant_categories: TEST_CATEGORIES.iter().map(|c| c.to_string()).collect(),
        ..Default::default()
    }
}

/// Create a persisted-shape evaluation (not yet marked as persisted)
pub fn create_test_evaluation() -> Evaluation {
    Evaluation::new(create_test_new_evaluation()).expect("fixture input is valid")
}

/// Create an evaluation with a fixed score and category scores
pub fn create_test_evaluation_with_scores(
    score: f64,
    category_scores: &[(&str, f64)],
) -> Evaluation {
    Evaluation::new(NewEvaluation {
        score,
        category_scores: category_scores
            .iter()
            .map(|(name, value)| (name.to_string(), *value))
            .collect(),
        ..create_test_new_evaluation()
    })
    .expect("fixture input is valid")
}

/// Create the storage row of a random evaluation
pub fn create_test_row() -> EvaluationRow {
    EvaluationRow::from_entity(&create_test_evaluation()).expect("fixture serializes")
}

/// Create an improvement plan
pub fn create_test_improvement_plan() -> ImprovementPlan {
    ImprovementPlan {
        area: Word().fake(),
        description: Sentence(4..8).fake(),
        action_items: vec![Sentence(3..6).fake(), Sentence(3..6).fake()],
        resources: vec![],
        priority: Some("medium".to_string()),
    }
}

/// Create a recommended resource
pub fn create_test_resource() -> RecommendedResource {
    RecommendedResource {
        title: Sentence(2..4).fake(),
        url: Some("https://example.com/guide".to_string()),
        resource_type: Some("article".to_string()),
        description: None,
    }
}

/// Create a user context with previous scores
pub fn create_test_user_context(previous_overall: f64) -> UserContext {
    let mut previous_scores = BTreeMap::new();
    previous_scores.insert("overall".to_string(), previous_overall);
    for category in TEST_CATEGORIES {
        previous_scores.insert(category.to_string(), previous_overall);
    }

    UserContext {
        skill_level: Some("intermediate".to_string()),
        focus_areas: vec!["clarity".to_string()],
        learning_goals: vec![Sentence(3..6).fake()],
        previous_scores,
        completed_challenge_count: (1..20).fake(),
    }
}

/// Create a challenge context with category weights
pub fn create_test_challenge_context(weights: &[(&str, f64)]) -> ChallengeContext {
    ChallengeContext {
        title: Sentence(2..5).fake(),
        challenge_type: Some("writing".to_string()),
        focus_area: Some("clarity".to_string()),
        difficulty: Some("medium".to_string()),
        category_weights: weights
            .iter()
            .map(|(name, weight)| (name.to_string(), *weight))
            .collect(),
    }
}

/// Create an update touching only feedback fields
pub fn create_test_feedback_update() -> EvaluationUpdate {
    EvaluationUpdate {
        overall_feedback: Some(Sentence(5..10).fake()),
        next_steps: Some(Sentence(3..6).fake()),
        ..Default::default()
    }
}
