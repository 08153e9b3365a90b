//! Tests for the evaluation aggregate
//!
//! Exercises the public API the repository relies on: construction, partial
//! updates, metrics recomputation and the pending-event buffer.

use assessment_domain::{
    events::MAX_PENDING_EVENTS, metrics::OVERALL_SCORE_KEY, ChallengeContext, Evaluation,
    EvaluationEventType, EvaluationUpdate, ImprovementPlan, NewEvaluation, PerformanceLevel,
    RecommendedChallenge, RecommendedResource, UserContext,
};
use fake::faker::lorem::en::Sentence;
use fake::Fake;
use proptest::prelude::*;
use std::collections::BTreeMap;

fn new_evaluation(score: f64) -> NewEvaluation {
    NewEvaluation {
        user_id: "user-7".into(),
        challenge_id: "challenge-3".into(),
        score,
        category_scores: [
            ("clarity".to_string(), 85.0),
            ("correctness".to_string(), 72.0),
            ("testing".to_string(), 40.0),
        ]
        .into_iter()
        .collect(),
        overall_feedback: Sentence(3..8).fake(),
        strengths: vec!["clear naming".to_string()],
        areas_for_improvement: vec!["testing".to_string()],
        ..Default::default()
    }
}

// ============================================================================
// Construction
// ============================================================================

#[test]
fn test_create_derives_all_metrics() {
    let evaluation = Evaluation::new(new_evaluation(78.0)).unwrap();
    let metrics = evaluation.metrics();

    assert_eq!(metrics.performance_level, PerformanceLevel::VeryGood);
    assert_eq!(metrics.category_strengths, vec!["clarity"]);
    assert_eq!(metrics.category_weaknesses, vec!["testing"]);
    assert_eq!(
        metrics.category_performance_levels.get("correctness"),
        Some(&PerformanceLevel::Good)
    );
    assert_eq!(metrics.strength_count, 1);
    assert_eq!(metrics.improvement_area_count, 1);
    assert_eq!(evaluation.score_percent(), 78);
    assert_eq!(evaluation.created_at(), evaluation.updated_at());
}

#[test]
fn test_validation_failure_names_fields() {
    let err = Evaluation::new(NewEvaluation {
        score: -1.0,
        ..new_evaluation(0.0)
    })
    .unwrap_err();

    assert_eq!(err.fields(), vec!["score"]);
}

// ============================================================================
// Updates
// ============================================================================

#[test]
fn test_feedback_only_update_keeps_metrics() {
    let mut evaluation = Evaluation::new(new_evaluation(78.0)).unwrap();
    let before = evaluation.metrics().clone();

    evaluation
        .update(EvaluationUpdate {
            overall_feedback: Some("Rewritten feedback".to_string()),
            next_steps: Some("Write more tests".to_string()),
            ..Default::default()
        })
        .unwrap();

    assert_eq!(evaluation.metrics(), &before);
    assert_eq!(evaluation.overall_feedback(), "Rewritten feedback");
    assert_eq!(evaluation.next_steps(), "Write more tests");
}

#[test]
fn test_score_update_recomputes() {
    let mut evaluation = Evaluation::new(new_evaluation(78.0)).unwrap();

    evaluation
        .update(EvaluationUpdate {
            score: Some(96.0),
            ..Default::default()
        })
        .unwrap();

    assert_eq!(evaluation.metrics().performance_level, PerformanceLevel::Exceptional);
    assert_eq!(evaluation.score_percent(), 96);
}

#[test]
fn test_update_cannot_move_evaluation() {
    let mut evaluation = Evaluation::new(new_evaluation(78.0)).unwrap();
    let created = evaluation.created_at();

    evaluation
        .update(EvaluationUpdate {
            challenge_id: Some("other-challenge".into()),
            created_at: Some(created - chrono::Duration::days(3)),
            ..Default::default()
        })
        .unwrap();

    assert_eq!(evaluation.challenge_id().as_str(), "challenge-3");
    assert_eq!(evaluation.created_at(), created);
}

#[test]
fn test_recommendations_accumulate() {
    let mut evaluation = Evaluation::new(new_evaluation(78.0)).unwrap();
    evaluation.add_recommended_resource(RecommendedResource {
        title: "Property testing in practice".to_string(),
        ..Default::default()
    });
    evaluation.add_recommended_challenge(RecommendedChallenge {
        title: "Write a fuzzer".to_string(),
        focus_area: Some("testing".to_string()),
        ..Default::default()
    });

    assert_eq!(evaluation.recommended_resources().len(), 1);
    assert_eq!(evaluation.recommended_challenges().len(), 1);
}

#[test]
fn test_improvement_plan_for_new_area_extends_areas() {
    let mut evaluation = Evaluation::new(new_evaluation(78.0)).unwrap();
    evaluation
        .add_improvement_plan(ImprovementPlan {
            area: "documentation".to_string(),
            action_items: vec!["Document public functions".to_string()],
            ..Default::default()
        })
        .unwrap();

    assert_eq!(
        evaluation.areas_for_improvement(),
        &["testing".to_string(), "documentation".to_string()]
    );
    assert_eq!(evaluation.metrics().improvement_area_count, 2);
}

// ============================================================================
// Context and personalization
// ============================================================================

#[test]
fn test_growth_against_previous_scores() {
    let mut evaluation = Evaluation::new(new_evaluation(68.0)).unwrap();
    evaluation.add_user_context(UserContext {
        skill_level: Some("intermediate".to_string()),
        previous_scores: [
            (OVERALL_SCORE_KEY.to_string(), 70.0),
            ("clarity".to_string(), 90.0),
            ("testing".to_string(), 30.0),
        ]
        .into_iter()
        .collect(),
        ..Default::default()
    });

    let improvement = &evaluation.metrics().improvement_metrics;
    assert_eq!(improvement.overall_improvement, -2.0);
    assert!(!improvement.has_improved);
    assert_eq!(improvement.most_improved_category.as_deref(), Some("testing"));
    assert_eq!(improvement.least_improved_category.as_deref(), Some("clarity"));
    assert_eq!(evaluation.growth_metrics().declined_categories, vec!["clarity"]);

    let feedback = evaluation.personalized_feedback();
    assert!(feedback
        .growth_insights
        .unwrap()
        .message
        .starts_with("Your score is slightly lower"));
}

#[test]
fn test_challenge_weights_feed_weighted_score() {
    let mut evaluation = Evaluation::new(new_evaluation(78.0)).unwrap();
    let weights: BTreeMap<String, f64> = [
        ("clarity".to_string(), 1.0),
        ("correctness".to_string(), 3.0),
    ]
    .into_iter()
    .collect();
    evaluation.add_challenge_context(ChallengeContext {
        title: "Implement an LRU cache".to_string(),
        category_weights: weights,
        ..Default::default()
    });

    // (85 * 1 + 72 * 3) / 4 = 75.25
    assert_eq!(evaluation.metrics().weighted_score, Some(75.0));
}

// ============================================================================
// Domain events
// ============================================================================

#[test]
fn test_event_buffer_overflow_is_an_error() {
    let mut evaluation = Evaluation::new(new_evaluation(78.0)).unwrap();
    for _ in 0..MAX_PENDING_EVENTS {
        evaluation
            .record_event(EvaluationEventType::EvaluationUpdated)
            .unwrap();
    }

    let err = evaluation
        .record_event(EvaluationEventType::EvaluationUpdated)
        .unwrap_err();
    assert_eq!(err.error_code(), "DOMAIN_ERROR");

    assert_eq!(evaluation.take_domain_events().len(), MAX_PENDING_EVENTS);
    assert!(evaluation
        .record_event(EvaluationEventType::EvaluationUpdated)
        .is_ok());
}

proptest! {
    #[test]
    fn prop_valid_scores_always_construct(score in 0.0f64..=100.0) {
        let evaluation = Evaluation::new(new_evaluation(score)).unwrap();
        prop_assert!(evaluation.is_valid());
        prop_assert!(evaluation.score_percent() <= 100);
    }

    #[test]
    fn prop_out_of_range_scores_are_rejected(score in 100.001f64..1.0e6) {
        prop_assert!(Evaluation::new(new_evaluation(score)).is_err());
    }
}
