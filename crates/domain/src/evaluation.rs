//! The evaluation aggregate.
//!
//! An [`Evaluation`] holds the scores and feedback produced for one response
//! to one challenge, the contextual data the metrics engine reads, the derived
//! metrics themselves, and a buffer of domain events waiting for the next
//! commit.
//!
//! Fields are private: identity never changes after construction and the
//! derived metrics are only ever written by [`Evaluation::recompute_metrics`],
//! which every metrics-relevant mutation calls before returning.

use crate::errors::{AppError, ValidationError};
use crate::events::{DomainEvent, EvaluationEventPayload, EvaluationEventType, EventBuffer};
use crate::identifiers::{ChallengeId, EvaluationId, UserId};
use crate::metrics::{
    compute_metrics, growth_insights, skill_level_feedback, EvaluationMetrics, GrowthInsights,
    MetricsInput, OVERALL_SCORE_KEY,
};
use crate::validation::{key_path, ValidationResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Lowest valid score
pub const MIN_SCORE: f64 = 0.0;

/// Highest valid score
pub const MAX_SCORE: f64 = 100.0;

/// Metadata key that may carry per-category weights
pub const CATEGORY_WEIGHTS_KEY: &str = "categoryWeights";

/// Per-strength explanation produced by the evaluator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StrengthAnalysis {
    pub strength: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub impact: Option<String>,
}

/// Plan for one area of improvement
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ImprovementPlan {
    pub area: String,
    pub description: String,
    pub action_items: Vec<String>,
    pub resources: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
}

/// Learning resource recommended to the user
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecommendedResource {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Follow-up challenge recommended to the user
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecommendedChallenge {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub challenge_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub focus_area: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// What the user domain knows about the person being evaluated
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skill_level: Option<String>,
    pub focus_areas: Vec<String>,
    pub learning_goals: Vec<String>,
    pub previous_scores: BTreeMap<String, f64>,
    pub completed_challenge_count: u32,
}

/// What the challenge domain knows about the challenge being answered
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChallengeContext {
    pub title: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub challenge_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub focus_area: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<String>,
    pub category_weights: BTreeMap<String, f64>,
}

/// Snapshot of deltas against the user's previous scores
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GrowthMetrics {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_score: Option<f64>,
    pub score_change: f64,
    pub category_changes: BTreeMap<String, f64>,
    pub improved_categories: Vec<String>,
    pub declined_categories: Vec<String>,
    pub completed_challenge_count: u32,
}

/// Validated input for a new evaluation
#[derive(Debug, Clone, Default, Serialize, Deserialize, validator::Validate)]
#[serde(rename_all = "camelCase", default)]
pub struct NewEvaluation {
    pub id: Option<EvaluationId>,
    pub user_id: UserId,
    pub challenge_id: ChallengeId,
    #[validate(range(min = 0.0, max = 100.0, message = "Score must be between 0 and 100"))]
    pub score: f64,
    pub category_scores: BTreeMap<String, f64>,
    #[validate(length(max = 20000, message = "Overall feedback must be 20000 characters or less"))]
    pub overall_feedback: String,
    pub strengths: Vec<String>,
    pub strength_analysis: Vec<StrengthAnalysis>,
    pub areas_for_improvement: Vec<String>,
    pub improvement_plans: Vec<ImprovementPlan>,
    #[validate(length(max = 20000, message = "Next steps must be 20000 characters or less"))]
    pub next_steps: String,
    pub recommended_resources: Vec<RecommendedResource>,
    pub recommended_challenges: Vec<RecommendedChallenge>,
    pub user_context: Option<UserContext>,
    pub challenge_context: Option<ChallengeContext>,
    pub relevant_categories: Vec<String>,
    pub response_id: Option<String>,
    pub thread_id: Option<String>,
    pub metadata: Map<String, Value>,
}

/// Partial update of an evaluation
///
/// Identity fields deserialize so the schema validator can reject them;
/// [`Evaluation::update`] ignores them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EvaluationUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<EvaluationId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub challenge_id: Option<ChallengeId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_scores: Option<BTreeMap<String, f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overall_feedback: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strengths: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strength_analysis: Option<Vec<StrengthAnalysis>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub areas_for_improvement: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub improvement_plans: Option<Vec<ImprovementPlan>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_steps: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommended_resources: Option<Vec<RecommendedResource>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommended_challenges: Option<Vec<RecommendedChallenge>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_context: Option<UserContext>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub challenge_context: Option<ChallengeContext>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relevant_categories: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

impl EvaluationUpdate {
    /// Whether the update carries any identity field
    pub fn has_identity_fields(&self) -> bool {
        self.id.is_some()
            || self.user_id.is_some()
            || self.challenge_id.is_some()
            || self.created_at.is_some()
    }

    /// Whether applying the update changes a metrics input
    pub fn touches_metrics(&self) -> bool {
        self.score.is_some()
            || self.category_scores.is_some()
            || self.strengths.is_some()
            || self.strength_analysis.is_some()
            || self.areas_for_improvement.is_some()
            || self.user_context.is_some()
            || self.challenge_context.is_some()
            || self.relevant_categories.is_some()
            || self.metadata.is_some()
    }
}

/// Every persisted field of an evaluation, used to rebuild one from storage
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationRecord {
    pub id: EvaluationId,
    pub user_id: UserId,
    pub challenge_id: ChallengeId,
    pub score: f64,
    pub category_scores: BTreeMap<String, f64>,
    pub overall_feedback: String,
    pub strengths: Vec<String>,
    pub strength_analysis: Vec<StrengthAnalysis>,
    pub areas_for_improvement: Vec<String>,
    pub improvement_plans: Vec<ImprovementPlan>,
    pub next_steps: String,
    pub recommended_resources: Vec<RecommendedResource>,
    pub recommended_challenges: Vec<RecommendedChallenge>,
    pub user_context: Option<UserContext>,
    pub challenge_context: Option<ChallengeContext>,
    pub growth_metrics: GrowthMetrics,
    pub relevant_categories: Vec<String>,
    pub response_id: Option<String>,
    pub thread_id: Option<String>,
    pub metadata: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Feedback tailored to the user's skill level and history
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonalizedFeedback {
    pub skill_level_feedback: String,
    pub growth_insights: Option<GrowthInsights>,
    pub focus_areas: Vec<String>,
    pub relevant_scores: BTreeMap<String, f64>,
}

/// Evaluation aggregate root
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Evaluation {
    id: EvaluationId,
    user_id: UserId,
    challenge_id: ChallengeId,
    score: f64,
    category_scores: BTreeMap<String, f64>,
    overall_feedback: String,
    strengths: Vec<String>,
    strength_analysis: Vec<StrengthAnalysis>,
    areas_for_improvement: Vec<String>,
    improvement_plans: Vec<ImprovementPlan>,
    next_steps: String,
    recommended_resources: Vec<RecommendedResource>,
    recommended_challenges: Vec<RecommendedChallenge>,
    user_context: Option<UserContext>,
    challenge_context: Option<ChallengeContext>,
    relevant_categories: Vec<String>,
    response_id: Option<String>,
    thread_id: Option<String>,
    metadata: Map<String, Value>,
    metrics: EvaluationMetrics,
    growth_metrics: GrowthMetrics,
    score_percent: u32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(skip)]
    persisted: bool,
    #[serde(skip)]
    domain_events: EventBuffer,
}

fn check_score(field: &str, score: f64, result: &mut ValidationResult) {
    if !score.is_finite() {
        result.add_error(field, "Score must be a finite number");
    } else if !(MIN_SCORE..=MAX_SCORE).contains(&score) {
        result.add_error(field, "Score must be between 0 and 100");
    }
}

fn check_category_scores(scores: &BTreeMap<String, f64>, result: &mut ValidationResult) {
    if scores.is_empty() {
        result.add_error("categoryScores", "At least one category score is required");
    }
    for (category, score) in scores {
        if category.trim().is_empty() {
            result.add_error("categoryScores", "Category name cannot be empty");
        }
        check_score(&key_path("categoryScores", category), *score, result);
    }
}

impl Evaluation {
    /// Build a new evaluation from submission input
    pub fn new(input: NewEvaluation) -> Result<Self, ValidationError> {
        let mut result = ValidationResult::success();
        if input.user_id.is_blank() {
            result.add_error("userId", "User ID is required");
        }
        if input.challenge_id.is_blank() {
            result.add_error("challengeId", "Challenge ID is required");
        }
        check_score("score", input.score, &mut result);
        check_category_scores(&input.category_scores, &mut result);
        result.into_result("Invalid evaluation data")?;

        let now = Utc::now();
        let mut evaluation = Self {
            id: input.id.unwrap_or_default(),
            user_id: input.user_id,
            challenge_id: input.challenge_id,
            score: input.score,
            category_scores: input.category_scores,
            overall_feedback: input.overall_feedback,
            strengths: input.strengths,
            strength_analysis: input.strength_analysis,
            areas_for_improvement: input.areas_for_improvement,
            improvement_plans: input.improvement_plans,
            next_steps: input.next_steps,
            recommended_resources: input.recommended_resources,
            recommended_challenges: input.recommended_challenges,
            user_context: input.user_context,
            challenge_context: input.challenge_context,
            relevant_categories: input.relevant_categories,
            response_id: input.response_id,
            thread_id: input.thread_id,
            metadata: input.metadata,
            metrics: placeholder_metrics(),
            growth_metrics: GrowthMetrics::default(),
            score_percent: 0,
            created_at: now,
            updated_at: now,
            persisted: false,
            domain_events: EventBuffer::new(),
        };
        evaluation.recompute_metrics();
        Ok(evaluation)
    }

    /// Rebuild an evaluation from a persisted record
    ///
    /// Derived state is recomputed rather than trusted, so a reconstructed
    /// evaluation is indistinguishable from one built in memory.
    pub fn reconstruct(record: EvaluationRecord) -> Result<Self, ValidationError> {
        let mut result = ValidationResult::success();
        check_score("score", record.score, &mut result);
        check_category_scores(&record.category_scores, &mut result);
        result.into_result(format!("Stored evaluation {} is invalid", record.id))?;

        let mut evaluation = Self {
            id: record.id,
            user_id: record.user_id,
            challenge_id: record.challenge_id,
            score: record.score,
            category_scores: record.category_scores,
            overall_feedback: record.overall_feedback,
            strengths: record.strengths,
            strength_analysis: record.strength_analysis,
            areas_for_improvement: record.areas_for_improvement,
            improvement_plans: record.improvement_plans,
            next_steps: record.next_steps,
            recommended_resources: record.recommended_resources,
            recommended_challenges: record.recommended_challenges,
            user_context: record.user_context,
            challenge_context: record.challenge_context,
            relevant_categories: record.relevant_categories,
            response_id: record.response_id,
            thread_id: record.thread_id,
            metadata: record.metadata,
            metrics: placeholder_metrics(),
            growth_metrics: record.growth_metrics,
            score_percent: 0,
            created_at: record.created_at,
            updated_at: record.updated_at,
            persisted: true,
            domain_events: EventBuffer::new(),
        };
        evaluation.recompute_metrics();
        Ok(evaluation)
    }

    /// Copy out every persisted field
    pub fn to_record(&self) -> EvaluationRecord {
        EvaluationRecord {
            id: self.id,
            user_id: self.user_id.clone(),
            challenge_id: self.challenge_id.clone(),
            score: self.score,
            category_scores: self.category_scores.clone(),
            overall_feedback: self.overall_feedback.clone(),
            strengths: self.strengths.clone(),
            strength_analysis: self.strength_analysis.clone(),
            areas_for_improvement: self.areas_for_improvement.clone(),
            improvement_plans: self.improvement_plans.clone(),
            next_steps: self.next_steps.clone(),
            recommended_resources: self.recommended_resources.clone(),
            recommended_challenges: self.recommended_challenges.clone(),
            user_context: self.user_context.clone(),
            challenge_context: self.challenge_context.clone(),
            growth_metrics: self.growth_metrics.clone(),
            relevant_categories: self.relevant_categories.clone(),
            response_id: self.response_id.clone(),
            thread_id: self.thread_id.clone(),
            metadata: self.metadata.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    /// Apply a partial update
    ///
    /// Identity fields in `updates` are ignored. Scores are range-checked
    /// before anything is applied, so a rejected update leaves the evaluation
    /// untouched.
    pub fn update(&mut self, updates: EvaluationUpdate) -> Result<(), ValidationError> {
        let mut result = ValidationResult::success();
        if let Some(score) = updates.score {
            check_score("score", score, &mut result);
        }
        if let Some(ref scores) = updates.category_scores {
            check_category_scores(scores, &mut result);
        }
        result.into_result("Invalid evaluation update")?;

        let recompute = updates.touches_metrics();

        if let Some(score) = updates.score {
            self.score = score;
        }
        if let Some(category_scores) = updates.category_scores {
            self.category_scores = category_scores;
        }
        if let Some(overall_feedback) = updates.overall_feedback {
            self.overall_feedback = overall_feedback;
        }
        if let Some(strengths) = updates.strengths {
            self.strengths = strengths;
        }
        if let Some(strength_analysis) = updates.strength_analysis {
            self.strength_analysis = strength_analysis;
        }
        if let Some(areas) = updates.areas_for_improvement {
            self.areas_for_improvement = areas;
        }
        if let Some(plans) = updates.improvement_plans {
            self.improvement_plans = plans;
        }
        if let Some(next_steps) = updates.next_steps {
            self.next_steps = next_steps;
        }
        if let Some(resources) = updates.recommended_resources {
            self.recommended_resources = resources;
        }
        if let Some(challenges) = updates.recommended_challenges {
            self.recommended_challenges = challenges;
        }
        if let Some(user_context) = updates.user_context {
            self.user_context = Some(user_context);
        }
        if let Some(challenge_context) = updates.challenge_context {
            self.challenge_context = Some(challenge_context);
        }
        if let Some(categories) = updates.relevant_categories {
            self.relevant_categories = categories;
        }
        if let Some(response_id) = updates.response_id {
            self.response_id = Some(response_id);
        }
        if let Some(thread_id) = updates.thread_id {
            self.thread_id = Some(thread_id);
        }
        if let Some(metadata) = updates.metadata {
            self.metadata = metadata;
        }

        if recompute {
            self.recompute_metrics();
        }
        self.touch();
        Ok(())
    }

    /// Insert or replace the score of one category
    pub fn add_category_score(
        &mut self,
        category: impl Into<String>,
        score: f64,
    ) -> Result<(), ValidationError> {
        let category = category.into();
        let mut result = ValidationResult::success();
        if category.trim().is_empty() {
            result.add_error("category", "Category must be a non-empty string");
        }
        check_score("score", score, &mut result);
        result.into_result("Invalid category score")?;

        self.category_scores.insert(category, score);
        self.recompute_metrics();
        self.touch();
        Ok(())
    }

    /// Insert or replace the plan for `plan.area`
    pub fn add_improvement_plan(&mut self, plan: ImprovementPlan) -> Result<(), ValidationError> {
        if plan.area.trim().is_empty() {
            return Err(ValidationError::field(
                "area",
                "Improvement plan must have an area",
            ));
        }

        if !self.areas_for_improvement.contains(&plan.area) {
            self.areas_for_improvement.push(plan.area.clone());
        }
        match self
            .improvement_plans
            .iter_mut()
            .find(|existing| existing.area == plan.area)
        {
            Some(existing) => *existing = plan,
            None => self.improvement_plans.push(plan),
        }

        self.recompute_metrics();
        self.touch();
        Ok(())
    }

    /// Attach the user context supplied by the user domain
    pub fn add_user_context(&mut self, context: UserContext) {
        self.user_context = Some(context);
        self.recompute_metrics();
        self.touch();
    }

    /// Attach the challenge context supplied by the challenge domain
    pub fn add_challenge_context(&mut self, context: ChallengeContext) {
        self.challenge_context = Some(context);
        self.recompute_metrics();
        self.touch();
    }

    /// Replace the categories relevant to the user's focus areas
    pub fn set_relevant_categories(&mut self, categories: Vec<String>) {
        self.relevant_categories = categories;
        self.recompute_metrics();
        self.touch();
    }

    pub fn add_recommended_resource(&mut self, resource: RecommendedResource) {
        self.recommended_resources.push(resource);
        self.touch();
    }

    pub fn add_recommended_challenge(&mut self, challenge: RecommendedChallenge) {
        self.recommended_challenges.push(challenge);
        self.touch();
    }

    /// Cheap structural check used before persistence
    pub fn is_valid(&self) -> bool {
        !self.id.as_uuid().is_nil()
            && !self.user_id.is_blank()
            && !self.challenge_id.is_blank()
            && self.score.is_finite()
            && self.score >= MIN_SCORE
    }

    /// Category weights from metadata, falling back to the challenge context
    pub fn category_weights(&self) -> Option<BTreeMap<String, f64>> {
        let from_metadata = self
            .metadata
            .get(CATEGORY_WEIGHTS_KEY)
            .and_then(Value::as_object)
            .map(|weights| {
                weights
                    .iter()
                    .filter_map(|(category, weight)| weight.as_f64().map(|w| (category.clone(), w)))
                    .collect::<BTreeMap<_, _>>()
            })
            .filter(|weights| !weights.is_empty());

        from_metadata.or_else(|| {
            self.challenge_context
                .as_ref()
                .map(|context| context.category_weights.clone())
                .filter(|weights| !weights.is_empty())
        })
    }

    /// Run the metrics engine over the current state
    pub fn calculate_metrics(&self) -> EvaluationMetrics {
        let weights = self.category_weights();
        compute_metrics(MetricsInput {
            score: self.score,
            category_scores: &self.category_scores,
            category_weights: weights.as_ref(),
            relevant_categories: &self.relevant_categories,
            previous_scores: self.previous_scores(),
            strength_count: self.strengths.len(),
            analyzed_strength_count: self.strength_analysis.len(),
            improvement_area_count: self.areas_for_improvement.len(),
        })
    }

    fn recompute_metrics(&mut self) {
        let metrics = self.calculate_metrics();
        let improvement = &metrics.improvement_metrics;

        self.growth_metrics = GrowthMetrics {
            previous_score: self
                .previous_scores()
                .and_then(|previous| previous.get(OVERALL_SCORE_KEY).copied()),
            score_change: improvement.overall_improvement,
            category_changes: improvement.category_improvements.clone(),
            improved_categories: improvement
                .category_improvements
                .iter()
                .filter(|(_, delta)| **delta > 0.0)
                .map(|(category, _)| category.clone())
                .collect(),
            declined_categories: improvement
                .category_improvements
                .iter()
                .filter(|(_, delta)| **delta < 0.0)
                .map(|(category, _)| category.clone())
                .collect(),
            completed_challenge_count: self
                .user_context
                .as_ref()
                .map(|context| context.completed_challenge_count)
                .unwrap_or(0),
        };
        self.score_percent = metrics.score_percent;
        self.metrics = metrics;
    }

    fn previous_scores(&self) -> Option<&BTreeMap<String, f64>> {
        self.user_context
            .as_ref()
            .map(|context| &context.previous_scores)
            .filter(|previous| !previous.is_empty())
    }

    fn touch(&mut self) {
        let now = Utc::now();
        // Keep updated_at strictly monotonic even on coarse clocks.
        self.updated_at = if now > self.updated_at {
            now
        } else {
            self.updated_at + chrono::Duration::microseconds(1)
        };
    }

    /// Feedback tailored to the user's skill level and score history
    pub fn personalized_feedback(&self) -> PersonalizedFeedback {
        let context = self.user_context.as_ref();
        PersonalizedFeedback {
            skill_level_feedback: skill_level_feedback(
                context.and_then(|c| c.skill_level.as_deref()),
            )
            .to_string(),
            growth_insights: growth_insights(
                self.score,
                self.previous_scores()
                    .and_then(|previous| previous.get(OVERALL_SCORE_KEY).copied()),
            ),
            focus_areas: context.map(|c| c.focus_areas.clone()).unwrap_or_default(),
            relevant_scores: self.metrics.relevant_scores.clone(),
        }
    }

    /// Stage a domain event for publication after the next commit
    pub fn add_domain_event(
        &mut self,
        event_type: impl Into<String>,
        payload: Value,
    ) -> Result<(), AppError> {
        let event = DomainEvent::new(event_type, self.id, payload);
        self.domain_events.push(event)
    }

    /// Stage one of the lifecycle events with the standard payload
    pub fn record_event(&mut self, event_type: EvaluationEventType) -> Result<(), AppError> {
        let event = self.event_payload().into_event(event_type);
        self.domain_events.push(event)
    }

    /// Staged events, oldest first
    pub fn domain_events(&self) -> &[DomainEvent] {
        self.domain_events.events()
    }

    pub fn clear_domain_events(&mut self) {
        self.domain_events.clear();
    }

    /// Read and clear the staged events in one step
    pub fn take_domain_events(&mut self) -> Vec<DomainEvent> {
        self.domain_events.drain()
    }

    /// Payload describing this evaluation in lifecycle events
    pub fn event_payload(&self) -> EvaluationEventPayload {
        EvaluationEventPayload {
            evaluation_id: self.id,
            user_id: self.user_id.clone(),
            challenge_id: self.challenge_id.clone(),
            score: self.score,
            timestamp: Utc::now(),
            performance_level: Some(self.metrics.performance_level.label().to_string()),
        }
    }

    /// Whether this evaluation was loaded from (or written to) storage
    pub fn is_persisted(&self) -> bool {
        self.persisted
    }

    /// Record that the evaluation now exists in storage
    pub fn mark_persisted(&mut self) {
        self.persisted = true;
    }

    pub fn id(&self) -> EvaluationId {
        self.id
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn challenge_id(&self) -> &ChallengeId {
        &self.challenge_id
    }

    pub fn score(&self) -> f64 {
        self.score
    }

    pub fn category_scores(&self) -> &BTreeMap<String, f64> {
        &self.category_scores
    }

    pub fn overall_feedback(&self) -> &str {
        &self.overall_feedback
    }

    pub fn strengths(&self) -> &[String] {
        &self.strengths
    }

    pub fn strength_analysis(&self) -> &[StrengthAnalysis] {
        &self.strength_analysis
    }

    pub fn areas_for_improvement(&self) -> &[String] {
        &self.areas_for_improvement
    }

    pub fn improvement_plans(&self) -> &[ImprovementPlan] {
        &self.improvement_plans
    }

    pub fn next_steps(&self) -> &str {
        &self.next_steps
    }

    pub fn recommended_resources(&self) -> &[RecommendedResource] {
        &self.recommended_resources
    }

    pub fn recommended_challenges(&self) -> &[RecommendedChallenge] {
        &self.recommended_challenges
    }

    pub fn user_context(&self) -> Option<&UserContext> {
        self.user_context.as_ref()
    }

    pub fn challenge_context(&self) -> Option<&ChallengeContext> {
        self.challenge_context.as_ref()
    }

    pub fn relevant_categories(&self) -> &[String] {
        &self.relevant_categories
    }

    pub fn response_id(&self) -> Option<&str> {
        self.response_id.as_deref()
    }

    pub fn thread_id(&self) -> Option<&str> {
        self.thread_id.as_deref()
    }

    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    pub fn metrics(&self) -> &EvaluationMetrics {
        &self.metrics
    }

    pub fn growth_metrics(&self) -> &GrowthMetrics {
        &self.growth_metrics
    }

    pub fn score_percent(&self) -> u32 {
        self.score_percent
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

fn placeholder_metrics() -> EvaluationMetrics {
    let empty = BTreeMap::new();
    compute_metrics(MetricsInput {
        score: 0.0,
        category_scores: &empty,
        category_weights: None,
        relevant_categories: &[],
        previous_scores: None,
        strength_count: 0,
        analyzed_strength_count: 0,
        improvement_area_count: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{PerformanceLevel, SIGNIFICANT_IMPROVEMENT_MESSAGE};

    fn input(score: f64, categories: &[(&str, f64)]) -> NewEvaluation {
        NewEvaluation {
            user_id: UserId::new("user-1"),
            challenge_id: ChallengeId::new("challenge-1"),
            score,
            category_scores: categories
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_new_computes_metrics() {
        let evaluation = Evaluation::new(input(8.0, &[("clarity", 80.0)])).unwrap();

        assert_eq!(evaluation.metrics().normalized_score, 80.0);
        assert_eq!(evaluation.metrics().performance_level, PerformanceLevel::VeryGood);
        assert_eq!(evaluation.score_percent(), 8);
        assert!(evaluation.is_valid());
        assert!(!evaluation.is_persisted());
    }

    #[test]
    fn test_new_keeps_supplied_id() {
        let id = EvaluationId::new();
        let evaluation = Evaluation::new(NewEvaluation {
            id: Some(id),
            ..input(50.0, &[("a", 50.0)])
        })
        .unwrap();
        assert_eq!(evaluation.id(), id);
    }

    #[test]
    fn test_new_rejects_invalid_input() {
        let err = Evaluation::new(input(101.0, &[("a", 50.0)])).unwrap_err();
        assert_eq!(err.fields(), vec!["score"]);

        let err = Evaluation::new(input(50.0, &[])).unwrap_err();
        assert_eq!(err.fields(), vec!["categoryScores"]);

        let err = Evaluation::new(input(f64::NAN, &[("a", 120.0)])).unwrap_err();
        assert_eq!(err.fields(), vec!["score", "categoryScores.a"]);

        let err = Evaluation::new(NewEvaluation {
            user_id: UserId::new(""),
            challenge_id: ChallengeId::new(" "),
            ..input(50.0, &[("a", 50.0)])
        })
        .unwrap_err();
        assert_eq!(err.fields(), vec!["userId", "challengeId"]);
    }

    #[test]
    fn test_empty_update_only_touches_updated_at() {
        let mut evaluation = Evaluation::new(input(70.0, &[("a", 70.0)])).unwrap();
        let metrics_before = evaluation.metrics().clone();
        let updated_before = evaluation.updated_at();
        let created_before = evaluation.created_at();

        evaluation.update(EvaluationUpdate::default()).unwrap();

        assert_eq!(evaluation.metrics(), &metrics_before);
        assert_eq!(evaluation.score(), 70.0);
        assert_eq!(evaluation.created_at(), created_before);
        assert!(evaluation.updated_at() > updated_before);
    }

    #[test]
    fn test_update_ignores_identity_fields() {
        let mut evaluation = Evaluation::new(input(70.0, &[("a", 70.0)])).unwrap();
        let id = evaluation.id();

        evaluation
            .update(EvaluationUpdate {
                id: Some(EvaluationId::new()),
                user_id: Some(UserId::new("someone-else")),
                score: Some(50.0),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(evaluation.id(), id);
        assert_eq!(evaluation.user_id().as_str(), "user-1");
        assert_eq!(evaluation.score(), 50.0);
        assert_eq!(evaluation.metrics().performance_level, PerformanceLevel::Average);
    }

    #[test]
    fn test_rejected_update_changes_nothing() {
        let mut evaluation = Evaluation::new(input(70.0, &[("a", 70.0)])).unwrap();
        let before = evaluation.updated_at();

        let err = evaluation
            .update(EvaluationUpdate {
                score: Some(150.0),
                next_steps: Some("ignored".to_string()),
                ..Default::default()
            })
            .unwrap_err();

        assert_eq!(err.fields(), vec!["score"]);
        assert_eq!(evaluation.score(), 70.0);
        assert_eq!(evaluation.next_steps(), "");
        assert_eq!(evaluation.updated_at(), before);
    }

    #[test]
    fn test_add_category_score_upserts() {
        let mut evaluation = Evaluation::new(input(70.0, &[("a", 70.0)])).unwrap();

        evaluation.add_category_score("b", 90.0).unwrap();
        evaluation.add_category_score("a", 40.0).unwrap();

        assert_eq!(evaluation.category_scores().len(), 2);
        assert_eq!(evaluation.metrics().category_strengths, vec!["b"]);
        assert_eq!(evaluation.metrics().category_weaknesses, vec!["a"]);

        assert!(evaluation.add_category_score("", 50.0).is_err());
        assert!(evaluation.add_category_score("c", -1.0).is_err());
        assert!(!evaluation.category_scores().contains_key("c"));
    }

    #[test]
    fn test_add_improvement_plan_replaces_by_area() {
        let mut evaluation = Evaluation::new(input(70.0, &[("a", 70.0)])).unwrap();

        evaluation
            .add_improvement_plan(ImprovementPlan {
                area: "testing".to_string(),
                description: "first".to_string(),
                ..Default::default()
            })
            .unwrap();
        evaluation
            .add_improvement_plan(ImprovementPlan {
                area: "testing".to_string(),
                description: "second".to_string(),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(evaluation.improvement_plans().len(), 1);
        assert_eq!(evaluation.improvement_plans()[0].description, "second");
        assert_eq!(evaluation.areas_for_improvement(), &["testing".to_string()]);
        assert_eq!(evaluation.metrics().improvement_area_count, 1);

        assert!(evaluation
            .add_improvement_plan(ImprovementPlan::default())
            .is_err());
    }

    #[test]
    fn test_context_drives_metrics() {
        let mut evaluation = Evaluation::new(input(85.0, &[("a", 70.0), ("b", 60.0)])).unwrap();
        assert_eq!(evaluation.metrics().weighted_score, None);

        evaluation.add_user_context(UserContext {
            skill_level: Some("beginner".to_string()),
            previous_scores: [("overall".to_string(), 70.0), ("a".to_string(), 50.0)]
                .into_iter()
                .collect(),
            completed_challenge_count: 4,
            ..Default::default()
        });
        let improvement = &evaluation.metrics().improvement_metrics;
        assert_eq!(improvement.overall_improvement, 15.0);
        assert!(improvement.has_improved);
        assert_eq!(improvement.category_improvements.get("a"), Some(&20.0));
        assert_eq!(improvement.most_improved_category.as_deref(), Some("a"));
        assert_eq!(evaluation.growth_metrics().previous_score, Some(70.0));
        assert_eq!(evaluation.growth_metrics().improved_categories, vec!["a"]);
        assert_eq!(evaluation.growth_metrics().completed_challenge_count, 4);

        evaluation.add_challenge_context(ChallengeContext {
            title: "Design a cache".to_string(),
            category_weights: [("a".to_string(), 1.0), ("b".to_string(), 1.0)]
                .into_iter()
                .collect(),
            ..Default::default()
        });
        assert_eq!(evaluation.metrics().weighted_score, Some(65.0));

        evaluation.set_relevant_categories(vec!["b".to_string()]);
        assert_eq!(evaluation.metrics().focus_area_average, Some(60.0));
    }

    #[test]
    fn test_metadata_weights_take_precedence() {
        let mut metadata = Map::new();
        metadata.insert(
            CATEGORY_WEIGHTS_KEY.to_string(),
            serde_json::json!({ "a": 2, "b": 1 }),
        );
        let mut evaluation = Evaluation::new(NewEvaluation {
            metadata,
            ..input(70.0, &[("a", 80.0), ("b", 60.0)])
        })
        .unwrap();
        evaluation.add_challenge_context(ChallengeContext {
            category_weights: [("b".to_string(), 1.0)].into_iter().collect(),
            ..Default::default()
        });

        assert_eq!(evaluation.metrics().weighted_score, Some(73.0));
    }

    #[test]
    fn test_personalized_feedback_matches_metrics() {
        let mut evaluation = Evaluation::new(input(90.0, &[("a", 90.0)])).unwrap();
        evaluation.add_user_context(UserContext {
            skill_level: Some("advanced".to_string()),
            focus_areas: vec!["systems".to_string()],
            previous_scores: [("overall".to_string(), 70.0)].into_iter().collect(),
            ..Default::default()
        });

        let feedback = evaluation.personalized_feedback();
        assert!(feedback.skill_level_feedback.starts_with("As an advanced"));
        assert_eq!(feedback.growth_insights, evaluation.metrics().growth_insights);
        assert_eq!(
            feedback.growth_insights.unwrap().message,
            SIGNIFICANT_IMPROVEMENT_MESSAGE
        );
        assert_eq!(feedback.focus_areas, vec!["systems"]);
    }

    #[test]
    fn test_domain_event_buffer() {
        let mut evaluation = Evaluation::new(input(70.0, &[("a", 70.0)])).unwrap();
        evaluation
            .add_domain_event("evaluation_scored", serde_json::json!({ "score": 70 }))
            .unwrap();
        evaluation
            .record_event(EvaluationEventType::EvaluationUpdated)
            .unwrap();

        assert_eq!(evaluation.domain_events().len(), 2);
        assert_eq!(
            evaluation.domain_events()[0].aggregate_id,
            evaluation.id().to_string()
        );

        let drained = evaluation.take_domain_events();
        assert_eq!(drained.len(), 2);
        assert!(evaluation.domain_events().is_empty());

        evaluation
            .add_domain_event("again", serde_json::json!({}))
            .unwrap();
        evaluation.clear_domain_events();
        assert!(evaluation.domain_events().is_empty());
    }

    #[test]
    fn test_record_round_trip_recomputes_metrics() {
        let mut evaluation = Evaluation::new(input(60.0, &[("a", 60.0)])).unwrap();
        evaluation.set_relevant_categories(vec!["a".to_string()]);

        let rebuilt = Evaluation::reconstruct(evaluation.to_record()).unwrap();
        assert!(rebuilt.is_persisted());
        assert_eq!(rebuilt.metrics(), evaluation.metrics());
        assert_eq!(rebuilt.created_at(), evaluation.created_at());
    }

    #[test]
    fn test_serializes_camel_case_without_events() {
        let mut evaluation = Evaluation::new(input(60.0, &[("a", 60.0)])).unwrap();
        evaluation
            .record_event(EvaluationEventType::EvaluationCreated)
            .unwrap();

        let json = serde_json::to_value(&evaluation).unwrap();
        assert!(json.get("categoryScores").is_some());
        assert!(json.get("scorePercent").is_some());
        assert!(json.get("domainEvents").is_none());
        assert!(json.get("persisted").is_none());
    }
}
