//! Evaluation metrics engine.
//!
//! Pure computation over an evaluation's scores and context. Given the same
//! inputs it always produces the same [`EvaluationMetrics`]: every map is a
//! `BTreeMap`, so iteration (and therefore tie-breaking) follows ascending key
//! order.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Key of the overall score inside `previousScores`
pub const OVERALL_SCORE_KEY: &str = "overall";

/// Category score at or above which a category counts as a strength
pub const STRENGTH_THRESHOLD: f64 = 80.0;

/// Category score at or below which a category counts as a weakness
pub const WEAKNESS_THRESHOLD: f64 = 50.0;

/// Improvement above which growth is reported as significant
pub const SIGNIFICANT_IMPROVEMENT: f64 = 5.0;

pub const SIGNIFICANT_IMPROVEMENT_MESSAGE: &str =
    "Great job! You've shown significant improvement since your last evaluation.";
pub const STEADY_IMPROVEMENT_MESSAGE: &str =
    "You're showing steady improvement. Keep up the good work!";
pub const CONSISTENT_PERFORMANCE_MESSAGE: &str =
    "Your performance is consistent with your previous evaluation.";
pub const SLIGHTLY_LOWER_MESSAGE: &str =
    "Your score is slightly lower than your previous evaluation. Review the suggestions below to get back on track.";

/// Nine-tier classification of a 0-100 score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PerformanceLevel {
    #[serde(rename = "poor")]
    Poor,
    #[serde(rename = "below average")]
    BelowAverage,
    #[serde(rename = "needs improvement")]
    NeedsImprovement,
    #[serde(rename = "average")]
    Average,
    #[serde(rename = "satisfactory")]
    Satisfactory,
    #[serde(rename = "good")]
    Good,
    #[serde(rename = "very good")]
    VeryGood,
    #[serde(rename = "excellent")]
    Excellent,
    #[serde(rename = "exceptional")]
    Exceptional,
}

impl PerformanceLevel {
    /// Classify a score using the fixed thresholds 95/85/75/65/55/45/35/25
    pub fn from_score(score: f64) -> Self {
        if score >= 95.0 {
            Self::Exceptional
        } else if score >= 85.0 {
            Self::Excellent
        } else if score >= 75.0 {
            Self::VeryGood
        } else if score >= 65.0 {
            Self::Good
        } else if score >= 55.0 {
            Self::Satisfactory
        } else if score >= 45.0 {
            Self::Average
        } else if score >= 35.0 {
            Self::NeedsImprovement
        } else if score >= 25.0 {
            Self::BelowAverage
        } else {
            Self::Poor
        }
    }

    /// Human readable label
    pub fn label(&self) -> &'static str {
        match self {
            Self::Exceptional => "exceptional",
            Self::Excellent => "excellent",
            Self::VeryGood => "very good",
            Self::Good => "good",
            Self::Satisfactory => "satisfactory",
            Self::Average => "average",
            Self::NeedsImprovement => "needs improvement",
            Self::BelowAverage => "below average",
            Self::Poor => "poor",
        }
    }
}

impl std::fmt::Display for PerformanceLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Deltas between the current evaluation and the user's previous scores
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImprovementMetrics {
    pub overall_improvement: f64,
    pub has_improved: bool,
    pub category_improvements: BTreeMap<String, f64>,
    pub most_improved_category: Option<String>,
    pub least_improved_category: Option<String>,
}

impl ImprovementMetrics {
    /// Compare current scores against `previous_scores`
    ///
    /// `previous_scores` holds the overall score under [`OVERALL_SCORE_KEY`]
    /// and per-category scores under their category names.
    pub fn compute(
        score: f64,
        category_scores: &BTreeMap<String, f64>,
        previous_scores: &BTreeMap<String, f64>,
    ) -> Self {
        let overall_improvement = previous_scores
            .get(OVERALL_SCORE_KEY)
            .map(|previous| score - previous)
            .unwrap_or(0.0);

        let mut category_improvements = BTreeMap::new();
        let mut most: Option<(&str, f64)> = None;
        let mut least: Option<(&str, f64)> = None;

        for (category, current) in category_scores {
            let Some(previous) = previous_scores.get(category) else {
                continue;
            };
            let delta = current - previous;
            category_improvements.insert(category.clone(), delta);

            // Strict comparisons keep the first category seen on ties.
            if most.map_or(true, |(_, best)| delta > best) {
                most = Some((category.as_str(), delta));
            }
            if least.map_or(true, |(_, worst)| delta < worst) {
                least = Some((category.as_str(), delta));
            }
        }

        Self {
            overall_improvement,
            has_improved: overall_improvement > 0.0,
            category_improvements,
            most_improved_category: most.map(|(name, _)| name.to_string()),
            least_improved_category: least.map(|(name, _)| name.to_string()),
        }
    }
}

/// Natural-language banner describing growth since the previous evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrowthInsights {
    pub improvement: f64,
    pub message: String,
}

/// Growth banner for `score` against the previous overall score
///
/// Returns `None` when there is no previous overall score. The difference is
/// classified unrounded, so a 0.4 point gain is "steady improvement".
pub fn growth_insights(score: f64, previous_overall: Option<f64>) -> Option<GrowthInsights> {
    let previous = previous_overall?;
    let improvement = score - previous;

    let message = if improvement > SIGNIFICANT_IMPROVEMENT {
        SIGNIFICANT_IMPROVEMENT_MESSAGE
    } else if improvement > 0.0 {
        STEADY_IMPROVEMENT_MESSAGE
    } else if improvement == 0.0 {
        CONSISTENT_PERFORMANCE_MESSAGE
    } else {
        SLIGHTLY_LOWER_MESSAGE
    };

    Some(GrowthInsights {
        improvement,
        message: message.to_string(),
    })
}

/// Feedback line for the user's declared skill level
pub fn skill_level_feedback(skill_level: Option<&str>) -> &'static str {
    match skill_level.map(|level| level.trim().to_ascii_lowercase()).as_deref() {
        Some("beginner") => {
            "As a beginner, focus on building a strong foundation in the core concepts before moving on to advanced techniques."
        }
        Some("intermediate") => {
            "At the intermediate level, deepen your understanding and apply the concepts to more complex scenarios."
        }
        Some("advanced") => {
            "As an advanced learner, focus on mastering the nuances and exploring edge cases."
        }
        _ => "Keep practicing to strengthen your skills across all areas.",
    }
}

/// Everything the metrics engine reads
#[derive(Debug, Clone, Copy)]
pub struct MetricsInput<'a> {
    pub score: f64,
    pub category_scores: &'a BTreeMap<String, f64>,
    pub category_weights: Option<&'a BTreeMap<String, f64>>,
    pub relevant_categories: &'a [String],
    pub previous_scores: Option<&'a BTreeMap<String, f64>>,
    pub strength_count: usize,
    pub analyzed_strength_count: usize,
    pub improvement_area_count: usize,
}

/// Derived analytics of an evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationMetrics {
    pub normalized_score: f64,
    pub performance_level: PerformanceLevel,
    pub category_performance_levels: BTreeMap<String, PerformanceLevel>,
    pub category_strengths: Vec<String>,
    pub category_weaknesses: Vec<String>,
    pub weighted_score: Option<f64>,
    pub focus_area_scores: BTreeMap<String, f64>,
    pub focus_area_average: Option<f64>,
    pub improvement_metrics: ImprovementMetrics,
    pub score_percent: u32,
    pub relevant_scores: BTreeMap<String, f64>,
    pub growth_insights: Option<GrowthInsights>,
    pub strength_count: usize,
    pub analyzed_strength_count: usize,
    pub improvement_area_count: usize,
}

/// Scores reported on a 0-10 scale are lifted to 0-100
pub fn normalize_score(score: f64) -> f64 {
    if score <= 10.0 {
        score * 10.0
    } else {
        score
    }
}

/// `round(score / 100 * 100)`, or 0 when there are no category scores
pub fn score_percent(score: f64, category_scores: &BTreeMap<String, f64>) -> u32 {
    if category_scores.is_empty() {
        return 0;
    }
    (score / 100.0 * 100.0).round().max(0.0) as u32
}

/// Weighted mean over categories present in both maps, rounded
pub fn weighted_score(
    category_scores: &BTreeMap<String, f64>,
    weights: &BTreeMap<String, f64>,
) -> Option<f64> {
    let (total, weight_sum) = category_scores
        .iter()
        .filter_map(|(category, score)| weights.get(category).map(|weight| (score, weight)))
        .fold((0.0, 0.0), |(total, sum), (score, weight)| {
            (total + score * weight, sum + weight)
        });

    if weight_sum == 0.0 {
        None
    } else {
        Some((total / weight_sum).round())
    }
}

fn restrict(scores: &BTreeMap<String, f64>, categories: &[String]) -> BTreeMap<String, f64> {
    categories
        .iter()
        .filter_map(|category| scores.get(category).map(|score| (category.clone(), *score)))
        .collect()
}

/// Compute all derived metrics
pub fn compute_metrics(input: MetricsInput<'_>) -> EvaluationMetrics {
    let normalized_score = normalize_score(input.score);

    let category_performance_levels = input
        .category_scores
        .iter()
        .map(|(category, score)| (category.clone(), PerformanceLevel::from_score(*score)))
        .collect();

    let category_strengths = input
        .category_scores
        .iter()
        .filter(|(_, score)| **score >= STRENGTH_THRESHOLD)
        .map(|(category, _)| category.clone())
        .collect();
    let category_weaknesses = input
        .category_scores
        .iter()
        .filter(|(_, score)| **score <= WEAKNESS_THRESHOLD)
        .map(|(category, _)| category.clone())
        .collect();

    let weighted = input
        .category_weights
        .and_then(|weights| weighted_score(input.category_scores, weights));

    let focus_area_scores = restrict(input.category_scores, input.relevant_categories);
    let focus_area_average = if focus_area_scores.is_empty() {
        None
    } else {
        let sum: f64 = focus_area_scores.values().sum();
        Some((sum / focus_area_scores.len() as f64).round())
    };

    let empty = BTreeMap::new();
    let previous_scores = input.previous_scores.unwrap_or(&empty);

    EvaluationMetrics {
        normalized_score,
        performance_level: PerformanceLevel::from_score(normalized_score),
        category_performance_levels,
        category_strengths,
        category_weaknesses,
        weighted_score: weighted,
        relevant_scores: restrict(input.category_scores, input.relevant_categories),
        focus_area_scores,
        focus_area_average,
        improvement_metrics: ImprovementMetrics::compute(
            input.score,
            input.category_scores,
            previous_scores,
        ),
        score_percent: score_percent(input.score, input.category_scores),
        growth_insights: growth_insights(
            input.score,
            previous_scores.get(OVERALL_SCORE_KEY).copied(),
        ),
        strength_count: input.strength_count,
        analyzed_strength_count: input.analyzed_strength_count,
        improvement_area_count: input.improvement_area_count,
    }
}
