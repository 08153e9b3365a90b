//! Storage row shape for evaluations.
//!
//! Columns are snake_case while the aggregate and its wire format use
//! camelCase. [`FIELD_MAPPINGS`] is the single table translating between the
//! two; every read and write goes through it.

use assessment_domain::{
    ChallengeId, Evaluation, EvaluationId, EvaluationRecord, EvaluationUpdate, UserId,
};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::{Error, Result};

/// Table holding evaluations
pub const EVALUATIONS_TABLE: &str = "evaluations";

/// `(entity field, storage column)` pairs, one per persisted field
pub const FIELD_MAPPINGS: &[(&str, &str)] = &[
    ("id", "id"),
    ("userId", "user_id"),
    ("challengeId", "challenge_id"),
    ("score", "score"),
    ("categoryScores", "category_scores"),
    ("overallFeedback", "overall_feedback"),
    ("strengths", "strengths"),
    ("strengthAnalysis", "strength_analysis"),
    ("areasForImprovement", "areas_for_improvement"),
    ("improvementPlans", "improvement_plans"),
    ("nextSteps", "next_steps"),
    ("recommendedResources", "recommended_resources"),
    ("recommendedChallenges", "recommended_challenges"),
    ("userContext", "user_context"),
    ("challengeContext", "challenge_context"),
    ("growthMetrics", "growth_metrics"),
    ("relevantCategories", "relevant_categories"),
    ("responseId", "response_id"),
    ("threadId", "thread_id"),
    ("metadata", "metadata"),
    ("createdAt", "created_at"),
    ("updatedAt", "updated_at"),
];

/// Entity fields that are never written after insert
pub const IMMUTABLE_FIELDS: &[&str] = &["id", "userId", "challengeId", "createdAt"];

/// Storage column for an entity field
pub fn to_storage_field(field: &str) -> Option<&'static str> {
    FIELD_MAPPINGS
        .iter()
        .find(|(entity, _)| *entity == field)
        .map(|(_, column)| *column)
}

/// Entity field for a storage column
pub fn to_entity_field(column: &str) -> Option<&'static str> {
    FIELD_MAPPINGS
        .iter()
        .find(|(_, storage)| *storage == column)
        .map(|(entity, _)| *entity)
}

/// All storage columns in declaration order
pub fn columns() -> impl Iterator<Item = &'static str> {
    FIELD_MAPPINGS.iter().map(|(_, column)| *column)
}

/// Comma separated column list for SELECT and RETURNING clauses
pub fn column_list() -> String {
    columns().collect::<Vec<_>>().join(", ")
}

/// One row of the `evaluations` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct EvaluationRow {
    pub id: Uuid,
    pub user_id: String,
    pub challenge_id: String,
    pub score: f64,
    pub category_scores: Value,
    pub overall_feedback: String,
    pub strengths: Value,
    pub strength_analysis: Value,
    pub areas_for_improvement: Value,
    pub improvement_plans: Value,
    pub next_steps: String,
    pub recommended_resources: Value,
    pub recommended_challenges: Value,
    pub user_context: Option<Value>,
    pub challenge_context: Option<Value>,
    pub growth_metrics: Value,
    pub relevant_categories: Value,
    pub response_id: Option<String>,
    pub thread_id: Option<String>,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EvaluationRow {
    /// Flatten an evaluation into its storage shape
    pub fn from_entity(evaluation: &Evaluation) -> Result<Self> {
        let record = evaluation.to_record();
        Ok(Self {
            id: *record.id.as_uuid(),
            user_id: record.user_id.to_string(),
            challenge_id: record.challenge_id.to_string(),
            score: record.score,
            category_scores: serde_json::to_value(&record.category_scores)?,
            overall_feedback: record.overall_feedback,
            strengths: serde_json::to_value(&record.strengths)?,
            strength_analysis: serde_json::to_value(&record.strength_analysis)?,
            areas_for_improvement: serde_json::to_value(&record.areas_for_improvement)?,
            improvement_plans: serde_json::to_value(&record.improvement_plans)?,
            next_steps: record.next_steps,
            recommended_resources: serde_json::to_value(&record.recommended_resources)?,
            recommended_challenges: serde_json::to_value(&record.recommended_challenges)?,
            user_context: record
                .user_context
                .as_ref()
                .map(serde_json::to_value)
                .transpose()?,
            challenge_context: record
                .challenge_context
                .as_ref()
                .map(serde_json::to_value)
                .transpose()?,
            growth_metrics: serde_json::to_value(&record.growth_metrics)?,
            relevant_categories: serde_json::to_value(&record.relevant_categories)?,
            response_id: record.response_id,
            thread_id: record.thread_id,
            metadata: Value::Object(record.metadata),
            created_at: record.created_at,
            updated_at: record.updated_at,
        })
    }

    /// Rebuild the aggregate, recomputing its derived metrics
    pub fn into_entity(self) -> Result<Evaluation> {
        let id = self.id;
        let record = EvaluationRecord {
            id: EvaluationId::from_uuid(self.id),
            user_id: UserId::new(self.user_id),
            challenge_id: ChallengeId::new(self.challenge_id),
            score: self.score,
            category_scores: decode("category_scores", self.category_scores)?,
            overall_feedback: self.overall_feedback,
            strengths: decode("strengths", self.strengths)?,
            strength_analysis: decode("strength_analysis", self.strength_analysis)?,
            areas_for_improvement: decode("areas_for_improvement", self.areas_for_improvement)?,
            improvement_plans: decode("improvement_plans", self.improvement_plans)?,
            next_steps: self.next_steps,
            recommended_resources: decode("recommended_resources", self.recommended_resources)?,
            recommended_challenges: decode("recommended_challenges", self.recommended_challenges)?,
            user_context: self
                .user_context
                .map(|value| decode("user_context", value))
                .transpose()?,
            challenge_context: self
                .challenge_context
                .map(|value| decode("challenge_context", value))
                .transpose()?,
            growth_metrics: decode("growth_metrics", self.growth_metrics)?,
            relevant_categories: decode("relevant_categories", self.relevant_categories)?,
            response_id: self.response_id,
            thread_id: self.thread_id,
            metadata: decode::<Map<String, Value>>("metadata", self.metadata)?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        };

        Evaluation::reconstruct(record)
            .map_err(|e| Error::InvalidRow(format!("evaluation {}: {}", id, e)))
    }
}

/// Decode a JSON column, treating SQL/JSON null as the empty value
fn decode<T: DeserializeOwned + Default>(column: &str, value: Value) -> Result<T> {
    if value.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(value).map_err(|e| Error::InvalidRow(format!("{}: {}", column, e)))
}

/// Column-level change set for a partial update
///
/// Built from an [`EvaluationUpdate`]: fields the caller left out are absent
/// from the patch, and immutable fields are never included.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowPatch {
    columns: BTreeMap<&'static str, Value>,
}

impl RowPatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map the fields present in `update` to their storage columns
    pub fn from_update(update: &EvaluationUpdate) -> Result<Self> {
        let Value::Object(fields) = serde_json::to_value(update)? else {
            return Err(Error::InvalidRow(
                "update did not serialize to an object".to_string(),
            ));
        };

        let mut patch = Self::new();
        for (field, value) in fields {
            if IMMUTABLE_FIELDS.contains(&field.as_str()) {
                continue;
            }
            let column = to_storage_field(&field)
                .ok_or_else(|| Error::InvalidRow(format!("unmapped field '{}'", field)))?;
            patch.columns.insert(column, value);
        }
        Ok(patch)
    }

    /// Carry the derived columns of `row` along with the caller's changes
    pub fn with_derived(mut self, row: &EvaluationRow) -> Result<Self> {
        self.columns
            .insert("growth_metrics", row.growth_metrics.clone());
        self.columns
            .insert("updated_at", serde_json::to_value(row.updated_at)?);
        Ok(self)
    }

    /// Set a column directly
    pub fn set(&mut self, column: &'static str, value: Value) {
        self.columns.insert(column, value);
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns.get(column)
    }

    /// Columns touched by the patch, in ascending order
    pub fn columns(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.columns.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// The patch as a JSON object keyed by column
    pub fn to_json(&self) -> Value {
        Value::Object(
            self.columns
                .iter()
                .map(|(column, value)| (column.to_string(), value.clone()))
                .collect(),
        )
    }

    /// Overlay the patch onto an existing row
    pub fn apply_to(&self, row: &EvaluationRow) -> Result<EvaluationRow> {
        let Value::Object(mut current) = serde_json::to_value(row)? else {
            return Err(Error::InvalidRow("row did not serialize to an object".to_string()));
        };
        for (column, value) in &self.columns {
            current.insert(column.to_string(), value.clone());
        }
        Ok(serde_json::from_value(Value::Object(current))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assessment_domain::{NewEvaluation, UserContext};
    use proptest::prelude::*;
    use std::collections::HashSet;

    fn evaluation() -> Evaluation {
        Evaluation::new(NewEvaluation {
            user_id: "user-1".into(),
            challenge_id: "challenge-1".into(),
            score: 64.0,
            category_scores: [("clarity".to_string(), 64.0)].into_iter().collect(),
            strengths: vec!["structure".to_string()],
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_field_mappings_are_a_bijection() {
        let fields: HashSet<_> = FIELD_MAPPINGS.iter().map(|(f, _)| *f).collect();
        let cols: HashSet<_> = columns().collect();
        assert_eq!(fields.len(), FIELD_MAPPINGS.len());
        assert_eq!(cols.len(), FIELD_MAPPINGS.len());

        for (field, column) in FIELD_MAPPINGS {
            assert_eq!(to_storage_field(field), Some(*column));
            assert_eq!(to_entity_field(column), Some(*field));
        }
        assert_eq!(to_storage_field("metrics"), None);
    }

    #[test]
    fn test_mappings_cover_every_row_column() {
        let row = EvaluationRow::from_entity(&evaluation()).unwrap();
        let Value::Object(serialized) = serde_json::to_value(&row).unwrap() else {
            panic!("row must serialize to an object");
        };

        let row_columns: HashSet<_> = serialized.keys().map(String::as_str).collect();
        let mapped: HashSet<_> = columns().collect();
        assert_eq!(row_columns, mapped);
    }

    #[test]
    fn test_row_round_trip() {
        let mut original = evaluation();
        original.add_user_context(UserContext {
            skill_level: Some("beginner".to_string()),
            previous_scores: [("overall".to_string(), 60.0)].into_iter().collect(),
            ..Default::default()
        });

        let row = EvaluationRow::from_entity(&original).unwrap();
        assert_eq!(row.user_id, "user-1");
        assert!(row.user_context.is_some());
        assert!(row.challenge_context.is_none());

        let rebuilt = row.into_entity().unwrap();
        assert!(rebuilt.is_persisted());
        assert_eq!(rebuilt.id(), original.id());
        assert_eq!(rebuilt.metrics(), original.metrics());
        assert_eq!(rebuilt.growth_metrics(), original.growth_metrics());
    }

    #[test]
    fn test_invalid_row_is_reported() {
        let mut row = EvaluationRow::from_entity(&evaluation()).unwrap();
        row.strengths = serde_json::json!({ "not": "a list" });
        let err = row.into_entity().unwrap_err();
        assert!(matches!(err, Error::InvalidRow(ref msg) if msg.starts_with("strengths")));

        let mut row = EvaluationRow::from_entity(&evaluation()).unwrap();
        row.score = 140.0;
        assert!(matches!(row.into_entity(), Err(Error::InvalidRow(_))));
    }

    #[test]
    fn test_null_json_columns_decode_as_empty() {
        let mut row = EvaluationRow::from_entity(&evaluation()).unwrap();
        row.recommended_resources = Value::Null;
        row.metadata = Value::Null;

        let rebuilt = row.into_entity().unwrap();
        assert!(rebuilt.recommended_resources().is_empty());
        assert!(rebuilt.metadata().is_empty());
    }

    #[test]
    fn test_patch_drops_absent_and_immutable_fields() {
        let update = EvaluationUpdate {
            id: Some(EvaluationId::new()),
            user_id: Some("someone-else".into()),
            next_steps: Some("Refactor".to_string()),
            score: Some(70.0),
            ..Default::default()
        };

        let patch = RowPatch::from_update(&update).unwrap();
        assert_eq!(patch.columns().collect::<Vec<_>>(), vec!["next_steps", "score"]);
        assert_eq!(patch.get("score"), Some(&serde_json::json!(70.0)));
    }

    #[test]
    fn test_patch_apply() {
        let entity = evaluation();
        let row = EvaluationRow::from_entity(&entity).unwrap();

        let mut patch = RowPatch::from_update(&EvaluationUpdate {
            overall_feedback: Some("Much better".to_string()),
            ..Default::default()
        })
        .unwrap();
        patch.set("score", serde_json::json!(80.0));

        let patched = patch.apply_to(&row).unwrap();
        assert_eq!(patched.overall_feedback, "Much better");
        assert_eq!(patched.score, 80.0);
        assert_eq!(patched.id, row.id);
        assert_eq!(patched.created_at, row.created_at);
        assert_eq!(patch.to_json()["overall_feedback"], "Much better");
    }

    proptest! {
        #[test]
        fn prop_patch_never_touches_identity_columns(
            score in proptest::option::of(0.0f64..=100.0),
            next_steps in proptest::option::of("[a-z ]{0,24}"),
            change_identity in any::<bool>(),
        ) {
            let row = EvaluationRow::from_entity(&evaluation()).unwrap();
            let update = EvaluationUpdate {
                id: change_identity.then(EvaluationId::new),
                user_id: change_identity.then(|| "someone-else".into()),
                score,
                next_steps: next_steps.clone(),
                ..Default::default()
            };

            let patch = RowPatch::from_update(&update).unwrap();
            prop_assert_eq!(patch.len(), score.is_some() as usize + next_steps.is_some() as usize);
            for column in patch.columns() {
                prop_assert!(to_entity_field(column).is_some());
                prop_assert!(!IMMUTABLE_FIELDS.contains(&to_entity_field(column).unwrap()));
            }

            let patched = patch.apply_to(&row).unwrap();
            prop_assert_eq!(patched.id, row.id);
            prop_assert_eq!(&patched.user_id, &row.user_id);
            prop_assert_eq!(patched.created_at, row.created_at);
            prop_assert_eq!(patched.score, score.unwrap_or(row.score));
            prop_assert_eq!(patched.next_steps, next_steps.unwrap_or(row.next_steps.clone()));
        }
    }
}
