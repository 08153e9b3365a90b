//! Domain event types and the pending-event buffer.
//!
//! Events describe committed state changes. They are staged in an
//! [`EventBuffer`] owned by the aggregate (or by the repository operation that
//! performs the write) and are only handed to the event bus once the write has
//! committed.

use crate::errors::AppError;
use crate::identifiers::{ChallengeId, EvaluationId, EventId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Aggregate type recorded on every evaluation event
pub const EVALUATION_AGGREGATE: &str = "evaluation";

/// Maximum number of events an aggregate may hold before a flush
pub const MAX_PENDING_EVENTS: usize = 64;

/// Domain event envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainEvent {
    pub id: EventId,
    pub event_type: String,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    pub version: u32,
    pub metadata: EventMetadata,
}

impl DomainEvent {
    /// Create an event for an evaluation aggregate
    pub fn new(
        event_type: impl Into<String>,
        aggregate_id: impl ToString,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: EventId::new(),
            event_type: event_type.into(),
            aggregate_type: EVALUATION_AGGREGATE.to_string(),
            aggregate_id: aggregate_id.to_string(),
            payload,
            timestamp: Utc::now(),
            version: 1,
            metadata: EventMetadata::default(),
        }
    }
}

/// Event metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub causation_id: Option<String>,
}

/// Evaluation lifecycle event types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationEventType {
    EvaluationCreated,
    EvaluationUpdated,
    EvaluationDeleted,
}

impl EvaluationEventType {
    /// Wire name of the event type
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EvaluationCreated => "evaluation_created",
            Self::EvaluationUpdated => "evaluation_updated",
            Self::EvaluationDeleted => "evaluation_deleted",
        }
    }
}

impl std::fmt::Display for EvaluationEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload shared by all evaluation lifecycle events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationEventPayload {
    pub evaluation_id: EvaluationId,
    pub user_id: UserId,
    pub challenge_id: ChallengeId,
    pub score: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub performance_level: Option<String>,
}

impl EvaluationEventPayload {
    /// Build the envelope for this payload
    pub fn into_event(self, event_type: EvaluationEventType) -> DomainEvent {
        let aggregate_id = self.evaluation_id;
        // Serializing a struct of plain fields cannot fail.
        let payload = serde_json::to_value(&self).unwrap_or(serde_json::Value::Null);
        DomainEvent::new(event_type.as_str(), aggregate_id, payload)
    }
}

/// Bounded, append-only list of events waiting for a commit
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventBuffer {
    events: Vec<DomainEvent>,
}

impl EventBuffer {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    /// Stage an event
    pub fn push(&mut self, event: DomainEvent) -> Result<(), AppError> {
        if self.events.len() >= MAX_PENDING_EVENTS {
            return Err(AppError::Domain(format!(
                "pending event buffer is full ({} events)",
                MAX_PENDING_EVENTS
            )));
        }
        self.events.push(event);
        Ok(())
    }

    /// Staged events, oldest first
    pub fn events(&self) -> &[DomainEvent] {
        &self.events
    }

    /// Drop every staged event
    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Read and clear in one step
    pub fn drain(&mut self) -> Vec<DomainEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> EvaluationEventPayload {
        EvaluationEventPayload {
            evaluation_id: EvaluationId::new(),
            user_id: UserId::new("u-1"),
            challenge_id: ChallengeId::new("c-1"),
            score: 72.0,
            timestamp: Utc::now(),
            performance_level: None,
        }
    }

    #[test]
    fn test_payload_uses_camel_case() {
        let event = payload().into_event(EvaluationEventType::EvaluationCreated);

        assert_eq!(event.event_type, "evaluation_created");
        assert_eq!(event.aggregate_type, EVALUATION_AGGREGATE);
        assert!(event.payload.get("evaluationId").is_some());
        assert_eq!(event.payload["userId"], "u-1");
        assert_eq!(event.payload["challengeId"], "c-1");
        assert_eq!(event.payload["score"], 72.0);
    }

    #[test]
    fn test_buffer_drain_clears() {
        let mut buffer = EventBuffer::new();
        buffer
            .push(payload().into_event(EvaluationEventType::EvaluationUpdated))
            .unwrap();

        let drained = buffer.drain();
        assert_eq!(drained.len(), 1);
        assert!(buffer.is_empty());
        assert!(buffer.drain().is_empty());
    }

    #[test]
    fn test_buffer_is_bounded() {
        let mut buffer = EventBuffer::new();
        for _ in 0..MAX_PENDING_EVENTS {
            buffer
                .push(DomainEvent::new("noop", "x", serde_json::json!({})))
                .unwrap();
        }

        let err = buffer
            .push(DomainEvent::new("noop", "x", serde_json::json!({})))
            .unwrap_err();
        assert!(matches!(err, AppError::Domain(_)));
        assert_eq!(buffer.len(), MAX_PENDING_EVENTS);
    }
}
