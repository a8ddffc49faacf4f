//! Events - the immutable facts that make up the session history.
//!
//! State is the fold of events; the log is canonical. Every event carries
//! the timestamp at which the orchestrator derived it, so replay never
//! reads a clock.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::confidence::Confidence;
use super::phase::Phase;
use super::session::{Artifact, CheckpointSummary, ChecklistItem, TurnBudget};

/// Envelope pairing a payload with its derivation timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub timestamp: DateTime<Utc>,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(timestamp: DateTime<Utc>, payload: EventPayload) -> Self {
        Self { timestamp, payload }
    }

    pub fn kind(&self) -> &'static str {
        self.payload.kind()
    }
}

/// The closed set of facts the evolver understands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum EventPayload {
    Initialized {
        prompt: String,
        checklist: Vec<ChecklistItem>,
        budgets: Vec<TurnBudget>,
    },
    PhaseStarted {
        phase: Phase,
        max_turns: u32,
    },
    PhaseCompleted {
        phase: Phase,
        turns_used: u32,
    },
    TurnStarted {
        turn: u64,
    },
    TurnCompleted,
    ArtifactCreated {
        artifact: Artifact,
    },
    ArtifactUpdated {
        artifact_id: Uuid,
        hash: String,
    },
    ChecklistItemCompleted {
        item_id: Uuid,
        evidence: String,
    },
    TestsPassed {
        coverage: Option<f64>,
    },
    TestsFailed {
        coverage: Option<f64>,
    },
    TypeCheckPassed,
    TypeCheckFailed {
        errors: Vec<String>,
    },
    ConfidenceUpdated {
        confidence: Confidence,
    },
    CheckpointCreated {
        summary: CheckpointSummary,
    },
    CheckpointApproved {
        checkpoint_id: Uuid,
    },
    CheckpointRejected {
        checkpoint_id: Uuid,
        reason: String,
    },
    ConvergenceReached {
        score: f64,
    },
    BudgetExhausted {
        phase: Phase,
        turns_used: u32,
    },
    ErrorOccurred {
        message: String,
        recoverable: bool,
    },
}

impl EventPayload {
    /// Snake-case kind tag, stored in the log's `kind` column and consulted
    /// by the snapshot policy.
    pub fn kind(&self) -> &'static str {
        match self {
            EventPayload::Initialized { .. } => "initialized",
            EventPayload::PhaseStarted { .. } => "phase_started",
            EventPayload::PhaseCompleted { .. } => "phase_completed",
            EventPayload::TurnStarted { .. } => "turn_started",
            EventPayload::TurnCompleted => "turn_completed",
            EventPayload::ArtifactCreated { .. } => "artifact_created",
            EventPayload::ArtifactUpdated { .. } => "artifact_updated",
            EventPayload::ChecklistItemCompleted { .. } => "checklist_item_completed",
            EventPayload::TestsPassed { .. } => "tests_passed",
            EventPayload::TestsFailed { .. } => "tests_failed",
            EventPayload::TypeCheckPassed => "type_check_passed",
            EventPayload::TypeCheckFailed { .. } => "type_check_failed",
            EventPayload::ConfidenceUpdated { .. } => "confidence_updated",
            EventPayload::CheckpointCreated { .. } => "checkpoint_created",
            EventPayload::CheckpointApproved { .. } => "checkpoint_approved",
            EventPayload::CheckpointRejected { .. } => "checkpoint_rejected",
            EventPayload::ConvergenceReached { .. } => "convergence_reached",
            EventPayload::BudgetExhausted { .. } => "budget_exhausted",
            EventPayload::ErrorOccurred { .. } => "error_occurred",
        }
    }
}

/// An event as read back from the store, with its assigned log index.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEvent {
    /// Monotonic position in the log. Assignment happens at append time,
    /// which is the linearization point for the whole system.
    pub index: i64,
    pub event: Event,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_kind_tags() {
        assert_eq!(EventPayload::TurnCompleted.kind(), "turn_completed");
        assert_eq!(
            EventPayload::TurnStarted { turn: 3 }.kind(),
            "turn_started"
        );
        assert_eq!(
            EventPayload::ConvergenceReached { score: 0.95 }.kind(),
            "convergence_reached"
        );
    }

    #[test]
    fn test_event_serde_roundtrip_revives_timestamp() {
        let event = Event::new(
            Utc::now(),
            EventPayload::TestsPassed {
                coverage: Some(91.5),
            },
        );
        let json = serde_json::to_string(&event).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
        assert_eq!(back.timestamp, event.timestamp);
    }

    #[test]
    fn test_payload_tagged_representation() {
        let json =
            serde_json::to_string(&EventPayload::TurnStarted { turn: 12 }).unwrap();
        assert_eq!(json, r#"{"type":"turn_started","data":{"turn":12}}"#);
    }
}
