//! Commands - intents fed to the decider.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::effect::{LlmResponse, TestResult};
use super::phase::Phase;

/// An intent the orchestrator (or an external caller) wants acted upon.
///
/// Commands never mutate state themselves; the decider translates them
/// into effect descriptions and the mapping layer turns execution results
/// into events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Command {
    Initialize {
        prompt: String,
    },
    AdvancePhase,
    StartTurn,
    ProcessLlmResponse {
        response: LlmResponse,
    },
    RecordArtifact {
        path: String,
        hash: String,
    },
    RecordTestResult {
        result: TestResult,
    },
    RecordTypeCheck {
        passed: bool,
        errors: Vec<String>,
    },
    CompleteChecklistItem {
        item_id: Uuid,
        evidence: String,
    },
    RequestCheckpoint,
    ApproveCheckpoint,
    RejectCheckpoint {
        reason: String,
    },
    Timeout {
        phase: Phase,
    },
    Error {
        message: String,
        recoverable: bool,
    },
}

impl Command {
    pub fn kind(&self) -> &'static str {
        match self {
            Command::Initialize { .. } => "initialize",
            Command::AdvancePhase => "advance_phase",
            Command::StartTurn => "start_turn",
            Command::ProcessLlmResponse { .. } => "process_llm_response",
            Command::RecordArtifact { .. } => "record_artifact",
            Command::RecordTestResult { .. } => "record_test_result",
            Command::RecordTypeCheck { .. } => "record_type_check",
            Command::CompleteChecklistItem { .. } => "complete_checklist_item",
            Command::RequestCheckpoint => "request_checkpoint",
            Command::ApproveCheckpoint => "approve_checkpoint",
            Command::RejectCheckpoint { .. } => "reject_checkpoint",
            Command::Timeout { .. } => "timeout",
            Command::Error { .. } => "error",
        }
    }
}
