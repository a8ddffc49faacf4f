//! Checkpoint port - the rendezvous with an external approver.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::models::CheckpointSummary;

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("Failed to emit checkpoint: {0}")]
    EmitFailed(String),
    #[error("Approval channel failed: {0}")]
    ApprovalFailed(String),
}

/// The approver's verdict on a checkpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct ApprovalDecision {
    pub approved: bool,
    pub reason: Option<String>,
}

impl ApprovalDecision {
    pub fn approved() -> Self {
        Self {
            approved: true,
            reason: None,
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            approved: false,
            reason: Some(reason.into()),
        }
    }
}

/// Trait for checkpoint transport implementations.
///
/// How the summary becomes externally visible (UI, webhook, queue) is the
/// adapter's business. `wait_for_approval` blocks until a verdict arrives;
/// the interpreter enforces the timeout and converts it into a rejection,
/// so adapters may block indefinitely.
#[async_trait]
pub trait CheckpointAdapter: Send + Sync {
    async fn emit_checkpoint(&self, summary: &CheckpointSummary) -> Result<(), CheckpointError>;

    async fn wait_for_approval(
        &self,
        checkpoint_id: Uuid,
    ) -> Result<ApprovalDecision, CheckpointError>;
}
