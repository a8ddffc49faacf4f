//! Session aggregate: checklist, artifacts, budgets, checkpoints, state.
//!
//! The event log owns the canonical history; a [`SessionState`] is always a
//! derivation of it and can be rebuilt by replay. The orchestrator holds
//! exactly one state value at a time and mutates by replacement.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::confidence::{overall_score, Confidence};
use super::phase::Phase;

/// Score threshold and streak length required to declare convergence.
pub const CONVERGENCE_SCORE_THRESHOLD: f64 = 0.9;
pub const CONVERGENCE_STREAK_REQUIRED: u32 = 3;

/// A single verifiable item of work, owned by a phase.
///
/// Items are created only at initialization and completion is monotonic:
/// once completed, an item stays completed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChecklistItem {
    pub id: Uuid,
    pub phase: Phase,
    pub description: String,
    pub completed: bool,
    pub evidence: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ChecklistItem {
    pub fn new(phase: Phase, description: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            phase,
            description: description.into(),
            completed: false,
            evidence: None,
            completed_at: None,
        }
    }
}

/// A file the session has produced, identified for lookup by its path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: Uuid,
    /// Path relative to the session work directory.
    pub path: String,
    /// SHA-256 of the content, lowercase hex.
    pub hash: String,
    pub phase: Phase,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Per-phase turn allowance. `used_turns <= max_turns` always holds;
/// equality is budget exhaustion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnBudget {
    pub phase: Phase,
    pub max_turns: u32,
    pub used_turns: u32,
}

impl TurnBudget {
    pub fn new(phase: Phase, max_turns: u32) -> Self {
        Self {
            phase,
            max_turns,
            used_turns: 0,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.used_turns >= self.max_turns
    }
}

/// Default turn allowance per phase, used when the caller does not override.
pub fn default_budgets() -> Vec<TurnBudget> {
    Phase::ORDER
        .iter()
        .map(|&phase| {
            let max_turns = match phase {
                Phase::Requirements => 10,
                Phase::Design => 15,
                Phase::Implementation => 40,
                Phase::Testing => 30,
                Phase::Documentation => 10,
                Phase::Verification => 15,
            };
            TurnBudget::new(phase, max_turns)
        })
        .collect()
}

/// Progress summary handed to the external approver at a checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointSummary {
    pub id: Uuid,
    pub phase: Phase,
    pub turn: u64,
    pub checklist_completed: usize,
    pub checklist_total: usize,
    pub artifact_count: usize,
    pub confidence_score: f64,
    pub created_at: DateTime<Utc>,
}

/// The session aggregate.
///
/// Invariants maintained by the evolver:
/// - `turn` is monotonically non-decreasing.
/// - `budgets` holds exactly one entry per phase, in [`Phase::ORDER`] order.
/// - `phase` never regresses.
/// - checklist completion is monotonic.
/// - `converged` implies `overall_score >= 0.9` and `convergence_streak >= 3`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub phase: Phase,
    pub turn: u64,
    pub prompt: String,
    pub checklist: Vec<ChecklistItem>,
    pub artifacts: Vec<Artifact>,
    pub budgets: Vec<TurnBudget>,
    pub confidence: Confidence,
    pub pending_checkpoint: Option<CheckpointSummary>,
    pub last_approved_checkpoint: Option<CheckpointSummary>,
    pub convergence_streak: u32,
    pub converged: bool,
    pub started_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}

impl SessionState {
    /// The state a session starts from before any event has been applied.
    ///
    /// Timestamps are pinned to the epoch so that replay from an empty log
    /// is reproducible; the `Initialized` event supplies the real
    /// `started_at`.
    pub fn initial(prompt: impl Into<String>) -> Self {
        let epoch = DateTime::<Utc>::from_timestamp(0, 0).unwrap_or_default();
        Self {
            phase: Phase::Requirements,
            turn: 0,
            prompt: prompt.into(),
            checklist: Vec::new(),
            artifacts: Vec::new(),
            budgets: default_budgets(),
            confidence: Confidence::default(),
            pending_checkpoint: None,
            last_approved_checkpoint: None,
            convergence_streak: 0,
            converged: false,
            started_at: epoch,
            last_activity_at: epoch,
        }
    }

    /// Terminal success condition: score at or above the threshold sustained
    /// for three consecutive green signals. A single flaky pass never
    /// converges a session.
    pub fn has_converged(&self) -> bool {
        overall_score(&self.confidence) >= CONVERGENCE_SCORE_THRESHOLD
            && self.convergence_streak >= CONVERGENCE_STREAK_REQUIRED
    }

    /// The budget entry for a phase. Every state carries one entry per
    /// phase, so this only returns `None` on a corrupted state.
    pub fn budget_for(&self, phase: Phase) -> Option<&TurnBudget> {
        self.budgets.iter().find(|b| b.phase == phase)
    }

    pub fn budget_for_mut(&mut self, phase: Phase) -> Option<&mut TurnBudget> {
        self.budgets.iter_mut().find(|b| b.phase == phase)
    }

    /// Checklist items owned by the given phase.
    pub fn checklist_for(&self, phase: Phase) -> impl Iterator<Item = &ChecklistItem> {
        self.checklist.iter().filter(move |i| i.phase == phase)
    }

    /// Whether the phase has at least one item and all of them are done.
    pub fn phase_checklist_complete(&self, phase: Phase) -> bool {
        let mut any = false;
        for item in self.checklist_for(phase) {
            any = true;
            if !item.completed {
                return false;
            }
        }
        any
    }

    /// Artifact lookup by session-relative path.
    pub fn artifact_by_path(&self, path: &str) -> Option<&Artifact> {
        self.artifacts.iter().find(|a| a.path == path)
    }

    /// Artifacts produced while in the given phase.
    pub fn artifacts_for(&self, phase: Phase) -> impl Iterator<Item = &Artifact> {
        self.artifacts.iter().filter(move |a| a.phase == phase)
    }

    /// Build a checkpoint summary of the current progress.
    pub fn checkpoint_summary(&self, now: DateTime<Utc>) -> CheckpointSummary {
        CheckpointSummary {
            id: Uuid::new_v4(),
            phase: self.phase,
            turn: self.turn,
            checklist_completed: self.checklist.iter().filter(|i| i.completed).count(),
            checklist_total: self.checklist.len(),
            artifact_count: self.artifacts.len(),
            confidence_score: overall_score(&self.confidence),
            created_at: now,
        }
    }
}
