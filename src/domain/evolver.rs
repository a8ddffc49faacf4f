//! The evolver: `(State, Event) -> State`.
//!
//! Pure, total, and non-blocking. One arm per event kind; every arm stamps
//! `last_activity_at` from the event envelope and never reads a clock, so
//! `replay` is reproducible bit-for-bit. Arms guard the state invariants
//! against impossible input (stale or replay-collided events): the turn
//! counter never decreases, the phase never regresses, checklist completion
//! is monotonic, and a checkpoint resolution with a mismatched id is a
//! no-op.

use crate::domain::models::{
    default_budgets, Event, EventPayload, Phase, SessionState, TurnBudget,
};

/// Apply one event to the state, producing the successor state.
pub fn evolve(mut state: SessionState, event: &Event) -> SessionState {
    state.last_activity_at = event.timestamp;

    match &event.payload {
        EventPayload::Initialized {
            prompt,
            checklist,
            budgets,
        } => {
            state.prompt = prompt.clone();
            state.checklist = checklist.clone();
            state.budgets = normalize_budgets(budgets);
            state.phase = forward_only(state.phase, Phase::Requirements);
            state.started_at = event.timestamp;
        }

        EventPayload::PhaseStarted { phase, max_turns } => {
            state.phase = forward_only(state.phase, *phase);
            if let Some(budget) = state.budget_for_mut(*phase) {
                *budget = TurnBudget::new(*phase, *max_turns);
            }
        }

        EventPayload::PhaseCompleted { phase, turns_used } => {
            if let Some(budget) = state.budget_for_mut(*phase) {
                budget.used_turns = (*turns_used).min(budget.max_turns);
            }
            if let Some(next) = phase.next() {
                state.phase = forward_only(state.phase, next);
            }
        }

        EventPayload::TurnStarted { turn } => {
            // The authoritative counter lives in events; an older value from
            // a replay collision never rolls the state back.
            state.turn = state.turn.max(*turn);
        }

        EventPayload::TurnCompleted => {
            let phase = state.phase;
            if let Some(budget) = state.budget_for_mut(phase) {
                budget.used_turns = (budget.used_turns + 1).min(budget.max_turns);
            }
        }

        EventPayload::ArtifactCreated { artifact } => {
            if state.artifact_by_path(&artifact.path).is_none() {
                state.artifacts.push(artifact.clone());
            }
        }

        EventPayload::ArtifactUpdated { artifact_id, hash } => {
            let timestamp = event.timestamp;
            if let Some(artifact) = state.artifacts.iter_mut().find(|a| a.id == *artifact_id) {
                artifact.hash = hash.clone();
                artifact.updated_at = timestamp;
            }
        }

        EventPayload::ChecklistItemCompleted { item_id, evidence } => {
            let timestamp = event.timestamp;
            if let Some(item) = state.checklist.iter_mut().find(|i| i.id == *item_id) {
                if !item.completed {
                    item.completed = true;
                    item.evidence = Some(evidence.clone());
                    item.completed_at = Some(timestamp);
                }
            }
            state.confidence.checklist_complete =
                !state.checklist.is_empty() && state.checklist.iter().all(|i| i.completed);
            state.confidence.recompute();
        }

        EventPayload::TestsPassed { coverage } => {
            state.confidence.tests_pass = true;
            if let Some(coverage) = coverage {
                state.confidence.coverage = *coverage;
            }
            state.convergence_streak += 1;
            state.confidence.recompute();
            state.converged = state.converged || state.has_converged();
        }

        EventPayload::TestsFailed { coverage } => {
            state.confidence.tests_pass = false;
            if let Some(coverage) = coverage {
                state.confidence.coverage = *coverage;
            }
            state.convergence_streak = 0;
            state.confidence.recompute();
        }

        EventPayload::TypeCheckPassed => {
            state.confidence.types_safe = true;
            state.confidence.recompute();
        }

        EventPayload::TypeCheckFailed { .. } => {
            state.confidence.types_safe = false;
            state.convergence_streak = 0;
            state.confidence.recompute();
        }

        EventPayload::ConfidenceUpdated { confidence } => {
            state.confidence = confidence.clone();
            state.converged = state.converged || state.has_converged();
        }

        EventPayload::CheckpointCreated { summary } => {
            state.pending_checkpoint = Some(summary.clone());
        }

        EventPayload::CheckpointApproved { checkpoint_id } => {
            if state
                .pending_checkpoint
                .as_ref()
                .is_some_and(|p| p.id == *checkpoint_id)
            {
                state.last_approved_checkpoint = state.pending_checkpoint.take();
            }
        }

        EventPayload::CheckpointRejected { checkpoint_id, .. } => {
            if state
                .pending_checkpoint
                .as_ref()
                .is_some_and(|p| p.id == *checkpoint_id)
            {
                state.pending_checkpoint = None;
            }
        }

        EventPayload::ConvergenceReached { score } => {
            state.converged = true;
            state.confidence.overall_score = *score;
        }

        EventPayload::BudgetExhausted { phase, turns_used } => {
            if let Some(budget) = state.budget_for_mut(*phase) {
                budget.used_turns = (*turns_used).min(budget.max_turns);
            }
        }

        EventPayload::ErrorOccurred { .. } => {
            // Only the activity timestamp moves.
        }
    }

    state
}

/// Fold a sequence of events over an initial state.
pub fn replay<'a, I>(initial: SessionState, events: I) -> SessionState
where
    I: IntoIterator<Item = &'a Event>,
{
    events.into_iter().fold(initial, evolve)
}

/// Fold only the first `k` events.
pub fn replay_until(initial: SessionState, events: &[Event], k: usize) -> SessionState {
    replay(initial, events.iter().take(k))
}

fn forward_only(current: Phase, target: Phase) -> Phase {
    if target.index() >= current.index() {
        target
    } else {
        current
    }
}

/// Exactly one budget entry per phase, in order; entries the event omitted
/// fall back to defaults, duplicates beyond the first are dropped.
fn normalize_budgets(from_event: &[TurnBudget]) -> Vec<TurnBudget> {
    default_budgets()
        .into_iter()
        .map(|default| {
            from_event
                .iter()
                .find(|b| b.phase == default.phase)
                .cloned()
                .unwrap_or(default)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{Artifact, CheckpointSummary, ChecklistItem, Confidence};
    use chrono::Utc;
    use uuid::Uuid;

    fn at_now(payload: EventPayload) -> Event {
        Event::new(Utc::now(), payload)
    }

    fn green_confidence() -> Confidence {
        Confidence {
            types_safe: true,
            schema_valid: true,
            tests_pass: true,
            coverage: 95.0,
            checklist_complete: true,
            overall_score: 1.0,
        }
    }

    // -- Universal invariants ------------------------------------------------

    #[test]
    fn test_every_event_preserves_one_budget_per_phase() {
        let state = SessionState::initial("p");
        let samples = vec![
            at_now(EventPayload::Initialized {
                prompt: "p".into(),
                checklist: vec![],
                budgets: vec![TurnBudget::new(Phase::Design, 2)],
            }),
            at_now(EventPayload::PhaseStarted {
                phase: Phase::Design,
                max_turns: 9,
            }),
            at_now(EventPayload::PhaseCompleted {
                phase: Phase::Design,
                turns_used: 4,
            }),
            at_now(EventPayload::TurnCompleted),
            at_now(EventPayload::BudgetExhausted {
                phase: Phase::Testing,
                turns_used: 30,
            }),
        ];

        let mut current = state;
        for event in &samples {
            current = evolve(current, event);
            for phase in Phase::ORDER {
                assert_eq!(
                    current.budgets.iter().filter(|b| b.phase == phase).count(),
                    1,
                    "phase {phase} lost its single budget entry"
                );
            }
        }
    }

    #[test]
    fn test_turn_is_monotonic() {
        let mut state = SessionState::initial("p");
        state.turn = 10;
        let next = evolve(state, &at_now(EventPayload::TurnStarted { turn: 4 }));
        assert_eq!(next.turn, 10);

        let next = evolve(next, &at_now(EventPayload::TurnStarted { turn: 12 }));
        assert_eq!(next.turn, 12);
    }

    #[test]
    fn test_phase_never_regresses() {
        let mut state = SessionState::initial("p");
        state.phase = Phase::Testing;
        let next = evolve(
            state,
            &at_now(EventPayload::PhaseStarted {
                phase: Phase::Design,
                max_turns: 5,
            }),
        );
        assert_eq!(next.phase, Phase::Testing);
    }

    // -- Convergence arithmetic ----------------------------------------------

    #[test]
    fn test_convergence_in_three_ticks() {
        let mut state = SessionState::initial("p");
        state.confidence = Confidence {
            types_safe: true,
            schema_valid: true,
            tests_pass: false,
            coverage: 95.0,
            checklist_complete: true,
            overall_score: 0.0,
        };
        state.convergence_streak = 0;

        for i in 1..=3u32 {
            state = evolve(
                state,
                &at_now(EventPayload::TestsPassed {
                    coverage: Some(95.0),
                }),
            );
            assert_eq!(state.convergence_streak, i);
            if i < 3 {
                assert!(!state.converged, "converged too early at streak {i}");
            }
        }

        assert!((state.confidence.overall_score - 1.0).abs() < f64::EPSILON);
        assert!(state.converged);
    }

    #[test]
    fn test_failure_resets_streak() {
        let mut state = SessionState::initial("p");
        state.confidence = green_confidence();
        state.convergence_streak = 2;

        let next = evolve(state, &at_now(EventPayload::TestsFailed { coverage: None }));
        assert_eq!(next.convergence_streak, 0);
        assert!(!next.confidence.tests_pass);
        assert!(next.confidence.overall_score <= 0.3);
    }

    #[test]
    fn test_type_check_failure_resets_streak() {
        let mut state = SessionState::initial("p");
        state.confidence = green_confidence();
        state.convergence_streak = 2;

        let next = evolve(
            state,
            &at_now(EventPayload::TypeCheckFailed {
                errors: vec!["e".into()],
            }),
        );
        assert_eq!(next.convergence_streak, 0);
        assert!(!next.confidence.types_safe);
        assert_eq!(next.confidence.overall_score, 0.0);
    }

    #[test]
    fn test_converged_implies_score_and_streak() {
        // Drive a state to convergence through events only, then check the
        // implication holds.
        let mut state = SessionState::initial("p");
        state.confidence.checklist_complete = true;
        state = evolve(state, &at_now(EventPayload::TypeCheckPassed));
        for _ in 0..3 {
            state = evolve(
                state,
                &at_now(EventPayload::TestsPassed {
                    coverage: Some(95.0),
                }),
            );
        }
        assert!(state.converged);
        assert!(crate::domain::models::overall_score(&state.confidence) >= 0.9);
        assert!(state.convergence_streak >= 3);
    }

    // -- Initialization ------------------------------------------------------

    #[test]
    fn test_initialized_sets_session_fields() {
        let state = SessionState::initial("");
        let checklist = vec![ChecklistItem::new(Phase::Requirements, "collect")];
        let event = at_now(EventPayload::Initialized {
            prompt: "hello".into(),
            checklist: checklist.clone(),
            budgets: default_budgets(),
        });

        let next = evolve(state, &event);
        assert_eq!(next.prompt, "hello");
        assert_eq!(next.phase, Phase::Requirements);
        assert_eq!(next.turn, 0);
        assert_eq!(next.checklist, checklist);
        assert_eq!(next.budgets.len(), 6);
        assert_eq!(next.started_at, event.timestamp);
    }

    #[test]
    fn test_initialized_normalizes_partial_budgets() {
        let state = SessionState::initial("");
        let next = evolve(
            state,
            &at_now(EventPayload::Initialized {
                prompt: "p".into(),
                checklist: vec![],
                budgets: vec![TurnBudget::new(Phase::Implementation, 99)],
            }),
        );
        assert_eq!(next.budgets.len(), 6);
        assert_eq!(next.budget_for(Phase::Implementation).unwrap().max_turns, 99);
    }

    // -- Budgets and turns ---------------------------------------------------

    #[test]
    fn test_turn_completed_increments_current_phase_budget() {
        let state = SessionState::initial("p");
        let next = evolve(state, &at_now(EventPayload::TurnCompleted));
        assert_eq!(next.budget_for(Phase::Requirements).unwrap().used_turns, 1);
    }

    #[test]
    fn test_turn_completed_saturates_at_max() {
        let mut state = SessionState::initial("p");
        state.budget_for_mut(Phase::Requirements).unwrap().max_turns = 1;
        state.budget_for_mut(Phase::Requirements).unwrap().used_turns = 1;

        let next = evolve(state, &at_now(EventPayload::TurnCompleted));
        let budget = next.budget_for(Phase::Requirements).unwrap();
        assert_eq!(budget.used_turns, budget.max_turns);
    }

    #[test]
    fn test_phase_completed_records_usage_and_advances() {
        let state = SessionState::initial("p");
        let next = evolve(
            state,
            &at_now(EventPayload::PhaseCompleted {
                phase: Phase::Requirements,
                turns_used: 7,
            }),
        );
        assert_eq!(next.phase, Phase::Design);
        assert_eq!(next.budget_for(Phase::Requirements).unwrap().used_turns, 7);
    }

    #[test]
    fn test_phase_completed_at_terminal_stays() {
        let mut state = SessionState::initial("p");
        state.phase = Phase::Verification;
        let next = evolve(
            state,
            &at_now(EventPayload::PhaseCompleted {
                phase: Phase::Verification,
                turns_used: 2,
            }),
        );
        assert_eq!(next.phase, Phase::Verification);
    }

    // -- Artifacts and checklist ---------------------------------------------

    #[test]
    fn test_artifact_lifecycle() {
        let now = Utc::now();
        let artifact = Artifact {
            id: Uuid::new_v4(),
            path: "src/lib.rs".into(),
            hash: "aa".into(),
            phase: Phase::Implementation,
            created_at: now,
            updated_at: now,
        };

        let state = SessionState::initial("p");
        let state = evolve(
            state,
            &at_now(EventPayload::ArtifactCreated {
                artifact: artifact.clone(),
            }),
        );
        assert_eq!(state.artifacts.len(), 1);

        let update = at_now(EventPayload::ArtifactUpdated {
            artifact_id: artifact.id,
            hash: "bb".into(),
        });
        let state = evolve(state, &update);
        assert_eq!(state.artifacts[0].hash, "bb");
        assert_eq!(state.artifacts[0].updated_at, update.timestamp);
    }

    #[test]
    fn test_artifact_update_unknown_id_is_noop() {
        let state = SessionState::initial("p");
        let next = evolve(
            state.clone(),
            &at_now(EventPayload::ArtifactUpdated {
                artifact_id: Uuid::new_v4(),
                hash: "bb".into(),
            }),
        );
        assert_eq!(next.artifacts, state.artifacts);
    }

    #[test]
    fn test_checklist_completion_is_monotonic_and_updates_confidence() {
        let mut state = SessionState::initial("p");
        let item = ChecklistItem::new(Phase::Requirements, "only one");
        let id = item.id;
        state.checklist.push(item);

        let event = at_now(EventPayload::ChecklistItemCompleted {
            item_id: id,
            evidence: "done in doc".into(),
        });
        let state = evolve(state, &event);
        assert!(state.checklist[0].completed);
        assert_eq!(state.checklist[0].evidence.as_deref(), Some("done in doc"));
        assert_eq!(state.checklist[0].completed_at, Some(event.timestamp));
        assert!(state.confidence.checklist_complete);

        // A second completion for the same id does not overwrite evidence.
        let again = evolve(
            state.clone(),
            &at_now(EventPayload::ChecklistItemCompleted {
                item_id: id,
                evidence: "other".into(),
            }),
        );
        assert_eq!(again.checklist[0].evidence.as_deref(), Some("done in doc"));
    }

    // -- Checkpoints ---------------------------------------------------------

    fn pending_checkpoint_state() -> (SessionState, CheckpointSummary) {
        let mut state = SessionState::initial("p");
        let summary = state.checkpoint_summary(Utc::now());
        state.pending_checkpoint = Some(summary.clone());
        (state, summary)
    }

    #[test]
    fn test_checkpoint_approval_moves_pending() {
        let (state, summary) = pending_checkpoint_state();
        let next = evolve(
            state,
            &at_now(EventPayload::CheckpointApproved {
                checkpoint_id: summary.id,
            }),
        );
        assert!(next.pending_checkpoint.is_none());
        assert_eq!(next.last_approved_checkpoint.as_ref().map(|c| c.id), Some(summary.id));
    }

    #[test]
    fn test_checkpoint_approval_id_mismatch_is_noop() {
        let (state, _) = pending_checkpoint_state();
        let next = evolve(
            state.clone(),
            &at_now(EventPayload::CheckpointApproved {
                checkpoint_id: Uuid::new_v4(),
            }),
        );
        assert_eq!(next.pending_checkpoint, state.pending_checkpoint);
        assert!(next.last_approved_checkpoint.is_none());
    }

    #[test]
    fn test_double_approval_is_idempotent() {
        let (state, summary) = pending_checkpoint_state();
        let approve = at_now(EventPayload::CheckpointApproved {
            checkpoint_id: summary.id,
        });
        let once = evolve(state, &approve);
        let twice = evolve(once.clone(), &approve);
        assert_eq!(twice, once);
    }

    #[test]
    fn test_checkpoint_rejection_clears_pending() {
        let (state, summary) = pending_checkpoint_state();
        let next = evolve(
            state,
            &at_now(EventPayload::CheckpointRejected {
                checkpoint_id: summary.id,
                reason: "timeout".into(),
            }),
        );
        assert!(next.pending_checkpoint.is_none());
        assert!(next.last_approved_checkpoint.is_none());
    }

    // -- Replay --------------------------------------------------------------

    #[test]
    fn test_replay_is_deterministic() {
        let events: Vec<Event> = vec![
            at_now(EventPayload::Initialized {
                prompt: "p".into(),
                checklist: vec![ChecklistItem::new(Phase::Requirements, "a")],
                budgets: default_budgets(),
            }),
            at_now(EventPayload::TurnStarted { turn: 1 }),
            at_now(EventPayload::TurnCompleted),
            at_now(EventPayload::TypeCheckPassed),
            at_now(EventPayload::TestsPassed {
                coverage: Some(80.0),
            }),
        ];

        let a = replay(SessionState::initial("p"), &events);
        let b = replay(SessionState::initial("p"), &events);
        assert_eq!(a, b);
    }

    #[test]
    fn test_replay_split_equals_whole() {
        let events: Vec<Event> = vec![
            at_now(EventPayload::TurnStarted { turn: 1 }),
            at_now(EventPayload::TurnCompleted),
            at_now(EventPayload::TypeCheckPassed),
            at_now(EventPayload::TestsPassed { coverage: None }),
            at_now(EventPayload::TurnStarted { turn: 2 }),
        ];

        for split in 0..=events.len() {
            let head = replay_until(SessionState::initial("p"), &events, split);
            let whole = replay(head, events.iter().skip(split));
            assert_eq!(whole, replay(SessionState::initial("p"), &events));
        }
    }
}
