//! Mapping executed effects and commands onto events.
//!
//! Two small total functions sit between effect execution and the evolver.
//! `events_for_effect` converts a single `(effect, outcome)` pair using the
//! fixed conversion table (file writes become artifact events, test runs
//! and type checks become their pass/fail events, everything else maps to
//! nothing). `events_for_command` derives the command-level facts that no
//! single effect carries: initialization, turn accounting, phase
//! transitions, and the checkpoint protocol. The orchestrator stamps both
//! with the same clock reading so replay sees exactly what the live run
//! saw.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::models::{
    default_budgets, Artifact, Command, Effect, EffectOutcome, Event, EventPayload,
    ExecutedEffect, SessionState,
};
use crate::domain::prompts::parse_checklist_response;

/// The effect-level conversion table.
pub fn events_for_effect(
    effect: &Effect,
    outcome: &EffectOutcome,
    state: &SessionState,
    now: DateTime<Utc>,
) -> Vec<Event> {
    match (effect, outcome) {
        (Effect::WriteFile { .. }, EffectOutcome::FileWritten { path, hash }) => {
            vec![Event::new(now, artifact_event(state, path, hash, now))]
        }

        (Effect::RunTests { .. }, EffectOutcome::TestsRan(result)) => {
            let payload = if result.all_passed() {
                EventPayload::TestsPassed {
                    coverage: result.coverage,
                }
            } else {
                EventPayload::TestsFailed {
                    coverage: result.coverage,
                }
            };
            vec![Event::new(now, payload)]
        }

        (Effect::CheckTypes, EffectOutcome::TypesChecked { passed, errors }) => {
            let payload = if *passed {
                EventPayload::TypeCheckPassed
            } else {
                EventPayload::TypeCheckFailed {
                    errors: errors.clone(),
                }
            };
            vec![Event::new(now, payload)]
        }

        _ => Vec::new(),
    }
}

/// Command-level facts derived after a command's effects have executed.
pub fn events_for_command(
    command: &Command,
    executed: &[ExecutedEffect],
    state: &SessionState,
    now: DateTime<Utc>,
) -> Vec<Event> {
    match command {
        Command::Initialize { prompt } => {
            // Only a fresh session reaches the LLM; a duplicate initialize
            // produced a warning and nothing else.
            let Some(response) = first_llm_response(executed) else {
                return Vec::new();
            };
            let checklist = parse_checklist_response(&response.content);
            let budgets = default_budgets();
            let requirements_max = budgets
                .first()
                .map(|b| b.max_turns)
                .unwrap_or_default();

            vec![
                Event::new(
                    now,
                    EventPayload::Initialized {
                        prompt: prompt.clone(),
                        checklist,
                        budgets,
                    },
                ),
                Event::new(
                    now,
                    EventPayload::PhaseStarted {
                        phase: crate::domain::models::Phase::Requirements,
                        max_turns: requirements_max,
                    },
                ),
            ]
        }

        Command::StartTurn => {
            if first_llm_response(executed).is_some() {
                return vec![
                    Event::new(now, EventPayload::TurnStarted { turn: state.turn + 1 }),
                    Event::new(now, EventPayload::TurnCompleted),
                ];
            }
            if has_metric(executed, "budget_exhausted") {
                let turns_used = state
                    .budget_for(state.phase)
                    .map(|b| b.used_turns)
                    .unwrap_or_default();
                return vec![Event::new(
                    now,
                    EventPayload::BudgetExhausted {
                        phase: state.phase,
                        turns_used,
                    },
                )];
            }
            Vec::new()
        }

        Command::AdvancePhase => {
            if !has_metric(executed, "phase_completed") {
                return Vec::new();
            }
            let Some(next) = state.phase.next() else {
                return Vec::new();
            };
            let turns_used = state
                .budget_for(state.phase)
                .map(|b| b.used_turns)
                .unwrap_or_default();
            let next_max = state
                .budget_for(next)
                .map(|b| b.max_turns)
                .unwrap_or_default();

            vec![
                Event::new(
                    now,
                    EventPayload::PhaseCompleted {
                        phase: state.phase,
                        turns_used,
                    },
                ),
                Event::new(
                    now,
                    EventPayload::PhaseStarted {
                        phase: next,
                        max_turns: next_max,
                    },
                ),
            ]
        }

        // Artifact and test events for a processed response come from the
        // effect-level table.
        Command::ProcessLlmResponse { .. } => Vec::new(),

        Command::RecordArtifact { path, hash } => {
            vec![Event::new(now, artifact_event(state, path, hash, now))]
        }

        Command::RecordTestResult { result } => {
            let payload = if result.all_passed() {
                EventPayload::TestsPassed {
                    coverage: result.coverage,
                }
            } else {
                EventPayload::TestsFailed {
                    coverage: result.coverage,
                }
            };
            vec![Event::new(now, payload)]
        }

        Command::RecordTypeCheck { passed, errors } => {
            let payload = if *passed {
                EventPayload::TypeCheckPassed
            } else {
                EventPayload::TypeCheckFailed {
                    errors: errors.clone(),
                }
            };
            vec![Event::new(now, payload)]
        }

        Command::CompleteChecklistItem { item_id, evidence } => {
            // The decider already vetted the id; a warning-only decision
            // produced no metric and maps to no event.
            if !has_metric(executed, "checklist_item_completed") {
                return Vec::new();
            }
            vec![Event::new(
                now,
                EventPayload::ChecklistItemCompleted {
                    item_id: *item_id,
                    evidence: evidence.clone(),
                },
            )]
        }

        Command::RequestCheckpoint => {
            let mut events = Vec::new();
            for executed_effect in executed {
                match (&executed_effect.effect, &executed_effect.outcome) {
                    (
                        Effect::EmitCheckpoint { summary },
                        EffectOutcome::CheckpointEmitted { .. },
                    ) => {
                        events.push(Event::new(
                            now,
                            EventPayload::CheckpointCreated {
                                summary: summary.clone(),
                            },
                        ));
                    }
                    (
                        _,
                        EffectOutcome::ApprovalResolved {
                            checkpoint_id,
                            approved,
                            reason,
                        },
                    ) => {
                        let payload = if *approved {
                            EventPayload::CheckpointApproved {
                                checkpoint_id: *checkpoint_id,
                            }
                        } else {
                            EventPayload::CheckpointRejected {
                                checkpoint_id: *checkpoint_id,
                                reason: reason.clone().unwrap_or_else(|| "rejected".to_string()),
                            }
                        };
                        events.push(Event::new(now, payload));
                    }
                    _ => {}
                }
            }
            events
        }

        Command::ApproveCheckpoint => {
            let Some(pending) = &state.pending_checkpoint else {
                return Vec::new();
            };
            if !has_metric(executed, "checkpoint_approved") {
                return Vec::new();
            }
            vec![Event::new(
                now,
                EventPayload::CheckpointApproved {
                    checkpoint_id: pending.id,
                },
            )]
        }

        Command::RejectCheckpoint { reason } => {
            let Some(pending) = &state.pending_checkpoint else {
                return Vec::new();
            };
            if !has_metric(executed, "checkpoint_rejected") {
                return Vec::new();
            }
            vec![Event::new(
                now,
                EventPayload::CheckpointRejected {
                    checkpoint_id: pending.id,
                    reason: reason.clone(),
                },
            )]
        }

        // A phase timeout is observability only.
        Command::Timeout { .. } => Vec::new(),

        Command::Error {
            message,
            recoverable,
        } => vec![Event::new(
            now,
            EventPayload::ErrorOccurred {
                message: message.clone(),
                recoverable: *recoverable,
            },
        )],
    }
}

fn artifact_event(
    state: &SessionState,
    path: &str,
    hash: &str,
    now: DateTime<Utc>,
) -> EventPayload {
    match state.artifact_by_path(path) {
        Some(existing) => EventPayload::ArtifactUpdated {
            artifact_id: existing.id,
            hash: hash.to_string(),
        },
        None => EventPayload::ArtifactCreated {
            artifact: Artifact {
                id: Uuid::new_v4(),
                path: path.to_string(),
                hash: hash.to_string(),
                phase: state.phase,
                created_at: now,
                updated_at: now,
            },
        },
    }
}

fn first_llm_response(
    executed: &[ExecutedEffect],
) -> Option<&crate::domain::models::LlmResponse> {
    executed.iter().find_map(|e| match &e.outcome {
        EffectOutcome::LlmInvoked(response) => Some(response),
        _ => None,
    })
}

fn has_metric(executed: &[ExecutedEffect], name: &str) -> bool {
    executed.iter().any(|e| {
        matches!(&e.effect, Effect::RecordMetric { name: n, .. } if n == name)
    })
}
