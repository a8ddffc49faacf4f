//! The orchestrator loop - the outermost imperative shell.
//!
//! One session, one logical executor, strictly serial: each iteration
//! issues a command, the decider names the effects, the interpreter runs
//! them in order, the mapping layer derives events, and every event is
//! applied through the evolver and appended to the log before the next
//! command starts. The log is the source of truth; abrupt termination is
//! safe and `try_resume` reconstructs the state from the latest snapshot
//! plus the events after it.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use thiserror::Error;

use crate::domain::decider::decide;
use crate::domain::evolver::evolve;
use crate::domain::models::{
    overall_score, Command, Effect, EffectOutcome, Event, EventPayload, ExecutedEffect,
    LlmResponse, LogLevel, Phase, SessionState, SpanStatus,
};
use crate::domain::ports::{
    CheckpointAdapter, EventStore, EventStoreError, LlmAdapter, Telemetry, Toolchain,
};
use crate::services::config::OrchestratorConfig;
use crate::services::event_mapper::{events_for_command, events_for_effect};
use crate::services::interpreter::{EffectInterpreter, InterpreterError};
use crate::services::snapshot::should_snapshot;

/// Consecutive failed iterations tolerated before the loop gives up.
const MAX_CONSECUTIVE_FAILURES: u32 = 10;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Store(#[from] EventStoreError),

    /// An error that could not be contained to its command, i.e. the event
    /// log itself failed while recording the failure.
    #[error("Failed to record error event: {0}")]
    Unrecoverable(String),
}

/// Caller-facing options for a session run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Root directory the session owns; all file effects resolve below it.
    pub work_dir: PathBuf,
    /// The original task prompt.
    pub prompt: String,
    /// Override for the global turn ceiling.
    pub max_turns: Option<u64>,
    /// Event database location; `None` means `<work_dir>/turbine.db`.
    pub db_path: Option<PathBuf>,
}

/// The adapter set a session runs against.
pub struct Adapters {
    pub llm: Arc<dyn LlmAdapter>,
    pub telemetry: Arc<dyn Telemetry>,
    pub store: Arc<dyn EventStore>,
    pub checkpoint: Arc<dyn CheckpointAdapter>,
    pub toolchain: Arc<dyn Toolchain>,
}

/// Observer invoked after each loop iteration.
pub type ProgressCallback = Box<dyn Fn(&SessionState, Option<&Event>) + Send + Sync>;

/// Aggregated result of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub converged: bool,
    pub final_score: f64,
    pub phase: Phase,
    pub turns: u64,
    pub events_persisted: u64,
    pub errors: u64,
    pub warnings: u64,
}

/// Final state plus summary, returned by [`Orchestrator::run`].
pub struct RunOutcome {
    pub state: SessionState,
    pub summary: RunSummary,
}

/// Result of handling one command.
struct CommandResult {
    executed: Vec<ExecutedEffect>,
    events: Vec<Event>,
}

pub struct Orchestrator {
    prompt: String,
    settings: OrchestratorConfig,
    interpreter: EffectInterpreter,
    store: Arc<dyn EventStore>,
    telemetry: Arc<dyn Telemetry>,
    state: SessionState,
    last_event: Option<Event>,
    on_progress: Option<ProgressCallback>,
    events_persisted: u64,
    errors: u64,
    warnings: u64,
}

impl Orchestrator {
    pub fn new(options: RunOptions, adapters: Adapters) -> Self {
        let mut settings = OrchestratorConfig::default();
        if let Some(max_turns) = options.max_turns {
            settings.max_turns = max_turns;
        }
        let interpreter = EffectInterpreter::new(
            options.work_dir.clone(),
            adapters.llm,
            adapters.telemetry.clone(),
            adapters.store.clone(),
            adapters.checkpoint,
            adapters.toolchain,
        );
        let state = SessionState::initial(&options.prompt);

        Self {
            prompt: options.prompt,
            settings,
            interpreter,
            store: adapters.store,
            telemetry: adapters.telemetry,
            state,
            last_event: None,
            on_progress: None,
            events_persisted: 0,
            errors: 0,
            warnings: 0,
        }
    }

    pub fn with_settings(mut self, settings: OrchestratorConfig) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.on_progress = Some(callback);
        self
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Feed an externally-originated command (recorded test results,
    /// checklist completions, checkpoint verdicts) through the same
    /// decide/execute/map cycle the loop uses.
    pub async fn submit(&mut self, command: Command) -> Result<(), OrchestratorError> {
        self.handle_command(command).await.map(|_| ())
    }

    /// Drive the session until it converges, exhausts its budget, or hits
    /// the turn ceiling.
    pub async fn run(&mut self) -> Result<RunOutcome, OrchestratorError> {
        self.try_resume().await?;

        if self.state.turn == 0 {
            let initialize = Command::Initialize {
                prompt: self.prompt.clone(),
            };
            self.handle_command(initialize).await?;
        }

        let mut consecutive_failures: u32 = 0;
        while !self.should_stop() {
            let phase_before = self.state.phase;
            let turn_before = self.state.turn;
            let result = self.handle_command(Command::StartTurn).await?;

            // Adapter errors are contained per command and retried on the
            // next iteration, but a backend that fails every time would
            // otherwise spin without ever moving the turn counter.
            let errored = result
                .events
                .iter()
                .any(|e| matches!(e.payload, EventPayload::ErrorOccurred { .. }));
            if errored {
                consecutive_failures += 1;
                if consecutive_failures >= MAX_CONSECUTIVE_FAILURES {
                    self.telemetry.log(
                        LogLevel::Error,
                        "halting: too many consecutive command failures",
                        &json!({ "failures": consecutive_failures }),
                    );
                    break;
                }
                continue;
            }
            consecutive_failures = 0;

            // A turn's LLM reply is processed as its own command so file
            // writes, test runs, and type checks flow through the same
            // decide/execute/map cycle.
            if let Some(response) = first_llm_response(&result.executed) {
                let response = response.clone();
                self.handle_command(Command::ProcessLlmResponse { response })
                    .await?;
            }

            let budget_exhausted = result
                .events
                .iter()
                .any(|e| matches!(e.payload, EventPayload::BudgetExhausted { .. }));

            if self.state.turn > turn_before
                && self.settings.checkpoint_interval > 0
                && self.state.turn % self.settings.checkpoint_interval == 0
            {
                self.handle_command(Command::RequestCheckpoint).await?;
            }

            if self.state.phase_checklist_complete(self.state.phase) {
                self.handle_command(Command::AdvancePhase).await?;
            }

            if budget_exhausted && self.state.phase == phase_before {
                // The phase can neither spend turns nor hand over to the
                // next one; the session halts and the log records why.
                self.telemetry.log(
                    LogLevel::Warn,
                    "halting: turn budget exhausted",
                    &json!({ "phase": self.state.phase.as_str() }),
                );
                self.warnings += 1;
                break;
            }

            if let Some(callback) = &self.on_progress {
                callback(&self.state, self.last_event.as_ref());
            }
        }

        self.store
            .set_metadata("session.turns", &self.state.turn.to_string())
            .await?;

        Ok(RunOutcome {
            state: self.state.clone(),
            summary: self.summary(),
        })
    }

    fn should_stop(&self) -> bool {
        self.state.has_converged()
            || self.state.turn >= self.settings.max_turns
            || self.state.converged
    }

    fn summary(&self) -> RunSummary {
        RunSummary {
            converged: self.state.converged,
            final_score: overall_score(&self.state.confidence),
            phase: self.state.phase,
            turns: self.state.turn,
            events_persisted: self.events_persisted,
            errors: self.errors,
            warnings: self.warnings,
        }
    }

    /// Restore state from the latest snapshot plus the events after it.
    async fn try_resume(&mut self) -> Result<(), OrchestratorError> {
        let (mut state, from) = match self.store.latest_snapshot().await? {
            Some(snapshot) => (snapshot.state, snapshot.at_event_index + 1),
            None => (SessionState::initial(&self.prompt), 1),
        };

        let events = self.store.get_events(Some(from), None).await?;
        let replayed = events.len();
        for stored in &events {
            state = evolve(state, &stored.event);
        }
        self.state = state;

        if replayed > 0 || from > 1 {
            self.telemetry.log(
                LogLevel::Info,
                "session resumed from log",
                &json!({ "replayed_events": replayed, "turn": self.state.turn }),
            );
        }
        self.store
            .set_metadata("session.prompt", &self.prompt)
            .await?;
        Ok(())
    }

    /// Run one command through decide -> execute -> map -> evolve+persist.
    ///
    /// Adapter failures are contained here: the batch is abandoned and a
    /// recoverable `ErrorOccurred` event is persisted in its place, so a
    /// restart replays to the same position.
    async fn handle_command(
        &mut self,
        command: Command,
    ) -> Result<CommandResult, OrchestratorError> {
        let now = Utc::now();
        let effects = decide(&command, &self.state, now);

        let executed = match self.interpreter.execute_all(&effects).await {
            Ok(executed) => executed,
            Err(error) => {
                return self.contain_error(&command, error).await;
            }
        };

        self.count_log_levels(&executed);

        let mut events = Vec::new();
        for executed_effect in &executed {
            let derived = events_for_effect(
                &executed_effect.effect,
                &executed_effect.outcome,
                &self.state,
                now,
            );
            for event in derived {
                self.apply_and_persist(&event).await?;
                events.push(event);
            }
        }
        let derived = events_for_command(&command, &executed, &self.state, now);
        for event in derived {
            self.apply_and_persist(&event).await?;
            events.push(event);
        }

        self.close_spans(&executed).await;

        Ok(CommandResult { executed, events })
    }

    /// Persist a recoverable error as an event; only a failure of the log
    /// itself escalates.
    async fn contain_error(
        &mut self,
        command: &Command,
        error: InterpreterError,
    ) -> Result<CommandResult, OrchestratorError> {
        self.errors += 1;
        self.telemetry.log(
            LogLevel::Error,
            &format!("command {} failed: {error}", command.kind()),
            &json!({ "command": command.kind() }),
        );

        let event = Event::new(
            Utc::now(),
            EventPayload::ErrorOccurred {
                message: error.to_string(),
                recoverable: true,
            },
        );
        self.apply_and_persist(&event)
            .await
            .map_err(|e| OrchestratorError::Unrecoverable(e.to_string()))?;

        Ok(CommandResult {
            executed: Vec::new(),
            events: vec![event],
        })
    }

    /// Apply an event through the evolver, append it to the log, emit the
    /// `events_persisted` metric, and honor the snapshot policy. When the
    /// applied event flips the session to converged, a `ConvergenceReached`
    /// event is derived and recorded the same way.
    async fn apply_and_persist(&mut self, event: &Event) -> Result<(), OrchestratorError> {
        let was_converged = self.state.converged;
        self.state = evolve(self.state.clone(), event);

        let outcome = self
            .interpreter
            .execute(&Effect::PersistEvent {
                event: event.clone(),
            })
            .await
            .map_err(|e| OrchestratorError::Unrecoverable(e.to_string()))?;
        let EffectOutcome::EventPersisted { index } = outcome else {
            return Err(OrchestratorError::Unrecoverable(
                "persist effect returned unexpected outcome".to_string(),
            ));
        };

        self.events_persisted += 1;
        self.telemetry.record_metric(
            "events_persisted",
            1.0,
            &json!({ "kind": event.kind() }),
        );

        if should_snapshot(index, event.kind(), self.settings.snapshot_interval) {
            self.interpreter
                .execute(&Effect::CreateSnapshot {
                    state: Box::new(self.state.clone()),
                    at_event_index: index,
                })
                .await
                .map_err(|e| OrchestratorError::Unrecoverable(e.to_string()))?;
        }

        self.last_event = Some(event.clone());

        if !was_converged && self.state.converged {
            let convergence = Event::new(
                Utc::now(),
                EventPayload::ConvergenceReached {
                    score: overall_score(&self.state.confidence),
                },
            );
            // Converged is already latched, so this recursion terminates
            // after one step.
            Box::pin(self.apply_and_persist(&convergence)).await?;
        }

        Ok(())
    }

    async fn close_spans(&self, executed: &[ExecutedEffect]) {
        for executed_effect in executed {
            if let EffectOutcome::SpanStarted { span_id } = executed_effect.outcome {
                let _ = self
                    .interpreter
                    .execute(&Effect::EndSpan {
                        span_id,
                        status: SpanStatus::Ok,
                        error: None,
                    })
                    .await;
            }
        }
    }

    fn count_log_levels(&mut self, executed: &[ExecutedEffect]) {
        for executed_effect in executed {
            if let Effect::Log { level, .. } = &executed_effect.effect {
                match level {
                    LogLevel::Warn => self.warnings += 1,
                    LogLevel::Error => self.errors += 1,
                    _ => {}
                }
            }
        }
    }
}

fn first_llm_response(executed: &[ExecutedEffect]) -> Option<&LlmResponse> {
    executed.iter().find_map(|e| match &e.outcome {
        EffectOutcome::LlmInvoked(response) => Some(response),
        _ => None,
    })
}
