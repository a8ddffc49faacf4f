//! The effect interpreter - the impure half of the core.
//!
//! Takes effect descriptions from the decider and performs them against
//! the adapter ports, one at a time, in list order. Every execution is
//! wrapped in a telemetry span named `effect.<kind>` and timed with an
//! `effect_duration_ms` metric tagged with its status. The first failure
//! aborts a batch; the orchestrator converts it into an `ErrorOccurred`
//! event.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::domain::models::{Effect, EffectOutcome, ExecutedEffect, SpanStatus};
use crate::domain::ports::{
    estimate_tokens, CheckpointAdapter, CheckpointError, EventStore, EventStoreError, LlmAdapter,
    LlmError, LlmRequest, Telemetry, Toolchain, ToolchainError,
};

#[derive(Debug, Error)]
pub enum InterpreterError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Path escapes the work directory: {0}")]
    PathEscape(String),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Store(#[from] EventStoreError),

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error(transparent)]
    Toolchain(#[from] ToolchainError),
}

/// Executes effects against the adapter interfaces.
pub struct EffectInterpreter {
    work_dir: PathBuf,
    llm: Arc<dyn LlmAdapter>,
    telemetry: Arc<dyn Telemetry>,
    store: Arc<dyn EventStore>,
    checkpoint: Arc<dyn CheckpointAdapter>,
    toolchain: Arc<dyn Toolchain>,
}

impl EffectInterpreter {
    pub fn new(
        work_dir: PathBuf,
        llm: Arc<dyn LlmAdapter>,
        telemetry: Arc<dyn Telemetry>,
        store: Arc<dyn EventStore>,
        checkpoint: Arc<dyn CheckpointAdapter>,
        toolchain: Arc<dyn Toolchain>,
    ) -> Self {
        Self {
            work_dir,
            llm,
            telemetry,
            store,
            checkpoint,
            toolchain,
        }
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Execute a single effect, wrapped in telemetry.
    pub async fn execute(&self, effect: &Effect) -> Result<EffectOutcome, InterpreterError> {
        let kind = effect.kind();
        let span_id = self
            .telemetry
            .start_span(&format!("effect.{kind}"), &json!({ "effect": kind }));
        let started = Instant::now();

        let result = self.execute_inner(effect).await;
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

        match &result {
            Ok(_) => {
                self.telemetry.record_metric(
                    "effect_duration_ms",
                    elapsed_ms,
                    &json!({ "effect": kind, "status": "success" }),
                );
                self.telemetry.end_span(span_id, SpanStatus::Ok, None);
            }
            Err(error) => {
                self.telemetry.record_metric(
                    "effect_duration_ms",
                    elapsed_ms,
                    &json!({ "effect": kind, "status": "error" }),
                );
                self.telemetry
                    .end_span(span_id, SpanStatus::Error, Some(&error.to_string()));
            }
        }

        result
    }

    /// Execute a batch strictly sequentially; the first failure aborts.
    pub async fn execute_all(
        &self,
        effects: &[Effect],
    ) -> Result<Vec<ExecutedEffect>, InterpreterError> {
        let mut executed = Vec::with_capacity(effects.len());
        for effect in effects {
            let outcome = self.execute(effect).await?;
            executed.push(ExecutedEffect {
                effect: effect.clone(),
                outcome,
            });
        }
        Ok(executed)
    }

    async fn execute_inner(&self, effect: &Effect) -> Result<EffectOutcome, InterpreterError> {
        match effect {
            Effect::InvokeLlm {
                prompt,
                system_prompt,
                max_tokens,
                temperature,
            } => {
                let mut response = self
                    .llm
                    .invoke(LlmRequest {
                        prompt: prompt.clone(),
                        system_prompt: system_prompt.clone(),
                        max_tokens: *max_tokens,
                        temperature: *temperature,
                    })
                    .await?;
                if response.tokens_used == 0 {
                    response.tokens_used = estimate_tokens(&response.content);
                }
                Ok(EffectOutcome::LlmInvoked(response))
            }

            Effect::WriteFile { path, content } => {
                let absolute = self.resolve(path)?;
                if let Some(parent) = absolute.parent() {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .map_err(|e| io_err(path, e))?;
                }
                tokio::fs::write(&absolute, content)
                    .await
                    .map_err(|e| io_err(path, e))?;
                let hash = hex::encode(Sha256::digest(content.as_bytes()));
                Ok(EffectOutcome::FileWritten {
                    path: path.clone(),
                    hash,
                })
            }

            Effect::ReadFile { path } => {
                let absolute = self.resolve(path)?;
                let content = tokio::fs::read_to_string(&absolute)
                    .await
                    .map_err(|e| io_err(path, e))?;
                Ok(EffectOutcome::FileRead {
                    path: path.clone(),
                    content,
                })
            }

            Effect::DeleteFile { path } => {
                let absolute = self.resolve(path)?;
                tokio::fs::remove_file(&absolute)
                    .await
                    .map_err(|e| io_err(path, e))?;
                Ok(EffectOutcome::FileDeleted { path: path.clone() })
            }

            Effect::ListDirectory { path, recursive } => {
                let absolute = self.resolve(path)?;
                let entries = self.list_directory(&absolute, *recursive).await?;
                Ok(EffectOutcome::DirectoryListed { entries })
            }

            Effect::RunTests { pattern, coverage } => {
                let result = self
                    .toolchain
                    .run_tests(pattern.as_deref(), *coverage)
                    .await?;
                self.telemetry
                    .record_metric("tests_total", result.total as f64, &json!(null));
                self.telemetry
                    .record_metric("tests_passed", result.passed as f64, &json!(null));
                self.telemetry
                    .record_metric("tests_failed", result.failed as f64, &json!(null));
                if let Some(coverage) = result.coverage {
                    self.telemetry
                        .record_metric("coverage", coverage, &json!(null));
                }
                Ok(EffectOutcome::TestsRan(result))
            }

            Effect::CheckTypes => {
                let report = self.toolchain.check_types().await?;
                Ok(EffectOutcome::TypesChecked {
                    passed: report.passed,
                    errors: report.errors,
                })
            }

            Effect::ValidateSchema {
                schema_path,
                data_path,
            } => {
                let report = self
                    .toolchain
                    .validate_schema(schema_path, data_path)
                    .await?;
                Ok(EffectOutcome::SchemaValidated {
                    valid: report.valid,
                    errors: report.errors,
                })
            }

            Effect::StartSpan { name, attributes } => {
                let span_id = self.telemetry.start_span(name, attributes);
                Ok(EffectOutcome::SpanStarted { span_id })
            }

            Effect::EndSpan {
                span_id,
                status,
                error,
            } => {
                self.telemetry
                    .end_span(*span_id, *status, error.as_deref());
                Ok(EffectOutcome::SpanEnded)
            }

            Effect::RecordMetric { name, value, tags } => {
                self.telemetry.record_metric(name, *value, tags);
                Ok(EffectOutcome::MetricRecorded)
            }

            Effect::Log {
                level,
                message,
                context,
            } => {
                self.telemetry.log(*level, message, context);
                Ok(EffectOutcome::Logged)
            }

            Effect::EmitCheckpoint { summary } => {
                self.checkpoint.emit_checkpoint(summary).await?;
                Ok(EffectOutcome::CheckpointEmitted {
                    checkpoint_id: summary.id,
                })
            }

            Effect::WaitForApproval {
                checkpoint_id,
                timeout_ms,
            } => {
                let wait = self.checkpoint.wait_for_approval(*checkpoint_id);
                match tokio::time::timeout(Duration::from_millis(*timeout_ms), wait).await {
                    Ok(decision) => {
                        let decision = decision?;
                        Ok(EffectOutcome::ApprovalResolved {
                            checkpoint_id: *checkpoint_id,
                            approved: decision.approved,
                            reason: decision.reason,
                        })
                    }
                    // Timeout is a rejection, not an error.
                    Err(_) => Ok(EffectOutcome::ApprovalResolved {
                        checkpoint_id: *checkpoint_id,
                        approved: false,
                        reason: Some("timeout".to_string()),
                    }),
                }
            }

            Effect::PersistEvent { event } => {
                let index = self.store.append_event(event).await?;
                Ok(EffectOutcome::EventPersisted { index })
            }

            Effect::CreateSnapshot {
                state,
                at_event_index,
            } => {
                self.store.create_snapshot(state, *at_event_index).await?;
                Ok(EffectOutcome::SnapshotCreated {
                    at_event_index: *at_event_index,
                })
            }
        }
    }

    /// Resolve a session-relative path, refusing anything that could land
    /// outside the work directory.
    fn resolve(&self, relative: &str) -> Result<PathBuf, InterpreterError> {
        let path = Path::new(relative);
        if path.is_absolute() {
            return Err(InterpreterError::PathEscape(relative.to_string()));
        }
        for component in path.components() {
            if matches!(component, Component::ParentDir) {
                return Err(InterpreterError::PathEscape(relative.to_string()));
            }
        }
        Ok(self.work_dir.join(path))
    }

    async fn list_directory(
        &self,
        root: &Path,
        recursive: bool,
    ) -> Result<Vec<String>, InterpreterError> {
        let mut pending = vec![root.to_path_buf()];
        let mut entries = Vec::new();

        while let Some(dir) = pending.pop() {
            let mut read_dir = tokio::fs::read_dir(&dir)
                .await
                .map_err(|e| io_err(&dir.display().to_string(), e))?;
            while let Some(entry) = read_dir
                .next_entry()
                .await
                .map_err(|e| io_err(&dir.display().to_string(), e))?
            {
                let path = entry.path();
                let is_dir = entry
                    .file_type()
                    .await
                    .map_err(|e| io_err(&path.display().to_string(), e))?
                    .is_dir();
                let relative = path
                    .strip_prefix(&self.work_dir)
                    .unwrap_or(&path)
                    .display()
                    .to_string();
                entries.push(relative);
                if is_dir && recursive {
                    pending.push(path);
                }
            }
        }

        entries.sort();
        Ok(entries)
    }
}

fn io_err(path: &str, source: std::io::Error) -> InterpreterError {
    InterpreterError::Io {
        path: path.to_string(),
        source,
    }
}
