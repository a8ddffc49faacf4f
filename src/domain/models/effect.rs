//! Effect descriptions and their execution outcomes.
//!
//! An [`Effect`] is a value describing an intended side effect. The decider
//! only ever returns effect descriptions; the interpreter in the shell is
//! what actually performs them and reports an [`EffectOutcome`] back. The
//! list returned from a single decision is executed strictly in order.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::session::{CheckpointSummary, SessionState};

/// Canonical log levels for structured log effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Terminal status of a telemetry span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpanStatus {
    Ok,
    Error,
}

/// One tool invocation reported by the LLM adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolUse {
    pub tool: String,
    pub input: Value,
    pub result: Option<Value>,
}

/// Response of a single LLM invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmResponse {
    pub content: String,
    pub tool_uses: Vec<ToolUse>,
    pub tokens_used: u64,
}

/// Result of a test run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    pub total: u32,
    pub passed: u32,
    pub failed: u32,
    pub coverage: Option<f64>,
}

impl TestResult {
    /// A run counts as passing only when it ran something and nothing failed.
    pub fn all_passed(&self) -> bool {
        self.total > 0 && self.failed == 0
    }
}

/// A side effect the core wants performed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Effect {
    InvokeLlm {
        prompt: String,
        system_prompt: Option<String>,
        max_tokens: u32,
        temperature: Option<f64>,
    },
    WriteFile {
        path: String,
        content: String,
    },
    ReadFile {
        path: String,
    },
    DeleteFile {
        path: String,
    },
    ListDirectory {
        path: String,
        recursive: bool,
    },
    RunTests {
        pattern: Option<String>,
        coverage: bool,
    },
    CheckTypes,
    ValidateSchema {
        schema_path: String,
        data_path: String,
    },
    StartSpan {
        name: String,
        attributes: Value,
    },
    EndSpan {
        span_id: Uuid,
        status: SpanStatus,
        error: Option<String>,
    },
    RecordMetric {
        name: String,
        value: f64,
        tags: Value,
    },
    Log {
        level: LogLevel,
        message: String,
        context: Value,
    },
    EmitCheckpoint {
        summary: CheckpointSummary,
    },
    WaitForApproval {
        checkpoint_id: Uuid,
        timeout_ms: u64,
    },
    PersistEvent {
        event: super::event::Event,
    },
    CreateSnapshot {
        state: Box<SessionState>,
        at_event_index: i64,
    },
}

impl Effect {
    /// Snake-case kind tag, used for span naming and duration metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Effect::InvokeLlm { .. } => "invoke_llm",
            Effect::WriteFile { .. } => "write_file",
            Effect::ReadFile { .. } => "read_file",
            Effect::DeleteFile { .. } => "delete_file",
            Effect::ListDirectory { .. } => "list_directory",
            Effect::RunTests { .. } => "run_tests",
            Effect::CheckTypes => "check_types",
            Effect::ValidateSchema { .. } => "validate_schema",
            Effect::StartSpan { .. } => "start_span",
            Effect::EndSpan { .. } => "end_span",
            Effect::RecordMetric { .. } => "record_metric",
            Effect::Log { .. } => "log",
            Effect::EmitCheckpoint { .. } => "emit_checkpoint",
            Effect::WaitForApproval { .. } => "wait_for_approval",
            Effect::PersistEvent { .. } => "persist_event",
            Effect::CreateSnapshot { .. } => "create_snapshot",
        }
    }

    /// Convenience constructor for log effects without extra context.
    pub fn log(level: LogLevel, message: impl Into<String>) -> Self {
        Effect::Log {
            level,
            message: message.into(),
            context: Value::Null,
        }
    }

    /// Convenience constructor for metrics without tags.
    pub fn metric(name: impl Into<String>, value: f64) -> Self {
        Effect::RecordMetric {
            name: name.into(),
            value,
            tags: Value::Null,
        }
    }
}

/// What actually happened when an effect was executed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum EffectOutcome {
    LlmInvoked(LlmResponse),
    FileWritten {
        path: String,
        hash: String,
    },
    FileRead {
        path: String,
        content: String,
    },
    FileDeleted {
        path: String,
    },
    DirectoryListed {
        entries: Vec<String>,
    },
    TestsRan(TestResult),
    TypesChecked {
        passed: bool,
        errors: Vec<String>,
    },
    SchemaValidated {
        valid: bool,
        errors: Vec<String>,
    },
    SpanStarted {
        span_id: Uuid,
    },
    SpanEnded,
    MetricRecorded,
    Logged,
    CheckpointEmitted {
        checkpoint_id: Uuid,
    },
    ApprovalResolved {
        checkpoint_id: Uuid,
        approved: bool,
        reason: Option<String>,
    },
    EventPersisted {
        index: i64,
    },
    SnapshotCreated {
        at_event_index: i64,
    },
}

/// An effect paired with its outcome, as handed to the event mapping layer.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutedEffect {
    pub effect: Effect,
    pub outcome: EffectOutcome,
}
