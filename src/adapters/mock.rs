//! Mock adapters for tests and dry runs.
//!
//! These stand in for the real LLM backend, telemetry pipeline, toolchain,
//! and approval channel. They are deterministic and record what passed
//! through them so tests can assert on the observable protocol.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::domain::models::{CheckpointSummary, LlmResponse, LogLevel, SpanStatus, TestResult};
use crate::domain::ports::{
    ApprovalDecision, CheckpointAdapter, CheckpointError, LlmAdapter, LlmError, LlmRequest,
    SchemaReport, Telemetry, Toolchain, ToolchainError, TypeCheckReport,
};

// ---------------------------------------------------------------------------
// ScriptedLlm
// ---------------------------------------------------------------------------

/// LLM adapter that replays a scripted sequence of responses.
///
/// When the script runs dry it returns an empty response rather than
/// failing, so long-running loop tests do not need one entry per turn.
#[derive(Debug, Default)]
pub struct ScriptedLlm {
    responses: Mutex<VecDeque<LlmResponse>>,
    requests: Mutex<Vec<LlmRequest>>,
}

impl ScriptedLlm {
    pub fn new(responses: impl IntoIterator<Item = LlmResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Requests seen so far, in order.
    pub fn requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmAdapter for ScriptedLlm {
    async fn invoke(&self, request: LlmRequest) -> Result<LlmResponse, LlmError> {
        self.requests.lock().unwrap().push(request);
        let next = self.responses.lock().unwrap().pop_front();
        Ok(next.unwrap_or(LlmResponse {
            content: String::new(),
            tool_uses: Vec::new(),
            tokens_used: 0,
        }))
    }
}

/// LLM adapter that always fails. Used to exercise error containment.
#[derive(Debug, Default)]
pub struct FailingLlm;

#[async_trait]
impl LlmAdapter for FailingLlm {
    async fn invoke(&self, _request: LlmRequest) -> Result<LlmResponse, LlmError> {
        Err(LlmError::InvocationFailed("scripted failure".into()))
    }
}

// ---------------------------------------------------------------------------
// RecordingTelemetry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    pub name: String,
    pub value: f64,
    pub tags: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub level: LogLevel,
    pub message: String,
}

/// Telemetry sink that keeps everything in memory.
#[derive(Debug, Default)]
pub struct RecordingTelemetry {
    metrics: Mutex<Vec<MetricSample>>,
    logs: Mutex<Vec<LogRecord>>,
    open_spans: Mutex<Vec<Uuid>>,
}

impl RecordingTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn metrics(&self) -> Vec<MetricSample> {
        self.metrics.lock().unwrap().clone()
    }

    pub fn logs(&self) -> Vec<LogRecord> {
        self.logs.lock().unwrap().clone()
    }

    /// All recorded values for a metric name.
    pub fn metric_values(&self, name: &str) -> Vec<f64> {
        self.metrics
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.name == name)
            .map(|m| m.value)
            .collect()
    }

    pub fn logs_at(&self, level: LogLevel) -> Vec<String> {
        self.logs
            .lock()
            .unwrap()
            .iter()
            .filter(|l| l.level == level)
            .map(|l| l.message.clone())
            .collect()
    }
}

impl Telemetry for RecordingTelemetry {
    fn start_span(&self, _name: &str, _attributes: &Value) -> Uuid {
        let span_id = Uuid::new_v4();
        self.open_spans.lock().unwrap().push(span_id);
        span_id
    }

    fn end_span(&self, span_id: Uuid, _status: SpanStatus, _error: Option<&str>) {
        self.open_spans.lock().unwrap().retain(|id| *id != span_id);
    }

    fn record_metric(&self, name: &str, value: f64, tags: &Value) {
        self.metrics.lock().unwrap().push(MetricSample {
            name: name.to_string(),
            value,
            tags: tags.clone(),
        });
    }

    fn log(&self, level: LogLevel, message: &str, _context: &Value) {
        self.logs.lock().unwrap().push(LogRecord {
            level,
            message: message.to_string(),
        });
    }
}

// ---------------------------------------------------------------------------
// StaticToolchain
// ---------------------------------------------------------------------------

/// Toolchain stub returning fixed results.
#[derive(Debug, Clone)]
pub struct StaticToolchain {
    pub test_result: TestResult,
    pub type_check: TypeCheckReport,
    pub schema: SchemaReport,
}

impl StaticToolchain {
    /// Everything green with the given coverage.
    pub fn passing(coverage: f64) -> Self {
        Self {
            test_result: TestResult {
                total: 10,
                passed: 10,
                failed: 0,
                coverage: Some(coverage),
            },
            type_check: TypeCheckReport {
                passed: true,
                errors: Vec::new(),
            },
            schema: SchemaReport {
                valid: true,
                errors: Vec::new(),
            },
        }
    }

    /// A failing test run alongside a clean type check.
    pub fn failing_tests() -> Self {
        Self {
            test_result: TestResult {
                total: 10,
                passed: 7,
                failed: 3,
                coverage: Some(40.0),
            },
            ..Self::passing(40.0)
        }
    }
}

#[async_trait]
impl Toolchain for StaticToolchain {
    async fn run_tests(
        &self,
        _pattern: Option<&str>,
        _coverage: bool,
    ) -> Result<TestResult, ToolchainError> {
        Ok(self.test_result.clone())
    }

    async fn check_types(&self) -> Result<TypeCheckReport, ToolchainError> {
        Ok(self.type_check.clone())
    }

    async fn validate_schema(
        &self,
        _schema_path: &str,
        _data_path: &str,
    ) -> Result<SchemaReport, ToolchainError> {
        Ok(self.schema.clone())
    }
}

// ---------------------------------------------------------------------------
// Checkpoint adapters
// ---------------------------------------------------------------------------

/// Approval channel that answers immediately with a fixed decision.
#[derive(Debug)]
pub struct AutoApprover {
    decision: ApprovalDecision,
    emitted: Mutex<Vec<CheckpointSummary>>,
}

impl AutoApprover {
    pub fn approving() -> Self {
        Self {
            decision: ApprovalDecision::approved(),
            emitted: Mutex::new(Vec::new()),
        }
    }

    pub fn rejecting(reason: impl Into<String>) -> Self {
        Self {
            decision: ApprovalDecision::rejected(reason),
            emitted: Mutex::new(Vec::new()),
        }
    }

    pub fn emitted(&self) -> Vec<CheckpointSummary> {
        self.emitted.lock().unwrap().clone()
    }
}

#[async_trait]
impl CheckpointAdapter for AutoApprover {
    async fn emit_checkpoint(&self, summary: &CheckpointSummary) -> Result<(), CheckpointError> {
        self.emitted.lock().unwrap().push(summary.clone());
        Ok(())
    }

    async fn wait_for_approval(
        &self,
        _checkpoint_id: Uuid,
    ) -> Result<ApprovalDecision, CheckpointError> {
        Ok(self.decision.clone())
    }
}

/// Approval channel that never answers; exercises the timeout path.
#[derive(Debug, Default)]
pub struct SilentApprover;

#[async_trait]
impl CheckpointAdapter for SilentApprover {
    async fn emit_checkpoint(&self, _summary: &CheckpointSummary) -> Result<(), CheckpointError> {
        Ok(())
    }

    async fn wait_for_approval(
        &self,
        _checkpoint_id: Uuid,
    ) -> Result<ApprovalDecision, CheckpointError> {
        std::future::pending().await
    }
}
