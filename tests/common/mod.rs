//! Shared fixtures for integration tests.
#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use serde_json::json;

use turbine::adapters::mock::{AutoApprover, RecordingTelemetry, ScriptedLlm, StaticToolchain};
use turbine::domain::models::{LlmResponse, ToolUse};
use turbine::domain::ports::{CheckpointAdapter, EventStore, InMemoryEventStore, Toolchain};
use turbine::services::orchestrator::{Adapters, Orchestrator, RunOptions};

/// One checklist item per phase, as the extraction call would return.
pub const CHECKLIST_JSON: &str = r#"[
  {"phase": "requirements", "description": "Capture the inputs and outputs", "verification": "requirements doc exists"},
  {"phase": "design", "description": "Sketch the module layout", "verification": "design doc exists"},
  {"phase": "implementation", "description": "Implement the core", "verification": "code compiles"},
  {"phase": "testing", "description": "Cover the core with tests", "verification": "tests pass"},
  {"phase": "documentation", "description": "Document the public API", "verification": "docs render"},
  {"phase": "verification", "description": "Verify against the original task", "verification": "review sign-off"}
]"#;

pub fn checklist_response() -> LlmResponse {
    LlmResponse {
        content: format!("Here is the plan:\n{CHECKLIST_JSON}"),
        tool_uses: vec![],
        tokens_used: 200,
    }
}

pub fn empty_response() -> LlmResponse {
    LlmResponse {
        content: "working on it".into(),
        tool_uses: vec![],
        tokens_used: 10,
    }
}

pub fn write_file_response(path: &str, content: &str) -> LlmResponse {
    LlmResponse {
        content: "writing a file".into(),
        tool_uses: vec![ToolUse {
            tool: "write_file".into(),
            input: json!({ "path": path, "content": content }),
            result: None,
        }],
        tokens_used: 50,
    }
}

pub struct Harness {
    pub orchestrator: Orchestrator,
    pub telemetry: Arc<RecordingTelemetry>,
    pub store: Arc<InMemoryEventStore>,
    pub llm: Arc<ScriptedLlm>,
    pub checkpoint: Arc<AutoApprover>,
}

/// Orchestrator wired to in-memory adapters: scripted LLM, recording
/// telemetry, in-memory log, auto-approving checkpoints, green toolchain.
pub fn harness(work_dir: &Path, responses: Vec<LlmResponse>) -> Harness {
    harness_with(
        work_dir,
        responses,
        Arc::new(StaticToolchain::passing(95.0)),
        Arc::new(AutoApprover::approving()),
    )
}

pub fn harness_with(
    work_dir: &Path,
    responses: Vec<LlmResponse>,
    toolchain: Arc<dyn Toolchain>,
    checkpoint: Arc<AutoApprover>,
) -> Harness {
    let telemetry = Arc::new(RecordingTelemetry::new());
    let store = Arc::new(InMemoryEventStore::new());
    let llm = Arc::new(ScriptedLlm::new(responses));

    let options = RunOptions {
        work_dir: work_dir.to_path_buf(),
        prompt: "build a key-value store".into(),
        max_turns: None,
        db_path: None,
    };
    let adapters = Adapters {
        llm: llm.clone(),
        telemetry: telemetry.clone(),
        store: store.clone() as Arc<dyn EventStore>,
        checkpoint: checkpoint.clone() as Arc<dyn CheckpointAdapter>,
        toolchain,
    };

    Harness {
        orchestrator: Orchestrator::new(options, adapters),
        telemetry,
        store,
        llm,
        checkpoint,
    }
}
