//! The decider: `(Command, State) -> [Effect]`.
//!
//! Pure and total. No I/O happens here; the decider only describes the
//! side effects it wants, and the effect list it returns is executed
//! strictly in order (a span start precedes the LLM invocation it wraps).
//! The timestamp is supplied by the orchestrator so replayed decisions see
//! the same clock the live run saw.

use chrono::{DateTime, Utc};
use serde_json::json;

use crate::domain::models::{Command, Effect, LogLevel, Phase, SessionState};
use crate::domain::prompts::{phase_prompt, requirements_extraction_prompt};

/// Token ceiling for the requirements-extraction call.
pub const REQUIREMENTS_MAX_TOKENS: u32 = 4000;
/// Token ceiling for a working turn.
pub const TURN_MAX_TOKENS: u32 = 8000;
/// How long a checkpoint waits for external approval before it is treated
/// as rejected.
pub const APPROVAL_TIMEOUT_MS: u64 = 300_000;

/// Decide which effects a command should produce against the given state.
pub fn decide(command: &Command, state: &SessionState, now: DateTime<Utc>) -> Vec<Effect> {
    match command {
        Command::Initialize { prompt } => decide_initialize(prompt, state),
        Command::AdvancePhase => decide_advance_phase(state),
        Command::StartTurn => decide_start_turn(state),
        Command::ProcessLlmResponse { response } => decide_process_response(response, state),
        Command::RecordArtifact { path, .. } => decide_record_artifact(path, state),
        Command::RecordTestResult { result } => decide_record_test_result(result, state),
        Command::RecordTypeCheck { passed, errors } => decide_record_type_check(*passed, errors),
        Command::CompleteChecklistItem { item_id, evidence } => {
            decide_complete_item(*item_id, evidence, state)
        }
        Command::RequestCheckpoint => decide_request_checkpoint(state, now),
        Command::ApproveCheckpoint => decide_resolve_checkpoint(state, true, None),
        Command::RejectCheckpoint { reason } => {
            decide_resolve_checkpoint(state, false, Some(reason))
        }
        Command::Timeout { phase } => vec![
            Effect::Log {
                level: LogLevel::Error,
                message: format!("phase {phase} timed out"),
                context: json!({ "phase": phase.as_str() }),
            },
            Effect::RecordMetric {
                name: "phase_timeout".into(),
                value: 1.0,
                tags: json!({ "phase": phase.as_str() }),
            },
        ],
        Command::Error {
            message,
            recoverable,
        } => vec![
            Effect::Log {
                level: LogLevel::Error,
                message: message.clone(),
                context: json!({ "recoverable": recoverable }),
            },
            Effect::RecordMetric {
                name: "errors_total".into(),
                value: 1.0,
                tags: json!({ "recoverable": recoverable.to_string() }),
            },
        ],
    }
}

fn decide_initialize(prompt: &str, state: &SessionState) -> Vec<Effect> {
    if state.turn > 0 || !state.checklist.is_empty() {
        return vec![Effect::log(
            LogLevel::Warn,
            "session already initialized, ignoring initialize",
        )];
    }

    vec![
        Effect::Log {
            level: LogLevel::Info,
            message: "initializing session".into(),
            context: json!({ "prompt_chars": prompt.len() }),
        },
        Effect::StartSpan {
            name: "session".into(),
            attributes: json!({ "prompt_chars": prompt.len() }),
        },
        Effect::InvokeLlm {
            prompt: requirements_extraction_prompt(prompt),
            system_prompt: None,
            max_tokens: REQUIREMENTS_MAX_TOKENS,
            temperature: None,
        },
    ]
}

fn decide_advance_phase(state: &SessionState) -> Vec<Effect> {
    if !state.phase_checklist_complete(state.phase) {
        return vec![Effect::log(
            LogLevel::Warn,
            format!(
                "cannot advance: checklist for phase {} is incomplete",
                state.phase
            ),
        )];
    }
    let Some(next) = state.phase.next() else {
        return vec![Effect::log(
            LogLevel::Warn,
            "already at the final phase, nothing to advance to",
        )];
    };

    vec![
        Effect::RecordMetric {
            name: "phase_completed".into(),
            value: 1.0,
            tags: json!({ "phase": state.phase.as_str() }),
        },
        Effect::Log {
            level: LogLevel::Info,
            message: format!("phase {} complete, advancing to {}", state.phase, next),
            context: json!({ "from": state.phase.as_str(), "to": next.as_str() }),
        },
    ]
}

fn decide_start_turn(state: &SessionState) -> Vec<Effect> {
    if state.has_converged() {
        return vec![Effect::log(
            LogLevel::Info,
            "session has converged, no further turns",
        )];
    }

    let exhausted = state
        .budget_for(state.phase)
        .map(|b| b.is_exhausted())
        .unwrap_or(true);
    if exhausted {
        return vec![
            Effect::Log {
                level: LogLevel::Warn,
                message: format!("turn budget exhausted for phase {}", state.phase),
                context: json!({ "phase": state.phase.as_str() }),
            },
            Effect::RecordMetric {
                name: "budget_exhausted".into(),
                value: 1.0,
                tags: json!({ "phase": state.phase.as_str() }),
            },
        ];
    }

    vec![
        Effect::StartSpan {
            name: "turn".into(),
            attributes: json!({ "phase": state.phase.as_str(), "turn": state.turn + 1 }),
        },
        Effect::Log {
            level: LogLevel::Info,
            message: format!("starting turn {} in phase {}", state.turn + 1, state.phase),
            context: json!({ "phase": state.phase.as_str() }),
        },
        Effect::InvokeLlm {
            prompt: phase_prompt(state),
            system_prompt: None,
            max_tokens: TURN_MAX_TOKENS,
            temperature: None,
        },
    ]
}

fn decide_process_response(
    response: &crate::domain::models::LlmResponse,
    state: &SessionState,
) -> Vec<Effect> {
    let mut effects = vec![
        Effect::Log {
            level: LogLevel::Info,
            message: "processing llm response".into(),
            context: json!({
                "tokens_used": response.tokens_used,
                "tool_uses": response.tool_uses.len(),
            }),
        },
        Effect::metric("tokens_used", response.tokens_used as f64),
    ];

    for tool_use in &response.tool_uses {
        if tool_use.tool != "write_file" {
            continue;
        }
        // Malformed tool input (missing path/content, wrong shape) is
        // skipped without complaint.
        let path = tool_use.input.get("path").and_then(|v| v.as_str());
        let content = tool_use.input.get("content").and_then(|v| v.as_str());
        if let (Some(path), Some(content)) = (path, content) {
            effects.push(Effect::WriteFile {
                path: path.to_string(),
                content: content.to_string(),
            });
        }
    }

    if matches!(state.phase, Phase::Implementation | Phase::Testing) {
        effects.push(Effect::RunTests {
            pattern: None,
            coverage: true,
        });
        effects.push(Effect::CheckTypes);
    }

    effects
}

fn decide_record_artifact(path: &str, state: &SessionState) -> Vec<Effect> {
    if state.artifact_by_path(path).is_some() {
        vec![
            Effect::Log {
                level: LogLevel::Info,
                message: format!("artifact updated: {path}"),
                context: json!({ "path": path }),
            },
            Effect::metric("artifact_updated", 1.0),
        ]
    } else {
        vec![
            Effect::Log {
                level: LogLevel::Info,
                message: format!("artifact created: {path}"),
                context: json!({ "path": path }),
            },
            Effect::metric("artifact_created", 1.0),
        ]
    }
}

fn decide_record_test_result(
    result: &crate::domain::models::TestResult,
    state: &SessionState,
) -> Vec<Effect> {
    let mut effects = vec![
        Effect::Log {
            level: if result.all_passed() {
                LogLevel::Info
            } else {
                LogLevel::Warn
            },
            message: format!(
                "test run: {} passed, {} failed of {}",
                result.passed, result.failed, result.total
            ),
            context: json!({
                "total": result.total,
                "passed": result.passed,
                "failed": result.failed,
            }),
        },
        Effect::metric("tests_total", result.total as f64),
        Effect::metric("tests_passed", result.passed as f64),
        Effect::metric("tests_failed", result.failed as f64),
    ];
    if let Some(coverage) = result.coverage {
        effects.push(Effect::metric("coverage", coverage));
    }

    // Project the confidence this result implies and surface it as a metric;
    // the authoritative update happens when the event is applied.
    let mut confidence = state.confidence.clone();
    confidence.tests_pass = result.all_passed();
    if let Some(coverage) = result.coverage {
        confidence.coverage = coverage;
    }
    confidence.recompute();
    effects.push(Effect::metric("confidence", confidence.overall_score));

    effects
}

fn decide_record_type_check(passed: bool, errors: &[String]) -> Vec<Effect> {
    let mut effects = vec![
        Effect::Log {
            level: if passed { LogLevel::Info } else { LogLevel::Warn },
            message: if passed {
                "type check passed".to_string()
            } else {
                format!("type check failed with {} errors", errors.len())
            },
            context: json!({ "passed": passed }),
        },
        Effect::metric("type_check_passed", if passed { 1.0 } else { 0.0 }),
    ];

    if !passed {
        for error in errors.iter().take(5) {
            effects.push(Effect::Log {
                level: LogLevel::Error,
                message: format!("type error: {error}"),
                context: serde_json::Value::Null,
            });
        }
    }

    effects
}

fn decide_complete_item(
    item_id: uuid::Uuid,
    evidence: &str,
    state: &SessionState,
) -> Vec<Effect> {
    let Some(item) = state.checklist.iter().find(|i| i.id == item_id) else {
        return vec![Effect::log(
            LogLevel::Warn,
            format!("unknown checklist item {item_id}"),
        )];
    };
    if item.completed {
        return vec![Effect::log(
            LogLevel::Info,
            format!("checklist item {item_id} already completed"),
        )];
    }

    vec![
        Effect::Log {
            level: LogLevel::Info,
            message: format!("checklist item completed: {}", item.description),
            context: json!({ "item_id": item_id.to_string(), "evidence": evidence }),
        },
        Effect::metric("checklist_item_completed", 1.0),
    ]
}

fn decide_request_checkpoint(state: &SessionState, now: DateTime<Utc>) -> Vec<Effect> {
    if state.pending_checkpoint.is_some() {
        return vec![Effect::log(
            LogLevel::Warn,
            "a checkpoint is already pending approval",
        )];
    }

    let summary = state.checkpoint_summary(now);
    vec![
        Effect::Log {
            level: LogLevel::Info,
            message: format!("requesting checkpoint at turn {}", state.turn),
            context: json!({ "checkpoint_id": summary.id.to_string() }),
        },
        Effect::EmitCheckpoint {
            summary: summary.clone(),
        },
        Effect::WaitForApproval {
            checkpoint_id: summary.id,
            timeout_ms: APPROVAL_TIMEOUT_MS,
        },
    ]
}

fn decide_resolve_checkpoint(
    state: &SessionState,
    approve: bool,
    reason: Option<&String>,
) -> Vec<Effect> {
    let Some(pending) = &state.pending_checkpoint else {
        return vec![Effect::log(
            LogLevel::Warn,
            "no checkpoint is pending approval",
        )];
    };

    if approve {
        vec![
            Effect::Log {
                level: LogLevel::Info,
                message: format!("checkpoint {} approved", pending.id),
                context: json!({ "checkpoint_id": pending.id.to_string() }),
            },
            Effect::metric("checkpoint_approved", 1.0),
        ]
    } else {
        vec![
            Effect::Log {
                level: LogLevel::Info,
                message: format!("checkpoint {} rejected", pending.id),
                context: json!({
                    "checkpoint_id": pending.id.to_string(),
                    "reason": reason.cloned().unwrap_or_default(),
                }),
            },
            Effect::metric("checkpoint_rejected", 1.0),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{
        ChecklistItem, Confidence, LlmResponse, TestResult, ToolUse, TurnBudget,
    };
    use serde_json::json;

    fn effect_kinds(effects: &[Effect]) -> Vec<&'static str> {
        effects.iter().map(Effect::kind).collect()
    }

    fn metric_names(effects: &[Effect]) -> Vec<String> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::RecordMetric { name, .. } => Some(name.clone()),
                _ => None,
            })
            .collect()
    }

    // -- Initialize ---------------------------------------------------------

    #[test]
    fn test_initialize_fresh_emits_extraction_call() {
        let state = SessionState::initial("hello");
        let effects = decide(
            &Command::Initialize {
                prompt: "hello".into(),
            },
            &state,
            Utc::now(),
        );

        assert_eq!(effect_kinds(&effects), vec!["log", "start_span", "invoke_llm"]);
        match &effects[2] {
            Effect::InvokeLlm {
                prompt, max_tokens, ..
            } => {
                assert_eq!(*max_tokens, REQUIREMENTS_MAX_TOKENS);
                assert!(prompt.contains("hello"));
            }
            other => panic!("expected invoke_llm, got {other:?}"),
        }
    }

    #[test]
    fn test_initialize_twice_is_warning_only() {
        let mut state = SessionState::initial("hello");
        state
            .checklist
            .push(ChecklistItem::new(Phase::Requirements, "x"));

        let effects = decide(
            &Command::Initialize {
                prompt: "hello".into(),
            },
            &state,
            Utc::now(),
        );
        assert_eq!(effects.len(), 1);
        assert!(matches!(
            effects[0],
            Effect::Log {
                level: LogLevel::Warn,
                ..
            }
        ));
    }

    // -- StartTurn ----------------------------------------------------------

    #[test]
    fn test_start_turn_emits_llm_call_with_turn_budget() {
        let state = SessionState::initial("p");
        let effects = decide(&Command::StartTurn, &state, Utc::now());

        assert_eq!(effect_kinds(&effects), vec!["start_span", "log", "invoke_llm"]);
        match &effects[2] {
            Effect::InvokeLlm { max_tokens, .. } => assert_eq!(*max_tokens, TURN_MAX_TOKENS),
            other => panic!("expected invoke_llm, got {other:?}"),
        }
    }

    #[test]
    fn test_start_turn_budget_exhausted() {
        let mut state = SessionState::initial("p");
        state.phase = Phase::Implementation;
        *state.budget_for_mut(Phase::Implementation).unwrap() = TurnBudget {
            phase: Phase::Implementation,
            max_turns: 1,
            used_turns: 1,
        };

        let effects = decide(&Command::StartTurn, &state, Utc::now());
        assert!(!effect_kinds(&effects).contains(&"invoke_llm"));
        assert!(metric_names(&effects).contains(&"budget_exhausted".to_string()));
        assert!(matches!(
            effects[0],
            Effect::Log {
                level: LogLevel::Warn,
                ..
            }
        ));
    }

    #[test]
    fn test_start_turn_after_convergence_is_log_only() {
        let mut state = SessionState::initial("p");
        state.confidence = Confidence {
            types_safe: true,
            schema_valid: true,
            tests_pass: true,
            coverage: 95.0,
            checklist_complete: true,
            overall_score: 1.0,
        };
        state.convergence_streak = 3;

        let effects = decide(&Command::StartTurn, &state, Utc::now());
        assert_eq!(effect_kinds(&effects), vec!["log"]);
    }

    // -- ProcessLlmResponse -------------------------------------------------

    #[test]
    fn test_process_response_extracts_write_file_tool_uses() {
        let state = SessionState::initial("p");
        let response = LlmResponse {
            content: "done".into(),
            tool_uses: vec![
                ToolUse {
                    tool: "write_file".into(),
                    input: json!({ "path": "src/lib.rs", "content": "pub fn f() {}" }),
                    result: None,
                },
                ToolUse {
                    tool: "write_file".into(),
                    input: json!({ "path": "missing_content.rs" }),
                    result: None,
                },
                ToolUse {
                    tool: "run_shell".into(),
                    input: json!({ "cmd": "ls" }),
                    result: None,
                },
            ],
            tokens_used: 120,
        };

        let effects = decide(
            &Command::ProcessLlmResponse { response },
            &state,
            Utc::now(),
        );
        let writes: Vec<_> = effects
            .iter()
            .filter(|e| matches!(e, Effect::WriteFile { .. }))
            .collect();
        assert_eq!(writes.len(), 1);
        assert!(metric_names(&effects).contains(&"tokens_used".to_string()));
        // Requirements phase: no test or type-check effects.
        assert!(!effect_kinds(&effects).contains(&"run_tests"));
    }

    #[test]
    fn test_process_response_runs_checks_in_implementation() {
        let mut state = SessionState::initial("p");
        state.phase = Phase::Implementation;
        let response = LlmResponse {
            content: String::new(),
            tool_uses: vec![],
            tokens_used: 10,
        };

        let effects = decide(
            &Command::ProcessLlmResponse { response },
            &state,
            Utc::now(),
        );
        let kinds = effect_kinds(&effects);
        assert!(kinds.contains(&"run_tests"));
        assert!(kinds.contains(&"check_types"));
        match effects.iter().find(|e| e.kind() == "run_tests").unwrap() {
            Effect::RunTests { coverage, .. } => assert!(*coverage),
            _ => unreachable!(),
        }
    }

    // -- AdvancePhase -------------------------------------------------------

    #[test]
    fn test_advance_phase_refuses_incomplete_checklist() {
        let mut state = SessionState::initial("p");
        state
            .checklist
            .push(ChecklistItem::new(Phase::Requirements, "open"));

        let effects = decide(&Command::AdvancePhase, &state, Utc::now());
        assert_eq!(effect_kinds(&effects), vec!["log"]);
    }

    #[test]
    fn test_advance_phase_refuses_empty_checklist() {
        let state = SessionState::initial("p");
        let effects = decide(&Command::AdvancePhase, &state, Utc::now());
        assert_eq!(effect_kinds(&effects), vec!["log"]);
    }

    #[test]
    fn test_advance_phase_emits_metric_when_satisfied() {
        let mut state = SessionState::initial("p");
        let mut item = ChecklistItem::new(Phase::Requirements, "done");
        item.completed = true;
        state.checklist.push(item);

        let effects = decide(&Command::AdvancePhase, &state, Utc::now());
        assert!(metric_names(&effects).contains(&"phase_completed".to_string()));
    }

    #[test]
    fn test_advance_phase_at_terminal_is_warning_only() {
        let mut state = SessionState::initial("p");
        state.phase = Phase::Verification;
        let mut item = ChecklistItem::new(Phase::Verification, "done");
        item.completed = true;
        state.checklist.push(item);

        let effects = decide(&Command::AdvancePhase, &state, Utc::now());
        assert_eq!(effect_kinds(&effects), vec!["log"]);
    }

    // -- Checkpoints --------------------------------------------------------

    #[test]
    fn test_request_checkpoint_emits_and_waits() {
        let state = SessionState::initial("p");
        let effects = decide(&Command::RequestCheckpoint, &state, Utc::now());
        assert_eq!(
            effect_kinds(&effects),
            vec!["log", "emit_checkpoint", "wait_for_approval"]
        );

        let summary_id = match &effects[1] {
            Effect::EmitCheckpoint { summary } => summary.id,
            _ => unreachable!(),
        };
        match &effects[2] {
            Effect::WaitForApproval {
                checkpoint_id,
                timeout_ms,
            } => {
                assert_eq!(*checkpoint_id, summary_id);
                assert_eq!(*timeout_ms, APPROVAL_TIMEOUT_MS);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_request_checkpoint_single_flight() {
        let mut state = SessionState::initial("p");
        state.pending_checkpoint = Some(state.checkpoint_summary(Utc::now()));

        let effects = decide(&Command::RequestCheckpoint, &state, Utc::now());
        assert_eq!(effects.len(), 1);
        assert!(matches!(
            effects[0],
            Effect::Log {
                level: LogLevel::Warn,
                ..
            }
        ));
    }

    #[test]
    fn test_approve_without_pending_is_warning() {
        let state = SessionState::initial("p");
        let effects = decide(&Command::ApproveCheckpoint, &state, Utc::now());
        assert_eq!(effect_kinds(&effects), vec!["log"]);
    }

    // -- Records ------------------------------------------------------------

    #[test]
    fn test_record_test_result_metrics() {
        let state = SessionState::initial("p");
        let effects = decide(
            &Command::RecordTestResult {
                result: TestResult {
                    total: 10,
                    passed: 9,
                    failed: 1,
                    coverage: Some(72.0),
                },
            },
            &state,
            Utc::now(),
        );
        let names = metric_names(&effects);
        for expected in ["tests_total", "tests_passed", "tests_failed", "coverage", "confidence"] {
            assert!(names.contains(&expected.to_string()), "missing {expected}");
        }
    }

    #[test]
    fn test_record_type_check_caps_error_logs_at_five() {
        let state = SessionState::initial("p");
        let errors: Vec<String> = (0..9).map(|i| format!("error {i}")).collect();
        let effects = decide(
            &Command::RecordTypeCheck {
                passed: false,
                errors,
            },
            &state,
            Utc::now(),
        );
        let error_logs = effects
            .iter()
            .filter(|e| {
                matches!(
                    e,
                    Effect::Log {
                        level: LogLevel::Error,
                        ..
                    }
                )
            })
            .count();
        assert_eq!(error_logs, 5);
    }

    #[test]
    fn test_complete_unknown_item_is_warning() {
        let state = SessionState::initial("p");
        let effects = decide(
            &Command::CompleteChecklistItem {
                item_id: uuid::Uuid::new_v4(),
                evidence: "e".into(),
            },
            &state,
            Utc::now(),
        );
        assert_eq!(effect_kinds(&effects), vec!["log"]);
    }

    #[test]
    fn test_complete_already_done_item_is_info() {
        let mut state = SessionState::initial("p");
        let mut item = ChecklistItem::new(Phase::Requirements, "x");
        item.completed = true;
        let id = item.id;
        state.checklist.push(item);

        let effects = decide(
            &Command::CompleteChecklistItem {
                item_id: id,
                evidence: "e".into(),
            },
            &state,
            Utc::now(),
        );
        assert_eq!(effects.len(), 1);
        assert!(matches!(
            effects[0],
            Effect::Log {
                level: LogLevel::Info,
                ..
            }
        ));
    }

    #[test]
    fn test_error_command_counts() {
        let state = SessionState::initial("p");
        let effects = decide(
            &Command::Error {
                message: "boom".into(),
                recoverable: true,
            },
            &state,
            Utc::now(),
        );
        assert!(metric_names(&effects).contains(&"errors_total".to_string()));
    }
}
