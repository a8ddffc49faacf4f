//! Prompt templates and LLM response parsing for the functional core.
//!
//! Everything here is pure: templates are built from the session state
//! alone, and parsing tolerates malformed model output by skipping it.

use serde_json::Value;

use crate::domain::models::{overall_score, ChecklistItem, Phase, SessionState};

/// The stable requirements-extraction template sent on `Initialize`.
///
/// Asks for a JSON array so the reply can be parsed without any
/// vendor-specific structured-output machinery.
pub fn requirements_extraction_prompt(prompt: &str) -> String {
    format!(
        "You are planning an autonomous software generation session.\n\
         \n\
         Task:\n{prompt}\n\
         \n\
         Break the task into concrete checklist items across these phases, \
         in order: requirements, design, implementation, testing, \
         documentation, verification.\n\
         \n\
         Reply with ONLY a JSON array. Each element must be an object with:\n\
         - \"phase\": one of the phase names above\n\
         - \"description\": what must be done, one sentence\n\
         - \"verification\": how completion can be checked\n"
    )
}

/// The per-turn working prompt: current phase, progress, and context.
pub fn phase_prompt(state: &SessionState) -> String {
    let confidence_pct = (overall_score(&state.confidence) * 100.0).round() as u32;

    let mut completed = String::new();
    let mut remaining = String::new();
    for item in state.checklist_for(state.phase) {
        let line = format!("- {}\n", item.description);
        if item.completed {
            completed.push_str(&line);
        } else {
            remaining.push_str(&line);
        }
    }
    if completed.is_empty() {
        completed.push_str("(none)\n");
    }
    if remaining.is_empty() {
        remaining.push_str("(none)\n");
    }

    let mut artifacts = String::new();
    for artifact in state.artifacts_for(state.phase) {
        artifacts.push_str(&format!("- {}\n", artifact.path));
    }
    if artifacts.is_empty() {
        artifacts.push_str("(none)\n");
    }

    format!(
        "Phase: {phase} (turn {turn}, confidence {confidence_pct}%)\n\
         \n\
         Original task:\n{prompt}\n\
         \n\
         Completed in this phase:\n{completed}\
         \n\
         Remaining in this phase:\n{remaining}\
         \n\
         Artifacts produced this phase:\n{artifacts}\
         \n\
         Continue the work. Use the write_file tool for every file you \
         produce, and focus on the remaining checklist items.",
        phase = state.phase,
        turn = state.turn,
        prompt = state.prompt,
    )
}

/// Parse the reply to the requirements-extraction prompt.
///
/// Scans the content for its first JSON array and converts well-formed
/// `{phase, description}` entries into checklist items. Entries with an
/// unknown phase or a missing description are skipped; an unparseable
/// reply yields an empty checklist.
pub fn parse_checklist_response(content: &str) -> Vec<ChecklistItem> {
    let Some(raw) = extract_json_array(content) else {
        return Vec::new();
    };
    let Ok(Value::Array(entries)) = serde_json::from_str::<Value>(&raw) else {
        return Vec::new();
    };

    let mut items = Vec::new();
    for entry in entries {
        let Some(obj) = entry.as_object() else {
            continue;
        };
        let Some(phase) = obj
            .get("phase")
            .and_then(Value::as_str)
            .and_then(parse_phase)
        else {
            continue;
        };
        let Some(description) = obj.get("description").and_then(Value::as_str) else {
            continue;
        };
        if description.trim().is_empty() {
            continue;
        }
        items.push(ChecklistItem::new(phase, description.trim()));
    }
    items
}

fn parse_phase(name: &str) -> Option<Phase> {
    Phase::ORDER
        .iter()
        .copied()
        .find(|p| p.as_str() == name.trim().to_lowercase())
}

/// Locate the first top-level JSON array in free-form model output.
///
/// Bracket depth is tracked with string/escape awareness so `]` inside a
/// description does not terminate the scan early.
fn extract_json_array(content: &str) -> Option<String> {
    let start = content.find('[')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in content[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '[' => depth += 1,
            ']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(content[start..start + offset + ch.len_utf8()].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{Confidence, SessionState};

    #[test]
    fn test_extraction_prompt_embeds_task() {
        let prompt = requirements_extraction_prompt("build a scheduler");
        assert!(prompt.contains("build a scheduler"));
        assert!(prompt.contains("JSON array"));
    }

    #[test]
    fn test_phase_prompt_embeds_progress() {
        let mut state = SessionState::initial("build a scheduler");
        state.turn = 4;
        let mut done = ChecklistItem::new(Phase::Requirements, "list inputs");
        done.completed = true;
        state.checklist.push(done);
        state
            .checklist
            .push(ChecklistItem::new(Phase::Requirements, "list outputs"));

        let prompt = phase_prompt(&state);
        assert!(prompt.contains("requirements"));
        assert!(prompt.contains("turn 4"));
        assert!(prompt.contains("list inputs"));
        assert!(prompt.contains("list outputs"));
        assert!(prompt.contains("build a scheduler"));
    }

    #[test]
    fn test_phase_prompt_confidence_percentage() {
        let mut state = SessionState::initial("p");
        state.confidence = Confidence {
            types_safe: true,
            schema_valid: true,
            tests_pass: false,
            coverage: 0.0,
            checklist_complete: false,
            overall_score: 0.3,
        };
        assert!(phase_prompt(&state).contains("confidence 30%"));
    }

    #[test]
    fn test_parse_checklist_happy_path() {
        let content = r#"Here is the plan:
[
  {"phase": "requirements", "description": "Collect inputs", "verification": "doc exists"},
  {"phase": "design", "description": "Sketch modules", "verification": "review"}
]
Done."#;
        let items = parse_checklist_response(content);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].phase, Phase::Requirements);
        assert_eq!(items[0].description, "Collect inputs");
        assert_eq!(items[1].phase, Phase::Design);
        assert!(!items[0].completed);
    }

    #[test]
    fn test_parse_checklist_skips_malformed_entries() {
        let content = r#"[
  {"phase": "nonsense", "description": "skipped"},
  {"description": "no phase"},
  {"phase": "testing"},
  "just a string",
  {"phase": "testing", "description": "Write integration tests"}
]"#;
        let items = parse_checklist_response(content);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].phase, Phase::Testing);
    }

    #[test]
    fn test_parse_checklist_handles_brackets_in_strings() {
        let content = r#"[{"phase": "design", "description": "Use Vec[T] ] style notes"}]"#;
        let items = parse_checklist_response(content);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].description, "Use Vec[T] ] style notes");
    }

    #[test]
    fn test_parse_checklist_unparseable_is_empty() {
        assert!(parse_checklist_response("no json here").is_empty());
        assert!(parse_checklist_response("[{ broken").is_empty());
    }
}
