//! Confidence scoring - the primary convergence signal.
//!
//! The overall score is a deterministic, total function of the component
//! signals. Type safety and schema validity are hard gates: either one
//! failing zeroes the score. Failing tests cap the score at 0.3. Above
//! those gates, coverage and checklist completion each contribute a
//! quarter on top of a 0.5 base.

use serde::{Deserialize, Serialize};

/// Aggregated quality signals plus the derived overall score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Confidence {
    /// Latest type check passed.
    pub types_safe: bool,
    /// Latest schema validation passed.
    pub schema_valid: bool,
    /// Latest test run passed.
    pub tests_pass: bool,
    /// Test coverage percentage in `[0, 100]`.
    pub coverage: f64,
    /// Every checklist item is completed.
    pub checklist_complete: bool,
    /// Derived score in `[0.0, 1.0]`; kept in sync via [`Confidence::recompute`].
    pub overall_score: f64,
}

impl Default for Confidence {
    /// A fresh session: nothing verified yet. Schema validity defaults to
    /// true because no event in the log ever toggles it directly; it is
    /// only replaced wholesale by a `ConfidenceUpdated` event.
    fn default() -> Self {
        Self {
            types_safe: false,
            schema_valid: true,
            tests_pass: false,
            coverage: 0.0,
            checklist_complete: false,
            overall_score: 0.0,
        }
    }
}

impl Confidence {
    /// Re-derive `overall_score` from the component signals.
    pub fn recompute(&mut self) {
        self.overall_score = overall_score(self);
    }
}

/// Deterministic scoring function.
///
/// - `types_safe == false` or `schema_valid == false` => 0.0
/// - `tests_pass == false` => 0.3
/// - otherwise `0.5 + min(coverage / 80, 1.0) * 0.25 + 0.25 * checklist_complete`,
///   capped at 1.0.
pub fn overall_score(confidence: &Confidence) -> f64 {
    if !confidence.types_safe {
        return 0.0;
    }
    if !confidence.schema_valid {
        return 0.0;
    }
    if !confidence.tests_pass {
        return 0.3;
    }

    let coverage_part = (confidence.coverage / 80.0).min(1.0) * 0.25;
    let checklist_part = if confidence.checklist_complete { 0.25 } else { 0.0 };
    (0.5 + coverage_part + checklist_part).min(1.0)
}
