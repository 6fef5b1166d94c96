//! The per-run evaluation context consumed by the violation catalog.
//!
//! A context exists only for the duration of one gating decision. Optional
//! fields model signals that may legitimately be absent (for example no
//! security scan was run); rules that need an absent field are skipped.

use serde::{Deserialize, Serialize};

/// A test or guardrail-configuration change, with the change marker found
/// for it (if any).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkedChange {
    pub path: String,
    #[serde(default)]
    pub marker: Option<String>,
}

impl MarkedChange {
    pub fn new(path: impl Into<String>, marker: Option<String>) -> Self {
        Self {
            path: path.into(),
            marker,
        }
    }

    /// Whether this entry carries exactly `token`.
    pub fn carries(&self, token: &str) -> bool {
        self.marker.as_deref() == Some(token)
    }
}

/// Structured input to every catalog rule.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationContext {
    /// Changed lines in the diff (additions + deletions).
    #[serde(default)]
    pub diff_loc: Option<u64>,

    /// `None` when nobody extracted criteria; `Some(vec![])` when the prompt
    /// was inspected and none were found.
    #[serde(default)]
    pub acceptance_criteria: Option<Vec<String>>,

    #[serde(default)]
    pub new_dependencies: Vec<String>,
    #[serde(default)]
    pub dependency_justification: Option<String>,

    #[serde(default)]
    pub security_findings: Option<u32>,
    #[serde(default)]
    pub performance_findings: Option<u32>,
    #[serde(default)]
    pub secret_findings: Option<u32>,
    /// Added lines carrying a hardcoded URL.
    #[serde(default)]
    pub url_findings: Option<u32>,

    /// Test files touched by the change.
    #[serde(default)]
    pub test_files: Option<Vec<String>>,
    #[serde(default)]
    pub large_files: Vec<String>,

    /// Current line coverage in percent.
    #[serde(default)]
    pub coverage: Option<f64>,
    /// Coverage of the changed lines in percent.
    #[serde(default)]
    pub diff_coverage: Option<f64>,
    /// Coverage fail-under threshold after the change.
    #[serde(default)]
    pub coverage_threshold: Option<f64>,
    /// Stored fail-under threshold before the change.
    #[serde(default)]
    pub baseline_threshold: Option<f64>,
    /// Line coverage measured before the change.
    #[serde(default)]
    pub baseline_coverage: Option<f64>,

    /// Added production-code lines.
    #[serde(default)]
    pub code_lines: Option<u64>,
    /// Added test lines.
    #[serde(default)]
    pub test_lines: Option<u64>,

    #[serde(default)]
    pub tests_failed: Option<u32>,
    #[serde(default)]
    pub tests_skipped: Option<u32>,
    /// Whether the test run actually passed.
    #[serde(default)]
    pub tests_succeeded: Option<bool>,
    /// Whether the generator reported its change as passing.
    #[serde(default)]
    pub claimed_success: Option<bool>,

    #[serde(default)]
    pub test_changes: Vec<MarkedChange>,
    #[serde(default)]
    pub deleted_test_files: Vec<MarkedChange>,

    /// Violations reported by an external integrity observer.
    #[serde(default)]
    pub integrity_violations: Vec<String>,
    #[serde(default)]
    pub integrity_score: Option<u8>,

    /// Weasel words spotted in added lines; only ever used for questions.
    #[serde(default)]
    pub weasel_words: Vec<String>,
}
