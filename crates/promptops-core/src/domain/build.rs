//! Inputs produced by external collaborators: the task and a completed build.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The originating request. Owned by the caller; read-only to the gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub task_id: Uuid,
    /// Free-text request.
    pub description: String,
    /// Rendered prompt used to generate the diff.
    pub prompt: String,
}

impl Task {
    pub fn new(description: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            task_id: Uuid::new_v4(),
            description: description.into(),
            prompt: prompt.into(),
        }
    }
}

/// Test run outcome reported by the build pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestSummary {
    pub passed: u32,
    pub failed: u32,
    pub skipped: u32,
}

impl TestSummary {
    pub fn succeeded(&self) -> bool {
        self.failed == 0
    }
}

/// Raw signals gathered alongside the build. Absent fields mean the signal
/// was not collected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildMetrics {
    #[serde(default)]
    pub coverage: Option<f64>,
    #[serde(default)]
    pub diff_coverage: Option<f64>,
    #[serde(default)]
    pub coverage_threshold: Option<f64>,
    #[serde(default)]
    pub baseline_threshold: Option<f64>,
    /// Coverage of the target branch before the change.
    #[serde(default)]
    pub baseline_coverage: Option<f64>,

    #[serde(default)]
    pub security_findings: Option<u32>,
    #[serde(default)]
    pub performance_findings: Option<u32>,
    #[serde(default)]
    pub secret_findings: Option<u32>,
    #[serde(default)]
    pub url_findings: Option<u32>,

    #[serde(default)]
    pub new_dependencies: Vec<String>,
    #[serde(default)]
    pub dependency_justification: Option<String>,

    /// Overrides criteria extracted from the task prompt.
    #[serde(default)]
    pub acceptance_criteria: Option<Vec<String>>,

    #[serde(default)]
    pub large_files: Vec<String>,
    /// Post-change sizes of touched files, used for large-file detection.
    #[serde(default)]
    pub file_sizes: Vec<(String, u64)>,

    /// Added code/test line counts; derived from the diff when absent.
    #[serde(default)]
    pub code_lines: Option<u64>,
    #[serde(default)]
    pub test_lines: Option<u64>,

    /// What the generator claimed about its own test run.
    #[serde(default)]
    pub claimed_success: Option<bool>,

    #[serde(default)]
    pub integrity_violations: Vec<String>,
    #[serde(default)]
    pub integrity_score: Option<u8>,
}

/// A completed build: diff, test outcome and metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildResult {
    /// Unified diff text.
    pub diff: String,
    /// Commit message accompanying the diff; may carry the change marker.
    #[serde(default)]
    pub commit_message: String,
    #[serde(default)]
    pub tests: TestSummary,
    #[serde(default)]
    pub metrics: BuildMetrics,
}
