//! Integrity scorer.
//!
//! Turns a violation set into a 0–100 score and derives the clarification
//! questions a reviewer should answer for conditions the rules cannot settle
//! on their own (unjustified dependencies, missing scans, weasel words).

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::RuleConfig;
use crate::domain::{EvaluationContext, Violation, ViolationKind};

/// Starting score before penalties.
pub const MAX_SCORE: u8 = 100;

/// Score plus open questions for one evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityAssessment {
    pub score: u8,
    pub questions: Vec<String>,
}

impl IntegrityAssessment {
    /// Qualitative band used in summaries.
    pub fn band(&self) -> &'static str {
        match self.score {
            90..=100 => "excellent",
            80..=89 => "good",
            70..=79 => "acceptable",
            _ => "poor",
        }
    }

    pub fn summary(&self) -> String {
        format!("integrity score {}/100 ({})", self.score, self.band())
    }
}

/// Deterministic, order-independent scorer.
#[derive(Debug, Clone)]
pub struct IntegrityScorer {
    config: Arc<RuleConfig>,
}

impl IntegrityScorer {
    pub fn new(config: Arc<RuleConfig>) -> Self {
        Self { config }
    }

    /// Sum all penalties first, then clamp at zero.
    pub fn score(&self, ctx: &EvaluationContext, violations: &[Violation]) -> IntegrityAssessment {
        let penalty: u32 = violations
            .iter()
            .map(|v| self.config.penalties.for_severity(v.severity))
            .fold(0u32, u32::saturating_add);
        let score = u32::from(MAX_SCORE).saturating_sub(penalty) as u8;

        IntegrityAssessment {
            score,
            questions: self.questions(ctx, violations),
        }
    }

    fn questions(&self, ctx: &EvaluationContext, violations: &[Violation]) -> Vec<String> {
        let has = |kind: ViolationKind| violations.iter().any(|v| v.kind == kind);
        let marker = &self.config.change_marker;
        let mut questions = Vec::new();

        if has(ViolationKind::NewExternalDeps) {
            for dep in &ctx.new_dependencies {
                questions.push(format!(
                    "New dependency {dep} added without justification: intended?"
                ));
            }
        }

        if has(ViolationKind::CoverageThresholdLowered) {
            if let (Some(threshold), Some(baseline)) =
                (ctx.coverage_threshold, ctx.baseline_threshold)
            {
                questions.push(format!(
                    "Coverage threshold lowered from {baseline}% to {threshold}%: was this agreed?"
                ));
            }
        }

        if has(ViolationKind::TestChangesUnmarked) {
            let paths: Vec<&str> = ctx.test_changes.iter().map(|c| c.path.as_str()).collect();
            questions.push(format!(
                "Test/config files changed without {marker} ({}): what is the rationale?",
                paths.join(", ")
            ));
        }

        if has(ViolationKind::TestFilesDeleted) {
            let paths: Vec<&str> = ctx
                .deleted_test_files
                .iter()
                .map(|c| c.path.as_str())
                .collect();
            questions.push(format!(
                "Why were tests deleted ({})? Was this necessary?",
                paths.join(", ")
            ));
        }

        if has(ViolationKind::CoverageBelowFloor) {
            if let Some(coverage) = ctx.coverage {
                questions.push(format!(
                    "Why is coverage only {coverage}%? Are the new lines tested?"
                ));
            }
        }

        if has(ViolationKind::CoverageDropped) {
            if let (Some(coverage), Some(baseline)) = (ctx.coverage, ctx.baseline_coverage) {
                questions.push(format!(
                    "Coverage fell from {baseline}% to {coverage}%: which code lost its tests?"
                ));
            }
        }

        if has(ViolationKind::CodeTestRatioLow) {
            if let (Some(code), Some(tests)) = (ctx.code_lines, ctx.test_lines) {
                questions.push(format!(
                    "Only {tests} test lines for {code} lines of code: is the new code exercised?"
                ));
            }
        }

        if has(ViolationKind::ClaimMismatch) {
            questions.push(
                "Why does the reported result not match the actual test run?".to_string(),
            );
        }

        if has(ViolationKind::HardcodedUrls) {
            questions.push(
                "Hardcoded URLs were added: should they come from configuration?".to_string(),
            );
        }

        if has(ViolationKind::FailingTests) {
            questions.push("Tests are failing: is the change incomplete?".to_string());
        }

        if has(ViolationKind::SkippedTests) {
            questions.push("Why are tests being skipped? Is this justified?".to_string());
        }

        if has(ViolationKind::IntegrityViolations) {
            questions.push(format!(
                "The integrity observer flagged: {}. Can you explain?",
                ctx.integrity_violations.join("; ")
            ));
        }

        if !ctx.weasel_words.is_empty() {
            questions.push(format!(
                "Added lines mention {}: is this a temporary fix?",
                ctx.weasel_words.join(", ")
            ));
        }

        if ctx.security_findings.is_none() {
            questions.push("No security scan results were provided: was the scan skipped?".into());
        }

        if ctx.coverage.is_none() {
            questions.push("No coverage report was provided: were tests run with coverage?".into());
        }

        questions
    }
}

impl Default for IntegrityScorer {
    fn default() -> Self {
        Self::new(Arc::new(RuleConfig::default()))
    }
}
