//! Violations: named, severity-tagged defects found in an evaluation context.

use std::fmt;

use serde::{Deserialize, Serialize};

/// How bad a violation is. Ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every rule in the catalog is identified by exactly one kind.
///
/// The serialized names are the stable policy vocabulary shared with the
/// presentation layer and with stored rule configurations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    DiffTooLarge,
    MissingAcceptanceCriteria,
    NewExternalDeps,
    SecurityIssues,
    PerformanceIssues,
    MissingTests,
    LargeFiles,
    HardcodedSecrets,
    CoverageThresholdLow,
    #[serde(rename = "coverage_below_80")]
    CoverageBelowFloor,
    CoverageThresholdLowered,
    TestChangesUnmarked,
    TestFilesDeleted,
    IntegrityViolations,
    IntegrityScoreLow,
    FailingTests,
    SkippedTests,
    #[serde(rename = "diff_coverage_below_threshold")]
    DiffCoverageLow,
    CoverageDropped,
    CodeTestRatioLow,
    ClaimMismatch,
    HardcodedUrls,
}

impl ViolationKind {
    /// All kinds, in catalog order.
    pub const ALL: [ViolationKind; 22] = [
        Self::DiffTooLarge,
        Self::MissingAcceptanceCriteria,
        Self::NewExternalDeps,
        Self::SecurityIssues,
        Self::PerformanceIssues,
        Self::MissingTests,
        Self::LargeFiles,
        Self::HardcodedSecrets,
        Self::CoverageThresholdLow,
        Self::CoverageBelowFloor,
        Self::CoverageThresholdLowered,
        Self::TestChangesUnmarked,
        Self::TestFilesDeleted,
        Self::IntegrityViolations,
        Self::IntegrityScoreLow,
        Self::FailingTests,
        Self::SkippedTests,
        Self::DiffCoverageLow,
        Self::CoverageDropped,
        Self::CodeTestRatioLow,
        Self::ClaimMismatch,
        Self::HardcodedUrls,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::DiffTooLarge => "diff_too_large",
            Self::MissingAcceptanceCriteria => "missing_acceptance_criteria",
            Self::NewExternalDeps => "new_external_deps",
            Self::SecurityIssues => "security_issues",
            Self::PerformanceIssues => "performance_issues",
            Self::MissingTests => "missing_tests",
            Self::LargeFiles => "large_files",
            Self::HardcodedSecrets => "hardcoded_secrets",
            Self::CoverageThresholdLow => "coverage_threshold_low",
            Self::CoverageBelowFloor => "coverage_below_80",
            Self::CoverageThresholdLowered => "coverage_threshold_lowered",
            Self::TestChangesUnmarked => "test_changes_unmarked",
            Self::TestFilesDeleted => "test_files_deleted",
            Self::IntegrityViolations => "integrity_violations",
            Self::IntegrityScoreLow => "integrity_score_low",
            Self::FailingTests => "failing_tests",
            Self::SkippedTests => "skipped_tests",
            Self::DiffCoverageLow => "diff_coverage_below_threshold",
            Self::CoverageDropped => "coverage_dropped",
            Self::CodeTestRatioLow => "code_test_ratio_low",
            Self::ClaimMismatch => "claim_mismatch",
            Self::HardcodedUrls => "hardcoded_urls",
        }
    }

    /// Fixed severity mapping.
    ///
    /// Secrets, security findings, tamper signals and false success claims
    /// are critical. Oversized diffs and coverage or test problems are
    /// errors. Everything else is a warning.
    pub fn severity(self) -> Severity {
        match self {
            Self::HardcodedSecrets
            | Self::SecurityIssues
            | Self::CoverageThresholdLowered
            | Self::CoverageDropped
            | Self::TestChangesUnmarked
            | Self::TestFilesDeleted
            | Self::IntegrityViolations
            | Self::ClaimMismatch => Severity::Critical,

            Self::DiffTooLarge
            | Self::CoverageThresholdLow
            | Self::CoverageBelowFloor
            | Self::DiffCoverageLow
            | Self::MissingTests
            | Self::FailingTests
            | Self::IntegrityScoreLow => Severity::Error,

            Self::LargeFiles
            | Self::MissingAcceptanceCriteria
            | Self::NewExternalDeps
            | Self::PerformanceIssues
            | Self::SkippedTests
            | Self::CodeTestRatioLow
            | Self::HardcodedUrls => Severity::Warning,
        }
    }

    /// Whether this kind signals tampering with tests or guardrails.
    pub fn is_tamper(self) -> bool {
        matches!(
            self,
            Self::CoverageThresholdLowered | Self::TestChangesUnmarked | Self::TestFilesDeleted
        )
    }
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single triggered rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub kind: ViolationKind,
    pub severity: Severity,
    /// Human-readable explanation.
    pub message: String,
}

impl Violation {
    /// Build a violation with the kind's fixed severity.
    pub fn new(kind: ViolationKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: kind.severity(),
            message: message.into(),
        }
    }
}
