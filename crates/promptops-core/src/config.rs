//! Versioned rule configuration.
//!
//! Trigger thresholds, the enabled rule set and scoring penalties are policy,
//! not mechanism: they are loaded from TOML or JSON and passed explicitly to
//! the evaluator, so several rule sets (e.g. one per project) can coexist.

use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::{Severity, ViolationKind};
use crate::error::{GateError, GateResult};

/// Numeric trigger thresholds for the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// `diff_too_large` fires above this many changed lines.
    pub max_diff_lines: u64,
    /// Coverage floor in percent for both the measured value and the
    /// configured fail-under threshold.
    pub min_coverage: f64,
    /// Score floor for auto-approval and `integrity_score_low`.
    pub min_integrity_score: u8,
    /// Coverage floor for changed lines.
    pub min_diff_coverage: f64,
    /// Skipped tests tolerated before `skipped_tests` fires.
    pub max_skipped_tests: u32,
    /// Files at or above this size are reported as large.
    pub large_file_bytes: u64,
    /// Percentage points coverage may fall below the baseline.
    pub max_coverage_drop: f64,
    /// Minimum added test lines per added code line.
    pub min_code_test_ratio: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            max_diff_lines: 300,
            min_coverage: 80.0,
            min_integrity_score: 70,
            min_diff_coverage: 100.0,
            max_skipped_tests: 0,
            large_file_bytes: 1024 * 1024,
            max_coverage_drop: 5.0,
            min_code_test_ratio: 0.1,
        }
    }
}

/// Points subtracted from the integrity score per violation severity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeverityPenalties {
    pub critical: u32,
    pub error: u32,
    pub warning: u32,
    pub info: u32,
}

impl Default for SeverityPenalties {
    fn default() -> Self {
        Self {
            critical: 25,
            error: 15,
            warning: 5,
            info: 1,
        }
    }
}

impl SeverityPenalties {
    pub fn for_severity(&self, severity: Severity) -> u32 {
        match severity {
            Severity::Critical => self.critical,
            Severity::Error => self.error,
            Severity::Warning => self.warning,
            Severity::Info => self.info,
        }
    }
}

/// How the change marker is matched across a list of changes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerMode {
    /// One marked entry satisfies the whole list.
    #[default]
    AnyEntry,
    /// Every entry must carry the marker.
    EveryEntry,
}

/// Path patterns used by the tamper detector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TamperPatterns {
    /// Regexes matching test files.
    pub test_patterns: Vec<String>,
    /// Regexes matching guardrail configuration (coverage config, CI gates).
    pub guardrail_patterns: Vec<String>,
    /// Substrings exempting a path from tamper checks.
    pub whitelist: Vec<String>,
}

impl Default for TamperPatterns {
    fn default() -> Self {
        Self {
            test_patterns: vec![
                r"(^|/)tests?/".to_string(),
                r"(^|/)test_[^/]*\.py$".to_string(),
                r"_test\.(py|go|rs)$".to_string(),
                r"\.(test|spec)\.[jt]sx?$".to_string(),
            ],
            guardrail_patterns: vec![
                r"(^|/)\.github/workflows/".to_string(),
                r"(^|/)pyproject\.toml$".to_string(),
                r"(^|/)\.coveragerc$".to_string(),
                r"(^|/)pytest\.ini$".to_string(),
                r"(^|/)tox\.ini$".to_string(),
                r"(^|/)\.pre-commit-config\.yaml$".to_string(),
                r"(^|/)codecov\.ya?ml$".to_string(),
                r"(^|/)tarpaulin\.toml$".to_string(),
            ],
            whitelist: vec![
                "coverage.xml".to_string(),
                ".coverage".to_string(),
                "htmlcov/".to_string(),
                ".pytest_cache/".to_string(),
            ],
        }
    }
}

/// A complete, versioned rule set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleConfig {
    pub version: String,
    /// Catalog rules that are evaluated. Defaults to the whole catalog.
    pub enabled: Vec<ViolationKind>,
    pub thresholds: Thresholds,
    pub penalties: SeverityPenalties,
    /// Token that acknowledges a test or guardrail change.
    pub change_marker: String,
    pub marker_mode: MarkerMode,
    pub tamper: TamperPatterns,
}

impl Default for RuleConfig {
    fn default() -> Self {
        Self {
            version: "builtin-1".to_string(),
            enabled: ViolationKind::ALL.to_vec(),
            thresholds: Thresholds::default(),
            penalties: SeverityPenalties::default(),
            change_marker: "#TEST_CHANGE".to_string(),
            marker_mode: MarkerMode::default(),
            tamper: TamperPatterns::default(),
        }
    }
}

impl RuleConfig {
    /// Parse and validate a TOML rule set.
    pub fn from_toml_str(s: &str) -> GateResult<Self> {
        let config: RuleConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a JSON rule set.
    pub fn from_json_str(s: &str) -> GateResult<Self> {
        let config: RuleConfig = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a rule set from disk; `.json` files are parsed as JSON, anything
    /// else as TOML.
    pub fn load(path: &Path) -> GateResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::parse_file(path, &raw)
    }

    /// [`RuleConfig::load`] without blocking the async runtime.
    pub async fn load_async(path: &Path) -> GateResult<Self> {
        let raw = tokio::fs::read_to_string(path).await?;
        Self::parse_file(path, &raw)
    }

    fn parse_file(path: &Path, raw: &str) -> GateResult<Self> {
        let config = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(raw)?,
            _ => Self::from_toml_str(raw)?,
        };
        tracing::debug!(
            path = %path.display(),
            version = %config.version,
            "rule configuration loaded"
        );
        Ok(config)
    }

    /// Apply `PROMPTOPS_*` environment overrides.
    pub fn with_env_overrides(self) -> GateResult<Self> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup.
    ///
    /// Recognised keys: `PROMPTOPS_MAX_DIFF_LINES`, `PROMPTOPS_MIN_COVERAGE`,
    /// `PROMPTOPS_MIN_INTEGRITY_SCORE`, `PROMPTOPS_CHANGE_MARKER`.
    pub fn apply_overrides<F>(mut self, lookup: F) -> GateResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("PROMPTOPS_MAX_DIFF_LINES") {
            self.thresholds.max_diff_lines = parse_override("PROMPTOPS_MAX_DIFF_LINES", &v)?;
        }
        if let Some(v) = lookup("PROMPTOPS_MIN_COVERAGE") {
            self.thresholds.min_coverage = parse_override("PROMPTOPS_MIN_COVERAGE", &v)?;
        }
        if let Some(v) = lookup("PROMPTOPS_MIN_INTEGRITY_SCORE") {
            self.thresholds.min_integrity_score =
                parse_override("PROMPTOPS_MIN_INTEGRITY_SCORE", &v)?;
        }
        if let Some(v) = lookup("PROMPTOPS_CHANGE_MARKER") {
            self.change_marker = v;
        }
        self.validate()?;
        Ok(self)
    }

    /// Reject configurations the evaluator cannot apply meaningfully.
    pub fn validate(&self) -> GateResult<()> {
        if self.version.trim().is_empty() {
            return Err(GateError::Config("version must not be empty".into()));
        }
        if self.change_marker.trim().is_empty() {
            return Err(GateError::Config("change_marker must not be empty".into()));
        }
        let t = &self.thresholds;
        if t.max_diff_lines == 0 {
            return Err(GateError::Config("max_diff_lines must be positive".into()));
        }
        for (name, value) in [
            ("min_coverage", t.min_coverage),
            ("min_diff_coverage", t.min_diff_coverage),
            ("max_coverage_drop", t.max_coverage_drop),
        ] {
            if !(0.0..=100.0).contains(&value) {
                return Err(GateError::Config(format!(
                    "{name} must be within 0..=100, got {value}"
                )));
            }
        }
        if !t.min_code_test_ratio.is_finite() || t.min_code_test_ratio < 0.0 {
            return Err(GateError::Config(format!(
                "min_code_test_ratio must be a non-negative number, got {}",
                t.min_code_test_ratio
            )));
        }
        if t.min_integrity_score > 100 {
            return Err(GateError::Config(format!(
                "min_integrity_score must be within 0..=100, got {}",
                t.min_integrity_score
            )));
        }
        for pattern in self
            .tamper
            .test_patterns
            .iter()
            .chain(&self.tamper.guardrail_patterns)
        {
            Regex::new(pattern)
                .map_err(|e| GateError::Config(format!("bad tamper pattern {pattern:?}: {e}")))?;
        }
        Ok(())
    }

    pub fn is_enabled(&self, kind: ViolationKind) -> bool {
        self.enabled.contains(&kind)
    }

    /// Disable a rule (builder pattern).
    pub fn without_rule(mut self, kind: ViolationKind) -> Self {
        self.enabled.retain(|k| *k != kind);
        self
    }

    /// SHA-256 of the canonical JSON form. Rule order does not affect it.
    pub fn digest(&self) -> String {
        let mut canonical = self.clone();
        canonical.enabled.sort();
        canonical.enabled.dedup();
        // Serializing plain data structs cannot fail.
        let bytes = serde_json::to_vec(&canonical).unwrap_or_default();
        hex::encode(Sha256::digest(&bytes))
    }
}

fn parse_override<T: std::str::FromStr>(key: &str, value: &str) -> GateResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| GateError::Config(format!("{key}: cannot parse {value:?}")))
}
