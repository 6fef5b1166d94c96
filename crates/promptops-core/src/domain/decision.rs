//! Policy decisions produced by the evaluator.

use serde::{Deserialize, Serialize};

use super::violation::{Severity, Violation, ViolationKind};

/// A rule could not run because a context field it needs was absent.
///
/// Absence is not failure: the rule is skipped and the rest of the catalog
/// still applies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationDataMissing {
    pub kind: ViolationKind,
    pub field: String,
}

/// The allow/deny verdict for one evaluation context.
///
/// `allowed` is derived from the violation list and is never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDecision {
    /// Triggered rules in catalog order.
    pub violations: Vec<Violation>,
    /// Rules skipped for missing data.
    #[serde(default)]
    pub skipped: Vec<EvaluationDataMissing>,
    /// Version label of the rule set that produced this decision.
    pub rule_set_version: String,
    /// SHA-256 of the rule set's canonical form.
    pub rule_set_digest: String,
}

impl PolicyDecision {
    /// Whether the change may proceed (no violations).
    pub fn allowed(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn violation_count(&self) -> usize {
        self.violations.len()
    }

    pub fn has(&self, kind: ViolationKind) -> bool {
        self.violations.iter().any(|v| v.kind == kind)
    }

    pub fn kinds(&self) -> Vec<ViolationKind> {
        self.violations.iter().map(|v| v.kind).collect()
    }

    /// Highest severity among the violations.
    pub fn max_severity(&self) -> Option<Severity> {
        self.violations.iter().map(|v| v.severity).max()
    }

    /// Whether any violation signals tampering with tests or guardrails.
    pub fn has_tamper_signal(&self) -> bool {
        self.violations.iter().any(|v| v.kind.is_tamper())
    }

    /// Flattened view for display layers.
    pub fn summary(&self) -> DecisionSummary {
        DecisionSummary {
            allowed: self.allowed(),
            violation_count: self.violation_count(),
            violations: self.kinds(),
            rule_set_version: self.rule_set_version.clone(),
        }
    }
}

/// Read-only projection of a [`PolicyDecision`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionSummary {
    pub allowed: bool,
    pub violation_count: usize,
    pub violations: Vec<ViolationKind>,
    pub rule_set_version: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decision(violations: Vec<Violation>) -> PolicyDecision {
        PolicyDecision {
            violations,
            skipped: Vec::new(),
            rule_set_version: "test".into(),
            rule_set_digest: "0".repeat(64),
        }
    }

    #[test]
    fn allowed_tracks_violations() {
        assert!(decision(vec![]).allowed());
        let denied = decision(vec![Violation::new(ViolationKind::MissingTests, "no tests")]);
        assert!(!denied.allowed());
        assert_eq!(denied.violation_count(), 1);
        assert!(denied.has(ViolationKind::MissingTests));
    }

    #[test]
    fn summary_mirrors_decision() {
        let d = decision(vec![
            Violation::new(ViolationKind::DiffTooLarge, "big"),
            Violation::new(ViolationKind::HardcodedSecrets, "secret"),
        ]);
        let s = d.summary();
        assert!(!s.allowed);
        assert_eq!(s.violation_count, 2);
        assert_eq!(d.max_severity(), Some(Severity::Critical));
        assert!(!d.has_tamper_signal());

        let tampered = decision(vec![Violation::new(ViolationKind::TestFilesDeleted, "gone")]);
        assert!(tampered.has_tamper_signal());
        assert_eq!(decision(vec![]).max_severity(), None);
    }

    #[test]
    fn serialized_form_has_no_allowed_field() {
        let json = serde_json::to_value(decision(vec![])).unwrap();
        assert!(json.get("allowed").is_none());
    }
}
