//! Violation catalog.
//!
//! Each rule is an independent predicate over an [`EvaluationContext`],
//! identified by its [`ViolationKind`]. Rules never look at each other's
//! results, so every rule can be tested in isolation.

use crate::config::{MarkerMode, RuleConfig};
use crate::domain::{EvaluationContext, MarkedChange, ViolationKind};

/// Result of running one rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleOutcome {
    /// Trigger condition not met.
    Clear,
    /// Trigger condition met; carries the human-readable message.
    Triggered(String),
    /// A required context field was absent; the rule is skipped.
    Missing(&'static str),
}

type RuleFn = fn(&EvaluationContext, &RuleConfig) -> RuleOutcome;

/// A named predicate in the catalog.
pub struct Rule {
    pub kind: ViolationKind,
    check: RuleFn,
}

impl Rule {
    pub fn evaluate(&self, ctx: &EvaluationContext, config: &RuleConfig) -> RuleOutcome {
        (self.check)(ctx, config)
    }
}

impl std::fmt::Debug for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rule").field("kind", &self.kind).finish()
    }
}

/// The full registry, in evaluation order.
pub static CATALOG: [Rule; 22] = [
    Rule { kind: ViolationKind::DiffTooLarge, check: diff_too_large },
    Rule { kind: ViolationKind::MissingAcceptanceCriteria, check: missing_acceptance_criteria },
    Rule { kind: ViolationKind::NewExternalDeps, check: new_external_deps },
    Rule { kind: ViolationKind::SecurityIssues, check: security_issues },
    Rule { kind: ViolationKind::PerformanceIssues, check: performance_issues },
    Rule { kind: ViolationKind::MissingTests, check: missing_tests },
    Rule { kind: ViolationKind::LargeFiles, check: large_files },
    Rule { kind: ViolationKind::HardcodedSecrets, check: hardcoded_secrets },
    Rule { kind: ViolationKind::CoverageThresholdLow, check: coverage_threshold_low },
    Rule { kind: ViolationKind::CoverageBelowFloor, check: coverage_below_floor },
    Rule { kind: ViolationKind::CoverageThresholdLowered, check: coverage_threshold_lowered },
    Rule { kind: ViolationKind::TestChangesUnmarked, check: test_changes_unmarked },
    Rule { kind: ViolationKind::TestFilesDeleted, check: test_files_deleted },
    Rule { kind: ViolationKind::IntegrityViolations, check: integrity_violations },
    Rule { kind: ViolationKind::IntegrityScoreLow, check: integrity_score_low },
    Rule { kind: ViolationKind::FailingTests, check: failing_tests },
    Rule { kind: ViolationKind::SkippedTests, check: skipped_tests },
    Rule { kind: ViolationKind::DiffCoverageLow, check: diff_coverage_low },
    Rule { kind: ViolationKind::CoverageDropped, check: coverage_dropped },
    Rule { kind: ViolationKind::CodeTestRatioLow, check: code_test_ratio_low },
    Rule { kind: ViolationKind::ClaimMismatch, check: claim_mismatch },
    Rule { kind: ViolationKind::HardcodedUrls, check: hardcoded_urls },
];

/// Look up the rule for a kind.
pub fn rule(kind: ViolationKind) -> &'static Rule {
    // CATALOG holds exactly one rule per kind, in ViolationKind::ALL order.
    &CATALOG[kind as usize]
}

/// Whether a list of marked changes is acknowledged by `marker`.
///
/// In [`MarkerMode::AnyEntry`] a single marked entry acknowledges the whole
/// list; [`MarkerMode::EveryEntry`] requires each entry to carry it.
pub fn markers_satisfied(changes: &[MarkedChange], marker: &str, mode: MarkerMode) -> bool {
    match mode {
        MarkerMode::AnyEntry => changes.iter().any(|c| c.carries(marker)),
        MarkerMode::EveryEntry => changes.iter().all(|c| c.carries(marker)),
    }
}

fn triggered_if(condition: bool, message: impl FnOnce() -> String) -> RuleOutcome {
    if condition {
        RuleOutcome::Triggered(message())
    } else {
        RuleOutcome::Clear
    }
}

fn unmarked_paths(changes: &[MarkedChange], marker: &str) -> String {
    changes
        .iter()
        .filter(|c| !c.carries(marker))
        .map(|c| c.path.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

fn diff_too_large(ctx: &EvaluationContext, config: &RuleConfig) -> RuleOutcome {
    let Some(loc) = ctx.diff_loc else {
        return RuleOutcome::Missing("diff_loc");
    };
    let max = config.thresholds.max_diff_lines;
    triggered_if(loc > max, || {
        format!("diff too large: {loc} changed lines (max {max})")
    })
}

fn missing_acceptance_criteria(ctx: &EvaluationContext, _: &RuleConfig) -> RuleOutcome {
    let empty = ctx
        .acceptance_criteria
        .as_ref()
        .map_or(true, |criteria| criteria.iter().all(|c| c.trim().is_empty()));
    triggered_if(empty, || "task has no acceptance criteria".to_string())
}

fn new_external_deps(ctx: &EvaluationContext, _: &RuleConfig) -> RuleOutcome {
    let unjustified = ctx
        .dependency_justification
        .as_deref()
        .map_or(true, |j| j.trim().is_empty());
    triggered_if(!ctx.new_dependencies.is_empty() && unjustified, || {
        format!(
            "new external dependencies without justification: {}",
            ctx.new_dependencies.join(", ")
        )
    })
}

fn security_issues(ctx: &EvaluationContext, _: &RuleConfig) -> RuleOutcome {
    let Some(count) = ctx.security_findings else {
        return RuleOutcome::Missing("security_findings");
    };
    triggered_if(count > 0, || format!("{count} security finding(s) reported"))
}

fn performance_issues(ctx: &EvaluationContext, _: &RuleConfig) -> RuleOutcome {
    let Some(count) = ctx.performance_findings else {
        return RuleOutcome::Missing("performance_findings");
    };
    triggered_if(count > 0, || format!("{count} performance finding(s) reported"))
}

fn missing_tests(ctx: &EvaluationContext, _: &RuleConfig) -> RuleOutcome {
    let Some(files) = &ctx.test_files else {
        return RuleOutcome::Missing("test_files");
    };
    triggered_if(files.is_empty(), || {
        "change does not add or update any test files".to_string()
    })
}

fn large_files(ctx: &EvaluationContext, _: &RuleConfig) -> RuleOutcome {
    triggered_if(!ctx.large_files.is_empty(), || {
        format!("large files in change: {}", ctx.large_files.join(", "))
    })
}

fn hardcoded_secrets(ctx: &EvaluationContext, _: &RuleConfig) -> RuleOutcome {
    let Some(count) = ctx.secret_findings else {
        return RuleOutcome::Missing("secret_findings");
    };
    triggered_if(count > 0, || format!("{count} potential hardcoded secret(s)"))
}

fn coverage_threshold_low(ctx: &EvaluationContext, config: &RuleConfig) -> RuleOutcome {
    let Some(threshold) = ctx.coverage_threshold else {
        return RuleOutcome::Missing("coverage_threshold");
    };
    let floor = config.thresholds.min_coverage;
    triggered_if(threshold < floor, || {
        format!("coverage fail-under threshold {threshold}% is below the {floor}% floor")
    })
}

fn coverage_below_floor(ctx: &EvaluationContext, config: &RuleConfig) -> RuleOutcome {
    let Some(coverage) = ctx.coverage else {
        return RuleOutcome::Missing("coverage");
    };
    let floor = config.thresholds.min_coverage;
    triggered_if(coverage < floor, || {
        format!("coverage {coverage}% is below {floor}%")
    })
}

fn coverage_threshold_lowered(ctx: &EvaluationContext, _: &RuleConfig) -> RuleOutcome {
    let Some(threshold) = ctx.coverage_threshold else {
        return RuleOutcome::Missing("coverage_threshold");
    };
    let Some(baseline) = ctx.baseline_threshold else {
        return RuleOutcome::Missing("baseline_threshold");
    };
    triggered_if(threshold < baseline, || {
        format!("coverage threshold lowered from {baseline}% to {threshold}%")
    })
}

fn test_changes_unmarked(ctx: &EvaluationContext, config: &RuleConfig) -> RuleOutcome {
    let marker = config.change_marker.as_str();
    let changes = &ctx.test_changes;
    triggered_if(
        !changes.is_empty() && !markers_satisfied(changes, marker, config.marker_mode),
        || {
            format!(
                "test/config changes without {marker}: {}",
                unmarked_paths(changes, marker)
            )
        },
    )
}

fn test_files_deleted(ctx: &EvaluationContext, config: &RuleConfig) -> RuleOutcome {
    let marker = config.change_marker.as_str();
    let deleted = &ctx.deleted_test_files;
    triggered_if(
        !deleted.is_empty() && !markers_satisfied(deleted, marker, config.marker_mode),
        || {
            format!(
                "test files deleted without {marker}: {}",
                unmarked_paths(deleted, marker)
            )
        },
    )
}

fn integrity_violations(ctx: &EvaluationContext, _: &RuleConfig) -> RuleOutcome {
    triggered_if(!ctx.integrity_violations.is_empty(), || {
        format!(
            "integrity observer reported: {}",
            ctx.integrity_violations.join("; ")
        )
    })
}

fn integrity_score_low(ctx: &EvaluationContext, config: &RuleConfig) -> RuleOutcome {
    let Some(score) = ctx.integrity_score else {
        return RuleOutcome::Missing("integrity_score");
    };
    let floor = config.thresholds.min_integrity_score;
    triggered_if(score < floor, || {
        format!("integrity score {score} is below {floor}")
    })
}

fn failing_tests(ctx: &EvaluationContext, _: &RuleConfig) -> RuleOutcome {
    let Some(failed) = ctx.tests_failed else {
        return RuleOutcome::Missing("tests_failed");
    };
    triggered_if(failed > 0, || format!("{failed} test(s) failing"))
}

fn skipped_tests(ctx: &EvaluationContext, config: &RuleConfig) -> RuleOutcome {
    let Some(skipped) = ctx.tests_skipped else {
        return RuleOutcome::Missing("tests_skipped");
    };
    let max = config.thresholds.max_skipped_tests;
    triggered_if(skipped > max, || {
        format!("{skipped} test(s) skipped (allowed {max})")
    })
}

fn diff_coverage_low(ctx: &EvaluationContext, config: &RuleConfig) -> RuleOutcome {
    let Some(coverage) = ctx.diff_coverage else {
        return RuleOutcome::Missing("diff_coverage");
    };
    let floor = config.thresholds.min_diff_coverage;
    triggered_if(coverage < floor, || {
        format!("diff coverage {coverage}% is below {floor}%")
    })
}

fn coverage_dropped(ctx: &EvaluationContext, config: &RuleConfig) -> RuleOutcome {
    let Some(coverage) = ctx.coverage else {
        return RuleOutcome::Missing("coverage");
    };
    let Some(baseline) = ctx.baseline_coverage else {
        return RuleOutcome::Missing("baseline_coverage");
    };
    let allowed = config.thresholds.max_coverage_drop;
    triggered_if(coverage < baseline - allowed, || {
        format!("coverage dropped from {baseline}% to {coverage}% (allowed drop {allowed} points)")
    })
}

/// Fires only when both code and tests were added; an absent side is
/// `missing_tests`' business.
fn code_test_ratio_low(ctx: &EvaluationContext, config: &RuleConfig) -> RuleOutcome {
    let Some(code) = ctx.code_lines else {
        return RuleOutcome::Missing("code_lines");
    };
    let Some(tests) = ctx.test_lines else {
        return RuleOutcome::Missing("test_lines");
    };
    if code == 0 || tests == 0 {
        return RuleOutcome::Clear;
    }
    let ratio = tests as f64 / code as f64;
    let min = config.thresholds.min_code_test_ratio;
    triggered_if(ratio < min, || {
        format!("test/code ratio {ratio:.2} is below {min} ({tests} test lines for {code} code lines)")
    })
}

fn claim_mismatch(ctx: &EvaluationContext, _: &RuleConfig) -> RuleOutcome {
    let Some(claimed) = ctx.claimed_success else {
        return RuleOutcome::Missing("claimed_success");
    };
    let Some(actual) = ctx.tests_succeeded else {
        return RuleOutcome::Missing("tests_succeeded");
    };
    let word = |ok: bool| if ok { "passing" } else { "failing" };
    triggered_if(claimed != actual, || {
        format!(
            "change was reported as {} but the test run is {}",
            word(claimed),
            word(actual)
        )
    })
}

fn hardcoded_urls(ctx: &EvaluationContext, _: &RuleConfig) -> RuleOutcome {
    let Some(count) = ctx.url_findings else {
        return RuleOutcome::Missing("url_findings");
    };
    triggered_if(count > 0, || format!("{count} line(s) with hardcoded URLs"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RuleConfig {
        RuleConfig::default()
    }

    fn eval(kind: ViolationKind, ctx: &EvaluationContext) -> RuleOutcome {
        rule(kind).evaluate(ctx, &config())
    }

    fn is_triggered(outcome: &RuleOutcome) -> bool {
        matches!(outcome, RuleOutcome::Triggered(_))
    }

    #[test]
    fn catalog_order_matches_kinds() {
        for (i, kind) in ViolationKind::ALL.into_iter().enumerate() {
            assert_eq!(CATALOG[i].kind, kind);
            assert_eq!(rule(kind).kind, kind);
        }
    }

    #[test]
    fn diff_size_boundary() {
        let at = EvaluationContext {
            diff_loc: Some(300),
            ..Default::default()
        };
        let over = EvaluationContext {
            diff_loc: Some(301),
            ..Default::default()
        };
        assert_eq!(eval(ViolationKind::DiffTooLarge, &at), RuleOutcome::Clear);
        assert!(is_triggered(&eval(ViolationKind::DiffTooLarge, &over)));
        assert_eq!(
            eval(ViolationKind::DiffTooLarge, &EvaluationContext::default()),
            RuleOutcome::Missing("diff_loc")
        );
    }

    #[test]
    fn acceptance_criteria_absent_or_empty_triggers() {
        let absent = EvaluationContext::default();
        let empty = EvaluationContext {
            acceptance_criteria: Some(vec![]),
            ..Default::default()
        };
        let present = EvaluationContext {
            acceptance_criteria: Some(vec!["returns 200".into()]),
            ..Default::default()
        };
        assert!(is_triggered(&eval(ViolationKind::MissingAcceptanceCriteria, &absent)));
        assert!(is_triggered(&eval(ViolationKind::MissingAcceptanceCriteria, &empty)));
        assert_eq!(
            eval(ViolationKind::MissingAcceptanceCriteria, &present),
            RuleOutcome::Clear
        );
    }

    #[test]
    fn dependencies_need_justification() {
        let mut ctx = EvaluationContext {
            new_dependencies: vec!["left-pad".into()],
            ..Default::default()
        };
        assert!(is_triggered(&eval(ViolationKind::NewExternalDeps, &ctx)));
        ctx.dependency_justification = Some("  ".into());
        assert!(is_triggered(&eval(ViolationKind::NewExternalDeps, &ctx)));
        ctx.dependency_justification = Some("needed for padding".into());
        assert_eq!(eval(ViolationKind::NewExternalDeps, &ctx), RuleOutcome::Clear);
    }

    #[test]
    fn scanner_counts_skip_when_absent() {
        let ctx = EvaluationContext::default();
        assert_eq!(
            eval(ViolationKind::SecurityIssues, &ctx),
            RuleOutcome::Missing("security_findings")
        );
        assert_eq!(
            eval(ViolationKind::PerformanceIssues, &ctx),
            RuleOutcome::Missing("performance_findings")
        );
        assert_eq!(
            eval(ViolationKind::HardcodedSecrets, &ctx),
            RuleOutcome::Missing("secret_findings")
        );

        let found = EvaluationContext {
            security_findings: Some(2),
            performance_findings: Some(0),
            secret_findings: Some(1),
            ..Default::default()
        };
        assert!(is_triggered(&eval(ViolationKind::SecurityIssues, &found)));
        assert_eq!(eval(ViolationKind::PerformanceIssues, &found), RuleOutcome::Clear);
        assert!(is_triggered(&eval(ViolationKind::HardcodedSecrets, &found)));
    }

    #[test]
    fn coverage_rules() {
        let ctx = EvaluationContext {
            coverage: Some(79.9),
            coverage_threshold: Some(75.0),
            baseline_threshold: Some(80.0),
            ..Default::default()
        };
        assert!(is_triggered(&eval(ViolationKind::CoverageBelowFloor, &ctx)));
        assert!(is_triggered(&eval(ViolationKind::CoverageThresholdLow, &ctx)));
        assert!(is_triggered(&eval(ViolationKind::CoverageThresholdLowered, &ctx)));

        let raised = EvaluationContext {
            coverage: Some(80.0),
            coverage_threshold: Some(85.0),
            baseline_threshold: Some(80.0),
            ..Default::default()
        };
        assert_eq!(eval(ViolationKind::CoverageBelowFloor, &raised), RuleOutcome::Clear);
        assert_eq!(eval(ViolationKind::CoverageThresholdLow, &raised), RuleOutcome::Clear);
        assert_eq!(
            eval(ViolationKind::CoverageThresholdLowered, &raised),
            RuleOutcome::Clear
        );
    }

    #[test]
    fn lowered_threshold_needs_both_values() {
        let ctx = EvaluationContext {
            coverage_threshold: Some(70.0),
            ..Default::default()
        };
        assert_eq!(
            eval(ViolationKind::CoverageThresholdLowered, &ctx),
            RuleOutcome::Missing("baseline_threshold")
        );
    }

    #[test]
    fn one_marked_entry_acknowledges_the_list() {
        let ctx = EvaluationContext {
            test_changes: vec![
                MarkedChange::new("tests/test_a.py", Some("#TEST_CHANGE".into())),
                MarkedChange::new("tests/test_b.py", None),
            ],
            ..Default::default()
        };
        assert_eq!(eval(ViolationKind::TestChangesUnmarked, &ctx), RuleOutcome::Clear);
    }

    #[test]
    fn every_entry_mode_requires_all_markers() {
        let ctx = EvaluationContext {
            test_changes: vec![
                MarkedChange::new("tests/test_a.py", Some("#TEST_CHANGE".into())),
                MarkedChange::new("tests/test_b.py", None),
            ],
            ..Default::default()
        };
        let mut strict = config();
        strict.marker_mode = MarkerMode::EveryEntry;
        match rule(ViolationKind::TestChangesUnmarked).evaluate(&ctx, &strict) {
            RuleOutcome::Triggered(msg) => {
                assert!(msg.contains("tests/test_b.py"));
                assert!(!msg.contains("tests/test_a.py"));
            }
            other => panic!("expected trigger, got {other:?}"),
        }
    }

    #[test]
    fn unmarked_deletion_triggers() {
        let ctx = EvaluationContext {
            deleted_test_files: vec![MarkedChange::new("tests/test_old.py", None)],
            ..Default::default()
        };
        assert!(is_triggered(&eval(ViolationKind::TestFilesDeleted, &ctx)));
    }

    #[test]
    fn marker_match_is_exact() {
        let ctx = EvaluationContext {
            deleted_test_files: vec![MarkedChange::new(
                "tests/test_old.py",
                Some("#TEST_CHANGED".into()),
            )],
            ..Default::default()
        };
        assert!(is_triggered(&eval(ViolationKind::TestFilesDeleted, &ctx)));
    }

    #[test]
    fn integrity_rules() {
        let ctx = EvaluationContext {
            integrity_violations: vec!["claim mismatch".into()],
            integrity_score: Some(69),
            ..Default::default()
        };
        assert!(is_triggered(&eval(ViolationKind::IntegrityViolations, &ctx)));
        assert!(is_triggered(&eval(ViolationKind::IntegrityScoreLow, &ctx)));

        let ok = EvaluationContext {
            integrity_score: Some(70),
            ..Default::default()
        };
        assert_eq!(eval(ViolationKind::IntegrityScoreLow, &ok), RuleOutcome::Clear);
    }

    #[test]
    fn test_outcome_rules() {
        let ctx = EvaluationContext {
            tests_failed: Some(1),
            tests_skipped: Some(1),
            diff_coverage: Some(99.0),
            test_files: Some(vec![]),
            ..Default::default()
        };
        assert!(is_triggered(&eval(ViolationKind::FailingTests, &ctx)));
        assert!(is_triggered(&eval(ViolationKind::SkippedTests, &ctx)));
        assert!(is_triggered(&eval(ViolationKind::DiffCoverageLow, &ctx)));
        assert!(is_triggered(&eval(ViolationKind::MissingTests, &ctx)));
    }

    #[test]
    fn coverage_drop_beyond_allowance() {
        let within = EvaluationContext {
            coverage: Some(86.0),
            baseline_coverage: Some(91.0),
            ..Default::default()
        };
        let beyond = EvaluationContext {
            coverage: Some(85.5),
            ..within.clone()
        };
        assert_eq!(eval(ViolationKind::CoverageDropped, &within), RuleOutcome::Clear);
        assert!(is_triggered(&eval(ViolationKind::CoverageDropped, &beyond)));
        assert_eq!(
            eval(
                ViolationKind::CoverageDropped,
                &EvaluationContext {
                    coverage: Some(50.0),
                    ..Default::default()
                }
            ),
            RuleOutcome::Missing("baseline_coverage")
        );
    }

    #[test]
    fn code_test_ratio() {
        let ctx = |code, tests| EvaluationContext {
            code_lines: Some(code),
            test_lines: Some(tests),
            ..Default::default()
        };
        assert!(is_triggered(&eval(ViolationKind::CodeTestRatioLow, &ctx(200, 5))));
        assert_eq!(eval(ViolationKind::CodeTestRatioLow, &ctx(100, 10)), RuleOutcome::Clear);
        assert_eq!(eval(ViolationKind::CodeTestRatioLow, &ctx(200, 0)), RuleOutcome::Clear);
        assert_eq!(eval(ViolationKind::CodeTestRatioLow, &ctx(0, 3)), RuleOutcome::Clear);
    }

    #[test]
    fn claimed_success_must_match_tests() {
        let ctx = |claimed, actual| EvaluationContext {
            claimed_success: Some(claimed),
            tests_succeeded: Some(actual),
            ..Default::default()
        };
        assert!(is_triggered(&eval(ViolationKind::ClaimMismatch, &ctx(true, false))));
        assert!(is_triggered(&eval(ViolationKind::ClaimMismatch, &ctx(false, true))));
        assert_eq!(eval(ViolationKind::ClaimMismatch, &ctx(true, true)), RuleOutcome::Clear);
        assert_eq!(
            eval(ViolationKind::ClaimMismatch, &EvaluationContext::default()),
            RuleOutcome::Missing("claimed_success")
        );
    }

    #[test]
    fn hardcoded_urls_rule() {
        let found = EvaluationContext {
            url_findings: Some(2),
            ..Default::default()
        };
        let none = EvaluationContext {
            url_findings: Some(0),
            ..Default::default()
        };
        assert!(is_triggered(&eval(ViolationKind::HardcodedUrls, &found)));
        assert_eq!(eval(ViolationKind::HardcodedUrls, &none), RuleOutcome::Clear);
    }
}
