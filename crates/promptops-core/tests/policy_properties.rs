//! Evaluator and scorer properties over hand-built context families.

use std::sync::Arc;

use promptops_core::{
    EvaluationContext, IntegrityScorer, MarkedChange, PolicyEvaluator, RuleConfig, ViolationKind,
};

fn baseline() -> EvaluationContext {
    EvaluationContext {
        diff_loc: Some(80),
        acceptance_criteria: Some(vec!["login succeeds".into()]),
        security_findings: Some(0),
        performance_findings: Some(0),
        secret_findings: Some(0),
        test_files: Some(vec!["tests/test_login.py".into()]),
        coverage: Some(88.0),
        tests_failed: Some(0),
        tests_skipped: Some(0),
        ..Default::default()
    }
}

type Aggravation = (&'static str, fn(&mut EvaluationContext));

/// Each entry adds one violation-triggering condition to a context.
fn aggravations() -> [Aggravation; 22] {
    [
        ("diff", |c| c.diff_loc = Some(1_000)),
        ("criteria", |c| c.acceptance_criteria = Some(vec![])),
        ("deps", |c| c.new_dependencies = vec!["leftpad".into()]),
        ("security", |c| c.security_findings = Some(1)),
        ("performance", |c| c.performance_findings = Some(2)),
        ("tests", |c| c.test_files = Some(vec![])),
        ("large", |c| c.large_files = vec!["data.bin".into()]),
        ("secrets", |c| c.secret_findings = Some(1)),
        ("threshold", |c| c.coverage_threshold = Some(50.0)),
        ("coverage", |c| c.coverage = Some(40.0)),
        ("lowered", |c| {
            c.coverage_threshold = Some(85.0);
            c.baseline_threshold = Some(90.0);
        }),
        ("unmarked", |c| {
            c.test_changes = vec![MarkedChange::new("tests/test_login.py", None)]
        }),
        ("deleted", |c| {
            c.deleted_test_files = vec![MarkedChange::new("tests/test_old.py", None)]
        }),
        ("observer", |c| c.integrity_violations = vec!["suspicious skip".into()]),
        ("observer_score", |c| c.integrity_score = Some(10)),
        ("failing", |c| c.tests_failed = Some(3)),
        ("skipped", |c| c.tests_skipped = Some(4)),
        ("diff_coverage", |c| c.diff_coverage = Some(30.0)),
        ("coverage_drop", |c| c.baseline_coverage = Some(99.0)),
        ("ratio", |c| {
            c.code_lines = Some(500);
            c.test_lines = Some(4);
        }),
        ("claim", |c| {
            c.claimed_success = Some(true);
            c.tests_succeeded = Some(false);
        }),
        ("urls", |c| c.url_findings = Some(3)),
    ]
}

/// Every subset of the first `n` aggravations applied to the baseline.
fn family(n: usize) -> Vec<EvaluationContext> {
    let aggs = aggravations();
    let n = n.min(aggs.len());
    (0u32..(1 << n))
        .map(|mask| {
            let mut ctx = baseline();
            for (i, (_, apply)) in aggs.iter().take(n).enumerate() {
                if mask & (1 << i) != 0 {
                    apply(&mut ctx);
                }
            }
            ctx
        })
        .collect()
}

#[test]
fn every_kind_has_an_aggravation() {
    let evaluator = PolicyEvaluator::default();
    let mut seen = Vec::new();
    for (name, apply) in aggravations() {
        let mut ctx = baseline();
        apply(&mut ctx);
        let decision = evaluator.evaluate(&ctx);
        assert!(!decision.allowed(), "{name} should trigger a violation");
        seen.extend(decision.kinds());
    }
    for kind in ViolationKind::ALL {
        assert!(seen.contains(&kind), "{kind} never triggered");
    }
}

#[test]
fn allowed_iff_no_violations() {
    let evaluator = PolicyEvaluator::default();
    for ctx in family(10) {
        let decision = evaluator.evaluate(&ctx);
        assert_eq!(decision.allowed(), decision.violations.is_empty());
    }
}

#[test]
fn evaluation_and_scoring_are_deterministic() {
    let evaluator = PolicyEvaluator::default();
    let scorer = IntegrityScorer::default();
    for ctx in family(8) {
        let a = evaluator.evaluate(&ctx);
        let b = evaluator.evaluate(&ctx.clone());
        assert_eq!(a, b);
        assert_eq!(
            scorer.score(&ctx, &a.violations),
            scorer.score(&ctx, &b.violations)
        );
    }
}

#[test]
fn adding_a_condition_never_helps() {
    let evaluator = PolicyEvaluator::default();
    let scorer = IntegrityScorer::default();
    for ctx in family(8) {
        let before = evaluator.evaluate(&ctx);
        let before_score = scorer.score(&ctx, &before.violations).score;

        for (name, apply) in aggravations() {
            let mut worse = ctx.clone();
            apply(&mut worse);
            let after = evaluator.evaluate(&worse);
            let after_score = scorer.score(&worse, &after.violations).score;

            assert!(after_score <= before_score, "{name} raised the score");
            if !before.allowed() {
                assert!(!after.allowed(), "{name} flipped a denial");
            }
        }
    }
}

#[test]
fn score_ignores_violation_order() {
    let evaluator = PolicyEvaluator::default();
    let scorer = IntegrityScorer::default();
    let mut ctx = baseline();
    for (_, apply) in aggravations() {
        apply(&mut ctx);
    }
    let decision = evaluator.evaluate(&ctx);
    let mut reversed = decision.violations.clone();
    reversed.reverse();
    assert_eq!(
        scorer.score(&ctx, &decision.violations).score,
        scorer.score(&ctx, &reversed).score
    );
    assert_eq!(scorer.score(&ctx, &decision.violations).score, 0);
}

#[test]
fn rule_sets_coexist() {
    let strict = PolicyEvaluator::new(Arc::new(RuleConfig::from_toml_str(
        "version = \"strict\"\n[thresholds]\nmax_diff_lines = 50\n",
    )
    .unwrap()));
    let default = PolicyEvaluator::default();

    let ctx = baseline();
    assert!(default.evaluate(&ctx).allowed());
    let decision = strict.evaluate(&ctx);
    assert_eq!(decision.kinds(), vec![ViolationKind::DiffTooLarge]);
    assert_eq!(decision.rule_set_version, "strict");
}
