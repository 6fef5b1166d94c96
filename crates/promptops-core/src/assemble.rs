//! Builds the [`EvaluationContext`] for one build.
//!
//! Explicit metrics from the build pipeline win over values derived here;
//! derived values only fill gaps.

use crate::config::RuleConfig;
use crate::diff::{FileStatus, ParsedDiff};
use crate::domain::{BuildResult, EvaluationContext, Task};
use crate::scan;
use crate::tamper::TamperDetector;

/// Assemble the context the catalog evaluates for `build` of `task`.
pub fn assemble_context(
    task: &Task,
    build: &BuildResult,
    detector: &TamperDetector,
    config: &RuleConfig,
) -> EvaluationContext {
    let diff = ParsedDiff::parse(&build.diff);
    let metrics = &build.metrics;

    let mut large_files = metrics.large_files.clone();
    for (path, size) in &metrics.file_sizes {
        if *size >= config.thresholds.large_file_bytes && !large_files.contains(path) {
            large_files.push(path.clone());
        }
    }

    let secrets = scan::count_secrets(&diff);
    let secret_findings = match metrics.secret_findings {
        Some(reported) => Some(reported.saturating_add(secrets)),
        None => Some(secrets),
    };
    let urls = scan::count_urls(&diff);
    let url_findings = Some(metrics.url_findings.map_or(urls, |r| r.saturating_add(urls)));

    let (code, tests) = added_line_split(&diff, detector);

    let ctx = EvaluationContext {
        diff_loc: Some(diff.changed_lines()),
        acceptance_criteria: metrics
            .acceptance_criteria
            .clone()
            .or_else(|| scan::extract_acceptance_criteria(&task.prompt)),
        new_dependencies: metrics.new_dependencies.clone(),
        dependency_justification: metrics.dependency_justification.clone(),
        security_findings: metrics.security_findings,
        performance_findings: metrics.performance_findings,
        secret_findings,
        url_findings,
        test_files: None,
        large_files,
        coverage: metrics.coverage,
        diff_coverage: metrics.diff_coverage,
        coverage_threshold: metrics.coverage_threshold,
        baseline_threshold: metrics.baseline_threshold,
        baseline_coverage: metrics.baseline_coverage,
        code_lines: metrics.code_lines.or(Some(code)),
        test_lines: metrics.test_lines.or(Some(tests)),
        tests_failed: Some(build.tests.failed),
        tests_skipped: Some(build.tests.skipped),
        tests_succeeded: Some(build.tests.succeeded()),
        claimed_success: metrics.claimed_success,
        test_changes: Vec::new(),
        deleted_test_files: Vec::new(),
        integrity_violations: metrics.integrity_violations.clone(),
        integrity_score: metrics.integrity_score,
        weasel_words: scan::find_weasel_words(&diff),
    };

    detector.detect(&diff, &build.commit_message, ctx)
}

/// Added lines in production code and in tests.
fn added_line_split(diff: &ParsedDiff, detector: &TamperDetector) -> (u64, u64) {
    let mut code = 0u64;
    let mut tests = 0u64;
    for file in diff.files.iter().filter(|f| f.status != FileStatus::Deleted) {
        let added = file.added.len() as u64;
        if detector.is_test_path(&file.path) {
            tests += added;
        } else if detector.is_source_path(&file.path) {
            code += added;
        }
    }
    (code, tests)
}
