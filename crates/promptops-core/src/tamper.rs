//! Tamper detector.
//!
//! Inspects a parsed diff for changes that weaken the quality bar instead of
//! meeting it: edited or deleted tests, edited guardrail configuration and
//! lowered coverage thresholds. Findings are written into the
//! [`EvaluationContext`] so the catalog rules can judge them.

use std::sync::{Arc, OnceLock};

use regex::Regex;

use crate::config::RuleConfig;
use crate::diff::{FileDiff, FileStatus, ParsedDiff};
use crate::domain::{EvaluationContext, MarkedChange};
use crate::error::{GateError, GateResult};

const SOURCE_EXTENSIONS: &[&str] = &[
    "py", "rs", "go", "js", "jsx", "ts", "tsx", "java", "kt", "rb", "c", "cc", "cpp", "h", "hpp",
    "cs", "swift", "scala",
];

fn fail_under() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"fail[_-]under["']?\s*[=:]?\s*(\d+(?:\.\d+)?)"#).expect("valid fail_under regex")
    })
}

/// Last fail-under value found on the given lines.
fn threshold_on(lines: &[String]) -> Option<f64> {
    lines
        .iter()
        .filter_map(|line| fail_under().captures(line))
        .filter_map(|caps| caps.get(1)?.as_str().parse::<f64>().ok())
        .last()
}

/// Classifies paths and extracts tamper signals from a diff.
#[derive(Debug, Clone)]
pub struct TamperDetector {
    config: Arc<RuleConfig>,
    test_patterns: Vec<Regex>,
    guardrail_patterns: Vec<Regex>,
}

impl TamperDetector {
    pub fn new(config: Arc<RuleConfig>) -> GateResult<Self> {
        let compile = |patterns: &[String]| -> GateResult<Vec<Regex>> {
            patterns
                .iter()
                .map(|p| {
                    Regex::new(p)
                        .map_err(|e| GateError::Config(format!("bad tamper pattern {p:?}: {e}")))
                })
                .collect()
        };
        let test_patterns = compile(&config.tamper.test_patterns)?;
        let guardrail_patterns = compile(&config.tamper.guardrail_patterns)?;
        Ok(Self {
            config,
            test_patterns,
            guardrail_patterns,
        })
    }

    pub fn is_whitelisted(&self, path: &str) -> bool {
        self.config
            .tamper
            .whitelist
            .iter()
            .any(|entry| path.contains(entry.as_str()))
    }

    pub fn is_test_path(&self, path: &str) -> bool {
        self.test_patterns.iter().any(|re| re.is_match(path))
    }

    pub fn is_guardrail_path(&self, path: &str) -> bool {
        self.guardrail_patterns.iter().any(|re| re.is_match(path))
    }

    /// Production code: a known source extension outside tests and guardrails.
    pub fn is_source_path(&self, path: &str) -> bool {
        if self.is_test_path(path) || self.is_guardrail_path(path) {
            return false;
        }
        path.rsplit_once('.')
            .map_or(false, |(_, ext)| SOURCE_EXTENSIONS.contains(&ext))
    }

    /// A test renamed to a path outside the test tree.
    fn moved_out_of_tests(&self, file: &FileDiff) -> bool {
        file.status == FileStatus::Renamed
            && !self.is_test_path(&file.path)
            && file
                .old_path
                .as_deref()
                .map_or(false, |old| self.is_test_path(old))
    }

    fn marker_for(&self, file: &FileDiff, commit_message: &str) -> Option<String> {
        let marker = self.config.change_marker.as_str();
        (commit_message.contains(marker) || file.mentions(marker)).then(|| marker.to_string())
    }

    /// Fill the tamper-related fields of `ctx` from `diff`.
    ///
    /// Guardrail edits are always recorded. Added or modified tests are only
    /// recorded when the diff touches no production code, since tests that
    /// travel with a code change are the expected case. Deleted tests, and
    /// tests renamed out of the test tree, are always recorded as deletions.
    pub fn detect(
        &self,
        diff: &ParsedDiff,
        commit_message: &str,
        mut ctx: EvaluationContext,
    ) -> EvaluationContext {
        let touches_source = diff
            .files
            .iter()
            .any(|f| {
                f.status != FileStatus::Deleted
                    && self.is_source_path(&f.path)
                    && !self.moved_out_of_tests(f)
            });

        let mut test_files = Vec::new();

        for file in &diff.files {
            if self.is_whitelisted(&file.path) {
                tracing::debug!(path = %file.path, "whitelisted path skipped");
                continue;
            }

            if self.is_guardrail_path(&file.path) {
                ctx.test_changes.push(MarkedChange::new(
                    file.path.clone(),
                    self.marker_for(file, commit_message),
                ));
                self.record_threshold_edit(file, &mut ctx);
                continue;
            }

            if self.moved_out_of_tests(file) {
                let old = file.old_path.clone().unwrap_or_default();
                tracing::debug!(from = %old, to = %file.path, "test renamed out of the test tree");
                ctx.deleted_test_files
                    .push(MarkedChange::new(old, self.marker_for(file, commit_message)));
                continue;
            }

            if !self.is_test_path(&file.path) {
                continue;
            }

            if file.status == FileStatus::Deleted {
                ctx.deleted_test_files.push(MarkedChange::new(
                    file.path.clone(),
                    self.marker_for(file, commit_message),
                ));
                continue;
            }

            test_files.push(file.path.clone());
            if !touches_source {
                ctx.test_changes.push(MarkedChange::new(
                    file.path.clone(),
                    self.marker_for(file, commit_message),
                ));
            }
        }

        if !ctx.test_changes.is_empty() || !ctx.deleted_test_files.is_empty() {
            tracing::debug!(
                test_changes = ctx.test_changes.len(),
                deleted = ctx.deleted_test_files.len(),
                "tamper signals detected"
            );
        }

        match ctx.test_files.as_mut() {
            Some(existing) => {
                for path in test_files {
                    if !existing.contains(&path) {
                        existing.push(path);
                    }
                }
            }
            None if diff.files.is_empty() => {}
            None => ctx.test_files = Some(test_files),
        }
        ctx
    }

    fn record_threshold_edit(&self, file: &FileDiff, ctx: &mut EvaluationContext) {
        let Some(new) = threshold_on(&file.added) else {
            return;
        };
        ctx.coverage_threshold = Some(new);
        if let Some(old) = threshold_on(&file.removed) {
            let baseline = ctx.baseline_threshold.map_or(old, |b| b.max(old));
            ctx.baseline_threshold = Some(baseline);
            if new < old {
                tracing::warn!(path = %file.path, old, new, "coverage threshold lowered");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MarkerMode;

    fn detector() -> TamperDetector {
        TamperDetector::new(Arc::new(RuleConfig::default())).unwrap()
    }

    fn run(diff: &str, message: &str) -> EvaluationContext {
        detector().detect(&ParsedDiff::parse(diff), message, EvaluationContext::default())
    }

    const CODE_AND_TEST: &str = "\
diff --git a/src/auth.py b/src/auth.py
--- a/src/auth.py
+++ b/src/auth.py
@@ -1 +1 @@
-def login(): pass
+def login(): return True
diff --git a/tests/test_auth.py b/tests/test_auth.py
--- a/tests/test_auth.py
+++ b/tests/test_auth.py
@@ -1 +1,2 @@
 def test_login():
+    assert login()
";

    const TEST_ONLY: &str = "\
diff --git a/tests/test_auth.py b/tests/test_auth.py
--- a/tests/test_auth.py
+++ b/tests/test_auth.py
@@ -1,2 +1,2 @@
 def test_login():
-    assert login() is True
+    assert True
";

    const DELETED_TEST: &str = "\
diff --git a/tests/test_payments.py b/tests/test_payments.py
deleted file mode 100644
--- a/tests/test_payments.py
+++ /dev/null
@@ -1,2 +0,0 @@
-def test_refund():
-    assert refund(10) == 10
";

    const LOWERED_THRESHOLD: &str = "\
diff --git a/pyproject.toml b/pyproject.toml
--- a/pyproject.toml
+++ b/pyproject.toml
@@ -1,3 +1,3 @@
 [tool.coverage.report]
-fail_under = 85
+fail_under = 70
 show_missing = true
";

    #[test]
    fn path_classification() {
        let d = detector();
        assert!(d.is_test_path("tests/test_auth.py"));
        assert!(d.is_test_path("pkg/auth_test.go"));
        assert!(d.is_test_path("web/login.spec.ts"));
        assert!(!d.is_test_path("src/auth.py"));
        assert!(d.is_guardrail_path(".github/workflows/ci.yml"));
        assert!(d.is_guardrail_path("pyproject.toml"));
        assert!(d.is_source_path("src/auth.py"));
        assert!(!d.is_source_path("README.md"));
        assert!(!d.is_source_path("tests/test_auth.py"));
        assert!(d.is_whitelisted("htmlcov/index.html"));
    }

    #[test]
    fn tests_alongside_code_are_not_tamper() {
        let ctx = run(CODE_AND_TEST, "add login");
        assert!(ctx.test_changes.is_empty());
        assert_eq!(ctx.test_files, Some(vec!["tests/test_auth.py".to_string()]));
    }

    #[test]
    fn test_only_edit_is_recorded_unmarked() {
        let ctx = run(TEST_ONLY, "fix flaky test");
        assert_eq!(ctx.test_changes, vec![MarkedChange::new("tests/test_auth.py", None)]);
    }

    #[test]
    fn commit_message_marker_acknowledges_change() {
        let ctx = run(TEST_ONLY, "relax assertion #TEST_CHANGE");
        assert!(ctx.test_changes[0].carries("#TEST_CHANGE"));
    }

    #[test]
    fn marker_on_changed_line_acknowledges_change() {
        let diff = TEST_ONLY.replace("+    assert True", "+    assert True  # #TEST_CHANGE");
        let ctx = run(&diff, "");
        assert!(ctx.test_changes[0].carries("#TEST_CHANGE"));
    }

    #[test]
    fn deleted_tests_are_recorded() {
        let ctx = run(DELETED_TEST, "cleanup");
        assert_eq!(
            ctx.deleted_test_files,
            vec![MarkedChange::new("tests/test_payments.py", None)]
        );
        assert_eq!(ctx.test_files, Some(vec![]));
    }

    const RENAMED_OUT: &str = "\
diff --git a/src/refunds.py b/src/refunds.py
--- a/src/refunds.py
+++ b/src/refunds.py
@@ -1 +1,2 @@
 def refund(x):
+    return x
diff --git a/tests/test_refunds.py b/docs/refunds_notes.txt
similarity index 100%
rename from tests/test_refunds.py
rename to docs/refunds_notes.txt
";

    #[test]
    fn test_renamed_out_of_tree_counts_as_deletion() {
        let ctx = run(RENAMED_OUT, "move notes");
        assert_eq!(
            ctx.deleted_test_files,
            vec![MarkedChange::new("tests/test_refunds.py", None)]
        );
        assert_eq!(ctx.test_files, Some(vec![]));

        let marked = run(RENAMED_OUT, "move notes #TEST_CHANGE");
        assert!(marked.deleted_test_files[0].carries("#TEST_CHANGE"));
    }

    #[test]
    fn test_renamed_within_tree_is_an_edit() {
        let diff = "\
diff --git a/tests/test_a.py b/tests/unit/test_a.py
similarity index 100%
rename from tests/test_a.py
rename to tests/unit/test_a.py
";
        let ctx = run(diff, "");
        assert!(ctx.deleted_test_files.is_empty());
        assert_eq!(ctx.test_files, Some(vec!["tests/unit/test_a.py".to_string()]));
        assert_eq!(ctx.test_changes.len(), 1);
    }

    #[test]
    fn lowered_threshold_sets_both_values() {
        let ctx = run(LOWERED_THRESHOLD, "");
        assert_eq!(ctx.coverage_threshold, Some(70.0));
        assert_eq!(ctx.baseline_threshold, Some(85.0));
        assert_eq!(ctx.test_changes.len(), 1);
        assert_eq!(ctx.test_changes[0].path, "pyproject.toml");
    }

    #[test]
    fn stored_baseline_is_never_lowered() {
        let ctx = detector().detect(
            &ParsedDiff::parse(LOWERED_THRESHOLD),
            "",
            EvaluationContext {
                baseline_threshold: Some(90.0),
                ..Default::default()
            },
        );
        assert_eq!(ctx.baseline_threshold, Some(90.0));
    }

    #[test]
    fn whitelisted_paths_are_ignored() {
        let diff = "\
diff --git a/htmlcov/tests/index.html b/htmlcov/tests/index.html
--- a/htmlcov/tests/index.html
+++ b/htmlcov/tests/index.html
@@ -1 +1 @@
-old
+new
";
        let ctx = run(diff, "");
        assert!(ctx.test_changes.is_empty());
    }

    #[test]
    fn custom_marker_is_used() {
        let config = RuleConfig {
            change_marker: "[tests-ok]".into(),
            marker_mode: MarkerMode::EveryEntry,
            ..RuleConfig::default()
        };
        let detector = TamperDetector::new(Arc::new(config)).unwrap();
        let ctx = detector.detect(
            &ParsedDiff::parse(TEST_ONLY),
            "[tests-ok] relax",
            EvaluationContext::default(),
        );
        assert!(ctx.test_changes[0].carries("[tests-ok]"));
    }

    #[test]
    fn existing_test_files_are_merged() {
        let ctx = detector().detect(
            &ParsedDiff::parse(CODE_AND_TEST),
            "",
            EvaluationContext {
                test_files: Some(vec!["tests/test_other.py".into()]),
                ..Default::default()
            },
        );
        assert_eq!(
            ctx.test_files,
            Some(vec![
                "tests/test_other.py".to_string(),
                "tests/test_auth.py".to_string()
            ])
        );
    }
}
