//! Policy evaluator.
//!
//! Runs every enabled catalog rule against an [`EvaluationContext`] and
//! aggregates the triggered rules into a [`PolicyDecision`]. The evaluator
//! holds only an immutable rule set, so one instance can be shared across
//! threads and called concurrently on independent contexts.

use std::sync::Arc;

use crate::catalog::{RuleOutcome, CATALOG};
use crate::config::RuleConfig;
use crate::domain::{EvaluationContext, EvaluationDataMissing, PolicyDecision, Violation};

/// Evaluates contexts against one versioned rule set.
#[derive(Debug, Clone)]
pub struct PolicyEvaluator {
    config: Arc<RuleConfig>,
    digest: String,
}

impl PolicyEvaluator {
    pub fn new(config: Arc<RuleConfig>) -> Self {
        let digest = config.digest();
        Self { config, digest }
    }

    pub fn config(&self) -> &RuleConfig {
        &self.config
    }

    /// Evaluate all enabled rules. Pure: no side effects beyond debug logs.
    pub fn evaluate(&self, ctx: &EvaluationContext) -> PolicyDecision {
        let mut violations = Vec::new();
        let mut skipped = Vec::new();

        for rule in CATALOG.iter().filter(|r| self.config.is_enabled(r.kind)) {
            match rule.evaluate(ctx, &self.config) {
                RuleOutcome::Clear => {}
                RuleOutcome::Triggered(message) => {
                    violations.push(Violation::new(rule.kind, message));
                }
                RuleOutcome::Missing(field) => {
                    tracing::debug!(rule = %rule.kind, field, "rule skipped: context field absent");
                    skipped.push(EvaluationDataMissing {
                        kind: rule.kind,
                        field: field.to_string(),
                    });
                }
            }
        }

        PolicyDecision {
            violations,
            skipped,
            rule_set_version: self.config.version.clone(),
            rule_set_digest: self.digest.clone(),
        }
    }
}

impl Default for PolicyEvaluator {
    fn default() -> Self {
        Self::new(Arc::new(RuleConfig::default()))
    }
}
