//! PromptOps integrity gate.
//!
//! Decides whether an AI-generated code change may proceed to a pull request
//! automatically, must wait for a human, or goes back for regeneration.

pub mod assemble;
pub mod catalog;
pub mod config;
pub mod diff;
pub mod domain;
pub mod error;
pub mod gate;
pub mod handoff;
pub mod metrics;
pub mod obs;
pub mod policy;
pub mod scan;
pub mod scorer;
pub mod tamper;
pub mod telemetry;

pub use assemble::assemble_context;
pub use catalog::{markers_satisfied, rule, Rule, RuleOutcome, CATALOG};
pub use config::{MarkerMode, RuleConfig, SeverityPenalties, TamperPatterns, Thresholds};
pub use diff::{FileDiff, FileStatus, ParsedDiff};
pub use domain::{
    BuildMetrics, BuildResult, DecisionSummary, EvaluationContext, EvaluationDataMissing,
    HumanDecision, MarkedChange, PolicyDecision, PullRequestRef, Run, RunState, Severity,
    StateChange, Task, TestSummary, Transition, Violation, ViolationKind,
};
pub use error::{GateError, GateResult};
pub use gate::{GateOutcome, IntegrityGate, IntegritySummary, ReviewPayload, ScoreDistribution};
pub use handoff::{
    handoff_channel, run_handoff_worker, Handoff, HandoffError, HandoffReceiver, HandoffSender,
    PullRequestService, RegenerationDispatcher,
};
pub use metrics::{Metrics, MetricsSnapshot, METRICS};
pub use policy::PolicyEvaluator;
pub use scorer::{IntegrityAssessment, IntegrityScorer, MAX_SCORE};
pub use tamper::TamperDetector;

/// Crate version, as reported by the CLI.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
