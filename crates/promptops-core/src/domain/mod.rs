//! Domain types for the integrity gate.

pub mod build;
pub mod context;
pub mod decision;
pub mod run;
pub mod violation;

pub use build::{BuildMetrics, BuildResult, Task, TestSummary};
pub use context::{EvaluationContext, MarkedChange};
pub use decision::{DecisionSummary, EvaluationDataMissing, PolicyDecision};
pub use run::{HumanDecision, PullRequestRef, Run, RunState, StateChange, Transition};
pub use violation::{Severity, Violation, ViolationKind};
