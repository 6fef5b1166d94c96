//! Runs and their lifecycle state machine.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::build::{Task, TestSummary};
use super::decision::PolicyDecision;
use super::violation::Violation;

/// Lifecycle state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Created,
    Built,
    Tested,
    IntegrityChecked,
    AutoApproved,
    AwaitingApproval,
    Approved,
    Rejected,
    PrOpened,
    RegenerationQueued,
    Error,
}

/// An action that moves a run between states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    RecordBuild,
    RecordTests,
    CheckIntegrity,
    AutoApprove,
    HoldForReview,
    Approve,
    Reject,
    QueueRegeneration,
    OpenPullRequest,
    Fail,
}

impl RunState {
    pub const ALL: [RunState; 11] = [
        Self::Created,
        Self::Built,
        Self::Tested,
        Self::IntegrityChecked,
        Self::AutoApproved,
        Self::AwaitingApproval,
        Self::Approved,
        Self::Rejected,
        Self::PrOpened,
        Self::RegenerationQueued,
        Self::Error,
    ];

    /// The transition table. `None` means the transition is illegal here.
    pub fn next(self, transition: Transition) -> Option<RunState> {
        use RunState as S;
        use Transition as T;

        match (self, transition) {
            (S::Created, T::RecordBuild) => Some(S::Built),
            (S::Built, T::RecordTests) => Some(S::Tested),
            (S::Tested, T::CheckIntegrity) => Some(S::IntegrityChecked),
            (S::IntegrityChecked, T::AutoApprove) => Some(S::AutoApproved),
            (S::IntegrityChecked, T::HoldForReview) => Some(S::AwaitingApproval),
            (S::AwaitingApproval, T::Approve) => Some(S::Approved),
            (S::AwaitingApproval, T::Reject) => Some(S::Rejected),
            (S::Rejected, T::QueueRegeneration) => Some(S::RegenerationQueued),
            (S::AutoApproved | S::Approved, T::OpenPullRequest) => Some(S::PrOpened),
            (state, T::Fail) if !state.is_terminal() => Some(S::Error),
            _ => None,
        }
    }

    /// Terminal states accept no further transitions.
    ///
    /// `Rejected` only stays observable when no regeneration was requested;
    /// otherwise it moves on to `RegenerationQueued` under the same lock.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::PrOpened | Self::Rejected | Self::Error)
    }

    /// Whether the gate has already produced a decision for this run.
    pub fn is_past_gate(self) -> bool {
        !matches!(
            self,
            Self::Created | Self::Built | Self::Tested | Self::IntegrityChecked
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Built => "built",
            Self::Tested => "tested",
            Self::IntegrityChecked => "integrity_checked",
            Self::AutoApproved => "auto_approved",
            Self::AwaitingApproval => "awaiting_approval",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::PrOpened => "pr_opened",
            Self::RegenerationQueued => "regeneration_queued",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Transition {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RecordBuild => "record_build",
            Self::RecordTests => "record_tests",
            Self::CheckIntegrity => "check_integrity",
            Self::AutoApprove => "auto_approve",
            Self::HoldForReview => "hold_for_review",
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::QueueRegeneration => "queue_regeneration",
            Self::OpenPullRequest => "open_pull_request",
            Self::Fail => "fail",
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The human verdict recorded on a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum HumanDecision {
    Approved {
        /// Recorded verbatim; may be empty.
        justification: String,
        decided_at: DateTime<Utc>,
    },
    Rejected {
        reason: String,
        regenerate: bool,
        decided_at: DateTime<Utc>,
    },
}

/// Pull request reported by the PR service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestRef {
    pub url: String,
    #[serde(default)]
    pub number: Option<u64>,
    #[serde(default)]
    pub branch: Option<String>,
}

/// One entry of the run's audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateChange {
    pub from: RunState,
    pub to: RunState,
    pub transition: Transition,
    pub at: DateTime<Utc>,
}

/// One attempt to produce and gate a code change for a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub run_id: Uuid,
    pub task: Task,
    pub state: RunState,

    /// 0..=100, set once the gate has run.
    pub integrity_score: Option<u8>,
    pub violations: Vec<Violation>,
    pub decision: Option<PolicyDecision>,
    pub questions: Vec<String>,

    pub test_summary: Option<TestSummary>,
    pub diff: Option<String>,

    pub human_decision: Option<HumanDecision>,
    pub regenerate: bool,
    pub pull_request: Option<PullRequestRef>,
    pub error: Option<String>,

    /// Bumped on every committed transition.
    pub revision: u64,
    pub history: Vec<StateChange>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Run {
    pub fn new(task: Task) -> Self {
        let now = Utc::now();
        Self {
            run_id: Uuid::new_v4(),
            task,
            state: RunState::Created,
            integrity_score: None,
            violations: Vec::new(),
            decision: None,
            questions: Vec::new(),
            test_summary: None,
            diff: None,
            human_decision: None,
            regenerate: false,
            pull_request: None,
            error: None,
            revision: 0,
            history: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply `transition` if the table allows it, returning the new state.
    ///
    /// On `None` the run is untouched.
    pub fn advance(&mut self, transition: Transition, at: DateTime<Utc>) -> Option<RunState> {
        let to = self.state.next(transition)?;
        self.history.push(StateChange {
            from: self.state,
            to,
            transition,
            at,
        });
        self.state = to;
        self.revision += 1;
        self.updated_at = at;
        Some(to)
    }

    /// Justification if the run was approved by a human.
    pub fn justification(&self) -> Option<&str> {
        match &self.human_decision {
            Some(HumanDecision::Approved { justification, .. }) => Some(justification),
            _ => None,
        }
    }

    pub fn rejection_reason(&self) -> Option<&str> {
        match &self.human_decision {
            Some(HumanDecision::Rejected { reason, .. }) => Some(reason),
            _ => None,
        }
    }
}
