//! The integrity gate service.
//!
//! Owns the run registry and drives each run through its state machine:
//! ingest a build, evaluate and score it, then either auto-approve or hold it
//! for a human. Every run sits behind its own mutex. A transition is applied
//! to a copy of the run and committed only if every step succeeds, so a
//! failed action never leaves a partially updated run behind.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::assemble::assemble_context;
use crate::config::RuleConfig;
use crate::domain::{
    BuildResult, DecisionSummary, HumanDecision, PolicyDecision, PullRequestRef, Run, RunState,
    Task, Transition, Violation,
};
use crate::error::{GateError, GateResult};
use crate::handoff::{handoff_channel, Handoff, HandoffReceiver, HandoffSender};
use crate::metrics::METRICS;
use crate::obs::{self, RunSpan};
use crate::policy::PolicyEvaluator;
use crate::scorer::IntegrityScorer;
use crate::tamper::TamperDetector;

/// What a reviewer needs to decide a held run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewPayload {
    pub decision: PolicyDecision,
    pub score: u8,
    pub violations: Vec<Violation>,
    pub questions: Vec<String>,
}

/// Result of submitting a build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateOutcome {
    pub run_id: Uuid,
    pub state: RunState,
    pub integrity_score: Option<u8>,
    pub decision: Option<DecisionSummary>,
    /// Present only while the run is awaiting approval.
    pub review: Option<ReviewPayload>,
}

impl GateOutcome {
    fn from_run(run: &Run) -> Self {
        let review = match (&run.decision, run.integrity_score) {
            (Some(decision), Some(score)) if run.state == RunState::AwaitingApproval => {
                Some(ReviewPayload {
                    decision: decision.clone(),
                    score,
                    violations: run.violations.clone(),
                    questions: run.questions.clone(),
                })
            }
            _ => None,
        };
        Self {
            run_id: run.run_id,
            state: run.state,
            integrity_score: run.integrity_score,
            decision: run.decision.as_ref().map(PolicyDecision::summary),
            review,
        }
    }
}

/// Fleet-level view over all runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntegritySummary {
    pub total_runs: usize,
    /// Mean score over runs that have been gated.
    pub average_score: Option<f64>,
    pub by_state: BTreeMap<RunState, usize>,
    pub score_distribution: ScoreDistribution,
}

/// Gated runs per score band.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreDistribution {
    /// 80 and above.
    pub high: usize,
    /// 60 to 79.
    pub medium: usize,
    /// Below 60.
    pub low: usize,
}

type RunCell = Arc<Mutex<Run>>;

pub struct IntegrityGate {
    config: Arc<RuleConfig>,
    evaluator: PolicyEvaluator,
    scorer: IntegrityScorer,
    detector: TamperDetector,
    runs: RwLock<HashMap<Uuid, RunCell>>,
    handoffs: HandoffSender,
}

impl std::fmt::Debug for IntegrityGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntegrityGate")
            .field("rule_set", &self.config.version)
            .finish_non_exhaustive()
    }
}

impl IntegrityGate {
    /// A gate without a handoff worker. Collaborator handoffs are dropped.
    pub fn new(config: RuleConfig) -> GateResult<Self> {
        Self::build(config, HandoffSender::detached())
    }

    /// A gate plus the receiving end of its handoff queue.
    pub fn with_handoffs(config: RuleConfig) -> GateResult<(Self, HandoffReceiver)> {
        let (tx, rx) = handoff_channel();
        Ok((Self::build(config, tx)?, rx))
    }

    fn build(config: RuleConfig, handoffs: HandoffSender) -> GateResult<Self> {
        config.validate()?;
        let config = Arc::new(config);
        Ok(Self {
            evaluator: PolicyEvaluator::new(config.clone()),
            scorer: IntegrityScorer::new(config.clone()),
            detector: TamperDetector::new(config.clone())?,
            config,
            runs: RwLock::new(HashMap::new()),
            handoffs,
        })
    }

    pub fn config(&self) -> &RuleConfig {
        &self.config
    }

    /// Register a new run for `task` in state `created`.
    pub fn create_run(&self, task: Task) -> Uuid {
        let run = Run::new(task);
        let run_id = run.run_id;
        obs::emit_run_created(&run_id.to_string(), &run.task.task_id.to_string());
        self.runs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(run_id, Arc::new(Mutex::new(run)));
        run_id
    }

    fn cell(&self, run_id: Uuid) -> GateResult<RunCell> {
        self.runs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&run_id)
            .cloned()
            .ok_or(GateError::RunNotFound(run_id))
    }

    /// Apply `f` to a copy of the run under its lock and commit on success.
    fn transact<T>(
        &self,
        run_id: Uuid,
        f: impl FnOnce(&mut Run) -> GateResult<T>,
    ) -> GateResult<T> {
        let cell = self.cell(run_id)?;
        let mut guard = cell.lock().unwrap_or_else(PoisonError::into_inner);
        let mut draft = guard.clone();
        let seen = draft.history.len();

        match f(&mut draft) {
            Ok(value) => {
                for change in &draft.history[seen..] {
                    obs::emit_state_changed(&run_id.to_string(), change.from, change.to);
                }
                *guard = draft;
                Ok(value)
            }
            Err(e) => {
                if matches!(
                    e,
                    GateError::InvalidTransition { .. } | GateError::StaleTransition { .. }
                ) {
                    METRICS.inc_refused_transitions();
                    obs::emit_transition_refused(&run_id.to_string(), &e);
                }
                Err(e)
            }
        }
    }

    /// Ingest a completed build and run the full gate.
    ///
    /// A run already past the gate is not re-evaluated: its stored outcome is
    /// returned unchanged.
    pub fn submit_build_result(&self, run_id: Uuid, build: BuildResult) -> GateResult<GateOutcome> {
        let _span = RunSpan::enter(&run_id.to_string());

        let (outcome, handoff, evaluated) = self.transact(run_id, |run| {
            if run.state.is_past_gate() {
                tracing::debug!(state = %run.state, "run already gated; returning stored outcome");
                return Ok((GateOutcome::from_run(run), None, false));
            }

            let now = Utc::now();
            step(run, Transition::RecordBuild, now)?;
            run.diff = Some(build.diff.clone());
            step(run, Transition::RecordTests, now)?;
            run.test_summary = Some(build.tests);

            let ctx = assemble_context(&run.task, &build, &self.detector, &self.config);
            let decision = self.evaluator.evaluate(&ctx);
            let assessment = self.scorer.score(&ctx, &decision.violations);
            step(run, Transition::CheckIntegrity, now)?;

            let allowed = decision.allowed();
            let auto = allowed && assessment.score >= self.config.thresholds.min_integrity_score;
            run.integrity_score = Some(assessment.score);
            run.violations = decision.violations.clone();
            run.questions = assessment.questions;

            let handoff = if auto {
                step(run, Transition::AutoApprove, now)?;
                Some(Handoff::OpenPullRequest {
                    run_id: run.run_id,
                    task: run.task.clone(),
                    diff: build.diff.clone(),
                    justification: None,
                })
            } else {
                step(run, Transition::HoldForReview, now)?;
                None
            };

            obs::emit_gate_evaluated(
                &run.run_id.to_string(),
                assessment.score,
                &decision,
                run.state,
            );
            run.decision = Some(decision);
            Ok((GateOutcome::from_run(run), handoff, true))
        })?;

        if evaluated {
            METRICS.inc_builds_evaluated();
            match handoff {
                Some(handoff) => {
                    METRICS.inc_auto_approved();
                    self.handoffs.send(handoff);
                }
                None => METRICS.inc_held_for_review(),
            }
        }
        Ok(outcome)
    }

    /// Human approval of a held run. `justification` is stored verbatim and
    /// may be empty.
    pub fn approve(&self, run_id: Uuid, justification: &str) -> GateResult<RunState> {
        let _span = RunSpan::enter(&run_id.to_string());

        let (state, handoff) = self.transact(run_id, |run| {
            let now = Utc::now();
            step(run, Transition::Approve, now)?;
            run.human_decision = Some(HumanDecision::Approved {
                justification: justification.to_string(),
                decided_at: now,
            });
            let handoff = Handoff::OpenPullRequest {
                run_id: run.run_id,
                task: run.task.clone(),
                diff: run.diff.clone().unwrap_or_default(),
                justification: Some(justification.to_string()),
            };
            Ok((run.state, handoff))
        })?;

        METRICS.inc_approvals();
        obs::emit_human_decision(&run_id.to_string(), "approved", false);
        self.handoffs.send(handoff);
        Ok(state)
    }

    /// Human rejection of a held run. With `regenerate` the task is handed
    /// back to the build pipeline, carrying `reason` as feedback.
    pub fn reject(&self, run_id: Uuid, reason: &str, regenerate: bool) -> GateResult<RunState> {
        if reason.trim().is_empty() {
            return Err(GateError::validation("reason", "rejection reason must not be empty"));
        }
        let _span = RunSpan::enter(&run_id.to_string());

        let (state, handoff) = self.transact(run_id, |run| {
            let now = Utc::now();
            step(run, Transition::Reject, now)?;
            run.human_decision = Some(HumanDecision::Rejected {
                reason: reason.to_string(),
                regenerate,
                decided_at: now,
            });
            run.regenerate = regenerate;

            let handoff = if regenerate {
                step(run, Transition::QueueRegeneration, now)?;
                Some(Handoff::Regenerate {
                    run_id: run.run_id,
                    task: run.task.clone(),
                    feedback: reason.to_string(),
                })
            } else {
                None
            };
            Ok((run.state, handoff))
        })?;

        METRICS.inc_rejections();
        obs::emit_human_decision(&run_id.to_string(), "rejected", regenerate);
        if let Some(handoff) = handoff {
            METRICS.inc_regenerations_queued();
            self.handoffs.send(handoff);
        }
        Ok(state)
    }

    /// Called when the PR collaborator reports the pull request is open.
    pub fn record_pr_opened(&self, run_id: Uuid, pull_request: PullRequestRef) -> GateResult<RunState> {
        let _span = RunSpan::enter(&run_id.to_string());
        let state = self.transact(run_id, |run| {
            step(run, Transition::OpenPullRequest, Utc::now())?;
            run.pull_request = Some(pull_request);
            Ok(run.state)
        })?;
        METRICS.inc_prs_opened();
        Ok(state)
    }

    /// Move a non-terminal run to `error`.
    pub fn record_failure(&self, run_id: Uuid, reason: &str) -> GateResult<RunState> {
        let _span = RunSpan::enter(&run_id.to_string());
        let state = self.transact(run_id, |run| {
            step(run, Transition::Fail, Utc::now())?;
            run.error = Some(reason.to_string());
            Ok(run.state)
        })?;
        METRICS.inc_run_errors();
        obs::emit_run_failed(&run_id.to_string(), reason);
        Ok(state)
    }

    /// Snapshot of one run.
    pub fn get_run(&self, run_id: Uuid) -> GateResult<Run> {
        let cell = self.cell(run_id)?;
        let run = cell.lock().unwrap_or_else(PoisonError::into_inner).clone();
        Ok(run)
    }

    /// Snapshots of all runs, oldest first.
    pub fn list_runs(&self) -> Vec<Run> {
        let cells: Vec<RunCell> = self
            .runs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        let mut runs: Vec<Run> = cells
            .iter()
            .map(|cell| cell.lock().unwrap_or_else(PoisonError::into_inner).clone())
            .collect();
        runs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.run_id.cmp(&b.run_id)));
        runs
    }

    pub fn summary(&self) -> IntegritySummary {
        let runs = self.list_runs();
        let mut summary = IntegritySummary {
            total_runs: runs.len(),
            ..Default::default()
        };

        let mut total = 0u64;
        let mut scored = 0u64;
        for run in &runs {
            *summary.by_state.entry(run.state).or_insert(0) += 1;
            if let Some(score) = run.integrity_score {
                total += u64::from(score);
                scored += 1;
                let bands = &mut summary.score_distribution;
                if score >= 80 {
                    bands.high += 1;
                } else if score >= 60 {
                    bands.medium += 1;
                } else {
                    bands.low += 1;
                }
            }
        }
        if scored > 0 {
            summary.average_score = Some(total as f64 / scored as f64);
        }
        summary
    }
}

/// Advance `run` or explain why it cannot move.
fn step(run: &mut Run, transition: Transition, at: chrono::DateTime<Utc>) -> GateResult<RunState> {
    let current = run.state;
    run.advance(transition, at).ok_or_else(|| {
        let decided = matches!(transition, Transition::Approve | Transition::Reject)
            && run.human_decision.is_some();
        if decided {
            GateError::StaleTransition {
                run_id: run.run_id,
                current,
                attempted: transition,
            }
        } else {
            GateError::InvalidTransition {
                run_id: run.run_id,
                current,
                attempted: transition,
            }
        }
    })
}
