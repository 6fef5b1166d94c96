//! Structured lifecycle events for gated runs.
//!
//! Every state change a run goes through is emitted as one `info!` event with
//! a stable `event` field, inside a span tagged with the run id. Operators
//! filter on `event` (e.g. `gate.evaluated`) rather than on message text.

use tracing::info;

use crate::domain::{PolicyDecision, RunState};

/// RAII guard that enters a run-scoped span for the duration of an operation.
pub struct RunSpan {
    _span: tracing::span::EnteredSpan,
}

impl RunSpan {
    pub fn enter(run_id: &str) -> Self {
        let span = tracing::info_span!("promptops.run", run_id = %run_id);
        Self {
            _span: span.entered(),
        }
    }
}

pub fn emit_run_created(run_id: &str, task_id: &str) {
    info!(event = "run.created", run_id = %run_id, task_id = %task_id);
}

pub fn emit_state_changed(run_id: &str, from: RunState, to: RunState) {
    info!(
        event = "run.state_changed",
        run_id = %run_id,
        from = from.as_str(),
        to = to.as_str(),
    );
}

/// Gate evaluation completed: score, verdict and where the run went.
pub fn emit_gate_evaluated(run_id: &str, score: u8, decision: &PolicyDecision, outcome: RunState) {
    let max_severity = decision.max_severity().map_or("none", |s| s.as_str());
    info!(
        event = "gate.evaluated",
        run_id = %run_id,
        score = score,
        violations = decision.violation_count(),
        max_severity = max_severity,
        tamper = decision.has_tamper_signal(),
        allowed = decision.allowed(),
        outcome = outcome.as_str(),
    );
}

pub fn emit_human_decision(run_id: &str, decision: &str, regenerate: bool) {
    info!(
        event = "run.human_decision",
        run_id = %run_id,
        decision = %decision,
        regenerate = regenerate,
    );
}

pub fn emit_handoff_dispatched(run_id: &str, kind: &str) {
    info!(event = "handoff.dispatched", run_id = %run_id, kind = %kind);
}

pub fn emit_handoff_failed(run_id: &str, kind: &str, error: &dyn std::fmt::Display) {
    tracing::warn!(event = "handoff.failed", run_id = %run_id, kind = %kind, error = %error);
}

/// Rejected action on a run (warning level).
pub fn emit_transition_refused(run_id: &str, error: &dyn std::fmt::Display) {
    tracing::warn!(event = "run.transition_refused", run_id = %run_id, error = %error);
}

pub fn emit_run_failed(run_id: &str, reason: &str) {
    tracing::warn!(event = "run.failed", run_id = %run_id, reason = %reason);
}
