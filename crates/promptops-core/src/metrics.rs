//! Process-wide gate counters.
//!
//! Counters are incremented at the call site; [`Metrics::flush`] emits the
//! current values as one `tracing::info!` event.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    builds_evaluated: AtomicU64,
    auto_approved: AtomicU64,
    held_for_review: AtomicU64,
    approvals: AtomicU64,
    rejections: AtomicU64,
    regenerations_queued: AtomicU64,
    prs_opened: AtomicU64,
    run_errors: AtomicU64,
    refused_transitions: AtomicU64,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub builds_evaluated: u64,
    pub auto_approved: u64,
    pub held_for_review: u64,
    pub approvals: u64,
    pub rejections: u64,
    pub regenerations_queued: u64,
    pub prs_opened: u64,
    pub run_errors: u64,
    pub refused_transitions: u64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

fn bump(counter: &AtomicU64, name: &'static str) {
    counter.fetch_add(1, Ordering::Relaxed);
    tracing::trace!(metric = name, "counter incremented");
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            builds_evaluated: AtomicU64::new(0),
            auto_approved: AtomicU64::new(0),
            held_for_review: AtomicU64::new(0),
            approvals: AtomicU64::new(0),
            rejections: AtomicU64::new(0),
            regenerations_queued: AtomicU64::new(0),
            prs_opened: AtomicU64::new(0),
            run_errors: AtomicU64::new(0),
            refused_transitions: AtomicU64::new(0),
        }
    }

    pub fn inc_builds_evaluated(&self) {
        bump(&self.builds_evaluated, "builds_evaluated");
    }

    pub fn inc_auto_approved(&self) {
        bump(&self.auto_approved, "auto_approved");
    }

    pub fn inc_held_for_review(&self) {
        bump(&self.held_for_review, "held_for_review");
    }

    pub fn inc_approvals(&self) {
        bump(&self.approvals, "approvals");
    }

    pub fn inc_rejections(&self) {
        bump(&self.rejections, "rejections");
    }

    pub fn inc_regenerations_queued(&self) {
        bump(&self.regenerations_queued, "regenerations_queued");
    }

    pub fn inc_prs_opened(&self) {
        bump(&self.prs_opened, "prs_opened");
    }

    pub fn inc_run_errors(&self) {
        bump(&self.run_errors, "run_errors");
    }

    /// Invalid or stale transition attempts.
    pub fn inc_refused_transitions(&self) {
        bump(&self.refused_transitions, "refused_transitions");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        MetricsSnapshot {
            builds_evaluated: load(&self.builds_evaluated),
            auto_approved: load(&self.auto_approved),
            held_for_review: load(&self.held_for_review),
            approvals: load(&self.approvals),
            rejections: load(&self.rejections),
            regenerations_queued: load(&self.regenerations_queued),
            prs_opened: load(&self.prs_opened),
            run_errors: load(&self.run_errors),
            refused_transitions: load(&self.refused_transitions),
        }
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        let s = self.snapshot();
        tracing::info!(
            metric = "flush",
            builds_evaluated = s.builds_evaluated,
            auto_approved = s.auto_approved,
            held_for_review = s.held_for_review,
            approvals = s.approvals,
            rejections = s.rejections,
            regenerations_queued = s.regenerations_queued,
            prs_opened = s.prs_opened,
            run_errors = s.run_errors,
            refused_transitions = s.refused_transitions,
        );
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        for counter in [
            &self.builds_evaluated,
            &self.auto_approved,
            &self.held_for_review,
            &self.approvals,
            &self.rejections,
            &self.regenerations_queued,
            &self.prs_opened,
            &self.run_errors,
            &self.refused_transitions,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}
