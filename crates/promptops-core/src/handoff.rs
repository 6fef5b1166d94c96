//! Fire-and-forget handoffs to external collaborators.
//!
//! The gate never waits on a collaborator. Entering `approved`/`auto_approved`
//! or `regeneration_queued` enqueues a [`Handoff`]; a worker task drains the
//! queue, calls the collaborator and reports the outcome back to the gate.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::domain::{PullRequestRef, Task};
use crate::gate::IntegrityGate;
use crate::obs;

/// Work handed to a collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Handoff {
    OpenPullRequest {
        run_id: Uuid,
        task: Task,
        diff: String,
        /// Human justification; `None` for auto-approved runs.
        justification: Option<String>,
    },
    Regenerate {
        run_id: Uuid,
        task: Task,
        /// Rejection reason, attached as feedback for the next attempt.
        feedback: String,
    },
}

impl Handoff {
    pub fn run_id(&self) -> Uuid {
        match self {
            Self::OpenPullRequest { run_id, .. } | Self::Regenerate { run_id, .. } => *run_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::OpenPullRequest { .. } => "open_pull_request",
            Self::Regenerate { .. } => "regenerate",
        }
    }
}

/// Failure reported by a collaborator.
#[derive(Debug, thiserror::Error)]
pub enum HandoffError {
    #[error("collaborator rejected the request: {0}")]
    Rejected(String),

    #[error("collaborator unavailable: {0}")]
    Unavailable(String),
}

pub type HandoffReceiver = mpsc::UnboundedReceiver<Handoff>;

/// Sending half held by the gate. Sending never blocks.
#[derive(Debug, Clone, Default)]
pub struct HandoffSender {
    tx: Option<mpsc::UnboundedSender<Handoff>>,
}

impl HandoffSender {
    /// A sender with no worker attached; handoffs are logged and dropped.
    pub fn detached() -> Self {
        Self { tx: None }
    }

    pub fn send(&self, handoff: Handoff) {
        let run_id = handoff.run_id().to_string();
        let kind = handoff.kind();
        match &self.tx {
            Some(tx) => match tx.send(handoff) {
                Ok(()) => obs::emit_handoff_dispatched(&run_id, kind),
                Err(_) => tracing::warn!(run_id = %run_id, kind, "handoff channel closed; dropped"),
            },
            None => tracing::debug!(run_id = %run_id, kind, "no handoff worker attached"),
        }
    }
}

/// Create a connected sender/receiver pair.
pub fn handoff_channel() -> (HandoffSender, HandoffReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (HandoffSender { tx: Some(tx) }, rx)
}

/// Opens pull requests for approved runs.
#[async_trait]
pub trait PullRequestService: Send + Sync {
    async fn open_pull_request(
        &self,
        run_id: Uuid,
        task: &Task,
        diff: &str,
        justification: Option<&str>,
    ) -> Result<PullRequestRef, HandoffError>;
}

/// Hands rejected tasks back to the build pipeline.
#[async_trait]
pub trait RegenerationDispatcher: Send + Sync {
    async fn dispatch(&self, run_id: Uuid, task: &Task, feedback: &str) -> Result<(), HandoffError>;
}

/// Drain `rx` until every sender is dropped, invoking collaborators and
/// reporting outcomes back to `gate`.
pub async fn run_handoff_worker(
    mut rx: HandoffReceiver,
    gate: Arc<IntegrityGate>,
    pull_requests: Arc<dyn PullRequestService>,
    regeneration: Arc<dyn RegenerationDispatcher>,
) {
    while let Some(handoff) = rx.recv().await {
        let run_id = handoff.run_id();
        let kind = handoff.kind();
        let outcome = match &handoff {
            Handoff::OpenPullRequest {
                task,
                diff,
                justification,
                ..
            } => match pull_requests
                .open_pull_request(run_id, task, diff, justification.as_deref())
                .await
            {
                Ok(pr) => {
                    if let Err(e) = gate.record_pr_opened(run_id, pr) {
                        tracing::warn!(run_id = %run_id, error = %e, "pull request opened for a run that moved on");
                    }
                    Ok(())
                }
                Err(e) => Err(e.to_string()),
            },
            Handoff::Regenerate { task, feedback, .. } => regeneration
                .dispatch(run_id, task, feedback)
                .await
                .map_err(|e| e.to_string()),
        };

        if let Err(message) = outcome {
            obs::emit_handoff_failed(&run_id.to_string(), kind, &message);
            if let Err(e) = gate.record_failure(run_id, &format!("{kind} failed: {message}")) {
                tracing::warn!(run_id = %run_id, error = %e, "could not record handoff failure");
            }
        }
    }
    tracing::debug!("handoff channel closed; worker exiting");
}
