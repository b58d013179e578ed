//! The approval bridge: how a human is asked about a request no grant covers.
//!
//! The channel calls [`ApprovalBridge::request_decision`] on a spawned task,
//! so an implementation may take as long as the human does.

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tracing::warn;
use warden_core::{Method, PublicKey};

/// What the human is being asked about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApprovalContext {
    pub caller: PublicKey,
    pub id: String,
    pub method: Method,
    pub params: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ApprovalDecision {
    Allow,
    Deny,
    /// Drop the request without answering.
    Ignore,
}

/// A decision plus its options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalOutcome {
    pub decision: ApprovalDecision,
    /// Replaces the handler's result in the response.
    pub result_override: Option<String>,
    /// Store the decision as a grant for the request's verb.
    pub remember: bool,
}

impl ApprovalOutcome {
    pub fn allow() -> Self {
        Self::new(ApprovalDecision::Allow)
    }

    pub fn deny() -> Self {
        Self::new(ApprovalDecision::Deny)
    }

    pub fn ignore() -> Self {
        Self::new(ApprovalDecision::Ignore)
    }

    fn new(decision: ApprovalDecision) -> Self {
        Self {
            decision,
            result_override: None,
            remember: false,
        }
    }

    pub fn with_result(mut self, result: impl Into<String>) -> Self {
        self.result_override = Some(result.into());
        self
    }

    pub fn remembered(mut self) -> Self {
        self.remember = true;
        self
    }
}

/// Source of human decisions.
#[async_trait]
pub trait ApprovalBridge: Send + Sync {
    async fn request_decision(&self, ctx: ApprovalContext) -> ApprovalOutcome;
}

/// Always answers the same way.
#[derive(Debug, Clone)]
pub struct StaticApproval(pub ApprovalOutcome);

#[async_trait]
impl ApprovalBridge for StaticApproval {
    async fn request_decision(&self, _ctx: ApprovalContext) -> ApprovalOutcome {
        self.0.clone()
    }
}

/// A prompt awaiting an answer.
///
/// Dropping it unanswered counts as [`ApprovalDecision::Ignore`].
#[derive(Debug)]
pub struct ApprovalPrompt {
    pub context: ApprovalContext,
    reply: oneshot::Sender<ApprovalOutcome>,
}

impl ApprovalPrompt {
    pub fn respond(self, outcome: ApprovalOutcome) {
        // The channel may have expired the request meanwhile.
        let _ = self.reply.send(outcome);
    }
}

/// Surfaces prompts on an mpsc channel for a UI to answer.
#[derive(Debug, Clone)]
pub struct QueuedApproval {
    prompts: mpsc::Sender<ApprovalPrompt>,
}

impl QueuedApproval {
    /// Create the bridge and the receiving end of its prompt queue.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<ApprovalPrompt>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { prompts: tx }, rx)
    }
}

#[async_trait]
impl ApprovalBridge for QueuedApproval {
    async fn request_decision(&self, ctx: ApprovalContext) -> ApprovalOutcome {
        let id = ctx.id.clone();
        let (tx, rx) = oneshot::channel();
        let prompt = ApprovalPrompt {
            context: ctx,
            reply: tx,
        };

        if self.prompts.send(prompt).await.is_err() {
            warn!(id = %id, "approval queue closed; ignoring request");
            return ApprovalOutcome::ignore();
        }

        match rx.await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(id = %id, "approval prompt dropped unanswered");
                ApprovalOutcome::ignore()
            }
        }
    }
}
