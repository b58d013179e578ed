//! An approval bridge driven by a script.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use warden_rpc::{ApprovalBridge, ApprovalContext, ApprovalOutcome};

/// Answers prompts from a queue of outcomes, in order, and records every
/// context it was asked about. Once the script runs out it answers
/// `fallback` (Ignore unless set).
pub struct ScriptedApproval {
    script: Mutex<VecDeque<ApprovalOutcome>>,
    fallback: ApprovalOutcome,
    asked: Mutex<Vec<ApprovalContext>>,
}

impl ScriptedApproval {
    pub fn new(script: impl IntoIterator<Item = ApprovalOutcome>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            fallback: ApprovalOutcome::ignore(),
            asked: Mutex::new(Vec::new()),
        }
    }

    pub fn with_fallback(mut self, fallback: ApprovalOutcome) -> Self {
        self.fallback = fallback;
        self
    }

    /// Contexts seen so far.
    pub fn asked(&self) -> Vec<ApprovalContext> {
        self.asked.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Ids seen so far.
    pub fn asked_ids(&self) -> Vec<String> {
        self.asked().into_iter().map(|c| c.id).collect()
    }
}

#[async_trait]
impl ApprovalBridge for ScriptedApproval {
    async fn request_decision(&self, ctx: ApprovalContext) -> ApprovalOutcome {
        self.asked
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(ctx);
        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }
}
