//! The request channel: validate, decrypt, dedup, authorize, execute, respond.
//!
//! ```text
//! event ──verify──▶ decrypt ──add_pending──▶ decide ──▶ Allow ─▶ execute ─┐
//!   │                  │           │            │                         ├─▶ confirm ─▶ publish
//!   ▼                  ▼           ▼            ├──▶ Deny ───────────────┘
//! dropped           dropped     duplicate       └──▶ Ask ─▶ approval task ─▶ resolve
//! ```
//!
//! Every id is answered at most once. The outstanding map owns ids waiting
//! for a human; whichever of resolve, expiry or an external settle removes
//! the entry first is the one that finishes the request.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use warden_core::{Event, EventBuilder, Method, PublicKey, Scheme, Signer, KIND_NOSTR_CONNECT};
use warden_perms::{Decision, PermissionEngine, Verb};
use warden_store::{now_millis, GrantValue, HistoryRecord, PendingRequest, Store, StoreError};

use crate::approval::{ApprovalBridge, ApprovalContext, ApprovalDecision, ApprovalOutcome};
use crate::error::Result;
use crate::handlers::HandlerRegistry;
use crate::messages::{errors, Request, Response, RESULT_ACK};
use crate::transport::{Filter, Transport};

/// Configuration for the channel.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// How long a request may wait for a human before it is answered
    /// "Request expired". `None` waits indefinitely.
    pub pending_ttl: Option<Duration>,
}

/// What happened to an inbound event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleOutcome {
    /// Failed validation or decryption; nothing was recorded or sent.
    Dropped,
    /// The id was already pending or resolved.
    Duplicate,
    /// Answered immediately.
    Responded,
    /// Waiting on the approval bridge.
    Deferred,
}

struct Outstanding {
    caller: PublicKey,
    scheme: Scheme,
    request: Request,
    received_at: Instant,
    task: Option<JoinHandle<()>>,
}

struct Inner<S: Store + ?Sized, T: Transport + ?Sized> {
    signer: Arc<Signer>,
    store: Arc<S>,
    engine: PermissionEngine<S>,
    transport: Arc<T>,
    approval: Arc<dyn ApprovalBridge>,
    handlers: HandlerRegistry,
    config: ChannelConfig,
    outstanding: Mutex<HashMap<String, Outstanding>>,
}

/// Serves remote-signing requests for one held key.
///
/// Cheap to clone; clones share state.
pub struct RpcChannel<S: Store + ?Sized, T: Transport + ?Sized> {
    inner: Arc<Inner<S, T>>,
}

impl<S: Store + ?Sized, T: Transport + ?Sized> Clone for RpcChannel<S, T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S, T> RpcChannel<S, T>
where
    S: Store + ?Sized + 'static,
    T: Transport + ?Sized + 'static,
{
    /// Create a channel with the standard handlers.
    pub fn new(
        signer: Arc<Signer>,
        store: Arc<S>,
        transport: Arc<T>,
        approval: Arc<dyn ApprovalBridge>,
        config: ChannelConfig,
    ) -> Self {
        Self::with_handlers(
            signer,
            store,
            transport,
            approval,
            HandlerRegistry::standard(),
            config,
        )
    }

    /// Create a channel with a custom handler table.
    pub fn with_handlers(
        signer: Arc<Signer>,
        store: Arc<S>,
        transport: Arc<T>,
        approval: Arc<dyn ApprovalBridge>,
        handlers: HandlerRegistry,
        config: ChannelConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                signer,
                engine: PermissionEngine::new(Arc::clone(&store)),
                store,
                transport,
                approval,
                handlers,
                config,
                outstanding: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn signer(&self) -> &Arc<Signer> {
        &self.inner.signer
    }

    pub fn store(&self) -> &Arc<S> {
        &self.inner.store
    }

    pub fn engine(&self) -> &PermissionEngine<S> {
        &self.inner.engine
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.inner.config
    }

    /// Filter selecting requests addressed to the held key.
    pub fn inbound_filter(&self) -> Result<Filter> {
        Ok(Filter::new()
            .kind(KIND_NOSTR_CONNECT)
            .p_tag(self.inner.signer.identity()?))
    }

    /// Ids currently waiting on the approval bridge, sorted.
    pub fn outstanding(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.lock_outstanding().keys().cloned().collect();
        ids.sort();
        ids
    }

    fn lock_outstanding(&self) -> MutexGuard<'_, HashMap<String, Outstanding>> {
        self.inner
            .outstanding
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    /// Process events one at a time until the stream ends.
    ///
    /// With a pending TTL configured, stale requests are swept periodically.
    pub async fn run(&self, mut events: mpsc::Receiver<Event>) {
        let ttl = self.inner.config.pending_ttl;
        let period = ttl
            .map(|t| (t / 2).max(Duration::from_secs(1)))
            .unwrap_or(Duration::from_secs(60));
        let mut sweep = tokio::time::interval(period);

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => {
                        self.handle_event(event).await;
                    }
                    None => break,
                },
                _ = sweep.tick(), if ttl.is_some() => {
                    self.expire_pending(Instant::now()).await;
                }
            }
        }
        debug!("request stream ended");
    }

    /// Handle one inbound event.
    pub async fn handle_event(&self, event: Event) -> HandleOutcome {
        let Some((request, scheme)) = self.open(&event) else {
            return HandleOutcome::Dropped;
        };
        let caller = event.pubkey;

        let params = match serde_json::to_string(&request.params) {
            Ok(params) => params,
            Err(e) => {
                warn!(id = %request.id, error = %e, "cannot serialize params");
                return HandleOutcome::Dropped;
            }
        };
        let pending = PendingRequest {
            id: request.id.clone(),
            caller,
            method: request.method.to_string(),
            params,
            created_at: now_millis(),
        };

        // Nothing with a side effect may run before this check.
        match self.inner.store.add_pending(&pending).await {
            Ok(true) => {}
            Ok(false) => {
                debug!(id = %request.id, "duplicate request");
                return HandleOutcome::Duplicate;
            }
            Err(e) => {
                error!(id = %request.id, error = %e, "dedup check failed; dropping request");
                return HandleOutcome::Dropped;
            }
        }

        info!(id = %request.id, caller = %caller, method = %request.method, "request received");

        if request.method == Method::Connect {
            self.finish(&caller, scheme, Response::ok(&request.id, RESULT_ACK), true)
                .await;
            return HandleOutcome::Responded;
        }

        // Methods without a handler are refused before any grant lookup or prompt.
        if !self.inner.handlers.supports(&request.method) {
            let response = Response::error(&request.id, errors::UNSUPPORTED_METHOD);
            self.finish(&caller, scheme, response, false).await;
            return HandleOutcome::Responded;
        }

        let decision = match self
            .inner
            .engine
            .decide(&caller, &request.method, &request.params)
            .await
        {
            Ok(decision) => decision,
            Err(e) => {
                warn!(id = %request.id, error = %e, "permission lookup failed; asking");
                Decision::Ask
            }
        };

        match decision {
            Decision::Allow => {
                info!(id = %request.id, "allowed by grant");
                let response = self.execute(&caller, &request, None).await;
                self.finish(&caller, scheme, response, true).await;
                HandleOutcome::Responded
            }
            Decision::Deny => {
                info!(id = %request.id, "denied by grant");
                let response = Response::error(&request.id, errors::NOT_AUTHORIZED);
                self.finish(&caller, scheme, response, false).await;
                HandleOutcome::Responded
            }
            Decision::Ask => {
                self.defer(caller, scheme, request);
                HandleOutcome::Deferred
            }
        }
    }

    /// Answer an outstanding request.
    ///
    /// Returns `false` if the id is not outstanding (already resolved,
    /// expired or settled elsewhere).
    pub async fn resolve(&self, id: &str, outcome: ApprovalOutcome) -> bool {
        self.complete(id, outcome, true).await
    }

    /// Expire outstanding requests older than the configured TTL.
    ///
    /// Returns how many were expired.
    pub async fn expire_pending(&self, now: Instant) -> usize {
        let Some(ttl) = self.inner.config.pending_ttl else {
            return 0;
        };

        let expired: Vec<Outstanding> = {
            let mut outstanding = self.lock_outstanding();
            let ids: Vec<String> = outstanding
                .iter()
                .filter(|(_, o)| now.saturating_duration_since(o.received_at) >= ttl)
                .map(|(id, _)| id.clone())
                .collect();
            ids.iter().filter_map(|id| outstanding.remove(id)).collect()
        };

        let count = expired.len();
        for entry in expired {
            if let Some(task) = entry.task {
                task.abort();
            }
            info!(id = %entry.request.id, "request expired");
            let response = Response::error(&entry.request.id, errors::REQUEST_EXPIRED);
            self.finish(&entry.caller, entry.scheme, response, false)
                .await;
        }
        count
    }

    /// Record that `id` was answered by another instance.
    ///
    /// Cancels any local approval and moves the id to history without
    /// publishing. Returns whether a history record was written.
    pub async fn settle_external(
        &self,
        id: &str,
        counterpart: &PublicKey,
        allowed: bool,
    ) -> Result<bool> {
        let entry = self.lock_outstanding().remove(id);
        if let Some(entry) = entry {
            if let Some(task) = entry.task {
                task.abort();
            }
            info!(id = %id, "answered elsewhere; cancelling approval");
        }

        let record = match self.inner.store.get_pending(id).await? {
            Some(pending) => pending.resolve(allowed, now_millis()),
            None => HistoryRecord {
                id: id.to_string(),
                caller: *counterpart,
                method: String::new(),
                params: "[]".to_string(),
                allowed,
                timestamp: now_millis(),
            },
        };
        Ok(self.inner.store.add_confirmed(&record).await?)
    }

    fn open(&self, event: &Event) -> Option<(Request, Scheme)> {
        if event.kind != KIND_NOSTR_CONNECT {
            debug!(kind = event.kind, "ignoring event of other kind");
            return None;
        }
        if let Err(e) = event.verify() {
            debug!(error = %e, "dropping invalid event");
            return None;
        }
        let identity = match self.inner.signer.identity() {
            Ok(identity) => identity,
            Err(e) => {
                warn!(error = %e, "no key loaded; dropping event");
                return None;
            }
        };
        if event.addressee() != Some(identity) {
            debug!("dropping event not addressed to us");
            return None;
        }

        let scheme = Scheme::detect(&event.content);
        let plaintext = match self
            .inner
            .signer
            .decrypt(scheme, &event.pubkey, &event.content)
        {
            Ok(plaintext) => plaintext,
            Err(e) => {
                debug!(error = %e, "dropping undecryptable event");
                return None;
            }
        };
        match Request::from_json(&plaintext) {
            Ok(request) => Some((request, scheme)),
            Err(e) => {
                debug!(error = %e, "dropping malformed request");
                None
            }
        }
    }

    fn defer(&self, caller: PublicKey, scheme: Scheme, request: Request) {
        let id = request.id.clone();
        let ctx = ApprovalContext {
            caller,
            id: id.clone(),
            method: request.method.clone(),
            params: request.params.clone(),
        };

        self.lock_outstanding().insert(
            id.clone(),
            Outstanding {
                caller,
                scheme,
                request,
                received_at: Instant::now(),
                task: None,
            },
        );

        let channel = self.clone();
        let task_id = id.clone();
        let task = tokio::spawn(async move {
            let outcome = channel.inner.approval.request_decision(ctx).await;
            channel.complete(&task_id, outcome, false).await;
        });

        // The task may already have finished and removed the entry.
        if let Some(entry) = self.lock_outstanding().get_mut(&id) {
            entry.task = Some(task);
        }
        info!(id = %id, "awaiting approval");
    }

    async fn complete(&self, id: &str, outcome: ApprovalOutcome, abort_task: bool) -> bool {
        let entry = self.lock_outstanding().remove(id);
        let Some(entry) = entry else {
            debug!(id = %id, "not outstanding");
            return false;
        };
        if abort_task {
            if let Some(task) = entry.task {
                task.abort();
            }
        }
        let Outstanding {
            caller,
            scheme,
            request,
            ..
        } = entry;

        if outcome.remember && outcome.decision != ApprovalDecision::Ignore {
            let verb = Verb::for_request(&request.method, &request.params).to_string();
            let value = GrantValue::from_allowed(outcome.decision == ApprovalDecision::Allow);
            if let Err(e) = self.inner.engine.grant(&caller, &verb, value).await {
                warn!(id = %id, verb = %verb, error = %e, "failed to remember decision");
            }
        }

        info!(id = %id, decision = ?outcome.decision, "approval resolved");
        match outcome.decision {
            ApprovalDecision::Allow => {
                let response = self
                    .execute(&caller, &request, outcome.result_override)
                    .await;
                self.finish(&caller, scheme, response, true).await
            }
            ApprovalDecision::Deny => {
                let response = Response::error(&request.id, errors::NOT_AUTHORIZED);
                self.finish(&caller, scheme, response, false).await
            }
            ApprovalDecision::Ignore => {
                if let Err(e) = self.inner.store.confirm_pending(id, false).await {
                    warn!(id = %id, error = %e, "failed to record ignored request");
                }
                false
            }
        }
    }

    async fn execute(
        &self,
        caller: &PublicKey,
        request: &Request,
        result_override: Option<String>,
    ) -> Response {
        let Some(handler) = self.inner.handlers.get(&request.method) else {
            return match result_override {
                Some(result) => Response::ok(&request.id, result),
                None => Response::error(&request.id, errors::UNSUPPORTED_METHOD),
            };
        };

        match handler
            .handle(&self.inner.signer, caller, &request.params)
            .await
        {
            Ok(result) => match result_override.or(result) {
                Some(result) => Response::ok(&request.id, result),
                None => Response::error(&request.id, errors::EMPTY_RESPONSE),
            },
            Err(e) => {
                warn!(id = %request.id, error = %e, "handler failed");
                Response::error(&request.id, format!("{:#}", e))
            }
        }
    }

    /// Record the decision, then publish the response.
    ///
    /// Returns whether a response was published.
    async fn finish(
        &self,
        caller: &PublicKey,
        scheme: Scheme,
        response: Response,
        allowed: bool,
    ) -> bool {
        match self.inner.store.confirm_pending(&response.id, allowed).await {
            Ok(_) => {}
            Err(StoreError::NotFound(_)) => {
                debug!(id = %response.id, "settled elsewhere; not responding");
                return false;
            }
            Err(e) => {
                error!(id = %response.id, error = %e, "failed to record decision");
            }
        }

        match self.publish(caller, scheme, &response).await {
            Ok(()) => true,
            Err(e) => {
                warn!(id = %response.id, error = %e, "failed to publish response");
                false
            }
        }
    }

    async fn publish(&self, caller: &PublicKey, scheme: Scheme, response: &Response) -> Result<()> {
        let signer = &self.inner.signer;
        let content = signer.encrypt(scheme, caller, &response.to_json()?)?;
        let caller_hex = caller.to_hex();
        let unsigned = EventBuilder::new(KIND_NOSTR_CONNECT, content)
            .tag(["p", caller_hex.as_str()])
            .build(signer.identity()?);
        let event = signer.sign_unsigned(unsigned)?;
        self.inner.transport.publish(event).await
    }
}
