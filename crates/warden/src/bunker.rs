//! The bunker: one held key served over a relay.
//!
//! Wires the signer, store, permission engine, request channel and watcher
//! together. [`Bunker::start`] subscribes to the transport and spawns the
//! channel and watcher loops.

use std::sync::Arc;

use serde::Deserialize;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use warden_core::{Keys, PublicKey, SharedSecretCache, Signer};
use warden_perms::{Package, PermissionEngine};
use warden_rpc::{ApprovalBridge, ChannelConfig, RpcChannel, Transport, Watcher};
use warden_store::{now_millis, AppRecord, GrantValue, HistoryRecord, PermissionGrant, Store};

use crate::error::Result;
use crate::names::{NameClient, NameClientConfig};

/// Configuration for a [`Bunker`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BunkerConfig {
    pub channel: ChannelConfig,
    /// Settle requests answered by other instances of the same key.
    pub watch_replies: bool,
    pub names: NameClientConfig,
}

impl Default for BunkerConfig {
    fn default() -> Self {
        Self {
            channel: ChannelConfig::default(),
            watch_replies: true,
            names: NameClientConfig::default(),
        }
    }
}

/// Background loops started by [`Bunker::start`].
pub struct BunkerHandle {
    tasks: Vec<JoinHandle<()>>,
}

impl BunkerHandle {
    /// Stop all loops. Outstanding approvals are left in the store as pending.
    pub fn shutdown(self) {
        for task in self.tasks {
            task.abort();
        }
    }

    /// Wait for the loops to end on their own (the transport closed).
    pub async fn join(self) {
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "bunker task failed");
            }
        }
    }
}

/// A remote signer for one key.
pub struct Bunker<S: Store + ?Sized + 'static, T: Transport + ?Sized + 'static> {
    signer: Arc<Signer>,
    transport: Arc<T>,
    channel: RpcChannel<S, T>,
    watcher: Arc<Watcher>,
    config: BunkerConfig,
}

impl<S, T> Bunker<S, T>
where
    S: Store + ?Sized + 'static,
    T: Transport + ?Sized + 'static,
{
    /// Create a bunker holding `keys`.
    pub fn new(
        keys: Keys,
        store: Arc<S>,
        transport: Arc<T>,
        approval: Arc<dyn ApprovalBridge>,
        config: BunkerConfig,
    ) -> Self {
        let cache = Arc::new(SharedSecretCache::new());
        let signer = Arc::new(Signer::with_cache(Some(keys), cache));
        let channel = RpcChannel::new(
            Arc::clone(&signer),
            store,
            Arc::clone(&transport),
            approval,
            config.channel.clone(),
        );
        Self {
            watcher: Arc::new(Watcher::new(Arc::clone(&signer))),
            signer,
            transport,
            channel,
            config,
        }
    }

    /// The held key's public identity.
    pub fn identity(&self) -> Result<PublicKey> {
        Ok(self.signer.identity()?)
    }

    pub fn signer(&self) -> &Arc<Signer> {
        &self.signer
    }

    pub fn channel(&self) -> &RpcChannel<S, T> {
        &self.channel
    }

    pub fn store(&self) -> &Arc<S> {
        self.channel.store()
    }

    pub fn engine(&self) -> &PermissionEngine<S> {
        self.channel.engine()
    }

    pub fn config(&self) -> &BunkerConfig {
        &self.config
    }

    /// Subscribe and spawn the request loop (and the watcher, if enabled).
    pub async fn start(&self) -> Result<BunkerHandle> {
        let mut tasks = Vec::new();

        let inbound = self.transport.subscribe(self.channel.inbound_filter()?).await?;
        let channel = self.channel.clone();
        tasks.push(tokio::spawn(async move { channel.run(inbound).await }));

        if self.config.watch_replies {
            let outbound = self.transport.subscribe(self.watcher.filter()?).await?;
            let watcher = Arc::clone(&self.watcher);
            let channel = self.channel.clone();
            tasks.push(tokio::spawn(async move {
                watcher
                    .run(outbound, move |reply| {
                        let channel = channel.clone();
                        async move {
                            let allowed = !reply.is_error;
                            if let Err(e) = channel
                                .settle_external(&reply.id, &reply.counterpart, allowed)
                                .await
                            {
                                warn!(id = %reply.id, error = %e, "failed to settle observed reply");
                            }
                        }
                    })
                    .await
            }));
        }

        info!(identity = %self.identity()?, "bunker started");
        Ok(BunkerHandle { tasks })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Apps & Permissions
    // ─────────────────────────────────────────────────────────────────────────

    /// Record a connected app, optionally granting it a package.
    pub async fn connect_app(
        &self,
        app: PublicKey,
        name: Option<String>,
        url: Option<String>,
        package: Option<Package>,
    ) -> Result<AppRecord> {
        let now = now_millis();
        let created_at = match self.store().get_app(&app).await? {
            Some(existing) => existing.created_at,
            None => now,
        };
        let record = AppRecord {
            app,
            key: self.identity()?,
            name,
            url,
            icon: None,
            created_at,
            updated_at: now,
        };
        self.store().put_app(&record).await?;
        if let Some(package) = package {
            self.engine().grant_package(&app, package).await?;
        }
        info!(app = %app, "app connected");
        Ok(record)
    }

    /// Forget an app and its grants.
    pub async fn disconnect_app(&self, app: &PublicKey) -> Result<bool> {
        Ok(self.store().delete_app(app).await?)
    }

    pub async fn apps(&self) -> Result<Vec<AppRecord>> {
        Ok(self.store().list_apps(&self.identity()?).await?)
    }

    pub async fn grant(
        &self,
        app: &PublicKey,
        verb: &str,
        value: GrantValue,
    ) -> Result<PermissionGrant> {
        Ok(self.engine().grant(app, verb, value).await?)
    }

    pub async fn revoke(&self, app: &PublicKey, verb: &str) -> Result<bool> {
        Ok(self.engine().revoke(app, verb).await?)
    }

    pub async fn grants_for(&self, app: &PublicKey) -> Result<Vec<PermissionGrant>> {
        Ok(self.engine().grants_for(app).await?)
    }

    pub async fn history_for(&self, app: &PublicKey) -> Result<Vec<HistoryRecord>> {
        Ok(self.store().history_for(app).await?)
    }

    /// Mark a request as answered elsewhere.
    pub async fn settle_external(
        &self,
        id: &str,
        counterpart: &PublicKey,
        allowed: bool,
    ) -> Result<bool> {
        Ok(self.channel.settle_external(id, counterpart, allowed).await?)
    }

    /// A directory client signing with the held key.
    pub fn name_client(&self) -> Result<NameClient> {
        NameClient::new(Arc::clone(&self.signer), self.config.names.clone())
    }
}
