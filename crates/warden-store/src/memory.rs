//! In-memory implementation of the Store trait.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use warden_core::PublicKey;

use crate::error::{Result, StoreError};
use crate::records::{
    now_millis, AppRecord, HistoryRecord, KeyRecord, PendingRequest, PermissionGrant,
};
use crate::traits::Store;

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock; each
/// operation holds the lock for its whole check-and-write.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    /// Pending requests in arrival order.
    pending: Vec<PendingRequest>,

    /// History in insertion order.
    history: Vec<HistoryRecord>,

    /// Ids present in history.
    resolved: HashSet<String>,

    /// Grants keyed by (caller, verb).
    permissions: BTreeMap<(PublicKey, String), PermissionGrant>,

    apps: HashMap<PublicKey, AppRecord>,

    keys: HashMap<PublicKey, KeyRecord>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner::default()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, MemoryStoreInner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, MemoryStoreInner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn by_time<T>(mut items: Vec<T>, key: impl Fn(&T) -> i64) -> Vec<T> {
    items.sort_by_key(|item| key(item));
    items
}

#[async_trait]
impl Store for MemoryStore {
    async fn add_pending(&self, request: &PendingRequest) -> Result<bool> {
        let mut inner = self.write();

        if inner.resolved.contains(&request.id) || inner.pending.iter().any(|p| p.id == request.id)
        {
            return Ok(false);
        }

        inner.pending.push(request.clone());
        Ok(true)
    }

    async fn get_pending(&self, id: &str) -> Result<Option<PendingRequest>> {
        let inner = self.read();
        Ok(inner.pending.iter().find(|p| p.id == id).cloned())
    }

    async fn confirm_pending(&self, id: &str, allowed: bool) -> Result<HistoryRecord> {
        let mut inner = self.write();

        let pos = inner
            .pending
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("pending request {}", id)))?;

        let record = inner.pending.remove(pos).resolve(allowed, now_millis());
        inner.resolved.insert(record.id.clone());
        inner.history.push(record.clone());
        Ok(record)
    }

    async fn add_confirmed(&self, record: &HistoryRecord) -> Result<bool> {
        let mut inner = self.write();

        if inner.resolved.contains(&record.id) {
            return Ok(false);
        }

        inner.pending.retain(|p| p.id != record.id);
        inner.resolved.insert(record.id.clone());
        inner.history.push(record.clone());
        Ok(true)
    }

    async fn list_pending(&self) -> Result<Vec<PendingRequest>> {
        let inner = self.read();
        Ok(by_time(inner.pending.clone(), |p| p.created_at))
    }

    async fn list_history(&self) -> Result<Vec<HistoryRecord>> {
        let inner = self.read();
        Ok(by_time(inner.history.clone(), |h| h.timestamp))
    }

    async fn history_for(&self, caller: &PublicKey) -> Result<Vec<HistoryRecord>> {
        let inner = self.read();
        let records = inner
            .history
            .iter()
            .filter(|h| &h.caller == caller)
            .cloned()
            .collect();
        Ok(by_time(records, |h| h.timestamp))
    }

    async fn get_permission(
        &self,
        caller: &PublicKey,
        verb: &str,
    ) -> Result<Option<PermissionGrant>> {
        let inner = self.read();
        Ok(inner
            .permissions
            .get(&(*caller, verb.to_string()))
            .cloned())
    }

    async fn put_permission(&self, grant: &PermissionGrant) -> Result<()> {
        let mut inner = self.write();
        inner
            .permissions
            .insert((grant.caller, grant.verb.clone()), grant.clone());
        Ok(())
    }

    async fn delete_permission(&self, caller: &PublicKey, verb: &str) -> Result<bool> {
        let mut inner = self.write();
        Ok(inner
            .permissions
            .remove(&(*caller, verb.to_string()))
            .is_some())
    }

    async fn list_permissions(&self, caller: &PublicKey) -> Result<Vec<PermissionGrant>> {
        let inner = self.read();
        Ok(inner
            .permissions
            .values()
            .filter(|g| &g.caller == caller)
            .cloned()
            .collect())
    }

    async fn put_app(&self, app: &AppRecord) -> Result<()> {
        let mut inner = self.write();
        inner.apps.insert(app.app, app.clone());
        Ok(())
    }

    async fn get_app(&self, app: &PublicKey) -> Result<Option<AppRecord>> {
        let inner = self.read();
        Ok(inner.apps.get(app).cloned())
    }

    async fn list_apps(&self, key: &PublicKey) -> Result<Vec<AppRecord>> {
        let inner = self.read();
        let mut apps: Vec<AppRecord> = inner
            .apps
            .values()
            .filter(|a| &a.key == key)
            .cloned()
            .collect();
        apps.sort_by(|a, b| (a.created_at, a.app).cmp(&(b.created_at, b.app)));
        Ok(apps)
    }

    async fn delete_app(&self, app: &PublicKey) -> Result<bool> {
        let mut inner = self.write();
        let existed = inner.apps.remove(app).is_some();
        inner.permissions.retain(|(caller, _), _| caller != app);
        Ok(existed)
    }

    async fn put_key(&self, key: &KeyRecord) -> Result<()> {
        let mut inner = self.write();
        inner.keys.insert(key.key, key.clone());
        Ok(())
    }

    async fn get_key(&self, key: &PublicKey) -> Result<Option<KeyRecord>> {
        let inner = self.read();
        Ok(inner.keys.get(key).cloned())
    }

    async fn list_keys(&self) -> Result<Vec<KeyRecord>> {
        let inner = self.read();
        let mut keys: Vec<KeyRecord> = inner.keys.values().cloned().collect();
        keys.sort_by(|a, b| (a.created_at, a.key).cmp(&(b.created_at, b.key)));
        Ok(keys)
    }

    async fn delete_key(&self, key: &PublicKey) -> Result<bool> {
        let mut inner = self.write();
        Ok(inner.keys.remove(key).is_some())
    }
}
