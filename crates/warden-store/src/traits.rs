//! Store trait: the abstract interface for signer state.
//!
//! Implementations include SQLite (primary) and in-memory (for tests).

use async_trait::async_trait;
use warden_core::PublicKey;

use crate::error::Result;
use crate::records::{AppRecord, HistoryRecord, KeyRecord, PendingRequest, PermissionGrant};

/// Async interface for request, permission, app and key persistence.
///
/// # Design Notes
///
/// - **Single dedup point**: `add_pending` checks Pending and History for the
///   id and inserts in one transaction. An id never appears in both.
/// - **Terminal records**: History rows are written once and never updated.
/// - **Grants**: unique per (caller, verb); last write wins.
#[async_trait]
pub trait Store: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Requests
    // ─────────────────────────────────────────────────────────────────────────

    /// Record a new pending request.
    ///
    /// Returns `false` if the id is already pending or resolved.
    async fn add_pending(&self, request: &PendingRequest) -> Result<bool>;

    /// Get a pending request by id.
    async fn get_pending(&self, id: &str) -> Result<Option<PendingRequest>>;

    /// Move a pending request to history with the decision attached.
    ///
    /// Fails with `NotFound` if the id is not pending.
    async fn confirm_pending(&self, id: &str, allowed: bool) -> Result<HistoryRecord>;

    /// Insert straight into history.
    ///
    /// Returns `false` (and changes nothing) if the id is already resolved.
    /// A pending row with the same id is removed.
    async fn add_confirmed(&self, record: &HistoryRecord) -> Result<bool>;

    /// All pending requests, oldest first.
    async fn list_pending(&self) -> Result<Vec<PendingRequest>>;

    /// All history records, oldest first.
    async fn list_history(&self) -> Result<Vec<HistoryRecord>>;

    /// History records for one caller, oldest first.
    async fn history_for(&self, caller: &PublicKey) -> Result<Vec<HistoryRecord>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Permissions
    // ─────────────────────────────────────────────────────────────────────────

    /// Get the grant for an exact (caller, verb) pair.
    async fn get_permission(&self, caller: &PublicKey, verb: &str)
        -> Result<Option<PermissionGrant>>;

    /// Insert or replace a grant.
    async fn put_permission(&self, grant: &PermissionGrant) -> Result<()>;

    /// Delete a grant. Returns whether one existed.
    async fn delete_permission(&self, caller: &PublicKey, verb: &str) -> Result<bool>;

    /// Grants held by a caller, ordered by verb.
    async fn list_permissions(&self, caller: &PublicKey) -> Result<Vec<PermissionGrant>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Apps
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert or replace an app record.
    async fn put_app(&self, app: &AppRecord) -> Result<()>;

    async fn get_app(&self, app: &PublicKey) -> Result<Option<AppRecord>>;

    /// Apps connected to a holder key, ordered by creation time.
    async fn list_apps(&self, key: &PublicKey) -> Result<Vec<AppRecord>>;

    /// Delete an app and every grant it holds. Returns whether it existed.
    async fn delete_app(&self, app: &PublicKey) -> Result<bool>;

    // ─────────────────────────────────────────────────────────────────────────
    // Keys
    // ─────────────────────────────────────────────────────────────────────────

    async fn put_key(&self, key: &KeyRecord) -> Result<()>;

    async fn get_key(&self, key: &PublicKey) -> Result<Option<KeyRecord>>;

    async fn list_keys(&self) -> Result<Vec<KeyRecord>>;

    async fn delete_key(&self, key: &PublicKey) -> Result<bool>;
}
