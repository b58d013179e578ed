//! SQLite implementation of the Store trait.
//!
//! This is the primary storage backend. It uses rusqlite with bundled
//! SQLite, wrapped in async via tokio::spawn_blocking.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use warden_core::PublicKey;

use crate::error::{Result, StoreError};
use crate::migration;
use crate::records::{
    now_millis, AppRecord, GrantValue, HistoryRecord, KeyRecord, PendingRequest, PermissionGrant,
};
use crate::traits::Store;

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a closure against the connection on the blocking pool.
    async fn run<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().map_err(|e| {
                tracing::warn!("sqlite connection mutex poisoned: {}", e);
                StoreError::Unavailable(format!("mutex poisoned: {}", e))
            })?;
            f(&mut conn)
        })
        .await
        .map_err(|e| {
            tracing::warn!("sqlite blocking task failed: {}", e);
            StoreError::Unavailable(format!("spawn_blocking failed: {}", e))
        })?
    }
}

fn pubkey_at(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<PublicKey> {
    let hex: String = row.get(idx)?;
    PublicKey::from_hex(&hex)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn row_to_pending(row: &rusqlite::Row<'_>) -> rusqlite::Result<PendingRequest> {
    Ok(PendingRequest {
        id: row.get(0)?,
        caller: pubkey_at(row, 1)?,
        method: row.get(2)?,
        params: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn row_to_history(row: &rusqlite::Row<'_>) -> rusqlite::Result<HistoryRecord> {
    Ok(HistoryRecord {
        id: row.get(0)?,
        caller: pubkey_at(row, 1)?,
        method: row.get(2)?,
        params: row.get(3)?,
        allowed: row.get(4)?,
        timestamp: row.get(5)?,
    })
}

fn row_to_grant(row: &rusqlite::Row<'_>) -> rusqlite::Result<PermissionGrant> {
    let raw: String = row.get(2)?;
    let value = GrantValue::parse(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            Type::Text,
            Box::new(StoreError::InvalidData(format!("grant value {:?}", raw))),
        )
    })?;
    Ok(PermissionGrant {
        caller: pubkey_at(row, 0)?,
        verb: row.get(1)?,
        value,
        granted_at: row.get(3)?,
    })
}

fn row_to_app(row: &rusqlite::Row<'_>) -> rusqlite::Result<AppRecord> {
    Ok(AppRecord {
        app: pubkey_at(row, 0)?,
        key: pubkey_at(row, 1)?,
        name: row.get(2)?,
        url: row.get(3)?,
        icon: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn row_to_key(row: &rusqlite::Row<'_>) -> rusqlite::Result<KeyRecord> {
    Ok(KeyRecord {
        key: pubkey_at(row, 0)?,
        name: row.get(1)?,
        encrypted_key: row.get(2)?,
        created_at: row.get(3)?,
    })
}

const PENDING_COLUMNS: &str = "id, caller, method, params, created_at";
const HISTORY_COLUMNS: &str = "id, caller, method, params, allowed, timestamp";
const GRANT_COLUMNS: &str = "caller, verb, value, granted_at";
const APP_COLUMNS: &str = "app, key, name, url, icon, created_at, updated_at";
const KEY_COLUMNS: &str = "key, name, encrypted_key, created_at";

fn id_known(conn: &Connection, id: &str) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM pending WHERE id = ?1
             UNION ALL
             SELECT 1 FROM history WHERE id = ?1
             LIMIT 1",
            params![id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

fn insert_history(conn: &Connection, record: &HistoryRecord) -> Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO history ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            HISTORY_COLUMNS
        ),
        params![
            record.id,
            record.caller.to_hex(),
            record.method,
            record.params,
            record.allowed,
            record.timestamp,
        ],
    )?;
    Ok(())
}

fn query_all<T>(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
    map: fn(&rusqlite::Row<'_>) -> rusqlite::Result<T>,
) -> Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, map)?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(StoreError::from)
}

#[async_trait]
impl Store for SqliteStore {
    async fn add_pending(&self, request: &PendingRequest) -> Result<bool> {
        let request = request.clone();
        self.run(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            if id_known(&tx, &request.id)? {
                return Ok(false);
            }
            tx.execute(
                &format!(
                    "INSERT INTO pending ({}) VALUES (?1, ?2, ?3, ?4, ?5)",
                    PENDING_COLUMNS
                ),
                params![
                    request.id,
                    request.caller.to_hex(),
                    request.method,
                    request.params,
                    request.created_at,
                ],
            )?;
            tx.commit()?;
            Ok(true)
        })
        .await
    }

    async fn get_pending(&self, id: &str) -> Result<Option<PendingRequest>> {
        let id = id.to_string();
        self.run(move |conn| {
            conn.query_row(
                &format!("SELECT {} FROM pending WHERE id = ?1", PENDING_COLUMNS),
                params![id],
                row_to_pending,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn confirm_pending(&self, id: &str, allowed: bool) -> Result<HistoryRecord> {
        let id = id.to_string();
        self.run(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let pending = tx
                .query_row(
                    &format!("SELECT {} FROM pending WHERE id = ?1", PENDING_COLUMNS),
                    params![id],
                    row_to_pending,
                )
                .optional()?
                .ok_or_else(|| StoreError::NotFound(format!("pending request {}", id)))?;

            tx.execute("DELETE FROM pending WHERE id = ?1", params![id])?;
            let record = pending.resolve(allowed, now_millis());
            insert_history(&tx, &record)?;
            tx.commit()?;
            Ok(record)
        })
        .await
    }

    async fn add_confirmed(&self, record: &HistoryRecord) -> Result<bool> {
        let record = record.clone();
        self.run(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let resolved: Option<i64> = tx
                .query_row(
                    "SELECT 1 FROM history WHERE id = ?1",
                    params![record.id],
                    |row| row.get(0),
                )
                .optional()?;
            if resolved.is_some() {
                return Ok(false);
            }
            tx.execute("DELETE FROM pending WHERE id = ?1", params![record.id])?;
            insert_history(&tx, &record)?;
            tx.commit()?;
            Ok(true)
        })
        .await
    }

    async fn list_pending(&self) -> Result<Vec<PendingRequest>> {
        self.run(|conn| {
            query_all(
                conn,
                &format!(
                    "SELECT {} FROM pending ORDER BY created_at, rowid",
                    PENDING_COLUMNS
                ),
                [],
                row_to_pending,
            )
        })
        .await
    }

    async fn list_history(&self) -> Result<Vec<HistoryRecord>> {
        self.run(|conn| {
            query_all(
                conn,
                &format!(
                    "SELECT {} FROM history ORDER BY timestamp, seq",
                    HISTORY_COLUMNS
                ),
                [],
                row_to_history,
            )
        })
        .await
    }

    async fn history_for(&self, caller: &PublicKey) -> Result<Vec<HistoryRecord>> {
        let caller = caller.to_hex();
        self.run(move |conn| {
            query_all(
                conn,
                &format!(
                    "SELECT {} FROM history WHERE caller = ?1 ORDER BY timestamp, seq",
                    HISTORY_COLUMNS
                ),
                params![caller],
                row_to_history,
            )
        })
        .await
    }

    async fn get_permission(
        &self,
        caller: &PublicKey,
        verb: &str,
    ) -> Result<Option<PermissionGrant>> {
        let caller = caller.to_hex();
        let verb = verb.to_string();
        self.run(move |conn| {
            conn.query_row(
                &format!(
                    "SELECT {} FROM permissions WHERE caller = ?1 AND verb = ?2",
                    GRANT_COLUMNS
                ),
                params![caller, verb],
                row_to_grant,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn put_permission(&self, grant: &PermissionGrant) -> Result<()> {
        let grant = grant.clone();
        self.run(move |conn| {
            conn.execute(
                &format!(
                    "INSERT OR REPLACE INTO permissions ({}) VALUES (?1, ?2, ?3, ?4)",
                    GRANT_COLUMNS
                ),
                params![
                    grant.caller.to_hex(),
                    grant.verb,
                    grant.value.as_str(),
                    grant.granted_at,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn delete_permission(&self, caller: &PublicKey, verb: &str) -> Result<bool> {
        let caller = caller.to_hex();
        let verb = verb.to_string();
        self.run(move |conn| {
            let n = conn.execute(
                "DELETE FROM permissions WHERE caller = ?1 AND verb = ?2",
                params![caller, verb],
            )?;
            Ok(n > 0)
        })
        .await
    }

    async fn list_permissions(&self, caller: &PublicKey) -> Result<Vec<PermissionGrant>> {
        let caller = caller.to_hex();
        self.run(move |conn| {
            query_all(
                conn,
                &format!(
                    "SELECT {} FROM permissions WHERE caller = ?1 ORDER BY verb",
                    GRANT_COLUMNS
                ),
                params![caller],
                row_to_grant,
            )
        })
        .await
    }

    async fn put_app(&self, app: &AppRecord) -> Result<()> {
        let app = app.clone();
        self.run(move |conn| {
            conn.execute(
                &format!(
                    "INSERT OR REPLACE INTO apps ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    APP_COLUMNS
                ),
                params![
                    app.app.to_hex(),
                    app.key.to_hex(),
                    app.name,
                    app.url,
                    app.icon,
                    app.created_at,
                    app.updated_at,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_app(&self, app: &PublicKey) -> Result<Option<AppRecord>> {
        let app = app.to_hex();
        self.run(move |conn| {
            conn.query_row(
                &format!("SELECT {} FROM apps WHERE app = ?1", APP_COLUMNS),
                params![app],
                row_to_app,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn list_apps(&self, key: &PublicKey) -> Result<Vec<AppRecord>> {
        let key = key.to_hex();
        self.run(move |conn| {
            query_all(
                conn,
                &format!(
                    "SELECT {} FROM apps WHERE key = ?1 ORDER BY created_at, app",
                    APP_COLUMNS
                ),
                params![key],
                row_to_app,
            )
        })
        .await
    }

    async fn delete_app(&self, app: &PublicKey) -> Result<bool> {
        let app = app.to_hex();
        self.run(move |conn| {
            let tx = conn.transaction()?;
            let n = tx.execute("DELETE FROM apps WHERE app = ?1", params![app])?;
            tx.execute("DELETE FROM permissions WHERE caller = ?1", params![app])?;
            tx.commit()?;
            Ok(n > 0)
        })
        .await
    }

    async fn put_key(&self, key: &KeyRecord) -> Result<()> {
        let key = key.clone();
        self.run(move |conn| {
            conn.execute(
                &format!(
                    "INSERT OR REPLACE INTO keys ({}) VALUES (?1, ?2, ?3, ?4)",
                    KEY_COLUMNS
                ),
                params![key.key.to_hex(), key.name, key.encrypted_key, key.created_at],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_key(&self, key: &PublicKey) -> Result<Option<KeyRecord>> {
        let key = key.to_hex();
        self.run(move |conn| {
            conn.query_row(
                &format!("SELECT {} FROM keys WHERE key = ?1", KEY_COLUMNS),
                params![key],
                row_to_key,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn list_keys(&self) -> Result<Vec<KeyRecord>> {
        self.run(|conn| {
            query_all(
                conn,
                &format!("SELECT {} FROM keys ORDER BY created_at, key", KEY_COLUMNS),
                [],
                row_to_key,
            )
        })
        .await
    }

    async fn delete_key(&self, key: &PublicKey) -> Result<bool> {
        let key = key.to_hex();
        self.run(move |conn| {
            let n = conn.execute("DELETE FROM keys WHERE key = ?1", params![key])?;
            Ok(n > 0)
        })
        .await
    }
}
