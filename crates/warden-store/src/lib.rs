//! # Warden Store
//!
//! Storage abstraction for Warden: pending requests, request history,
//! permission grants, connected apps and encrypted key blobs.
//!
//! ## Key Types
//!
//! - [`Store`] - The async trait for all storage operations
//! - [`SqliteStore`] - SQLite-based persistent storage
//! - [`MemoryStore`] - In-memory storage for tests
//!
//! ## Usage
//!
//! ```rust,no_run
//! use warden_store::{SqliteStore, Store};
//!
//! async fn example() {
//!     let store = SqliteStore::open("warden.db").unwrap();
//!     let pending = store.list_pending().await.unwrap();
//!     println!("{} requests awaiting a decision", pending.len());
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Dedup**: `add_pending` is the one place a request id is claimed
//! - **Terminal history**: resolved ids never return to Pending
//! - **Cascade**: deleting an app deletes its grants

#[cfg(test)]
mod conformance;
pub mod error;
pub mod memory;
pub mod migration;
pub mod records;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use records::{
    now_millis, AppRecord, GrantValue, HistoryRecord, KeyRecord, PendingRequest, PermissionGrant,
};
pub use sqlite::SqliteStore;
pub use traits::Store;
