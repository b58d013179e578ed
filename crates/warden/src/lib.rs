//! # Warden
//!
//! A remote signer: applications ask over a relay for signatures and
//! encryption, and the key never leaves the holder.
//!
//! ## Overview
//!
//! - **Requests** arrive as encrypted kind-24133 events and are answered
//!   exactly once
//! - **Permissions** are cached grants per app, with a `basic` package and
//!   kind-qualified `sign_event:<kind>` verbs
//! - **Approval** of anything no grant covers is deferred to a human
//! - **Names** are registered with a directory behind adaptive proof-of-work
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use warden::{Bunker, BunkerConfig};
//! use warden::core::Keys;
//! use warden::rpc::{MemoryRelay, QueuedApproval};
//! use warden::store::SqliteStore;
//!
//! let store = Arc::new(SqliteStore::open("warden.db")?);
//! let (approval, mut prompts) = QueuedApproval::new(16);
//! let bunker = Bunker::new(
//!     Keys::generate(),
//!     store,
//!     MemoryRelay::new(),
//!     Arc::new(approval),
//!     BunkerConfig::default(),
//! );
//! let handle = bunker.start().await?;
//!
//! while let Some(prompt) = prompts.recv().await {
//!     prompt.respond(ApprovalOutcome::allow());
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `warden::core` - keys, events, signer, envelopes
//! - `warden::store` - storage contract, memory and SQLite stores
//! - `warden::perms` - permission engine and packages
//! - `warden::rpc` - request channel, transport, approval, watcher

pub mod bunker;
pub mod error;
pub mod names;

pub use warden_core as core;
pub use warden_perms as perms;
pub use warden_rpc as rpc;
pub use warden_store as store;

pub use bunker::{Bunker, BunkerConfig, BunkerHandle};
pub use error::{Result, WardenError};
pub use names::{evaluate, Attempt, NameClient, NameClientConfig};
