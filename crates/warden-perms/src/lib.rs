//! # Warden Permissions
//!
//! Decides whether a caller may run a method, from grants cached in the
//! store.
//!
//! ## Key Concepts
//!
//! - **Verb**: a method name, or `sign_event:<kind>` for event signing
//! - **Grant**: a stored allow/deny for one (caller, verb) pair
//! - **Package**: a single grant covering a fixed table of verbs
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use warden_core::{Keys, Method};
//! use warden_perms::{Decision, Package, PermissionEngine};
//! use warden_store::MemoryStore;
//!
//! async fn example() {
//!     let engine = PermissionEngine::new(Arc::new(MemoryStore::new()));
//!     let app = Keys::generate().public_key();
//!     engine.grant_package(&app, Package::Basic).await.unwrap();
//!
//!     let params = vec![r#"{"kind":1}"#.to_string()];
//!     let decision = engine.decide(&app, &Method::SignEvent, &params).await.unwrap();
//!     assert_eq!(decision, Decision::Allow);
//! }
//! ```

pub mod engine;
pub mod error;
pub mod package;
pub mod verb;

pub use engine::{Decision, PermissionEngine};
pub use error::{PermsError, Result};
pub use package::{is_package_perm, Package, BASIC_VERBS};
pub use verb::Verb;
