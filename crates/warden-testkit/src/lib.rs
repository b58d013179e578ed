//! # Warden Testkit
//!
//! Testing utilities for Warden.
//!
//! - **Fixtures**: parties with keys and stores; request and response helpers
//! - **Scripted approval**: an [`ApprovalBridge`](warden_rpc::ApprovalBridge)
//!   that answers from a list
//! - **Generators**: proptest strategies for methods, kinds and ids
//!
//! ```rust,ignore
//! use warden_testkit::{ScriptedApproval, TestFixture};
//!
//! let app = TestFixture::new();
//! let event = app.request(&holder, "1", "sign_event", &[&unsigned_event_json(1, "hi")]);
//! ```

pub mod approval;
pub mod fixtures;
pub mod generators;

pub use approval::ScriptedApproval;
pub use fixtures::{multi_party_fixtures, unsigned_event_json, TestFixture};
