//! # Warden RPC
//!
//! The remote-signing request channel.
//!
//! Requests arrive as encrypted kind-24133 events. The channel verifies and
//! decrypts them, drops duplicates through the store's pending table, asks the
//! permission engine, defers to an [`ApprovalBridge`] when no grant decides,
//! runs the method handler and publishes exactly one encrypted response.
//!
//! ## Key Types
//!
//! - [`RpcChannel`] - the request state machine
//! - [`Transport`] - publish/subscribe over a relay ([`MemoryRelay`] for tests)
//! - [`ApprovalBridge`] - source of human decisions
//! - [`HandlerRegistry`] - method to handler table
//! - [`Watcher`] - observes replies sent by other instances of the same key
//!
//! ## Usage
//!
//! ```ignore
//! use warden_rpc::{RpcChannel, ChannelConfig, StaticApproval, ApprovalOutcome, MemoryRelay};
//!
//! let relay = MemoryRelay::new();
//! let channel = RpcChannel::new(
//!     signer,
//!     store,
//!     relay.clone(),
//!     Arc::new(StaticApproval(ApprovalOutcome::deny())),
//!     ChannelConfig::default(),
//! );
//! let events = relay.subscribe(channel.inbound_filter()?).await?;
//! channel.run(events).await;
//! ```

pub mod approval;
pub mod channel;
pub mod error;
pub mod handlers;
pub mod messages;
pub mod transport;
pub mod watcher;

pub use approval::{
    ApprovalBridge, ApprovalContext, ApprovalDecision, ApprovalOutcome, ApprovalPrompt,
    QueuedApproval, StaticApproval,
};
pub use channel::{ChannelConfig, HandleOutcome, RpcChannel};
pub use error::{Result, RpcError};
pub use handlers::{HandlerRegistry, MethodHandler};
pub use messages::{errors, Request, Response, RESULT_ACK, RESULT_AUTH_URL, RESULT_ERROR, RESULT_PONG};
pub use transport::memory::MemoryRelay;
pub use transport::{Filter, Transport};
pub use watcher::{ObservedReply, Watcher};
