//! Error types for the Warden facade.

use thiserror::Error;

/// Errors that can occur in bunker and name-registration operations.
#[derive(Debug, Error)]
pub enum WardenError {
    #[error("core error: {0}")]
    Core(#[from] warden_core::CoreError),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] warden_store::StoreError),

    /// Permission error.
    #[error("permission error: {0}")]
    Permission(#[from] warden_perms::PermsError),

    #[error("rpc error: {0}")]
    Rpc(#[from] warden_rpc::RpcError),

    /// HTTP request to the directory service failed.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The directory demands more proof-of-work than we are willing to mine.
    #[error("too many requests: server requires pow {required}, ceiling is {ceiling}")]
    TooManyRequests { required: u32, ceiling: u32 },

    /// The directory rejected the request.
    #[error("registration failed ({status}): {message}")]
    Registration { status: u16, message: String },

    /// A background task panicked or was cancelled.
    #[error("task failed: {0}")]
    Task(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for Warden operations.
pub type Result<T> = std::result::Result<T, WardenError>;
