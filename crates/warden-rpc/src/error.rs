//! Error types for the RPC module.

use thiserror::Error;

/// Errors that can occur while serving requests.
#[derive(Debug, Error)]
pub enum RpcError {
    /// Signing or envelope failure.
    #[error("core error: {0}")]
    Core(#[from] warden_core::CoreError),

    /// Store operation failed.
    #[error("store error: {0}")]
    Store(#[from] warden_store::StoreError),

    #[error("permission error: {0}")]
    Perms(#[from] warden_perms::PermsError),

    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(String),

    /// Payload could not be parsed as a request or response.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for RPC operations.
pub type Result<T> = std::result::Result<T, RpcError>;
