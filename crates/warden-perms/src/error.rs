//! Error types for the permissions module.

use thiserror::Error;
use warden_store::StoreError;

#[derive(Debug, Error)]
pub enum PermsError {
    /// The grant store failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("invalid verb: {0}")]
    InvalidVerb(String),
}

/// Result type for permission operations.
pub type Result<T> = std::result::Result<T, PermsError>;
