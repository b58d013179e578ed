//! Error types for Warden core.

use thiserror::Error;

/// Core errors raised by keys, events and the envelope codecs.
#[derive(Debug, Error)]
pub enum CoreError {
    /// No key material is loaded into the signer.
    #[error("signer not initialized")]
    NotInitialized,

    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("invalid secret key")]
    InvalidSecretKey,

    #[error("invalid signature")]
    InvalidSignature,

    /// Event id does not match its content.
    #[error("event id mismatch")]
    IdMismatch,

    #[error("invalid event: {0}")]
    InvalidEvent(String),

    /// Envelope could not be parsed (missing separator, bad base64, bad length).
    #[error("decode error: {0}")]
    Decode(String),

    #[error("encryption error: {0}")]
    Encryption(String),

    #[error("decryption error: {0}")]
    Decryption(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
