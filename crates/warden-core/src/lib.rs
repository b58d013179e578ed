//! # Warden Core
//!
//! Pure primitives for the Warden remote signer: keys, events, the signer
//! and the two envelope encryption schemes.
//!
//! This crate does no I/O. Storage, transport and approval live in the
//! crates layered on top.
//!
//! ## Key Types
//!
//! - [`Keys`] - secp256k1 key pair (never serialized)
//! - [`PublicKey`] - x-only public identity
//! - [`Event`] - signed relay event
//! - [`Signer`] - holds the key; signs and encrypts
//! - [`Method`] - closed set of remote-signing methods
//!
//! ## Envelopes
//!
//! [`nip04`] is the legacy AES-CBC form (`base64(ct)?iv=base64(iv)`),
//! [`nip44`] the versioned form. [`Scheme::detect`] picks one from a payload.

pub mod cache;
pub mod error;
pub mod event;
pub mod keys;
pub mod method;
pub mod nip04;
pub mod nip44;
pub mod pow;
pub mod signer;

pub use cache::SharedSecretCache;
pub use error::{CoreError, Result};
pub use event::{
    first_tag_value, now_secs, Event, EventBuilder, EventId, EventTemplate, Tag, UnsignedEvent,
    KIND_HTTP_AUTH, KIND_NOSTR_CONNECT,
};
pub use keys::{Keys, PublicKey, SchnorrSignature};
pub use method::Method;
pub use signer::{Scheme, Signer};
