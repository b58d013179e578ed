//! Events: the signed unit carried by relays.
//!
//! The id is SHA-256 over the JSON array
//! `[0, pubkey, created_at, kind, tags, content]`, and the signature is
//! BIP-340 Schnorr over that id.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::error::{CoreError, Result};
use crate::keys::{Keys, PublicKey, SchnorrSignature};

/// Kind of remote-signing request and response envelopes.
pub const KIND_NOSTR_CONNECT: u16 = 24133;

/// Kind of HTTP authorization events.
pub const KIND_HTTP_AUTH: u16 = 27235;

/// A tag: name followed by values.
pub type Tag = Vec<String>;

/// A 32-byte event id.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventId(pub [u8; 32]);

impl EventId {
    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventId({})", &self.to_hex()[..16])
    }
}

impl Serialize for EventId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for EventId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("event id must be 32 bytes"))?;
        Ok(Self(arr))
    }
}

/// A signed event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub pubkey: PublicKey,
    pub created_at: u64,
    pub kind: u16,
    pub tags: Vec<Tag>,
    pub content: String,
    pub sig: SchnorrSignature,
}

impl Event {
    /// Check the id against the content and the signature against the id.
    pub fn verify(&self) -> Result<()> {
        let computed = compute_id(
            &self.pubkey,
            self.created_at,
            self.kind,
            &self.tags,
            &self.content,
        )?;
        if computed != self.id {
            return Err(CoreError::IdMismatch);
        }
        self.pubkey.verify(&self.id.0, &self.sig)
    }

    /// First value of the first tag with the given name.
    pub fn tag_value(&self, name: &str) -> Option<&str> {
        first_tag_value(&self.tags, name)
    }

    /// The counterpart this event is addressed to (`p` tag).
    pub fn addressee(&self) -> Option<PublicKey> {
        self.tag_value("p").and_then(|v| PublicKey::from_hex(v).ok())
    }

    /// Serialize to a JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse from a JSON string.
    pub fn from_json(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }
}

/// An event that has an author but no id or signature yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedEvent {
    pub pubkey: PublicKey,
    pub created_at: u64,
    pub kind: u16,
    pub tags: Vec<Tag>,
    pub content: String,
}

impl UnsignedEvent {
    /// Compute the id this event will have once signed.
    pub fn id(&self) -> Result<EventId> {
        compute_id(
            &self.pubkey,
            self.created_at,
            self.kind,
            &self.tags,
            &self.content,
        )
    }

    /// Sign with the given keys.
    ///
    /// Fails if the event names a different author than the keys.
    pub fn sign(self, keys: &Keys) -> Result<Event> {
        if self.pubkey != keys.public_key() {
            return Err(CoreError::InvalidEvent(
                "event author does not match signing key".into(),
            ));
        }
        let id = self.id()?;
        let sig = keys.sign(&id.0)?;
        Ok(Event {
            id,
            pubkey: self.pubkey,
            created_at: self.created_at,
            kind: self.kind,
            tags: self.tags,
            content: self.content,
            sig,
        })
    }
}

/// An event as submitted for signing: author and timestamp are optional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventTemplate {
    pub kind: u16,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub created_at: Option<u64>,
    #[serde(default)]
    pub pubkey: Option<PublicKey>,
}

impl EventTemplate {
    /// Parse from a JSON string.
    pub fn from_json(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }

    /// Attach an author, defaulting the timestamp to now.
    pub fn into_unsigned(self, author: PublicKey) -> UnsignedEvent {
        UnsignedEvent {
            pubkey: self.pubkey.unwrap_or(author),
            created_at: self.created_at.unwrap_or_else(now_secs),
            kind: self.kind,
            tags: self.tags,
            content: self.content,
        }
    }
}

/// Builder for events.
pub struct EventBuilder {
    kind: u16,
    content: String,
    tags: Vec<Tag>,
    created_at: Option<u64>,
}

impl EventBuilder {
    /// Start building an event of the given kind.
    pub fn new(kind: u16, content: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
            tags: Vec::new(),
            created_at: None,
        }
    }

    /// Append a tag.
    pub fn tag<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.push(values.into_iter().map(Into::into).collect());
        self
    }

    /// Set the timestamp (Unix seconds).
    pub fn created_at(mut self, ts: u64) -> Self {
        self.created_at = Some(ts);
        self
    }

    /// Build without signing.
    pub fn build(self, author: PublicKey) -> UnsignedEvent {
        UnsignedEvent {
            pubkey: author,
            created_at: self.created_at.unwrap_or_else(now_secs),
            kind: self.kind,
            tags: self.tags,
            content: self.content,
        }
    }

    /// Build and sign.
    pub fn sign(self, keys: &Keys) -> Result<Event> {
        self.build(keys.public_key()).sign(keys)
    }
}

/// First value of the first tag with the given name.
pub fn first_tag_value<'a>(tags: &'a [Tag], name: &str) -> Option<&'a str> {
    tags.iter()
        .find(|t| t.first().map(String::as_str) == Some(name))
        .and_then(|t| t.get(1))
        .map(String::as_str)
}

fn compute_id(
    pubkey: &PublicKey,
    created_at: u64,
    kind: u16,
    tags: &[Tag],
    content: &str,
) -> Result<EventId> {
    let serialized = serde_json::to_string(&serde_json::json!([
        0,
        pubkey.to_hex(),
        created_at,
        kind,
        tags,
        content
    ]))?;
    Ok(EventId(Sha256::digest(serialized.as_bytes()).into()))
}

/// Current time in Unix seconds.
pub fn now_secs() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time went backwards")
        .as_secs()
}
