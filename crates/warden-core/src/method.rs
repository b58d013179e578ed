//! Remote-signing methods.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A request method.
///
/// Unrecognized names are kept in [`Method::Unknown`] so they can still be
/// recorded and answered with an error.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    Connect,
    GetPublicKey,
    SignEvent,
    Nip04Encrypt,
    Nip04Decrypt,
    Nip44Encrypt,
    Nip44Decrypt,
    Ping,
    Unknown(String),
}

impl Method {
    /// Every recognized method.
    pub const ALL: [Method; 8] = [
        Method::Connect,
        Method::GetPublicKey,
        Method::SignEvent,
        Method::Nip04Encrypt,
        Method::Nip04Decrypt,
        Method::Nip44Encrypt,
        Method::Nip44Decrypt,
        Method::Ping,
    ];

    /// Parse a wire name.
    pub fn parse(s: &str) -> Self {
        match s {
            "connect" => Method::Connect,
            "get_public_key" => Method::GetPublicKey,
            "sign_event" => Method::SignEvent,
            "nip04_encrypt" => Method::Nip04Encrypt,
            "nip04_decrypt" => Method::Nip04Decrypt,
            "nip44_encrypt" => Method::Nip44Encrypt,
            "nip44_decrypt" => Method::Nip44Decrypt,
            "ping" => Method::Ping,
            other => Method::Unknown(other.to_string()),
        }
    }

    /// Wire name.
    pub fn as_str(&self) -> &str {
        match self {
            Method::Connect => "connect",
            Method::GetPublicKey => "get_public_key",
            Method::SignEvent => "sign_event",
            Method::Nip04Encrypt => "nip04_encrypt",
            Method::Nip04Decrypt => "nip04_decrypt",
            Method::Nip44Encrypt => "nip44_encrypt",
            Method::Nip44Decrypt => "nip44_decrypt",
            Method::Ping => "ping",
            Method::Unknown(name) => name,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Method::Unknown(_))
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for Method {
    fn from(s: &str) -> Self {
        Method::parse(s)
    }
}

impl Serialize for Method {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Method {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Method::parse(&s))
    }
}
