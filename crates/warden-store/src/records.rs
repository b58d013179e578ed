//! Stored records.
//!
//! Timestamps are Unix milliseconds. Request parameters are kept in their
//! serialized JSON form so the store never interprets them.

use serde::{Deserialize, Serialize};
use warden_core::PublicKey;

/// A request seen but not yet resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingRequest {
    pub id: String,
    pub caller: PublicKey,
    pub method: String,
    /// JSON array of string params.
    pub params: String,
    pub created_at: i64,
}

impl PendingRequest {
    /// Turn into a history record carrying the decision.
    pub fn resolve(self, allowed: bool, timestamp: i64) -> HistoryRecord {
        HistoryRecord {
            id: self.id,
            caller: self.caller,
            method: self.method,
            params: self.params,
            allowed,
            timestamp,
        }
    }
}

/// A resolved request. Written once, never updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub id: String,
    pub caller: PublicKey,
    pub method: String,
    pub params: String,
    pub allowed: bool,
    pub timestamp: i64,
}

/// Value of a permission grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GrantValue {
    Allow,
    Deny,
}

impl GrantValue {
    /// Stored form: `"1"` or `"0"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            GrantValue::Allow => "1",
            GrantValue::Deny => "0",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "1" => Some(GrantValue::Allow),
            "0" => Some(GrantValue::Deny),
            _ => None,
        }
    }

    pub fn from_allowed(allowed: bool) -> Self {
        if allowed {
            GrantValue::Allow
        } else {
            GrantValue::Deny
        }
    }

    pub fn is_allow(&self) -> bool {
        matches!(self, GrantValue::Allow)
    }
}

/// A cached permission decision for one (caller, verb) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionGrant {
    pub caller: PublicKey,
    /// Method name, a `method:kind` pair, or a package name.
    pub verb: String,
    pub value: GrantValue,
    pub granted_at: i64,
}

/// A connected application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppRecord {
    /// The application's public identity (the caller).
    pub app: PublicKey,
    /// The holder identity the app is connected to.
    pub key: PublicKey,
    pub name: Option<String>,
    pub url: Option<String>,
    pub icon: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A held key. The key material is an opaque blob encrypted by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRecord {
    pub key: PublicKey,
    pub name: Option<String>,
    pub encrypted_key: String,
    pub created_at: i64,
}

/// Current time in Unix milliseconds.
pub fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time went backwards")
        .as_millis() as i64
}
