//! Verbs: the unit a permission is granted for.
//!
//! A verb is a method name, optionally qualified by an event kind
//! (`sign_event:1`).

use std::fmt;

use serde::{Deserialize, Serialize};
use warden_core::Method;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Verb {
    pub method: Method,
    pub kind: Option<u64>,
}

impl Verb {
    /// An unqualified verb.
    pub fn bare(method: Method) -> Self {
        Self { method, kind: None }
    }

    /// A kind-qualified verb.
    pub fn with_kind(method: Method, kind: u64) -> Self {
        Self {
            method,
            kind: Some(kind),
        }
    }

    /// The verb a request is checked against.
    ///
    /// `sign_event` is qualified by the `kind` field of the event in the
    /// first param. If that cannot be read the bare method is used.
    pub fn for_request(method: &Method, params: &[String]) -> Self {
        match method {
            Method::SignEvent => match params.first().and_then(|p| event_kind(p)) {
                Some(kind) => Self::with_kind(method.clone(), kind),
                None => Self::bare(method.clone()),
            },
            _ => Self::bare(method.clone()),
        }
    }

    /// Parse a stored verb string.
    pub fn parse(s: &str) -> Self {
        if let Some((method, kind)) = s.split_once(':') {
            if let Ok(kind) = kind.parse() {
                return Self::with_kind(Method::parse(method), kind);
            }
        }
        Self::bare(Method::parse(s))
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            Some(kind) => write!(f, "{}:{}", self.method, kind),
            None => f.write_str(self.method.as_str()),
        }
    }
}

fn event_kind(param: &str) -> Option<u64> {
    let value: serde_json::Value = serde_json::from_str(param).ok()?;
    value.get("kind")?.as_u64()
}
