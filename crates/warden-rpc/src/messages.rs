//! Request and response payloads carried inside encrypted envelopes.

use serde::{Deserialize, Serialize};
use warden_core::Method;

use crate::error::{Result, RpcError};

/// Result returned for `connect`.
pub const RESULT_ACK: &str = "ack";

/// Result returned for `ping`.
pub const RESULT_PONG: &str = "pong";

/// `result` value of an error response.
pub const RESULT_ERROR: &str = "error";

/// `result` value marking a pending-authorization reply.
pub const RESULT_AUTH_URL: &str = "auth_url";

/// Error strings sent back to callers.
pub mod errors {
    pub const NOT_AUTHORIZED: &str = "Not authorized";
    pub const UNSUPPORTED_METHOD: &str = "Unsupported method";
    pub const EMPTY_RESPONSE: &str = "Empty response";
    pub const REQUEST_EXPIRED: &str = "Request expired";
}

/// A decrypted request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub id: String,
    pub method: Method,
    #[serde(default)]
    pub params: Vec<String>,
}

impl Request {
    pub fn new(id: impl Into<String>, method: Method, params: Vec<String>) -> Self {
        Self {
            id: id.into(),
            method,
            params,
        }
    }

    /// Parse and check a decrypted payload.
    pub fn from_json(s: &str) -> Result<Self> {
        let request: Self = serde_json::from_str(s)?;
        if request.id.is_empty() {
            return Err(RpcError::InvalidMessage("empty request id".into()));
        }
        Ok(request)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// A response: `{id, result}` or `{id, result: "error", error}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub id: String,
    pub result: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    pub fn ok(id: impl Into<String>, result: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            result: result.into(),
            error: None,
        }
    }

    pub fn error(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            result: RESULT_ERROR.to_string(),
            error: Some(message.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some() || self.result == RESULT_ERROR
    }

    pub fn is_auth_url(&self) -> bool {
        self.result == RESULT_AUTH_URL
    }

    pub fn from_json(s: &str) -> Result<Self> {
        let response: Self = serde_json::from_str(s)?;
        if response.id.is_empty() {
            return Err(RpcError::InvalidMessage("empty response id".into()));
        }
        Ok(response)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
