//! Name registration against a directory service.
//!
//! Every call carries an HTTP-auth event (kind 27235) in the `Authorization`
//! header, mined to the proof-of-work the directory currently asks for. A
//! rejection may name a higher `minPow`; the client retries at exactly that
//! difficulty until it succeeds or the ceiling is exceeded.

use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use warden_core::{pow, EventBuilder, PublicKey, Signer, KIND_HTTP_AUTH};

use crate::error::{Result, WardenError};

/// Configuration for [`NameClient`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NameClientConfig {
    /// Directory base URL; requests go to `<base_url>/name`.
    pub base_url: String,
    /// Difficulty of the first attempt.
    pub min_pow: u32,
    /// Highest difficulty we will mine.
    pub max_pow: u32,
    pub request_timeout: Duration,
}

impl Default for NameClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".to_string(),
            min_pow: 14,
            max_pow: 19,
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl NameClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }
}

/// Outcome of one registration attempt.
#[derive(Debug)]
pub enum Attempt {
    /// Accepted; carries the response body (`Null` if empty).
    Success(Value),
    /// Try again at this difficulty.
    Retry(u32),
    Fatal(WardenError),
}

/// Classify a directory response to an attempt mined at `attempted`.
pub fn evaluate(status: u16, body: &str, attempted: u32, max_pow: u32) -> Attempt {
    let parsed: Option<Value> = serde_json::from_str(body).ok();

    if (200..300).contains(&status) {
        return Attempt::Success(parsed.unwrap_or(Value::Null));
    }

    if let Some(required) = parsed.as_ref().and_then(required_pow) {
        if required > attempted {
            if required > max_pow {
                return Attempt::Fatal(WardenError::TooManyRequests {
                    required,
                    ceiling: max_pow,
                });
            }
            return Attempt::Retry(required);
        }
    }

    let message = parsed
        .as_ref()
        .and_then(|v| v.get("error").or_else(|| v.get("message")))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| body.to_string());
    Attempt::Fatal(WardenError::Registration { status, message })
}

/// `minPow` at the top level, or under `cause`.
fn required_pow(body: &Value) -> Option<u32> {
    body.get("minPow")
        .or_else(|| body.get("cause").and_then(|c| c.get("minPow")))
        .and_then(Value::as_u64)
        .and_then(|v| u32::try_from(v).ok())
}

#[derive(Debug, Deserialize)]
struct NameLookup {
    npub: Option<String>,
    pubkey: Option<String>,
}

/// Client for the directory's `/name` endpoint.
pub struct NameClient {
    config: NameClientConfig,
    signer: Arc<Signer>,
    http: reqwest::Client,
}

impl NameClient {
    pub fn new(signer: Arc<Signer>, config: NameClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            config,
            signer,
            http,
        })
    }

    pub fn config(&self) -> &NameClientConfig {
        &self.config
    }

    fn name_url(&self) -> String {
        format!("{}/name", self.config.base_url.trim_end_matches('/'))
    }

    /// Register `name` for the held key.
    ///
    /// Starts at `min_pow` and follows the directory's `minPow` upward.
    /// Fails with [`WardenError::TooManyRequests`] once the directory asks
    /// for more than `max_pow`, without making that call.
    pub async fn register(&self, name: &str) -> Result<Value> {
        let npub = self.signer.identity()?.to_npub();
        let mut difficulty = self.config.min_pow;
        if difficulty > self.config.max_pow {
            return Err(WardenError::TooManyRequests {
                required: difficulty,
                ceiling: self.config.max_pow,
            });
        }

        loop {
            let body = json!({ "npub": npub, "name": name, "pow": difficulty }).to_string();
            let (status, text) = self.post(&body, difficulty).await?;

            match evaluate(status.as_u16(), &text, difficulty, self.config.max_pow) {
                Attempt::Success(value) => {
                    info!(name = %name, pow = difficulty, "name registered");
                    return Ok(value);
                }
                Attempt::Retry(next) => {
                    info!(name = %name, from = difficulty, to = next, "directory raised pow");
                    difficulty = next;
                }
                Attempt::Fatal(e) => {
                    warn!(name = %name, pow = difficulty, error = %e, "registration failed");
                    return Err(e);
                }
            }
        }
    }

    /// Look up who owns `name`. `None` if it is free.
    pub async fn check_name(&self, name: &str) -> Result<Option<PublicKey>> {
        let response = self
            .http
            .get(self.name_url())
            .query(&[("name", name)])
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let text = response.text().await?;
        if !status.is_success() {
            return Err(WardenError::Registration {
                status: status.as_u16(),
                message: text,
            });
        }

        let lookup: NameLookup = serde_json::from_str(&text)?;
        match (lookup.npub, lookup.pubkey) {
            (Some(npub), _) => Ok(Some(PublicKey::from_npub(&npub)?)),
            (None, Some(hex)) => Ok(Some(PublicKey::from_hex(&hex)?)),
            (None, None) => Ok(None),
        }
    }

    async fn post(&self, body: &str, difficulty: u32) -> Result<(StatusCode, String)> {
        let url = self.name_url();
        let auth = self
            .auth_header(&url, "POST", body.as_bytes(), difficulty)
            .await?;

        debug!(url = %url, pow = difficulty, "posting registration");
        let response = self
            .http
            .post(&url)
            .header(AUTHORIZATION, auth)
            .header(CONTENT_TYPE, "application/json")
            .body(body.to_string())
            .send()
            .await?;
        let status = response.status();
        let text = response.text().await?;
        Ok((status, text))
    }

    /// `Nostr <base64(event json)>` for an HTTP-auth event mined to `difficulty`.
    pub async fn auth_header(
        &self,
        url: &str,
        method: &str,
        body: &[u8],
        difficulty: u32,
    ) -> Result<String> {
        let mut builder = EventBuilder::new(KIND_HTTP_AUTH, "")
            .tag(["u", url])
            .tag(["method", method]);
        if !body.is_empty() {
            let digest = hex::encode(Sha256::digest(body));
            builder = builder.tag(["payload".to_string(), digest]);
        }
        let unsigned = builder.build(self.signer.identity()?);

        let mined = tokio::task::spawn_blocking(move || pow::mine(unsigned, difficulty))
            .await
            .map_err(|e| WardenError::Task(e.to_string()))??;
        let event = self.signer.sign_unsigned(mined)?;

        Ok(format!("Nostr {}", STANDARD.encode(event.to_json()?)))
    }
}
