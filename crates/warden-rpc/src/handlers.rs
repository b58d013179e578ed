//! Method handlers.
//!
//! The registry maps each supported method to a handler and is fixed when
//! the channel is built. `connect` is answered by the channel itself and
//! never reaches a handler.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use warden_core::{EventTemplate, Method, PublicKey, Scheme, Signer};

use crate::messages::RESULT_PONG;

/// Executes one method.
///
/// `Ok(None)` means the handler produced nothing; the channel answers
/// "Empty response".
#[async_trait]
pub trait MethodHandler: Send + Sync {
    async fn handle(
        &self,
        signer: &Signer,
        caller: &PublicKey,
        params: &[String],
    ) -> anyhow::Result<Option<String>>;
}

fn param<'a>(params: &'a [String], idx: usize, name: &str) -> anyhow::Result<&'a str> {
    params
        .get(idx)
        .map(String::as_str)
        .ok_or_else(|| anyhow!("missing param: {}", name))
}

pub struct GetPublicKey;

#[async_trait]
impl MethodHandler for GetPublicKey {
    async fn handle(
        &self,
        signer: &Signer,
        _caller: &PublicKey,
        _params: &[String],
    ) -> anyhow::Result<Option<String>> {
        Ok(Some(signer.identity()?.to_hex()))
    }
}

/// `params[0]` is an unsigned event; the result is the signed event.
pub struct SignEvent;

#[async_trait]
impl MethodHandler for SignEvent {
    async fn handle(
        &self,
        signer: &Signer,
        _caller: &PublicKey,
        params: &[String],
    ) -> anyhow::Result<Option<String>> {
        let template = EventTemplate::from_json(param(params, 0, "event")?)
            .context("invalid event")?;
        let event = signer.sign_event(template)?;
        Ok(Some(event.to_json()?))
    }
}

/// `params` = [peer, plaintext].
pub struct Encrypt(pub Scheme);

#[async_trait]
impl MethodHandler for Encrypt {
    async fn handle(
        &self,
        signer: &Signer,
        _caller: &PublicKey,
        params: &[String],
    ) -> anyhow::Result<Option<String>> {
        let peer = PublicKey::parse(param(params, 0, "pubkey")?)?;
        let plaintext = param(params, 1, "plaintext")?;
        Ok(Some(signer.encrypt(self.0, &peer, plaintext)?))
    }
}

/// `params` = [peer, ciphertext].
pub struct Decrypt(pub Scheme);

#[async_trait]
impl MethodHandler for Decrypt {
    async fn handle(
        &self,
        signer: &Signer,
        _caller: &PublicKey,
        params: &[String],
    ) -> anyhow::Result<Option<String>> {
        let peer = PublicKey::parse(param(params, 0, "pubkey")?)?;
        let ciphertext = param(params, 1, "ciphertext")?;
        Ok(Some(signer.decrypt(self.0, &peer, ciphertext)?))
    }
}

pub struct Ping;

#[async_trait]
impl MethodHandler for Ping {
    async fn handle(
        &self,
        _signer: &Signer,
        _caller: &PublicKey,
        _params: &[String],
    ) -> anyhow::Result<Option<String>> {
        Ok(Some(RESULT_PONG.to_string()))
    }
}

/// Method to handler table.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<Method, Arc<dyn MethodHandler>>,
}

impl HandlerRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every built-in handler.
    pub fn standard() -> Self {
        Self::new()
            .with(Method::GetPublicKey, GetPublicKey)
            .with(Method::SignEvent, SignEvent)
            .with(Method::Nip04Encrypt, Encrypt(Scheme::Nip04))
            .with(Method::Nip04Decrypt, Decrypt(Scheme::Nip04))
            .with(Method::Nip44Encrypt, Encrypt(Scheme::Nip44))
            .with(Method::Nip44Decrypt, Decrypt(Scheme::Nip44))
            .with(Method::Ping, Ping)
    }

    /// Register (or replace) a handler.
    pub fn with(mut self, method: Method, handler: impl MethodHandler + 'static) -> Self {
        self.handlers.insert(method, Arc::new(handler));
        self
    }

    /// Drop a handler, so the method is answered "Unsupported method".
    pub fn without(mut self, method: &Method) -> Self {
        self.handlers.remove(method);
        self
    }

    pub fn get(&self, method: &Method) -> Option<&Arc<dyn MethodHandler>> {
        self.handlers.get(method)
    }

    pub fn supports(&self, method: &Method) -> bool {
        self.handlers.contains_key(method)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_core::{Event, Keys};

    fn signer() -> Signer {
        Signer::new(Keys::generate())
    }

    async fn run(method: Method, signer: &Signer, params: &[String]) -> anyhow::Result<Option<String>> {
        let registry = HandlerRegistry::standard();
        let caller = Keys::generate().public_key();
        registry
            .get(&method)
            .expect("registered")
            .handle(signer, &caller, params)
            .await
    }

    #[tokio::test]
    async fn test_get_public_key() {
        let signer = signer();
        let result = run(Method::GetPublicKey, &signer, &[]).await.unwrap();
        assert_eq!(result, Some(signer.identity().unwrap().to_hex()));
    }

    #[tokio::test]
    async fn test_sign_event() {
        let signer = signer();
        let params = vec![r#"{"kind":1,"content":"hi","tags":[],"created_at":1700000000}"#.to_string()];
        let json = run(Method::SignEvent, &signer, &params).await.unwrap().unwrap();
        let event = Event::from_json(&json).unwrap();
        event.verify().unwrap();
        assert_eq!(event.pubkey, signer.identity().unwrap());
        assert_eq!(event.created_at, 1_700_000_000);
    }

    #[tokio::test]
    async fn test_sign_event_bad_param() {
        let signer = signer();
        assert!(run(Method::SignEvent, &signer, &["{".to_string()]).await.is_err());
        assert!(run(Method::SignEvent, &signer, &[]).await.is_err());
    }

    #[tokio::test]
    async fn test_encrypt_decrypt_via_handlers() {
        let alice = signer();
        let bob = signer();
        let bob_hex = bob.identity().unwrap().to_hex();
        let alice_hex = alice.identity().unwrap().to_hex();

        for (enc, dec) in [
            (Method::Nip04Encrypt, Method::Nip04Decrypt),
            (Method::Nip44Encrypt, Method::Nip44Decrypt),
        ] {
            let ct = run(enc, &alice, &[bob_hex.clone(), "secret".into()])
                .await
                .unwrap()
                .unwrap();
            let pt = run(dec, &bob, &[alice_hex.clone(), ct]).await.unwrap();
            assert_eq!(pt.as_deref(), Some("secret"));
        }
    }

    #[tokio::test]
    async fn test_missing_params_error() {
        let signer = signer();
        let err = run(Method::Nip44Encrypt, &signer, &[]).await.unwrap_err();
        assert!(err.to_string().contains("missing param"));
    }

    #[test]
    fn test_registry_without() {
        let registry = HandlerRegistry::standard().without(&Method::Ping);
        assert!(!registry.supports(&Method::Ping));
        assert!(registry.supports(&Method::SignEvent));
        assert!(!registry.supports(&Method::Connect));
    }
}
