//! The signer: sole holder of the private key.
//!
//! Everything that needs the secret scalar goes through [`Signer`]: event
//! signing and both envelope schemes. Key material can be loaded and
//! unloaded at runtime; every operation fails with
//! [`CoreError::NotInitialized`] while no key is loaded.

use std::sync::{Arc, RwLock};

use crate::cache::SharedSecretCache;
use crate::error::{CoreError, Result};
use crate::event::{Event, EventTemplate, UnsignedEvent};
use crate::keys::{Keys, PublicKey, SchnorrSignature};
use crate::{nip04, nip44};

/// Envelope encryption scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    /// AES-256-CBC, `?iv=` wire form.
    Nip04,
    /// Versioned ChaCha20 + HMAC envelope.
    Nip44,
}

impl Scheme {
    /// Detect the scheme an inbound payload was written with.
    pub fn detect(payload: &str) -> Self {
        if nip04::is_legacy_payload(payload) {
            Scheme::Nip04
        } else {
            Scheme::Nip44
        }
    }
}

/// Holds the key and performs every operation that needs it.
#[derive(Debug)]
pub struct Signer {
    keys: RwLock<Option<Keys>>,
    cache: Arc<SharedSecretCache>,
}

impl Signer {
    /// Create a signer holding `keys`, with its own cache.
    pub fn new(keys: Keys) -> Self {
        Self::with_cache(Some(keys), Arc::new(SharedSecretCache::new()))
    }

    /// Create a signer with no key loaded.
    pub fn empty() -> Self {
        Self::with_cache(None, Arc::new(SharedSecretCache::new()))
    }

    /// Create a signer around an existing cache.
    pub fn with_cache(keys: Option<Keys>, cache: Arc<SharedSecretCache>) -> Self {
        Self {
            keys: RwLock::new(keys),
            cache,
        }
    }

    /// Load key material, replacing any previous key.
    ///
    /// Cached shared secrets belong to the previous key and are dropped.
    pub fn load(&self, keys: Keys) {
        *self.keys.write().unwrap_or_else(|e| e.into_inner()) = Some(keys);
        self.cache.clear();
    }

    /// Drop the key material.
    pub fn unload(&self) {
        *self.keys.write().unwrap_or_else(|e| e.into_inner()) = None;
        self.cache.clear();
    }

    pub fn is_initialized(&self) -> bool {
        self.keys
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// The shared-secret cache.
    pub fn cache(&self) -> &Arc<SharedSecretCache> {
        &self.cache
    }

    fn with_keys<T>(&self, f: impl FnOnce(&Keys) -> Result<T>) -> Result<T> {
        let guard = self.keys.read().unwrap_or_else(|e| e.into_inner());
        match guard.as_ref() {
            Some(keys) => f(keys),
            None => Err(CoreError::NotInitialized),
        }
    }

    /// Public identity of the loaded key.
    pub fn identity(&self) -> Result<PublicKey> {
        self.with_keys(|keys| Ok(keys.public_key()))
    }

    /// Sign a 32-byte digest.
    pub fn sign(&self, digest: &[u8; 32]) -> Result<SchnorrSignature> {
        self.with_keys(|keys| keys.sign(digest))
    }

    /// Sign a template, filling in author and timestamp.
    pub fn sign_event(&self, template: EventTemplate) -> Result<Event> {
        self.with_keys(|keys| template.into_unsigned(keys.public_key()).sign(keys))
    }

    /// Sign an event that already names its author.
    pub fn sign_unsigned(&self, unsigned: UnsignedEvent) -> Result<Event> {
        self.with_keys(|keys| unsigned.sign(keys))
    }

    fn shared_key(&self, keys: &Keys, peer: &PublicKey, scheme: Scheme) -> Result<[u8; 32]> {
        let local = keys.public_key();
        self.cache
            .get_or_try_insert_with(&local, peer, scheme, || {
                let x = keys.ecdh_x(peer)?;
                Ok(match scheme {
                    Scheme::Nip04 => x,
                    Scheme::Nip44 => nip44::conversation_key(&x),
                })
            })
    }

    /// Encrypt `plaintext` for `peer`.
    pub fn encrypt(&self, scheme: Scheme, peer: &PublicKey, plaintext: &str) -> Result<String> {
        self.with_keys(|keys| {
            let key = self.shared_key(keys, peer, scheme)?;
            match scheme {
                Scheme::Nip04 => Ok(nip04::encrypt(&key, plaintext)),
                Scheme::Nip44 => nip44::encrypt(&key, plaintext),
            }
        })
    }

    /// Decrypt a payload sent by `peer`.
    pub fn decrypt(&self, scheme: Scheme, peer: &PublicKey, payload: &str) -> Result<String> {
        self.with_keys(|keys| {
            let key = self.shared_key(keys, peer, scheme)?;
            match scheme {
                Scheme::Nip04 => nip04::decrypt(&key, payload),
                Scheme::Nip44 => nip44::decrypt(&key, payload),
            }
        })
    }

    pub fn nip04_encrypt(&self, peer: &PublicKey, plaintext: &str) -> Result<String> {
        self.encrypt(Scheme::Nip04, peer, plaintext)
    }

    pub fn nip04_decrypt(&self, peer: &PublicKey, payload: &str) -> Result<String> {
        self.decrypt(Scheme::Nip04, peer, payload)
    }

    pub fn nip44_encrypt(&self, peer: &PublicKey, plaintext: &str) -> Result<String> {
        self.encrypt(Scheme::Nip44, peer, plaintext)
    }

    pub fn nip44_decrypt(&self, peer: &PublicKey, payload: &str) -> Result<String> {
        self.decrypt(Scheme::Nip44, peer, payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_empty_signer_not_initialized() {
        let signer = Signer::empty();
        assert!(!signer.is_initialized());
        assert!(matches!(signer.identity(), Err(CoreError::NotInitialized)));
        assert!(matches!(
            signer.sign(&[0; 32]),
            Err(CoreError::NotInitialized)
        ));
        let peer = Keys::generate().public_key();
        assert!(matches!(
            signer.nip04_encrypt(&peer, "x"),
            Err(CoreError::NotInitialized)
        ));
    }

    #[test]
    fn test_load_and_unload() {
        let signer = Signer::empty();
        let keys = Keys::generate();
        signer.load(keys.clone());
        assert_eq!(signer.identity().unwrap(), keys.public_key());
        signer.unload();
        assert!(signer.identity().is_err());
    }

    #[test]
    fn test_cross_keypair_nip04() {
        let a = Signer::new(Keys::generate());
        let b = Signer::new(Keys::generate());
        let a_pk = a.identity().unwrap();
        let b_pk = b.identity().unwrap();

        let payload = a.nip04_encrypt(&b_pk, "hello bob").unwrap();
        assert_eq!(b.nip04_decrypt(&a_pk, &payload).unwrap(), "hello bob");
    }

    #[test]
    fn test_cross_keypair_nip44() {
        let a = Signer::new(Keys::generate());
        let b = Signer::new(Keys::generate());
        let a_pk = a.identity().unwrap();
        let b_pk = b.identity().unwrap();

        let payload = a.nip44_encrypt(&b_pk, "hello bob").unwrap();
        assert_eq!(b.nip44_decrypt(&a_pk, &payload).unwrap(), "hello bob");
    }

    #[test]
    fn test_cache_populated_per_scheme() {
        let a = Signer::new(Keys::generate());
        let peer = Keys::generate().public_key();
        a.nip04_encrypt(&peer, "one").unwrap();
        a.nip04_encrypt(&peer, "two").unwrap();
        assert_eq!(a.cache().len(), 1);
        a.nip44_encrypt(&peer, "three").unwrap();
        assert_eq!(a.cache().len(), 2);
    }

    #[test]
    fn test_shared_cache_isolated_by_local_key() {
        let cache = Arc::new(SharedSecretCache::new());
        let a = Signer::with_cache(Some(Keys::generate()), cache.clone());
        let b = Signer::with_cache(Some(Keys::generate()), cache.clone());
        let peer = Keys::generate();

        let from_a = a.nip04_encrypt(&peer.public_key(), "from a").unwrap();
        let from_b = b.nip04_encrypt(&peer.public_key(), "from b").unwrap();

        let reader = Signer::new(peer);
        assert_eq!(
            reader
                .nip04_decrypt(&a.identity().unwrap(), &from_a)
                .unwrap(),
            "from a"
        );
        assert_eq!(
            reader
                .nip04_decrypt(&b.identity().unwrap(), &from_b)
                .unwrap(),
            "from b"
        );
    }

    #[test]
    fn test_sign_event_fills_author() {
        let keys = Keys::generate();
        let signer = Signer::new(keys.clone());
        let template = EventTemplate::from_json(r#"{"kind":1,"content":"hi","tags":[]}"#).unwrap();
        let event = signer.sign_event(template).unwrap();
        assert_eq!(event.pubkey, keys.public_key());
        event.verify().unwrap();
    }

    #[test]
    fn test_scheme_detection() {
        assert_eq!(Scheme::detect("abc?iv=def"), Scheme::Nip04);
        assert_eq!(Scheme::detect("AgAAAA"), Scheme::Nip44);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn prop_decrypt_inverts_encrypt(plaintext in "\\PC{1,200}", legacy in any::<bool>()) {
            let scheme = if legacy { Scheme::Nip04 } else { Scheme::Nip44 };
            let a = Signer::new(Keys::generate());
            let b = Signer::new(Keys::generate());
            let payload = a
                .encrypt(scheme, &b.identity().unwrap(), &plaintext)
                .unwrap();
            let opened = b
                .decrypt(scheme, &a.identity().unwrap(), &payload)
                .unwrap();
            prop_assert_eq!(opened, plaintext);
        }
    }
}
