//! Shared-secret cache.
//!
//! The curve multiplication behind each conversation key is the expensive
//! part of every encrypt/decrypt call, so derived keys are kept per
//! (local, remote, scheme). The cache is owned by whoever builds the
//! signer; nothing here is global.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::keys::PublicKey;
use crate::signer::Scheme;

type CacheKey = (PublicKey, PublicKey, Scheme);

/// In-memory cache of derived symmetric keys.
///
/// Concurrent population may derive the same key twice; the later insert
/// simply overwrites an identical value.
#[derive(Debug, Default)]
pub struct SharedSecretCache {
    entries: RwLock<HashMap<CacheKey, [u8; 32]>>,
}

impl SharedSecretCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a derived key.
    pub fn get(&self, local: &PublicKey, remote: &PublicKey, scheme: Scheme) -> Option<[u8; 32]> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(&(*local, *remote, scheme)).copied()
    }

    /// Store a derived key.
    pub fn insert(&self, local: PublicKey, remote: PublicKey, scheme: Scheme, key: [u8; 32]) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert((local, remote, scheme), key);
    }

    /// Return the cached key, deriving and storing it on a miss.
    pub fn get_or_try_insert_with<E>(
        &self,
        local: &PublicKey,
        remote: &PublicKey,
        scheme: Scheme,
        derive: impl FnOnce() -> Result<[u8; 32], E>,
    ) -> Result<[u8; 32], E> {
        if let Some(key) = self.get(local, remote, scheme) {
            return Ok(key);
        }
        // Derive outside the lock.
        let key = derive()?;
        self.insert(*local, *remote, scheme, key);
        Ok(key)
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every cached key.
    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}
