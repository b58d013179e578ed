//! Test fixtures and helpers.
//!
//! A fixture plays one party: a key pair plus its own memory store. The same
//! fixture can act as an app (building requests, opening responses) or as
//! the holder of a bunker.

use std::sync::Arc;

use warden_core::{Event, EventBuilder, Keys, Method, PublicKey, Scheme, Signer, KIND_NOSTR_CONNECT};
use warden_rpc::{Request, Response};
use warden_store::MemoryStore;

/// A test fixture with a key pair and memory store.
pub struct TestFixture {
    pub keys: Keys,
    pub store: Arc<MemoryStore>,
    signer: Signer,
}

impl TestFixture {
    /// Create a new test fixture with a random key.
    pub fn new() -> Self {
        Self::from_keys(Keys::generate())
    }

    /// Create with a deterministic key. `seed` must be non-zero.
    pub fn with_seed(seed: u8) -> Self {
        let keys = Keys::from_secret_bytes(&[seed; 32]).expect("seed is a valid scalar");
        Self::from_keys(keys)
    }

    fn from_keys(keys: Keys) -> Self {
        Self {
            signer: Signer::new(keys.clone()),
            keys,
            store: Arc::new(MemoryStore::new()),
        }
    }

    pub fn public_key(&self) -> PublicKey {
        self.keys.public_key()
    }

    /// Build a signed request event addressed to `holder`.
    pub fn request_event(
        &self,
        holder: &PublicKey,
        id: &str,
        method: &str,
        params: &[&str],
        scheme: Scheme,
    ) -> Event {
        let request = Request::new(
            id,
            Method::parse(method),
            params.iter().map(|p| p.to_string()).collect(),
        );
        let content = self
            .signer
            .encrypt(scheme, holder, &request.to_json().expect("request serializes"))
            .expect("encrypt request");
        let holder = holder.to_hex();
        EventBuilder::new(KIND_NOSTR_CONNECT, content)
            .tag(["p", holder.as_str()])
            .sign(&self.keys)
            .expect("sign request")
    }

    /// Shorthand for a NIP-44 request.
    pub fn request(&self, holder: &PublicKey, id: &str, method: &str, params: &[&str]) -> Event {
        self.request_event(holder, id, method, params, Scheme::Nip44)
    }

    /// Decrypt a response event sent to this party.
    pub fn open_response(&self, event: &Event) -> Option<Response> {
        let scheme = Scheme::detect(&event.content);
        let json = self.signer.decrypt(scheme, &event.pubkey, &event.content).ok()?;
        Response::from_json(&json).ok()
    }

    /// Responses addressed to this party among `events`, in order.
    pub fn responses_in(&self, events: &[Event]) -> Vec<Response> {
        events
            .iter()
            .filter(|e| e.addressee() == Some(self.public_key()))
            .filter_map(|e| self.open_response(e))
            .collect()
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Create multiple test fixtures for multi-party tests.
pub fn multi_party_fixtures(count: usize) -> Vec<TestFixture> {
    (0..count)
        .map(|i| TestFixture::with_seed(i as u8 + 1))
        .collect()
}

/// An unsigned event JSON of `kind`, as an app would send in `sign_event`.
pub fn unsigned_event_json(kind: u16, content: &str) -> String {
    serde_json::json!({
        "kind": kind,
        "content": content,
        "tags": [],
        "created_at": 1_700_000_000u64,
    })
    .to_string()
}
