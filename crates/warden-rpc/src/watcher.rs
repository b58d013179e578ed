//! Watches the held key's own outgoing responses.
//!
//! Another instance holding the same key may answer a request first. Its
//! reply shows up on the relay authored by our key, which is how we learn
//! the id is settled.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, trace};
use warden_core::{Event, PublicKey, Scheme, Signer, KIND_NOSTR_CONNECT};

use crate::error::Result;
use crate::messages::Response;
use crate::transport::Filter;

/// A reply sent by the held key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedReply {
    pub id: String,
    /// The `p`-tagged recipient.
    pub counterpart: PublicKey,
    pub is_error: bool,
}

pub struct Watcher {
    signer: Arc<Signer>,
}

impl Watcher {
    pub fn new(signer: Arc<Signer>) -> Self {
        Self { signer }
    }

    /// Filter selecting events authored by the held key.
    pub fn filter(&self) -> Result<Filter> {
        Ok(Filter::new()
            .kind(KIND_NOSTR_CONNECT)
            .author(self.signer.identity()?))
    }

    /// Inspect one event. Returns the reply it carries, if any.
    ///
    /// `auth_url` markers are not final answers and yield `None`.
    pub fn handle_event(&self, event: &Event) -> Option<ObservedReply> {
        if event.kind != KIND_NOSTR_CONNECT {
            return None;
        }
        let identity = self.signer.identity().ok()?;
        if event.pubkey != identity || event.verify().is_err() {
            trace!(id = ?event.id, "not our event");
            return None;
        }

        let counterpart = match event.addressee() {
            Some(pk) => pk,
            None => {
                debug!(id = ?event.id, "own event without recipient");
                return None;
            }
        };

        let scheme = Scheme::detect(&event.content);
        let plaintext = match self.signer.decrypt(scheme, &counterpart, &event.content) {
            Ok(plaintext) => plaintext,
            Err(e) => {
                debug!(id = ?event.id, error = %e, "cannot open own event");
                return None;
            }
        };

        let response = Response::from_json(&plaintext).ok()?;
        if response.is_auth_url() {
            trace!(id = %response.id, "skipping auth_url marker");
            return None;
        }
        Some(ObservedReply {
            is_error: response.is_error(),
            id: response.id,
            counterpart,
        })
    }

    /// Feed events into `on_reply` until the stream ends.
    pub async fn run<F, Fut>(&self, mut events: mpsc::Receiver<Event>, mut on_reply: F)
    where
        F: FnMut(ObservedReply) -> Fut,
        Fut: std::future::Future<Output = ()>,
    {
        while let Some(event) = events.recv().await {
            if let Some(reply) = self.handle_event(&event) {
                on_reply(reply).await;
            }
        }
        debug!("watch stream ended");
    }
}
