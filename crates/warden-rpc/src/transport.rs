//! Relay transport abstraction.
//!
//! A transport publishes signed events and delivers events matching a
//! filter. Delivery is at-least-once: the same event may arrive again.

use async_trait::async_trait;
use tokio::sync::mpsc;
use warden_core::{Event, PublicKey};

use crate::error::Result;

/// Event filter for subscriptions. Empty lists match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    pub kinds: Vec<u16>,
    pub authors: Vec<PublicKey>,
    /// Match events whose `p` tag names one of these keys.
    pub p_tags: Vec<PublicKey>,
    /// Only events created at or after this time (Unix seconds).
    pub since: Option<u64>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kind(mut self, kind: u16) -> Self {
        self.kinds.push(kind);
        self
    }

    pub fn author(mut self, author: PublicKey) -> Self {
        self.authors.push(author);
        self
    }

    pub fn p_tag(mut self, key: PublicKey) -> Self {
        self.p_tags.push(key);
        self
    }

    pub fn since(mut self, ts: u64) -> Self {
        self.since = Some(ts);
        self
    }

    /// Whether an event passes the filter.
    pub fn matches(&self, event: &Event) -> bool {
        if !self.kinds.is_empty() && !self.kinds.contains(&event.kind) {
            return false;
        }
        if !self.authors.is_empty() && !self.authors.contains(&event.pubkey) {
            return false;
        }
        if !self.p_tags.is_empty() {
            let tagged = event.tags.iter().any(|t| {
                t.first().map(String::as_str) == Some("p")
                    && t.get(1)
                        .is_some_and(|v| self.p_tags.iter().any(|k| k.to_hex() == *v))
            });
            if !tagged {
                return false;
            }
        }
        if let Some(since) = self.since {
            if event.created_at < since {
                return false;
            }
        }
        true
    }
}

/// Transport trait for publishing and subscribing to relay events.
///
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Publish an event.
    async fn publish(&self, event: Event) -> Result<()>;

    /// Subscribe to events matching `filter`.
    ///
    /// Stored events are delivered first, then live ones. The stream ends
    /// when the transport shuts down.
    async fn subscribe(&self, filter: Filter) -> Result<mpsc::Receiver<Event>>;
}

/// A simple in-memory relay for testing.
pub mod memory {
    use super::*;
    use std::sync::Arc;
    use tokio::sync::RwLock;

    use crate::error::RpcError;

    const SUBSCRIPTION_BUFFER: usize = 1000;

    struct Subscription {
        filter: Filter,
        sender: mpsc::Sender<Event>,
    }

    /// In-memory relay: stores every published event and fans it out to
    /// matching subscriptions.
    #[derive(Default)]
    pub struct MemoryRelay {
        events: RwLock<Vec<Event>>,
        subscriptions: RwLock<Vec<Subscription>>,
    }

    impl MemoryRelay {
        /// Create a new relay.
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        /// Every event published so far, in order.
        pub async fn published(&self) -> Vec<Event> {
            self.events.read().await.clone()
        }

        /// Published events matching a filter.
        pub async fn query(&self, filter: &Filter) -> Vec<Event> {
            self.events
                .read()
                .await
                .iter()
                .filter(|e| filter.matches(e))
                .cloned()
                .collect()
        }

        /// Deliver an event to live subscriptions again without storing it.
        pub async fn redeliver(&self, event: &Event) {
            self.fan_out(event).await;
        }

        async fn fan_out(&self, event: &Event) {
            let mut subscriptions = self.subscriptions.write().await;
            subscriptions.retain(|s| !s.sender.is_closed());
            for sub in subscriptions.iter() {
                if sub.filter.matches(event) {
                    // Receivers dropped between retain and send are pruned next time.
                    let _ = sub.sender.send(event.clone()).await;
                }
            }
        }
    }

    #[async_trait]
    impl Transport for MemoryRelay {
        async fn publish(&self, event: Event) -> Result<()> {
            event
                .verify()
                .map_err(|e| RpcError::Transport(format!("rejected event: {}", e)))?;
            self.events.write().await.push(event.clone());
            self.fan_out(&event).await;
            Ok(())
        }

        async fn subscribe(&self, filter: Filter) -> Result<mpsc::Receiver<Event>> {
            let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
            // Hold the subscription lock so no live event slips between replay and registration.
            let mut subscriptions = self.subscriptions.write().await;
            for event in self.events.read().await.iter() {
                if filter.matches(event) {
                    tx.send(event.clone())
                        .await
                        .map_err(|_| RpcError::Transport("subscriber closed".into()))?;
                }
            }
            subscriptions.push(Subscription { filter, sender: tx });
            Ok(rx)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::memory::MemoryRelay;
    use super::*;
    use warden_core::{EventBuilder, Keys, KIND_NOSTR_CONNECT};

    fn addressed(from: &Keys, to: &PublicKey, content: &str) -> Event {
        let to = to.to_hex();
        EventBuilder::new(KIND_NOSTR_CONNECT, content)
            .tag(["p", to.as_str()])
            .sign(from)
            .unwrap()
    }

    #[test]
    fn test_filter_matching() {
        let alice = Keys::generate();
        let bob = Keys::generate();
        let event = addressed(&alice, &bob.public_key(), "x");

        assert!(Filter::new().matches(&event));
        assert!(Filter::new().kind(KIND_NOSTR_CONNECT).matches(&event));
        assert!(!Filter::new().kind(1).matches(&event));
        assert!(Filter::new().author(alice.public_key()).matches(&event));
        assert!(!Filter::new().author(bob.public_key()).matches(&event));
        assert!(Filter::new().p_tag(bob.public_key()).matches(&event));
        assert!(!Filter::new().p_tag(alice.public_key()).matches(&event));
        assert!(!Filter::new().since(event.created_at + 1).matches(&event));
    }

    #[tokio::test]
    async fn test_memory_relay_replays_then_streams() {
        let relay = MemoryRelay::new();
        let alice = Keys::generate();
        let bob = Keys::generate();

        relay
            .publish(addressed(&alice, &bob.public_key(), "first"))
            .await
            .unwrap();

        let mut rx = relay
            .subscribe(Filter::new().p_tag(bob.public_key()))
            .await
            .unwrap();
        assert_eq!(rx.recv().await.unwrap().content, "first");

        relay
            .publish(addressed(&alice, &bob.public_key(), "second"))
            .await
            .unwrap();
        relay
            .publish(addressed(&bob, &alice.public_key(), "not for bob"))
            .await
            .unwrap();
        assert_eq!(rx.recv().await.unwrap().content, "second");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_memory_relay_rejects_forged_event() {
        let relay = MemoryRelay::new();
        let alice = Keys::generate();
        let mut event = addressed(&alice, &alice.public_key(), "x");
        event.content = "tampered".into();
        assert!(relay.publish(event).await.is_err());
        assert!(relay.published().await.is_empty());
    }

    #[tokio::test]
    async fn test_redeliver_reaches_live_subscribers() {
        let relay = MemoryRelay::new();
        let alice = Keys::generate();
        let event = addressed(&alice, &alice.public_key(), "again");
        relay.publish(event.clone()).await.unwrap();

        let mut rx = relay.subscribe(Filter::new()).await.unwrap();
        rx.recv().await.unwrap();
        relay.redeliver(&event).await;
        assert_eq!(rx.recv().await.unwrap(), event);
        assert_eq!(relay.published().await.len(), 1);
    }
}
