//! Cross-instance delivery of matchmaker events to connected
//! `/match/ws` clients (`spec.md` §4.2 Messaging Bus).
//!
//! Grounded on `crates/gateway/src/state.rs`'s connection registry
//! (`RwLock<HashMap<...>>` of per-connection senders), keyed here by
//! `userId` rather than connection id, since a matchmaker event always
//! targets a specific user rather than every connected client.

use peerdev_matchmaker::keys;
use peerdev_store::Store;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};

pub struct MessagingBus {
    store: Arc<dyn Store>,
    connections: Mutex<HashMap<String, mpsc::UnboundedSender<String>>>,
}

impl MessagingBus {
    pub fn new(store: Arc<dyn Store>) -> Arc<Self> {
        Arc::new(Self {
            store,
            connections: Mutex::new(HashMap::new()),
        })
    }

    pub async fn register(&self, user_id: &str, sender: mpsc::UnboundedSender<String>) {
        self.connections.lock().await.insert(user_id.to_string(), sender);
    }

    pub async fn unregister(&self, user_id: &str) {
        self.connections.lock().await.remove(user_id);
    }

    /// Subscribe to every `user:<userId>:message` channel and forward
    /// each payload to that user's connection on this instance, if any.
    /// An instance with no local connection for the user simply drops
    /// it (`spec.md` §4.2) — the matchmaker itself never blocks on
    /// delivery.
    pub async fn run_subscriber(self: Arc<Self>) -> peerdev_common::Result<()> {
        let mut subscription = self.store.pattern_subscribe(keys::USER_MESSAGE_PATTERN).await?;
        while let Some((channel, payload)) = subscription.recv().await {
            let Some(user_id) = parse_user_id(&channel) else {
                continue;
            };
            let connections = self.connections.lock().await;
            if let Some(sender) = connections.get(user_id) {
                let _ = sender.send(payload);
            }
        }
        Ok(())
    }
}

fn parse_user_id(channel: &str) -> Option<&str> {
    channel.strip_prefix("user:")?.strip_suffix(":message")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_user_id_extracts_the_middle_segment() {
        assert_eq!(parse_user_id("user:alice:message"), Some("alice"));
        assert_eq!(parse_user_id("room_updates"), None);
    }

    #[tokio::test]
    async fn register_then_unregister_drops_the_sender() {
        let store: Arc<dyn Store> = Arc::new(peerdev_store::FakeStore::new());
        let bus = MessagingBus::new(store);
        let (tx, _rx) = mpsc::unbounded_channel();
        bus.register("alice", tx).await;
        assert!(bus.connections.lock().await.contains_key("alice"));
        bus.unregister("alice").await;
        assert!(!bus.connections.lock().await.contains_key("alice"));
    }
}
