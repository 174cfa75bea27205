//! In-process store and bus implementations.
//!
//! Used by tests and single-node deployments. Expiry is checked lazily
//! against the wall clock on every read; there is no background sweep,
//! so an entry that is never read again is reclaimed on the next write
//! to the same key or never.

use crate::traits::{BusMessage, BusReceiver, MessageBus, SharedStore, StoreError};
use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// In-process expiring key-value store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    /// Value and expiry timestamp (epoch ms) per key.
    entries: DashMap<String, (String, u64)>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn live_value(entry: Option<(String, u64)>) -> Option<String> {
        entry.and_then(|(value, expires_at)| (now_ms() < expires_at).then_some(value))
    }
}

#[async_trait]
impl SharedStore for MemoryStore {
    async fn set_with_ttl(&self, key: &str, value: &str, ttl_ms: u64) -> Result<(), StoreError> {
        self.entries
            .insert(key.to_string(), (value.to_string(), now_ms() + ttl_ms));
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let entry = self.entries.get(key).map(|e| e.value().clone());
        let live = Self::live_value(entry);
        if live.is_none() {
            self.entries.remove_if(key, |_, (_, expires_at)| now_ms() >= *expires_at);
        }
        Ok(live)
    }

    async fn get_del(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(Self::live_value(self.entries.remove(key).map(|(_, v)| v)))
    }

    async fn del(&self, key: &str) -> Result<(), StoreError> {
        self.entries.remove(key);
        Ok(())
    }
}

/// In-process broadcast bus.
pub struct MemoryBus {
    subscribed: DashSet<String>,
    tx: mpsc::UnboundedSender<BusMessage>,
}

impl MemoryBus {
    /// Create a bus and the receiver its subscriptions feed.
    #[must_use]
    pub fn new() -> (Self, BusReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                subscribed: DashSet::new(),
                tx,
            },
            rx,
        )
    }
}

#[async_trait]
impl MessageBus for MemoryBus {
    async fn publish(&self, channel: &str, payload: &str) -> Result<(), StoreError> {
        if self.subscribed.contains(channel) {
            // Receiver dropped means nobody is listening; not an error.
            let _ = self.tx.send(BusMessage {
                channel: channel.to_string(),
                payload: payload.to_string(),
            });
        }
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<(), StoreError> {
        self.subscribed.insert(channel.to_string());
        Ok(())
    }

    async fn unsubscribe(&self, channel: &str) -> Result<(), StoreError> {
        self.subscribed.remove(channel);
        Ok(())
    }
}
