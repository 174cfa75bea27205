//! Store and bus abstractions.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors from the shared store or bus.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend cannot be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The backend rejected or failed the operation.
    #[error("store operation failed: {0}")]
    Operation(String),
}

/// Shared expiring key-value store.
///
/// The authoritative copy of every expiring entry lives here; in-process
/// caches in front of it are read-through optimizations only.
#[async_trait]
pub trait SharedStore: Send + Sync {
    /// Set `key` to `value`, expiring after `ttl_ms` milliseconds.
    async fn set_with_ttl(&self, key: &str, value: &str, ttl_ms: u64) -> Result<(), StoreError>;

    /// Get the value at `key`, if present and unexpired.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Atomically read and delete the value at `key`.
    ///
    /// This is the single-use primitive behind ticket redemption: two
    /// concurrent redeemers cannot both observe the value.
    async fn get_del(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Delete the value at `key`, if present.
    async fn del(&self, key: &str) -> Result<(), StoreError>;
}

/// A message received from a subscribed bus channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    /// The channel the message arrived on.
    pub channel: String,
    /// The payload, verbatim as published.
    pub payload: String,
}

/// Receiving half handed out when a bus is constructed.
pub type BusReceiver = mpsc::UnboundedReceiver<BusMessage>;

/// Shared broadcast bus.
///
/// Messages published to a subscribed channel arrive on the
/// [`BusReceiver`] returned at construction time. Delivery is
/// best-effort and at-most-once; there is no acknowledgement.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Publish `payload` to `channel`.
    async fn publish(&self, channel: &str, payload: &str) -> Result<(), StoreError>;

    /// Start receiving messages published to `channel`.
    async fn subscribe(&self, channel: &str) -> Result<(), StoreError>;

    /// Stop receiving messages published to `channel`.
    async fn unsubscribe(&self, channel: &str) -> Result<(), StoreError>;
}
