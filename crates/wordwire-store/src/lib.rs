//! # wordwire-store
//!
//! Shared-infrastructure seam for the Wordwire realtime layer.
//!
//! Cross-instance state lives behind two traits:
//!
//! - **SharedStore** - expiring key-value store (cooldown expiries,
//!   one-shot connection tickets)
//! - **MessageBus** - broadcast bus with per-channel subscriptions
//!   (per-article update fan-out)
//!
//! The Redis implementations are the production path; the in-memory
//! implementations back tests and single-node deployments. In-memory
//! state is per-process, so multi-instance correctness requires Redis.

pub mod memory;
pub mod redis;
pub mod traits;

pub use memory::{MemoryBus, MemoryStore};
pub use redis::{RedisBus, RedisStore};
pub use traits::{BusMessage, BusReceiver, MessageBus, SharedStore, StoreError};
