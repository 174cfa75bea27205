//! Per-user edit rate limiting.
//!
//! The authoritative expiry lives in the shared store, with a TTL
//! slightly longer than the cooldown window to absorb clock skew between
//! instances. A local cache keyed by user fronts the store on the hot
//! path; it self-evicts lazily on read and a periodic sweep bounds its
//! memory. The cache is never a source of truth when an entry is absent.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::debug;
use wordwire_store::{SharedStore, StoreError};

/// Default cooldown window.
pub const DEFAULT_COOLDOWN_MS: u64 = 30_000;

/// Extra TTL on the shared entry beyond the cooldown window.
const STORE_TTL_SLACK_MS: u64 = 1_000;

/// Interval of the local-cache sweep.
pub const SWEEP_INTERVAL: Duration = Duration::from_millis(500);

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Which operation a cooldown applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CooldownKind {
    /// Word edits.
    #[default]
    Edit,
    /// Hover previews.
    Hover,
}

impl CooldownKind {
    fn as_str(self) -> &'static str {
        match self {
            CooldownKind::Edit => "edit",
            CooldownKind::Hover => "hover",
        }
    }
}

/// Rate limiter for edit operations, shared-store-backed with a local
/// read-through cache.
pub struct CooldownTracker {
    store: Arc<dyn SharedStore>,
    /// Expiry timestamps (epoch ms) per store key.
    local: DashMap<String, u64>,
    duration_ms: u64,
}

impl CooldownTracker {
    /// Create a tracker with the given cooldown window.
    #[must_use]
    pub fn new(store: Arc<dyn SharedStore>, duration_ms: u64) -> Self {
        Self {
            store,
            local: DashMap::new(),
            duration_ms,
        }
    }

    fn key(kind: CooldownKind, user_id: &str) -> String {
        format!("cooldown:{}:{}", kind.as_str(), user_id)
    }

    /// Arm the configured cooldown for a user.
    pub async fn add_cooldown(&self, user_id: &str, kind: CooldownKind) -> Result<(), StoreError> {
        self.add_cooldown_for(user_id, kind, self.duration_ms).await
    }

    /// Arm a cooldown of a specific duration.
    pub async fn add_cooldown_for(
        &self,
        user_id: &str,
        kind: CooldownKind,
        duration_ms: u64,
    ) -> Result<(), StoreError> {
        let key = Self::key(kind, user_id);
        let expires_at = now_ms() + duration_ms;
        self.store
            .set_with_ttl(
                &key,
                &expires_at.to_string(),
                duration_ms + STORE_TTL_SLACK_MS,
            )
            .await?;
        self.local.insert(key, expires_at);
        debug!(user = %user_id, kind = kind.as_str(), duration_ms, "Cooldown armed");
        Ok(())
    }

    /// Milliseconds until the user's cooldown expires; 0 when not on
    /// cooldown.
    pub async fn remaining_ms(
        &self,
        user_id: &str,
        kind: CooldownKind,
    ) -> Result<u64, StoreError> {
        let key = Self::key(kind, user_id);
        let now = now_ms();

        if let Some(expires_at) = self.local.get(&key).map(|e| *e) {
            if expires_at > now {
                return Ok(expires_at - now);
            }
            self.local.remove(&key);
        }

        let Some(raw) = self.store.get(&key).await? else {
            return Ok(0);
        };
        let expires_at = raw.parse::<u64>().unwrap_or(0);
        if expires_at > now {
            self.local.insert(key, expires_at);
            Ok(expires_at - now)
        } else {
            Ok(0)
        }
    }

    /// Whether the user is currently rate limited.
    pub async fn is_on_cooldown(
        &self,
        user_id: &str,
        kind: CooldownKind,
    ) -> Result<bool, StoreError> {
        Ok(self.remaining_ms(user_id, kind).await? > 0)
    }

    /// Lift a user's cooldown early.
    pub async fn clear_cooldown(
        &self,
        user_id: &str,
        kind: CooldownKind,
    ) -> Result<(), StoreError> {
        let key = Self::key(kind, user_id);
        self.local.remove(&key);
        self.store.del(&key).await
    }

    /// Drop expired local-cache entries.
    pub fn sweep(&self) {
        let now = now_ms();
        self.local.retain(|_, expires_at| *expires_at > now);
    }

    /// Number of live local-cache entries.
    #[must_use]
    pub fn cached_entries(&self) -> usize {
        self.local.len()
    }
}

/// Sweep the tracker's local cache forever. Spawn once per tracker.
pub async fn run_sweeper(tracker: Arc<CooldownTracker>) {
    let mut interval = tokio::time::interval(SWEEP_INTERVAL);
    loop {
        interval.tick().await;
        tracker.sweep();
    }
}
