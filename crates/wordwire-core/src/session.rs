//! One-shot connection tickets.
//!
//! The HTTP layer issues a short-lived ticket after validating a full
//! session; the realtime layer redeems it exactly once while upgrading.
//! The ticket travels in the upgrade query string so that no long-lived
//! credential ever crosses the realtime transport, and redemption
//! deletes the entry atomically so a replayed ticket finds nothing.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;
use wordwire_store::{SharedStore, StoreError};

/// Key prefix for pending tickets.
const TICKET_PREFIX: &str = "ws:";

/// How long an unredeemed ticket stays valid.
pub const TICKET_TTL_MS: u64 = 60_000;

/// Identity carried by a redeemed ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(rename = "isBanned", default)]
    pub is_banned: bool,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub image: Option<String>,
}

/// Issues and redeems one-shot tickets through the shared store.
pub struct TicketExchange {
    store: Arc<dyn SharedStore>,
}

impl TicketExchange {
    /// Create an exchange over the shared store.
    #[must_use]
    pub fn new(store: Arc<dyn SharedStore>) -> Self {
        Self { store }
    }

    /// Issue a fresh ticket for `session`.
    pub async fn issue(&self, session: &SessionInfo) -> Result<String, StoreError> {
        let ticket = Uuid::new_v4().to_string();
        let payload = serde_json::to_string(session)
            .map_err(|err| StoreError::Operation(err.to_string()))?;
        self.store
            .set_with_ttl(&format!("{TICKET_PREFIX}{ticket}"), &payload, TICKET_TTL_MS)
            .await?;
        Ok(ticket)
    }

    /// Redeem a ticket, consuming it.
    ///
    /// Expired, unknown, and already-redeemed tickets are
    /// indistinguishable: all yield `None`, and the caller refuses the
    /// upgrade.
    pub async fn redeem(&self, ticket: &str) -> Result<Option<SessionInfo>, StoreError> {
        let Some(payload) = self
            .store
            .get_del(&format!("{TICKET_PREFIX}{ticket}"))
            .await?
        else {
            return Ok(None);
        };

        match serde_json::from_str(&payload) {
            Ok(session) => Ok(Some(session)),
            Err(err) => {
                warn!(error = %err, "Undecodable ticket payload");
                Ok(None)
            }
        }
    }
}
