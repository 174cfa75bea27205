//! # wordwire-core
//!
//! Core services for the Wordwire realtime layer.
//!
//! This crate provides the per-instance building blocks:
//!
//! - **Presence** - Which users view which articles, with editor
//!   exclusivity
//! - **Cooldown** - Per-user edit rate limiting over the shared store
//! - **Session** - One-shot ticket issue/redeem for connection auth
//! - **Articles** - Read-only client for the article-metadata
//!   collaborator
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌──────────────────┐     ┌─────────────┐
//! │  Connection │────▶│ PresenceRegistry │────▶│ MessageBus  │
//! └─────────────┘     └──────────────────┘     └─────────────┘
//!        │                                            │
//!        ▼                                            ▼
//! ┌─────────────┐                             ┌─────────────┐
//! │  Cooldowns  │────────────────────────────▶│ SharedStore │
//! └─────────────┘                             └─────────────┘
//! ```
//!
//! Registry state is strictly per-instance; everything cross-instance
//! goes through `wordwire-store`.

pub mod articles;
pub mod cooldown;
pub mod presence;
pub mod session;

pub use articles::{ArticleDirectory, ArticleInfo, DirectoryError};
pub use cooldown::{CooldownKind, CooldownTracker, DEFAULT_COOLDOWN_MS};
pub use presence::{
    BusDirective, ConnectionHandle, ConnectionKind, Outbound, OutboundReceiver, OutboundSender,
    PresenceRegistry,
};
pub use session::{SessionInfo, TicketExchange, TICKET_TTL_MS};
