//! Per-article presence tracking and editor exclusivity.
//!
//! The registry is a plain data structure with a `&mut` API; the server
//! wraps it in a mutex and never holds that lock across an await. Bus
//! side effects (subscribe/unsubscribe) are returned as directives and
//! executed by the caller outside the lock, while count updates and
//! disconnect notices go out synchronously through the per-connection
//! mpsc handles, which never block.

use crate::session::SessionInfo;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use wordwire_protocol::{
    encode_server, ServerMessage, CLOSE_SUPERSEDED, CLOSE_SUPERSEDED_REASON,
};

/// Unique connection identifier.
pub type ConnectionId = String;

/// Opaque article identifier.
pub type ArticleId = String;

/// Connection role, fixed at connect time from the upgrade query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionKind {
    /// Watches broadcasts only.
    #[default]
    Viewer,
    /// May preview word replacements; one live editor connection per user.
    Editor,
}

impl ConnectionKind {
    /// Parse the `type` query parameter; anything but `editor` is a viewer.
    #[must_use]
    pub fn from_query(value: Option<&str>) -> Self {
        if value == Some("editor") {
            ConnectionKind::Editor
        } else {
            ConnectionKind::Viewer
        }
    }
}

/// A bus operation the caller must perform after a presence mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusDirective {
    /// Start receiving the article's broadcast channel.
    Subscribe(ArticleId),
    /// Stop receiving the article's broadcast channel.
    Unsubscribe(ArticleId),
}

/// Outbound traffic for one connection.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// A typed envelope, serialized at the socket.
    Envelope(ServerMessage),
    /// A pre-serialized payload, delivered verbatim.
    Raw(String),
    /// Close the socket with an application close code.
    Close { code: u16, reason: &'static str },
}

/// Sending half of a connection's outbound queue.
pub type OutboundSender = mpsc::UnboundedSender<Outbound>;

/// Receiving half of a connection's outbound queue, drained by its
/// socket task.
pub type OutboundReceiver = mpsc::UnboundedReceiver<Outbound>;

/// Cheap, cloneable handle through which the registry reaches a live
/// connection.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    /// Unique connection id.
    pub id: ConnectionId,
    /// The authenticated identity behind this connection.
    pub session: Arc<SessionInfo>,
    /// Role fixed at connect time.
    pub kind: ConnectionKind,
    tx: OutboundSender,
}

impl ConnectionHandle {
    /// Create a handle over a connection's outbound queue.
    #[must_use]
    pub fn new(
        id: impl Into<ConnectionId>,
        session: Arc<SessionInfo>,
        kind: ConnectionKind,
        tx: OutboundSender,
    ) -> Self {
        Self {
            id: id.into(),
            session,
            kind,
            tx,
        }
    }

    /// The user behind this connection.
    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.session.user_id
    }

    /// Queue outbound traffic. Fire-and-forget: a connection whose
    /// socket task is already gone simply drops the message.
    pub fn send(&self, out: Outbound) -> bool {
        self.tx.send(out).is_ok()
    }

    /// Queue a typed envelope.
    pub fn send_envelope(&self, msg: ServerMessage) -> bool {
        self.send(Outbound::Envelope(msg))
    }

    /// Ask the socket task to close with an application close code.
    pub fn close(&self, code: u16, reason: &'static str) {
        self.send(Outbound::Close { code, reason });
    }
}

struct ConnEntry {
    handle: ConnectionHandle,
    article: ArticleId,
}

/// Which users view which articles, which connections belong to which
/// user, and who holds each editor slot.
///
/// Invariant: an article has an entry in `article_users` iff at least
/// one connection is bound to it, and the caller keeps a bus
/// subscription active for exactly those articles.
#[derive(Default)]
pub struct PresenceRegistry {
    /// All article-bound connections.
    conns: HashMap<ConnectionId, ConnEntry>,
    /// Distinct viewers per article, one entry per user across tabs.
    article_users: HashMap<ArticleId, HashSet<String>>,
    /// Live connections per user.
    user_conns: HashMap<String, HashSet<ConnectionId>>,
    /// The single permitted editor connection per user.
    editors: HashMap<String, ConnectionHandle>,
}

impl PresenceRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handle` as its user's editor connection, forcibly
    /// closing any previous editor connection for the same user before
    /// the new one proceeds.
    pub fn claim_editor(&mut self, handle: &ConnectionHandle) {
        if let Some(previous) = self
            .editors
            .insert(handle.user_id().to_string(), handle.clone())
        {
            if previous.id != handle.id {
                debug!(user = %handle.user_id(), superseded = %previous.id, "Editor takeover");
                previous.close(CLOSE_SUPERSEDED, CLOSE_SUPERSEDED_REASON);
            }
        }
    }

    /// Bind a connection to an article, leaving any previous article
    /// first. Returns the bus directives to execute outside the lock.
    pub fn join(&mut self, handle: &ConnectionHandle, article_id: &str) -> Vec<BusDirective> {
        let mut directives = Vec::new();

        match self.conns.get(&handle.id).map(|e| e.article.clone()) {
            Some(previous) if previous == article_id => return directives,
            Some(_) => directives.extend(self.detach(&handle.id, false)),
            None => {}
        }

        let user_id = handle.user_id().to_string();
        self.conns.insert(
            handle.id.clone(),
            ConnEntry {
                handle: handle.clone(),
                article: article_id.to_string(),
            },
        );
        self.user_conns
            .entry(user_id.clone())
            .or_default()
            .insert(handle.id.clone());

        if !self.article_users.contains_key(article_id) {
            // Subscribe before counting so the first broadcast cannot
            // race past an unsubscribed channel.
            directives.push(BusDirective::Subscribe(article_id.to_string()));
        }
        let added = self
            .article_users
            .entry(article_id.to_string())
            .or_default()
            .insert(user_id);
        if added {
            self.broadcast_count(article_id);
        }

        debug!(connection = %handle.id, article = %article_id, "Presence: joined");
        directives
    }

    /// Tear down a disconnecting connection: presence bookkeeping,
    /// editor-slot release, and the `user_disconnected` notice.
    pub fn leave(&mut self, handle: &ConnectionHandle) -> Vec<BusDirective> {
        if self
            .editors
            .get(handle.user_id())
            .is_some_and(|h| h.id == handle.id)
        {
            self.editors.remove(handle.user_id());
        }
        self.detach(&handle.id, true)
    }

    fn detach(&mut self, conn_id: &str, notify_disconnect: bool) -> Vec<BusDirective> {
        let Some(entry) = self.conns.remove(conn_id) else {
            return Vec::new();
        };
        let user_id = entry.handle.user_id().to_string();
        let article_id = entry.article;

        if let Some(conns) = self.user_conns.get_mut(&user_id) {
            conns.remove(conn_id);
            if conns.is_empty() {
                self.user_conns.remove(&user_id);
            }
        }

        // Another tab of the same user may still be on this article.
        let still_watching = self.user_conns.get(&user_id).is_some_and(|conns| {
            conns
                .iter()
                .any(|id| self.conns.get(id).is_some_and(|e| e.article == article_id))
        });
        if still_watching {
            return Vec::new();
        }

        let mut directives = Vec::new();
        let removed = self
            .article_users
            .get_mut(&article_id)
            .is_some_and(|users| users.remove(&user_id));
        if removed {
            if self
                .article_users
                .get(&article_id)
                .is_some_and(HashSet::is_empty)
            {
                self.article_users.remove(&article_id);
                directives.push(BusDirective::Unsubscribe(article_id.clone()));
            }
            self.broadcast_count(&article_id);
            if notify_disconnect {
                self.broadcast_envelope(
                    &article_id,
                    ServerMessage::UserDisconnected {
                        editor_id: user_id,
                    },
                );
            }
            debug!(connection = %conn_id, article = %article_id, "Presence: left");
        }
        directives
    }

    /// The article a connection is currently bound to, if any.
    #[must_use]
    pub fn article_of(&self, conn_id: &str) -> Option<&str> {
        self.conns.get(conn_id).map(|e| e.article.as_str())
    }

    /// Number of distinct users viewing an article.
    #[must_use]
    pub fn viewer_count(&self, article_id: &str) -> usize {
        self.article_users.get(article_id).map_or(0, HashSet::len)
    }

    /// Articles with at least one viewer, with their viewer counts.
    #[must_use]
    pub fn active_articles(&self) -> Vec<(ArticleId, usize)> {
        self.article_users
            .iter()
            .filter(|(_, users)| !users.is_empty())
            .map(|(id, users)| (id.clone(), users.len()))
            .collect()
    }

    /// Deliver `payload` verbatim to every connection bound to the
    /// article. A dead connection drops its copy without affecting the
    /// others.
    pub fn broadcast_raw(&self, article_id: &str, payload: &str) {
        for entry in self.conns.values() {
            if entry.article == article_id {
                entry.handle.send(Outbound::Raw(payload.to_string()));
            }
        }
    }

    fn broadcast_envelope(&self, article_id: &str, msg: ServerMessage) {
        match encode_server(&msg) {
            Ok(payload) => self.broadcast_raw(article_id, &payload),
            Err(err) => warn!(error = %err, "Failed to encode presence broadcast"),
        }
    }

    fn broadcast_count(&self, article_id: &str) {
        self.broadcast_envelope(
            article_id,
            ServerMessage::ActiveUsersUpdate {
                count: self.viewer_count(article_id),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wordwire_protocol::decode_client;

    fn session(user: &str) -> Arc<SessionInfo> {
        Arc::new(SessionInfo {
            user_id: user.to_string(),
            is_banned: false,
            name: user.to_uppercase(),
            image: None,
        })
    }

    fn handle(
        id: &str,
        user: &str,
        kind: ConnectionKind,
    ) -> (ConnectionHandle, OutboundReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ConnectionHandle::new(id, session(user), kind, tx), rx)
    }

    fn drain(rx: &mut OutboundReceiver) -> Vec<Outbound> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    fn counts(outbound: &[Outbound]) -> Vec<usize> {
        outbound
            .iter()
            .filter_map(|o| match o {
                Outbound::Raw(payload) => {
                    serde_json::from_str::<serde_json::Value>(payload).ok()
                }
                _ => None,
            })
            .filter(|v| v["type"] == "active_users_update")
            .map(|v| v["data"]["count"].as_u64().unwrap() as usize)
            .collect()
    }

    #[test]
    fn test_first_join_subscribes_and_counts() {
        let mut registry = PresenceRegistry::new();
        let (conn, mut rx) = handle("c1", "alice", ConnectionKind::Viewer);

        let directives = registry.join(&conn, "a1");
        assert_eq!(directives, vec![BusDirective::Subscribe("a1".into())]);
        assert_eq!(counts(&drain(&mut rx)), vec![1]);
        assert_eq!(registry.viewer_count("a1"), 1);
    }

    #[test]
    fn test_two_viewers_then_both_leave() {
        let mut registry = PresenceRegistry::new();
        let (v1, mut rx1) = handle("c1", "alice", ConnectionKind::Viewer);
        let (v2, mut rx2) = handle("c2", "bob", ConnectionKind::Viewer);

        assert_eq!(
            registry.join(&v1, "a1"),
            vec![BusDirective::Subscribe("a1".into())]
        );
        assert!(registry.join(&v2, "a1").is_empty());
        assert_eq!(counts(&drain(&mut rx1)), vec![1, 2]);
        assert_eq!(counts(&drain(&mut rx2)), vec![2]);

        assert!(registry.leave(&v1).is_empty());
        assert_eq!(
            registry.leave(&v2),
            vec![BusDirective::Unsubscribe("a1".into())]
        );
        assert_eq!(registry.viewer_count("a1"), 0);
        assert!(registry.active_articles().is_empty());
    }

    #[test]
    fn test_remaining_viewer_sees_disconnect_notice() {
        let mut registry = PresenceRegistry::new();
        let (v1, _rx1) = handle("c1", "alice", ConnectionKind::Viewer);
        let (v2, mut rx2) = handle("c2", "bob", ConnectionKind::Viewer);

        registry.join(&v1, "a1");
        registry.join(&v2, "a1");
        drain(&mut rx2);

        registry.leave(&v1);
        let outbound = drain(&mut rx2);
        assert_eq!(counts(&outbound), vec![1]);
        let disconnected = outbound.iter().any(|o| matches!(
            o,
            Outbound::Raw(p) if p.contains("user_disconnected") && p.contains("alice")
        ));
        assert!(disconnected);
    }

    #[test]
    fn test_switching_articles_leaves_the_previous_one() {
        let mut registry = PresenceRegistry::new();
        let (conn, _rx) = handle("c1", "alice", ConnectionKind::Viewer);

        registry.join(&conn, "a1");
        let directives = registry.join(&conn, "a2");
        assert_eq!(
            directives,
            vec![
                BusDirective::Unsubscribe("a1".into()),
                BusDirective::Subscribe("a2".into())
            ]
        );
        assert_eq!(registry.article_of("c1"), Some("a2"));
        assert_eq!(registry.viewer_count("a1"), 0);
    }

    #[test]
    fn test_rejoining_the_same_article_is_a_noop() {
        let mut registry = PresenceRegistry::new();
        let (conn, mut rx) = handle("c1", "alice", ConnectionKind::Viewer);

        registry.join(&conn, "a1");
        drain(&mut rx);
        assert!(registry.join(&conn, "a1").is_empty());
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_multi_tab_user_counts_once() {
        let mut registry = PresenceRegistry::new();
        let (tab1, mut rx1) = handle("c1", "alice", ConnectionKind::Viewer);
        let (tab2, _rx2) = handle("c2", "alice", ConnectionKind::Viewer);

        registry.join(&tab1, "a1");
        registry.join(&tab2, "a1");
        assert_eq!(registry.viewer_count("a1"), 1);
        // Second tab added no distinct user, so no second count broadcast.
        assert_eq!(counts(&drain(&mut rx1)), vec![1]);

        // Closing one tab keeps the user present.
        assert!(registry.leave(&tab1).is_empty());
        assert_eq!(registry.viewer_count("a1"), 1);
        assert_eq!(
            registry.leave(&tab2),
            vec![BusDirective::Unsubscribe("a1".into())]
        );
    }

    #[test]
    fn test_editor_takeover_closes_previous_with_4000() {
        let mut registry = PresenceRegistry::new();
        let (first, mut rx1) = handle("c1", "alice", ConnectionKind::Editor);
        let (second, mut rx2) = handle("c2", "alice", ConnectionKind::Editor);

        registry.claim_editor(&first);
        registry.claim_editor(&second);

        let closed = drain(&mut rx1);
        assert_eq!(
            closed,
            vec![Outbound::Close {
                code: CLOSE_SUPERSEDED,
                reason: CLOSE_SUPERSEDED_REASON
            }]
        );
        assert!(drain(&mut rx2).is_empty());
    }

    #[test]
    fn test_editor_slot_released_on_leave() {
        let mut registry = PresenceRegistry::new();
        let (first, _rx1) = handle("c1", "alice", ConnectionKind::Editor);

        registry.claim_editor(&first);
        registry.join(&first, "a1");
        registry.leave(&first);

        // A later editor connection must not close the departed one.
        let (second, _rx2) = handle("c2", "alice", ConnectionKind::Editor);
        registry.claim_editor(&second);
        assert!(registry.editors.contains_key("alice"));
        assert_eq!(registry.editors["alice"].id, "c2");
    }

    #[test]
    fn test_broadcast_raw_reaches_only_the_articles_connections() {
        let mut registry = PresenceRegistry::new();
        let (v1, mut rx1) = handle("c1", "alice", ConnectionKind::Viewer);
        let (v2, mut rx2) = handle("c2", "bob", ConnectionKind::Viewer);

        registry.join(&v1, "a1");
        registry.join(&v2, "a2");
        drain(&mut rx1);
        drain(&mut rx2);

        registry.broadcast_raw("a1", r#"{"type":"word_leave"}"#);
        assert_eq!(drain(&mut rx1).len(), 1);
        assert!(drain(&mut rx2).is_empty());
    }

    #[test]
    fn test_inbound_envelope_still_parses() {
        // Guard: broadcast payloads produced here stay decodable as wire
        // frames on the client side.
        let mut registry = PresenceRegistry::new();
        let (conn, mut rx) = handle("c1", "alice", ConnectionKind::Viewer);
        registry.join(&conn, "a1");

        for out in drain(&mut rx) {
            if let Outbound::Raw(payload) = out {
                assert!(decode_client(&payload).is_none()); // server envelope, not client
                assert!(serde_json::from_str::<serde_json::Value>(&payload).is_ok());
            }
        }
    }
}
