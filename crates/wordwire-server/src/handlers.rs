//! Connection handlers for the Wordwire server.
//!
//! The per-connection lifecycle: redeem the upgrade ticket, fix the
//! role, then exchange JSON text frames until the peer goes away or the
//! heartbeat sweep declares it dead. All realtime semantics live in
//! [`dispatch`]; the socket loop only moves frames.

use crate::bridge;
use crate::config::Config;
use crate::metrics::{self, ConnectionMetricsGuard};
use anyhow::Result;
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use futures_util::future::join_all;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use wordwire_core::cooldown::{self, CooldownKind, CooldownTracker};
use wordwire_core::{
    ArticleDirectory, ConnectionHandle, ConnectionKind, Outbound, PresenceRegistry, SessionInfo,
    TicketExchange,
};
use wordwire_protocol::{
    decode_client, encode_server, ActiveArticle, ClientMessage, ErrorCode, ServerMessage,
    WordHoverData,
};
use wordwire_store::{MemoryBus, MemoryStore, MessageBus, RedisBus, RedisStore, SharedStore};
use wordwire_text::{is_valid_token, ModerationFilter};

/// Shared server state.
pub struct AppState {
    /// Per-instance presence registry. Never held across an await.
    pub presence: Mutex<PresenceRegistry>,
    /// The shared broadcast bus.
    pub bus: Arc<dyn MessageBus>,
    /// One-shot connection tickets.
    pub tickets: TicketExchange,
    /// Per-user edit rate limiter.
    pub cooldowns: Arc<CooldownTracker>,
    /// Article-metadata collaborator client.
    pub articles: ArticleDirectory,
    /// Denylist filter for replacement tokens.
    pub filter: ModerationFilter,
    /// Server configuration.
    pub config: Config,
}

impl AppState {
    /// Create new app state over the given store and bus.
    #[must_use]
    pub fn new(config: Config, store: Arc<dyn SharedStore>, bus: Arc<dyn MessageBus>) -> Self {
        Self {
            presence: Mutex::new(PresenceRegistry::new()),
            bus,
            tickets: TicketExchange::new(store.clone()),
            cooldowns: Arc::new(CooldownTracker::new(store, config.cooldown.duration_ms)),
            articles: ArticleDirectory::new(&config.site_url),
            filter: ModerationFilter::new(config.moderation.denylist.clone()),
            config,
        }
    }

    /// Lock the presence registry. A poisoned lock is recovered rather
    /// than propagated; the registry has no invariants a panicking
    /// writer could half-apply that matter more than staying up.
    pub fn presence(&self) -> MutexGuard<'_, PresenceRegistry> {
        self.presence.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Run the WebSocket server.
///
/// # Errors
///
/// Returns an error if the backing stores or the listener fail to start.
pub async fn run_server(config: Config) -> Result<()> {
    let (store, bus, bus_rx): (Arc<dyn SharedStore>, Arc<dyn MessageBus>, _) =
        match &config.redis_url {
            Some(url) => {
                let store = RedisStore::connect(url).await?;
                let (bus, rx) = RedisBus::connect(url).await?;
                (Arc::new(store), Arc::new(bus), rx)
            }
            None => {
                warn!("No Redis URL configured; using in-process store and bus (single instance only)");
                let (bus, rx) = MemoryBus::new();
                (Arc::new(MemoryStore::new()), Arc::new(bus), rx)
            }
        };

    let state = Arc::new(AppState::new(config, store, bus));

    if state.config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(state.config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    tokio::spawn(bridge::run_bridge(state.clone(), bus_rx));
    tokio::spawn(cooldown::run_sweeper(state.cooldowns.clone()));

    let app = Router::new()
        .route(&state.config.websocket_path, get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(state.clone());

    let addr = state.config.bind_addr();
    let listener = TcpListener::bind(addr).await?;

    info!("Wordwire server listening on {}", addr);
    info!(
        "WebSocket endpoint: ws://{}{}",
        addr, state.config.websocket_path
    );

    axum::serve(listener, app).await?;

    Ok(())
}

/// Health check handler.
async fn health_handler() -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

#[derive(Debug, Deserialize)]
struct ConnectParams {
    /// One-shot ticket issued by the HTTP layer.
    token: Option<String>,
    /// `editor` or (default) `viewer`.
    #[serde(rename = "type")]
    kind: Option<String>,
}

/// WebSocket upgrade handler.
///
/// The ticket rides the query string so no long-lived credential crosses
/// the realtime transport. Missing/invalid/expired tickets get 401,
/// banned users 403, store failures 500.
async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let Some(token) = params.token else {
        return (StatusCode::UNAUTHORIZED, "authentication required").into_response();
    };

    let session = match state.tickets.redeem(&token).await {
        Ok(Some(session)) => session,
        Ok(None) => {
            return (StatusCode::UNAUTHORIZED, "invalid or expired ticket").into_response();
        }
        Err(err) => {
            error!(error = %err, "Ticket redemption failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, "upgrade failed").into_response();
        }
    };

    if session.is_banned {
        return (StatusCode::FORBIDDEN, "user is banned").into_response();
    }

    let kind = ConnectionKind::from_query(params.kind.as_deref());
    ws.on_upgrade(move |socket| handle_socket(socket, state, Arc::new(session), kind))
}

/// Drive one WebSocket connection to completion.
async fn handle_socket(
    socket: WebSocket,
    state: Arc<AppState>,
    session: Arc<SessionInfo>,
    kind: ConnectionKind,
) {
    let _metrics_guard = ConnectionMetricsGuard::new();

    let connection_id = format!("conn_{}", Uuid::new_v4().simple());
    let (tx, mut outbound_rx) = mpsc::unbounded_channel();
    let handle = ConnectionHandle::new(connection_id.clone(), session, kind, tx);

    debug!(connection = %connection_id, user = %handle.user_id(), ?kind, "WebSocket connected");

    if kind == ConnectionKind::Editor {
        state.presence().claim_editor(&handle);
    }

    let (mut sender, mut receiver) = socket.split();

    let mut ping_interval =
        tokio::time::interval(Duration::from_millis(state.config.heartbeat.interval_ms));
    // The first tick completes immediately; a ping at connect time is noise.
    ping_interval.tick().await;
    let idle_cutoff = Duration::from_millis(state.config.heartbeat.timeout_ms);
    let mut last_activity = Instant::now();

    loop {
        tokio::select! {
            biased;

            Some(out) = outbound_rx.recv() => {
                match out {
                    Outbound::Raw(payload) => {
                        metrics::record_message(payload.len(), "outbound");
                        if sender.send(Message::Text(payload)).await.is_err() {
                            break;
                        }
                    }
                    Outbound::Envelope(msg) => match encode_server(&msg) {
                        Ok(payload) => {
                            metrics::record_message(payload.len(), "outbound");
                            if sender.send(Message::Text(payload)).await.is_err() {
                                break;
                            }
                        }
                        Err(err) => {
                            warn!(connection = %connection_id, error = %err, "Failed to encode envelope");
                        }
                    },
                    Outbound::Close { code, reason } => {
                        let _ = sender
                            .send(Message::Close(Some(CloseFrame {
                                code,
                                reason: reason.into(),
                            })))
                            .await;
                        break;
                    }
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        last_activity = Instant::now();
                        metrics::record_message(text.len(), "inbound");
                        let start = Instant::now();
                        if let Some(msg) = decode_client(&text) {
                            dispatch(&state, &handle, msg).await;
                        }
                        // Oversized, malformed, and unknown-type frames
                        // fall through without a reply.
                        metrics::record_latency(start.elapsed().as_secs_f64());
                    }
                    Some(Ok(Message::Ping(data))) => {
                        last_activity = Instant::now();
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        last_activity = Instant::now();
                    }
                    Some(Ok(Message::Binary(_))) => {
                        // Text protocol only; binary frames count as
                        // liveness and nothing else.
                        last_activity = Instant::now();
                    }
                    Some(Ok(Message::Close(_))) => {
                        debug!(connection = %connection_id, "Received close frame");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(connection = %connection_id, error = %e, "WebSocket error");
                        metrics::record_error("websocket");
                        break;
                    }
                    None => {
                        debug!(connection = %connection_id, "WebSocket stream ended");
                        break;
                    }
                }
            }

            _ = ping_interval.tick() => {
                if last_activity.elapsed() > idle_cutoff {
                    debug!(connection = %connection_id, "Idle connection terminated");
                    break;
                }
                match encode_server(&ServerMessage::Ping) {
                    Ok(payload) => {
                        if sender.send(Message::Text(payload)).await.is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        warn!(connection = %connection_id, error = %err, "Failed to encode ping");
                    }
                }
            }
        }
    }

    let directives = state.presence().leave(&handle);
    bridge::apply_directives(&state, directives).await;
    metrics::set_active_articles(state.presence().active_articles().len());

    debug!(connection = %connection_id, "WebSocket disconnected");
}

/// Apply one decoded client message to the shared state.
async fn dispatch(state: &Arc<AppState>, handle: &ConnectionHandle, msg: ClientMessage) {
    match msg {
        ClientMessage::SetArticle { article } => {
            let directives = state.presence().join(handle, &article.id);
            bridge::apply_directives(state, directives).await;
            metrics::set_active_articles(state.presence().active_articles().len());
        }

        ClientMessage::GetActiveArticles => {
            handle_get_active_articles(state, handle).await;
        }

        ClientMessage::WordHover {
            word_index,
            new_word,
        } => {
            handle_word_hover(state, handle, word_index, new_word).await;
        }

        ClientMessage::WordLeave { word_index } => {
            handle_word_leave(state, handle, word_index).await;
        }

        ClientMessage::Pong => {
            // Liveness is tracked at the socket loop for any inbound frame.
        }
    }
}

/// Answer `get_active_articles` from the presence snapshot, resolving
/// titles/slugs against the collaborator. A failed lookup excludes that
/// article instead of failing the reply.
async fn handle_get_active_articles(state: &Arc<AppState>, handle: &ConnectionHandle) {
    let snapshot = state.presence().active_articles();

    let lookups = snapshot.into_iter().map(|(article_id, active_users)| {
        let articles = state.articles.clone();
        async move {
            match articles.fetch(&article_id).await {
                Ok(info) => Some(ActiveArticle {
                    title: info.title,
                    slug: info.slug,
                    active_users,
                }),
                Err(err) => {
                    warn!(article = %article_id, error = %err, "Active-article lookup failed; skipping");
                    None
                }
            }
        }
    });

    let articles: Vec<ActiveArticle> = join_all(lookups).await.into_iter().flatten().collect();
    handle.send_envelope(ServerMessage::ActiveArticles(articles));
}

/// Validate a hover preview, rate limit it, and publish it to the
/// article's channel. Broadcast only; nothing is persisted here.
async fn handle_word_hover(
    state: &Arc<AppState>,
    handle: &ConnectionHandle,
    word_index: usize,
    new_word: String,
) {
    let Some(article_id) = state.presence().article_of(&handle.id).map(str::to_string) else {
        debug!(connection = %handle.id, "word_hover before set_article; dropped");
        return;
    };

    if !is_valid_token(&new_word) || state.filter.is_disallowed(&new_word) {
        metrics::record_rejected_edit("invalid_word");
        handle.send_envelope(ServerMessage::error(ErrorCode::InvalidWord, "Invalid word"));
        return;
    }

    match state
        .cooldowns
        .remaining_ms(handle.user_id(), CooldownKind::Edit)
        .await
    {
        Ok(0) => {}
        Ok(remaining) => {
            metrics::record_rejected_edit("cooldown");
            handle.send_envelope(ServerMessage::cooldown_error(remaining));
            return;
        }
        Err(err) => {
            // Fail open: throttling is a courtesy, not an auth boundary.
            warn!(error = %err, "Cooldown check failed; allowing edit");
        }
    }

    let hover = ServerMessage::WordHover(WordHoverData {
        new_word,
        word_index,
        editor_id: handle.user_id().to_string(),
        editor_name: handle.session.name.clone(),
        editor_image: handle.session.image.clone(),
    });

    if publish_to_article(state, handle, &article_id, &hover).await {
        if let Err(err) = state
            .cooldowns
            .add_cooldown(handle.user_id(), CooldownKind::Edit)
            .await
        {
            warn!(error = %err, "Failed to arm cooldown");
        }
    }
}

/// Tell the article's viewers the editor stopped hovering a token.
async fn handle_word_leave(state: &Arc<AppState>, handle: &ConnectionHandle, word_index: usize) {
    let Some(article_id) = state.presence().article_of(&handle.id).map(str::to_string) else {
        return;
    };

    let msg = ServerMessage::WordLeave {
        word_index,
        editor_id: handle.user_id().to_string(),
    };
    publish_to_article(state, handle, &article_id, &msg).await;
}

/// Publish an envelope to an article's channel. On failure the sender
/// gets a typed error and the connection stays open; there is no retry.
async fn publish_to_article(
    state: &Arc<AppState>,
    handle: &ConnectionHandle,
    article_id: &str,
    msg: &ServerMessage,
) -> bool {
    let payload = match encode_server(msg) {
        Ok(payload) => payload,
        Err(err) => {
            warn!(article = %article_id, error = %err, "Failed to encode broadcast");
            return false;
        }
    };

    match state
        .bus
        .publish(&wordwire_protocol::update_channel(article_id), &payload)
        .await
    {
        Ok(()) => {
            metrics::record_broadcast();
            true
        }
        Err(err) => {
            warn!(article = %article_id, error = %err, "Broadcast publish failed");
            metrics::record_error("publish");
            handle.send_envelope(ServerMessage::error(
                ErrorCode::BroadcastFailed,
                "Broadcast failed",
            ));
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wordwire_core::OutboundReceiver;
    use wordwire_protocol::ArticleRef;

    fn test_state(cooldown_ms: u64) -> (Arc<AppState>, wordwire_store::BusReceiver) {
        let config = Config {
            cooldown: crate::config::CooldownConfig {
                duration_ms: cooldown_ms,
            },
            moderation: crate::config::ModerationConfig {
                denylist: vec!["badword".into()],
            },
            ..Config::default()
        };
        let (bus, rx) = MemoryBus::new();
        let state = Arc::new(AppState::new(
            config,
            Arc::new(MemoryStore::new()),
            Arc::new(bus),
        ));
        (state, rx)
    }

    fn test_handle(id: &str, user: &str, kind: ConnectionKind) -> (ConnectionHandle, OutboundReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let session = Arc::new(SessionInfo {
            user_id: user.to_string(),
            is_banned: false,
            name: user.to_uppercase(),
            image: None,
        });
        (ConnectionHandle::new(id, session, kind, tx), rx)
    }

    async fn join(state: &Arc<AppState>, conn: &ConnectionHandle, article: &str) {
        dispatch(
            state,
            conn,
            ClientMessage::SetArticle {
                article: ArticleRef { id: article.into() },
            },
        )
        .await;
    }

    async fn next_raw_containing(rx: &mut OutboundReceiver, needle: &str) -> String {
        tokio::time::timeout(Duration::from_secs(1), async {
            loop {
                match rx.recv().await {
                    Some(Outbound::Raw(payload)) if payload.contains(needle) => return payload,
                    Some(_) => continue,
                    None => panic!("connection queue closed"),
                }
            }
        })
        .await
        .expect("timed out waiting for broadcast")
    }

    async fn next_error(rx: &mut OutboundReceiver) -> wordwire_protocol::ErrorData {
        tokio::time::timeout(Duration::from_secs(1), async {
            loop {
                match rx.recv().await {
                    Some(Outbound::Envelope(ServerMessage::Error(data))) => return data,
                    Some(_) => continue,
                    None => panic!("connection queue closed"),
                }
            }
        })
        .await
        .expect("timed out waiting for error")
    }

    #[tokio::test]
    async fn test_end_to_end_hover_then_cooldown() {
        let (state, bus_rx) = test_state(30_000);
        tokio::spawn(bridge::run_bridge(state.clone(), bus_rx));

        let (viewer, mut viewer_rx) = test_handle("c1", "viewer1", ConnectionKind::Viewer);
        let (editor, mut editor_rx) = test_handle("c2", "editor1", ConnectionKind::Editor);

        join(&state, &viewer, "x").await;
        let count = next_raw_containing(&mut viewer_rx, "active_users_update").await;
        assert!(count.contains("\"count\":1"));

        join(&state, &editor, "x").await;
        let count = next_raw_containing(&mut viewer_rx, "active_users_update").await;
        assert!(count.contains("\"count\":2"));

        dispatch(
            &state,
            &editor,
            ClientMessage::WordHover {
                word_index: 3,
                new_word: "**foo**".into(),
            },
        )
        .await;

        let hover = next_raw_containing(&mut viewer_rx, "word_hover").await;
        assert!(hover.contains("\"newWord\":\"**foo**\""));
        assert!(hover.contains("\"wordIndex\":3"));
        assert!(hover.contains("\"editorId\":\"editor1\""));

        // Immediately resending trips the cooldown; only the sender hears
        // about it.
        dispatch(
            &state,
            &editor,
            ClientMessage::WordHover {
                word_index: 3,
                new_word: "**foo**".into(),
            },
        )
        .await;
        let err = next_error(&mut editor_rx).await;
        assert_eq!(err.code, ErrorCode::Cooldown);
        assert!(err.remaining_time.unwrap() > 0);
    }

    #[tokio::test]
    async fn test_invalid_word_rejected_to_sender_only() {
        let (state, _bus_rx) = test_state(30_000);
        let (editor, mut editor_rx) = test_handle("c1", "editor1", ConnectionKind::Editor);

        join(&state, &editor, "x").await;
        dispatch(
            &state,
            &editor,
            ClientMessage::WordHover {
                word_index: 0,
                new_word: "not a word".into(),
            },
        )
        .await;

        let err = next_error(&mut editor_rx).await;
        assert_eq!(err.code, ErrorCode::InvalidWord);
    }

    #[tokio::test]
    async fn test_moderated_word_rejected() {
        let (state, _bus_rx) = test_state(30_000);
        let (editor, mut editor_rx) = test_handle("c1", "editor1", ConnectionKind::Editor);

        join(&state, &editor, "x").await;
        dispatch(
            &state,
            &editor,
            ClientMessage::WordHover {
                word_index: 0,
                new_word: "badword".into(),
            },
        )
        .await;

        let err = next_error(&mut editor_rx).await;
        assert_eq!(err.code, ErrorCode::InvalidWord);
    }

    #[tokio::test]
    async fn test_hover_without_article_is_dropped() {
        let (state, bus_rx) = test_state(30_000);
        tokio::spawn(bridge::run_bridge(state.clone(), bus_rx));
        let (editor, mut editor_rx) = test_handle("c1", "editor1", ConnectionKind::Editor);

        dispatch(
            &state,
            &editor,
            ClientMessage::WordHover {
                word_index: 0,
                new_word: "hello".into(),
            },
        )
        .await;

        assert!(editor_rx.try_recv().is_err());
        assert!(!state
            .cooldowns
            .is_on_cooldown("editor1", CooldownKind::Edit)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_word_leave_reaches_other_viewers() {
        let (state, bus_rx) = test_state(30_000);
        tokio::spawn(bridge::run_bridge(state.clone(), bus_rx));

        let (viewer, mut viewer_rx) = test_handle("c1", "viewer1", ConnectionKind::Viewer);
        let (editor, _editor_rx) = test_handle("c2", "editor1", ConnectionKind::Editor);
        join(&state, &viewer, "x").await;
        join(&state, &editor, "x").await;

        dispatch(&state, &editor, ClientMessage::WordLeave { word_index: 7 }).await;

        let leave = next_raw_containing(&mut viewer_rx, "word_leave").await;
        assert!(leave.contains("\"wordIndex\":7"));
        assert!(leave.contains("\"editorId\":\"editor1\""));
    }

    #[tokio::test]
    async fn test_active_articles_empty_without_viewers() {
        let (state, _bus_rx) = test_state(30_000);
        let (conn, mut rx) = test_handle("c1", "u1", ConnectionKind::Viewer);

        dispatch(&state, &conn, ClientMessage::GetActiveArticles).await;

        match tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap()
        {
            Outbound::Envelope(ServerMessage::ActiveArticles(articles)) => {
                assert!(articles.is_empty());
            }
            other => panic!("unexpected outbound: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_leave_unsubscribes_empty_article() {
        let (state, _bus_rx) = test_state(30_000);
        let (conn, _rx) = test_handle("c1", "u1", ConnectionKind::Viewer);

        join(&state, &conn, "x").await;
        let directives = state.presence().leave(&conn);
        bridge::apply_directives(&state, directives).await;
        assert!(state.presence().active_articles().is_empty());
    }
}
