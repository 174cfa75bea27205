//! Redis-backed store and bus.
//!
//! The store rides a multiplexed [`ConnectionManager`], which reconnects
//! on its own. The bus holds a dedicated pub/sub connection split into a
//! sink (subscribe/unsubscribe) and a stream that a background task
//! pumps into the receiver handed out at connect time.

use crate::traits::{BusMessage, BusReceiver, MessageBus, SharedStore, StoreError};
use async_trait::async_trait;
use futures_util::StreamExt;
use redis::aio::{ConnectionManager, PubSubSink};
use redis::{AsyncCommands, Client};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_connection_refusal() || err.is_connection_dropped() || err.is_timeout() {
            StoreError::Unavailable(err.to_string())
        } else {
            StoreError::Operation(err.to_string())
        }
    }
}

/// Expiring key-value store on Redis.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    /// Connect to the Redis instance at `url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the connection fails.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = Client::open(url)?;
        let conn = client.get_connection_manager().await?;
        debug!("Redis store connected");
        Ok(Self { conn })
    }
}

#[async_trait]
impl SharedStore for RedisStore {
    async fn set_with_ttl(&self, key: &str, value: &str, ttl_ms: u64) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(ttl_ms)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        Ok(conn.get(key).await?)
    }

    async fn get_del(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = redis::cmd("GETDEL").arg(key).query_async(&mut conn).await?;
        Ok(value)
    }

    async fn del(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(key).await?;
        Ok(())
    }
}

/// Broadcast bus on Redis pub/sub.
pub struct RedisBus {
    publish_conn: ConnectionManager,
    sink: Mutex<PubSubSink>,
}

impl RedisBus {
    /// Connect to the Redis instance at `url`.
    ///
    /// Returns the bus and the receiver its subscriptions feed. The
    /// pump task ends when either side of the connection goes away.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or a connection fails.
    pub async fn connect(url: &str) -> Result<(Self, BusReceiver), StoreError> {
        let client = Client::open(url)?;
        let publish_conn = client.get_connection_manager().await?;
        let pubsub = client.get_async_pubsub().await?;
        let (sink, mut stream) = pubsub.split();

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Some(msg) = stream.next().await {
                let channel = msg.get_channel_name().to_string();
                match msg.get_payload::<String>() {
                    Ok(payload) => {
                        if tx.send(BusMessage { channel, payload }).is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        warn!(channel = %channel, error = %err, "Undecodable bus payload");
                    }
                }
            }
            debug!("Redis bus stream ended");
        });

        debug!("Redis bus connected");
        Ok((
            Self {
                publish_conn,
                sink: Mutex::new(sink),
            },
            rx,
        ))
    }
}

#[async_trait]
impl MessageBus for RedisBus {
    async fn publish(&self, channel: &str, payload: &str) -> Result<(), StoreError> {
        let mut conn = self.publish_conn.clone();
        let _: () = conn.publish(channel, payload).await?;
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<(), StoreError> {
        self.sink.lock().await.subscribe(channel).await?;
        Ok(())
    }

    async fn unsubscribe(&self, channel: &str) -> Result<(), StoreError> {
        self.sink.lock().await.unsubscribe(channel).await?;
        Ok(())
    }
}
