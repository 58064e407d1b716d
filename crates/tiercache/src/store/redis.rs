//! Redis-backed store over a reconnecting connection manager
//!
//! A connection-level failure marks the store not ready, so calls fail fast
//! with `BackendNotReady` instead of each waiting for the deadline. A
//! background task then pings with backoff until the manager has
//! reconnected and flips readiness back.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use ::redis::{aio::ConnectionManager, Client, Cmd, FromRedisValue, RedisError, RedisResult};
use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use super::{KeyValueStore, ScanPage};
use crate::{CacheError, Result};

/// Called once per connection-level failure.
pub type ConnectionErrorListener = Arc<dyn Fn(&CacheError) + Send + Sync>;

const RECONNECT_INITIAL_DELAY: Duration = Duration::from_millis(100);
const RECONNECT_MAX_DELAY: Duration = Duration::from_secs(5);

/// [`KeyValueStore`] speaking to a Redis-compatible server.
pub struct RedisStore {
    conn: ConnectionManager,
    ready: Arc<AtomicBool>,
    reconnecting: Arc<AtomicBool>,
    listener: RwLock<Option<ConnectionErrorListener>>,
}

impl RedisStore {
    /// Open a connection to `url` and verify it with `PING`.
    pub async fn connect(url: &str, connect_timeout: Duration) -> Result<Self> {
        let client = Client::open(url)
            .map_err(|e| CacheError::invalid_config(format!("invalid Redis URL: {e}")))?;

        let connecting = client.get_connection_manager();
        let connected = if connect_timeout.is_zero() {
            connecting.await
        } else {
            tokio::time::timeout(connect_timeout, connecting)
                .await
                .map_err(|_| CacheError::OperationTimeout {
                    operation: "CONNECT",
                    timeout_ms: connect_timeout.as_millis() as u64,
                })?
        };
        let mut conn = connected
            .map_err(|e| CacheError::not_ready(format!("failed to connect to Redis: {e}")))?;

        let pong: String = ::redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::not_ready(format!("Redis ping failed: {e}")))?;
        info!(reply = %pong, "Redis store connected");

        Ok(Self {
            conn,
            ready: Arc::new(AtomicBool::new(true)),
            reconnecting: Arc::new(AtomicBool::new(false)),
            listener: RwLock::new(None),
        })
    }

    /// Register a callback fired when the connection breaks.
    pub fn on_connection_error(&self, listener: ConnectionErrorListener) {
        *self.listener.write() = Some(listener);
    }

    async fn query<T: FromRedisValue>(&self, cmd: &Cmd) -> Result<T> {
        let mut conn = self.conn.clone();
        cmd.query_async(&mut conn)
            .await
            .map_err(|e| self.map_error(e))
    }

    fn map_error(&self, err: RedisError) -> CacheError {
        if err.is_connection_dropped() || err.is_connection_refusal() || err.is_io_error() {
            self.ready.store(false, Ordering::SeqCst);
            let error = CacheError::not_ready(format!("Redis connection lost: {err}"));
            warn!(error = %err, "Redis connection error");
            if let Some(listener) = self.listener.read().as_ref() {
                listener(&error);
            }
            self.watch_reconnect();
            error
        } else {
            CacheError::backend(err.to_string())
        }
    }

    /// Ping until the connection is usable again, then mark the store ready.
    /// At most one watcher runs at a time.
    fn watch_reconnect(&self) {
        if self.reconnecting.swap(true, Ordering::SeqCst) {
            return;
        }
        let conn = self.conn.clone();
        let ready = self.ready.clone();
        let reconnecting = self.reconnecting.clone();

        tokio::spawn(async move {
            let mut delay = RECONNECT_INITIAL_DELAY;
            loop {
                tokio::time::sleep(delay).await;
                let mut conn = conn.clone();
                let pong: RedisResult<String> =
                    ::redis::cmd("PING").query_async(&mut conn).await;
                match pong {
                    Ok(_) => {
                        ready.store(true, Ordering::SeqCst);
                        reconnecting.store(false, Ordering::SeqCst);
                        info!("Redis connection restored");
                        break;
                    }
                    Err(e) => {
                        let retry_in_ms = delay.as_millis() as u64;
                        debug!(error = %e, retry_in_ms, "Redis still unreachable");
                        delay = (delay * 2).min(RECONNECT_MAX_DELAY);
                    }
                }
            }
        });
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.query(::redis::cmd("GET").arg(key)).await
    }

    async fn set(&self, key: &str, value: &str, expire_at: Option<u64>) -> Result<()> {
        let mut cmd = ::redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(expire_at) = expire_at {
            cmd.arg("EXAT").arg(expire_at);
        }
        self.query(&cmd).await
    }

    async fn expire_at(&self, key: &str, unix_secs: u64) -> Result<bool> {
        self.query(::redis::cmd("EXPIREAT").arg(key).arg(unix_secs))
            .await
    }

    async fn unlink(&self, keys: &[String]) -> Result<u64> {
        self.query(::redis::cmd("UNLINK").arg(keys)).await
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<()> {
        self.query(::redis::cmd("HSET").arg(key).arg(field).arg(value))
            .await
    }

    async fn hexists(&self, key: &str, field: &str) -> Result<bool> {
        self.query(::redis::cmd("HEXISTS").arg(key).arg(field))
            .await
    }

    async fn hmget(&self, key: &str, fields: &[String]) -> Result<Vec<Option<String>>> {
        self.query(::redis::cmd("HMGET").arg(key).arg(fields))
            .await
    }

    async fn hdel(&self, key: &str, fields: &[String]) -> Result<u64> {
        self.query(::redis::cmd("HDEL").arg(key).arg(fields)).await
    }

    async fn hscan(&self, key: &str, cursor: u64, count: usize) -> Result<ScanPage> {
        let (cursor, flat): (u64, Vec<String>) = self
            .query(
                ::redis::cmd("HSCAN")
                    .arg(key)
                    .arg(cursor)
                    .arg("COUNT")
                    .arg(count),
            )
            .await?;

        let mut entries = Vec::with_capacity(flat.len() / 2);
        let mut pairs = flat.into_iter();
        while let (Some(field), Some(value)) = (pairs.next(), pairs.next()) {
            entries.push((field, value));
        }

        Ok(ScanPage { cursor, entries })
    }
}
