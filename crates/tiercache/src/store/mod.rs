//! Remote key-value store adapter
//!
//! [`KeyValueStore`] is the capability set the remote tier needs from its
//! backing service: string get/set with absolute expiry, hash field
//! operations, cursor-paginated hash scans, and bulk unlink. [`StoreClient`]
//! wraps a store with a readiness check and a per-call timeout so that every
//! remote operation fails fast or is cancelled individually.

mod memory;
mod redis;

use std::{future::Future, sync::Arc, time::Duration};

use async_trait::async_trait;

use crate::{CacheError, Result};

pub use self::memory::MemoryStore;
pub use self::redis::{ConnectionErrorListener, RedisStore};

/// Default per-operation deadline.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5_000);

/// One page of a hash scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanPage {
    /// Cursor for the next page; `0` once the scan is complete.
    pub cursor: u64,
    pub entries: Vec<(String, String)>,
}

/// Primitive operations of a Redis-compatible store.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Whether the underlying connection is established.
    fn is_ready(&self) -> bool;

    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store `value`, expiring at `expire_at` (Unix seconds) when given.
    async fn set(&self, key: &str, value: &str, expire_at: Option<u64>) -> Result<()>;

    /// Set an absolute expiry on an existing key.
    async fn expire_at(&self, key: &str, unix_secs: u64) -> Result<bool>;

    /// Remove keys, returning how many existed.
    async fn unlink(&self, keys: &[String]) -> Result<u64>;

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<()>;

    async fn hexists(&self, key: &str, field: &str) -> Result<bool>;

    async fn hmget(&self, key: &str, fields: &[String]) -> Result<Vec<Option<String>>>;

    async fn hdel(&self, key: &str, fields: &[String]) -> Result<u64>;

    async fn hscan(&self, key: &str, cursor: u64, count: usize) -> Result<ScanPage>;
}

/// Readiness-checked, deadline-bounded access to a [`KeyValueStore`].
#[derive(Clone)]
pub struct StoreClient {
    store: Arc<dyn KeyValueStore>,
    timeout: Duration,
}

impl StoreClient {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Per-operation deadline; `Duration::ZERO` disables it.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Fail with [`CacheError::BackendNotReady`] unless connected.
    pub fn ensure_ready(&self) -> Result<()> {
        if self.store.is_ready() {
            Ok(())
        } else {
            Err(CacheError::not_ready(
                "store is not ready yet or the connection was lost",
            ))
        }
    }

    async fn timed<T, F>(&self, operation: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.ensure_ready()?;
        if self.timeout.is_zero() {
            return fut.await;
        }
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(CacheError::OperationTimeout {
                operation,
                timeout_ms: self.timeout.as_millis() as u64,
            }),
        }
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        self.timed("GET", self.store.get(key)).await
    }

    pub async fn set(&self, key: &str, value: &str, expire_at: Option<u64>) -> Result<()> {
        self.timed("SET", self.store.set(key, value, expire_at)).await
    }

    pub async fn expire_at(&self, key: &str, unix_secs: u64) -> Result<bool> {
        self.timed("EXPIREAT", self.store.expire_at(key, unix_secs)).await
    }

    pub async fn unlink(&self, keys: &[String]) -> Result<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        self.timed("UNLINK", self.store.unlink(keys)).await
    }

    pub async fn hset(&self, key: &str, field: &str, value: &str) -> Result<()> {
        self.timed("HSET", self.store.hset(key, field, value)).await
    }

    pub async fn hexists(&self, key: &str, field: &str) -> Result<bool> {
        self.timed("HEXISTS", self.store.hexists(key, field)).await
    }

    pub async fn hmget(&self, key: &str, fields: &[String]) -> Result<Vec<Option<String>>> {
        if fields.is_empty() {
            return Ok(Vec::new());
        }
        self.timed("HMGET", self.store.hmget(key, fields)).await
    }

    pub async fn hdel(&self, key: &str, fields: &[String]) -> Result<u64> {
        if fields.is_empty() {
            return Ok(0);
        }
        self.timed("HDEL", self.store.hdel(key, fields)).await
    }

    pub async fn hscan(&self, key: &str, cursor: u64, count: usize) -> Result<ScanPage> {
        self.timed("HSCAN", self.store.hscan(key, cursor, count)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_not_ready_fails_fast() {
        let store = Arc::new(MemoryStore::new());
        store.set_ready(false);
        let client = StoreClient::new(store);

        let err = client.get("k").await.unwrap_err();
        assert!(matches!(err, CacheError::BackendNotReady { .. }));
    }

    #[tokio::test]
    async fn test_slow_operation_times_out() {
        let store = Arc::new(MemoryStore::new().with_latency(Duration::from_millis(200)));
        let client = StoreClient::new(store).with_timeout(Duration::from_millis(10));

        let err = client.get("k").await.unwrap_err();
        assert!(matches!(
            err,
            CacheError::OperationTimeout {
                operation: "GET",
                timeout_ms: 10
            }
        ));
    }

    #[tokio::test]
    async fn test_zero_timeout_disables_deadline() {
        let store = Arc::new(MemoryStore::new().with_latency(Duration::from_millis(20)));
        let client = StoreClient::new(store).with_timeout(Duration::ZERO);

        client.set("k", "v", None).await.unwrap();
        assert_eq!(client.get("k").await.unwrap(), Some("v".to_string()));
    }

    #[tokio::test]
    async fn test_empty_bulk_operations_skip_the_store() {
        let store = Arc::new(MemoryStore::new());
        store.set_ready(false);
        let client = StoreClient::new(store);

        assert_eq!(client.unlink(&[]).await.unwrap(), 0);
        assert_eq!(client.hdel("h", &[]).await.unwrap(), 0);
        assert!(client.hmget("h", &[]).await.unwrap().is_empty());
    }
}
