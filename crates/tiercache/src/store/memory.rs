//! In-process emulation of the remote store
//!
//! Behaves like a single Redis node for the operations the remote tier uses:
//! absolute key expiry, hash fields, and stateless cursor scans over hashes.

use std::{
    collections::{BTreeMap, HashMap},
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{KeyValueStore, ScanPage};
use crate::{entry::unix_now_secs, Result};

#[derive(Default)]
struct MemoryState {
    strings: HashMap<String, StoredString>,
    hashes: HashMap<String, BTreeMap<String, String>>,
}

struct StoredString {
    value: String,
    expire_at: Option<u64>,
}

impl StoredString {
    fn is_live(&self, now_secs: u64) -> bool {
        self.expire_at.map_or(true, |expire_at| expire_at > now_secs)
    }
}

/// In-memory [`KeyValueStore`].
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    ready: AtomicBool,
    latency: Option<Duration>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            ready: AtomicBool::new(true),
            latency: None,
        }
    }

    /// Delay every operation, to exercise deadlines.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Simulate a connection being established or lost.
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Whether a live string value exists at `key`.
    pub fn contains_key(&self, key: &str) -> bool {
        let now = unix_now_secs();
        self.state
            .lock()
            .strings
            .get(key)
            .is_some_and(|stored| stored.is_live(now))
    }

    /// Absolute expiry recorded on a string key.
    pub fn expiry_of(&self, key: &str) -> Option<u64> {
        self.state
            .lock()
            .strings
            .get(key)
            .and_then(|stored| stored.expire_at)
    }

    pub fn hash_field(&self, key: &str, field: &str) -> Option<String> {
        self.state
            .lock()
            .hashes
            .get(key)
            .and_then(|hash| hash.get(field).cloned())
    }

    pub fn hash_len(&self, key: &str) -> usize {
        self.state.lock().hashes.get(key).map_or(0, BTreeMap::len)
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.simulate_latency().await;
        let now = unix_now_secs();
        let mut state = self.state.lock();
        let lookup = state
            .strings
            .get(key)
            .map(|stored| (stored.is_live(now), stored.value.clone()));
        match lookup {
            Some((true, value)) => Ok(Some(value)),
            Some((false, _)) => {
                state.strings.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, expire_at: Option<u64>) -> Result<()> {
        self.simulate_latency().await;
        self.state.lock().strings.insert(
            key.to_string(),
            StoredString {
                value: value.to_string(),
                expire_at,
            },
        );
        Ok(())
    }

    async fn expire_at(&self, key: &str, unix_secs: u64) -> Result<bool> {
        self.simulate_latency().await;
        match self.state.lock().strings.get_mut(key) {
            Some(stored) => {
                stored.expire_at = Some(unix_secs);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn unlink(&self, keys: &[String]) -> Result<u64> {
        self.simulate_latency().await;
        let mut state = self.state.lock();
        let mut removed = 0;
        for key in keys {
            if state.strings.remove(key).is_some() || state.hashes.remove(key).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<()> {
        self.simulate_latency().await;
        self.state
            .lock()
            .hashes
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn hexists(&self, key: &str, field: &str) -> Result<bool> {
        self.simulate_latency().await;
        Ok(self
            .state
            .lock()
            .hashes
            .get(key)
            .is_some_and(|hash| hash.contains_key(field)))
    }

    async fn hmget(&self, key: &str, fields: &[String]) -> Result<Vec<Option<String>>> {
        self.simulate_latency().await;
        let state = self.state.lock();
        let hash = state.hashes.get(key);
        Ok(fields
            .iter()
            .map(|field| hash.and_then(|hash| hash.get(field).cloned()))
            .collect())
    }

    async fn hdel(&self, key: &str, fields: &[String]) -> Result<u64> {
        self.simulate_latency().await;
        let mut state = self.state.lock();
        let Some(hash) = state.hashes.get_mut(key) else {
            return Ok(0);
        };
        let removed = fields
            .iter()
            .filter(|field| hash.remove(field.as_str()).is_some())
            .count() as u64;
        if hash.is_empty() {
            state.hashes.remove(key);
        }
        Ok(removed)
    }

    async fn hscan(&self, key: &str, cursor: u64, count: usize) -> Result<ScanPage> {
        self.simulate_latency().await;
        let state = self.state.lock();
        let Some(hash) = state.hashes.get(key) else {
            return Ok(ScanPage::default());
        };

        let count = count.max(1);
        let start = cursor as usize;
        let entries: Vec<(String, String)> = hash
            .iter()
            .skip(start)
            .take(count)
            .map(|(field, value)| (field.clone(), value.clone()))
            .collect();
        let next = start + entries.len();
        let cursor = if next >= hash.len() { 0 } else { next as u64 };

        Ok(ScanPage { cursor, entries })
    }
}
