//! In-process tier with least-recently-used eviction

use std::{collections::HashMap, num::NonZeroUsize};

use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;
use tracing::debug;

use super::{GetMeta, Handler, RevalidateDurations};
use crate::{
    entry::{unix_now_ms, unix_now_secs},
    tags::is_implicit_tag,
    CacheEntry, CacheError, Result,
};

/// Local handler options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalHandlerOptions {
    /// Entries kept before the least recently used one is evicted.
    pub max_items: usize,
    /// Entries larger than this are not stored.
    pub max_item_size_bytes: usize,
}

impl Default for LocalHandlerOptions {
    fn default() -> Self {
        Self {
            max_items: 1_000,
            max_item_size_bytes: 100 * 1024 * 1024,
        }
    }
}

struct LocalState {
    entries: LruCache<String, CacheEntry>,
    /// Implicit tag → revalidation time (ms), checked against host-supplied
    /// implicit tags on read.
    revalidated: HashMap<String, u64>,
}

/// Bounded in-memory tier.
pub struct LocalHandler {
    state: Mutex<LocalState>,
    max_item_size_bytes: usize,
}

impl LocalHandler {
    pub fn new(options: LocalHandlerOptions) -> Result<Self> {
        let capacity = NonZeroUsize::new(options.max_items)
            .ok_or_else(|| CacheError::invalid_config("max_items must be greater than zero"))?;

        Ok(Self {
            state: Mutex::new(LocalState {
                entries: LruCache::new(capacity),
                revalidated: HashMap::new(),
            }),
            max_item_size_bytes: options.max_item_size_bytes,
        })
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys currently held, most recently used first.
    pub fn keys(&self) -> Vec<String> {
        self.state
            .lock()
            .entries
            .iter()
            .map(|(key, _)| key.clone())
            .collect()
    }
}

#[async_trait]
impl Handler for LocalHandler {
    fn name(&self) -> &str {
        "local-lru"
    }

    async fn get(&self, key: &str, meta: &GetMeta) -> Result<Option<CacheEntry>> {
        let mut state = self.state.lock();
        let Some(entry) = state.entries.get(key).cloned() else {
            return Ok(None);
        };

        let revalidated = meta
            .combined_tags(&entry)
            .iter()
            .filter_map(|tag| state.revalidated.get(tag))
            .any(|at| *at > entry.last_modified);

        if revalidated || entry.is_expired_at(unix_now_secs()) {
            state.entries.pop(key);
            return Ok(None);
        }

        Ok(Some(entry))
    }

    async fn set(&self, key: &str, entry: &CacheEntry) -> Result<()> {
        let mut state = self.state.lock();
        let size = entry.size_hint();
        if size > self.max_item_size_bytes {
            debug!(key = %key, size, limit = self.max_item_size_bytes, "Entry too large for local tier");
            state.entries.pop(key);
            return Ok(());
        }
        state.entries.put(key.to_string(), entry.clone());
        Ok(())
    }

    async fn revalidate_tag(
        &self,
        tag: &str,
        _durations: Option<RevalidateDurations>,
    ) -> Result<()> {
        let mut state = self.state.lock();
        if is_implicit_tag(tag) {
            state.revalidated.insert(tag.to_string(), unix_now_ms());
        }

        let tagged: Vec<String> = state
            .entries
            .iter()
            .filter(|(_, entry)| entry.has_tag(tag))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &tagged {
            state.entries.pop(key);
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.state.lock().entries.pop(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Lifespan;

    fn local(max_items: usize) -> LocalHandler {
        LocalHandler::new(LocalHandlerOptions {
            max_items,
            ..Default::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_least_recently_used_entry_is_evicted() {
        let handler = local(2);
        let meta = GetMeta::default();
        handler.set("a", &CacheEntry::new("1")).await.unwrap();
        handler.set("b", &CacheEntry::new("2")).await.unwrap();
        handler.get("a", &meta).await.unwrap();
        handler.set("c", &CacheEntry::new("3")).await.unwrap();

        assert!(handler.get("a", &meta).await.unwrap().is_some());
        assert!(handler.get("b", &meta).await.unwrap().is_none());
        assert_eq!(handler.len(), 2);
    }

    #[tokio::test]
    async fn test_oversize_entries_are_not_stored() {
        let handler = LocalHandler::new(LocalHandlerOptions {
            max_items: 10,
            max_item_size_bytes: 4,
        })
        .unwrap();
        handler.set("k", &CacheEntry::new("small")).await.unwrap();

        assert!(handler.is_empty());
    }

    #[tokio::test]
    async fn test_expired_entries_are_dropped_on_read() {
        let handler = local(10);
        let past = unix_now_secs() - 10;
        let entry = CacheEntry::new("v").with_lifespan(Lifespan {
            last_modified_at: past - 100,
            stale_at: past - 50,
            expire_at: past,
            stale_age: 50,
            expire_age: 100,
            revalidate: None,
        });
        handler.set("k", &entry).await.unwrap();

        assert!(handler.get("k", &GetMeta::default()).await.unwrap().is_none());
        assert!(handler.is_empty());
    }

    #[tokio::test]
    async fn test_revalidate_removes_tagged_entries() {
        let handler = local(10);
        let meta = GetMeta::default();
        handler
            .set("a", &CacheEntry::new("1").with_tags(["t1"]))
            .await
            .unwrap();
        handler
            .set("b", &CacheEntry::new("2").with_tags(["t2"]))
            .await
            .unwrap();

        handler.revalidate_tag("t1", None).await.unwrap();

        assert!(handler.get("a", &meta).await.unwrap().is_none());
        assert!(handler.get("b", &meta).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_implicit_revalidation_applies_to_host_tags() {
        let handler = local(10);
        let entry = CacheEntry::new("v").with_last_modified(unix_now_ms() - 1_000);
        handler.set("page", &entry).await.unwrap();

        handler.revalidate_tag("_N_T_/blog", None).await.unwrap();

        assert!(handler
            .get("page", &GetMeta::new(["_N_T_/layout"]))
            .await
            .unwrap()
            .is_some());
        assert!(handler
            .get("page", &GetMeta::new(["_N_T_/blog"]))
            .await
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_zero_capacity_is_rejected() {
        assert!(matches!(
            LocalHandler::new(LocalHandlerOptions {
                max_items: 0,
                ..Default::default()
            }),
            Err(CacheError::InvalidConfiguration { .. })
        ));
    }
}
