//! Shared tag index and revalidation ledger
//!
//! Three hashes live next to the cached values, all keyed by cache key
//! except the ledger:
//!
//! - `{prefix}__sharedTags__`: key → JSON array of the tags at last write
//! - `{prefix}__sharedTagsTtl__`: key → absolute expiry in Unix seconds
//! - `{prefix}__revalidated_tags__`: implicit tag → revalidation time in ms
//!
//! The store offers no "keys by tag" lookup, so finding the keys of a tag
//! means scanning the whole tags hash.

use std::collections::HashMap;

use tracing::warn;

use crate::{store::StoreClient, Result};

pub const DEFAULT_SHARED_TAGS_KEY: &str = "__sharedTags__";
pub const DEFAULT_SHARED_TAGS_TTL_KEY: &str = "__sharedTagsTtl__";
pub const REVALIDATED_TAGS_KEY: &str = "__revalidated_tags__";

/// Hash fields fetched per HSCAN round trip.
pub const DEFAULT_SCAN_COUNT: usize = 10_000;

/// Tag index rows and revalidation ledger of one key namespace.
#[derive(Clone)]
pub struct TagIndex {
    client: StoreClient,
    tags_key: String,
    expiry_key: String,
    ledger_key: String,
    scan_count: usize,
}

impl TagIndex {
    pub fn new(client: StoreClient, key_prefix: &str) -> Self {
        Self {
            client,
            tags_key: format!("{key_prefix}{DEFAULT_SHARED_TAGS_KEY}"),
            expiry_key: format!("{key_prefix}{DEFAULT_SHARED_TAGS_TTL_KEY}"),
            ledger_key: format!("{key_prefix}{REVALIDATED_TAGS_KEY}"),
            scan_count: DEFAULT_SCAN_COUNT,
        }
    }

    /// Override the hash names (each already including any prefix).
    pub fn with_hash_keys(mut self, tags_key: String, expiry_key: String) -> Self {
        self.tags_key = tags_key;
        self.expiry_key = expiry_key;
        self
    }

    pub fn with_scan_count(mut self, scan_count: usize) -> Self {
        self.scan_count = scan_count.max(1);
        self
    }

    pub fn tags_key(&self) -> &str {
        &self.tags_key
    }

    pub fn expiry_key(&self) -> &str {
        &self.expiry_key
    }

    pub fn ledger_key(&self) -> &str {
        &self.ledger_key
    }

    /// Whether `key` has a tags row; a value without one is orphaned.
    pub async fn contains(&self, key: &str) -> Result<bool> {
        self.client.hexists(&self.tags_key, key).await
    }

    /// Write the tags row and, when present, the expiry row of `key`.
    pub async fn record(&self, key: &str, tags: &[String], expire_at: Option<u64>) -> Result<()> {
        let encoded_tags = serde_json::to_string(tags)?;
        let set_tags = self.client.hset(&self.tags_key, key, &encoded_tags);

        match expire_at {
            Some(expire_at) => {
                let expire_at = expire_at.to_string();
                let set_expiry = self.client.hset(&self.expiry_key, key, &expire_at);
                tokio::try_join!(set_tags, set_expiry)?;
            }
            None => set_tags.await?,
        }
        Ok(())
    }

    /// Remove both index rows of every key in `keys`.
    pub async fn remove(&self, keys: &[String]) -> Result<()> {
        tokio::try_join!(
            self.client.hdel(&self.tags_key, keys),
            self.client.hdel(&self.expiry_key, keys),
        )?;
        Ok(())
    }

    /// Full scan of the tags hash.
    pub async fn scan_tags(&self) -> Result<HashMap<String, Vec<String>>> {
        let rows = self.scan_all(&self.tags_key).await?;
        Ok(rows
            .into_iter()
            .map(|(key, raw)| {
                let tags = serde_json::from_str::<Vec<String>>(&raw).unwrap_or_else(|e| {
                    warn!(key = %key, error = %e, "Unreadable tags row, treating as untagged");
                    Vec::new()
                });
                (key, tags)
            })
            .collect())
    }

    /// Full scan of the expiry hash.
    pub async fn scan_expiry(&self) -> Result<HashMap<String, u64>> {
        let rows = self.scan_all(&self.expiry_key).await?;
        Ok(rows
            .into_iter()
            .filter_map(|(key, raw)| match raw.parse::<u64>() {
                Ok(expire_at) => Some((key, expire_at)),
                Err(e) => {
                    warn!(key = %key, error = %e, "Unreadable expiry row, skipping");
                    None
                }
            })
            .collect())
    }

    /// Keys whose tag set contains `tag`.
    pub async fn keys_tagged(&self, tag: &str) -> Result<Vec<String>> {
        Ok(self
            .scan_tags()
            .await?
            .into_iter()
            .filter(|(_, tags)| tags.iter().any(|t| t == tag))
            .map(|(key, _)| key)
            .collect())
    }

    /// Keys whose recorded expiry lies before `now_ms`.
    pub async fn expired_keys(&self, now_ms: u64) -> Result<Vec<String>> {
        Ok(self
            .scan_expiry()
            .await?
            .into_iter()
            .filter(|(_, expire_at)| expire_at.saturating_mul(1000) < now_ms)
            .map(|(key, _)| key)
            .collect())
    }

    /// Record that `tag` was revalidated at `at_ms`.
    pub async fn stamp_revalidated(&self, tag: &str, at_ms: u64) -> Result<()> {
        self.client
            .hset(&self.ledger_key, tag, &at_ms.to_string())
            .await
    }

    /// Ledger timestamps for `tags`, in order; `None` when never revalidated
    /// or not numeric.
    pub async fn revalidated_at(&self, tags: &[String]) -> Result<Vec<Option<u64>>> {
        Ok(self
            .client
            .hmget(&self.ledger_key, tags)
            .await?
            .into_iter()
            .map(|raw| raw.and_then(|raw| raw.parse::<u64>().ok()))
            .collect())
    }

    async fn scan_all(&self, hash_key: &str) -> Result<Vec<(String, String)>> {
        let mut rows = Vec::new();
        let mut cursor = 0;
        loop {
            let page = self
                .client
                .hscan(hash_key, cursor, self.scan_count)
                .await?;
            rows.extend(page.entries);
            cursor = page.cursor;
            if cursor == 0 {
                break;
            }
        }
        Ok(rows)
    }
}
