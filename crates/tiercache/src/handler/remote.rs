//! Remote tier over a Redis-compatible store
//!
//! Values live at `{prefix}{key}`. Each write also records the key's tags and
//! expiry in the shared [`TagIndex`] hashes, which is what lets any process
//! find and purge the keys of a tag. Reads verify the tag row still exists
//! (orphan check) and that none of the entry's tags were revalidated after it
//! was written (ledger check) before returning anything.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{GetMeta, Handler, RevalidateDurations};
use crate::{
    codec,
    entry::unix_now_ms,
    store::{KeyValueStore, StoreClient, DEFAULT_TIMEOUT},
    tag_index::{
        TagIndex, DEFAULT_SCAN_COUNT, DEFAULT_SHARED_TAGS_KEY, DEFAULT_SHARED_TAGS_TTL_KEY,
    },
    tags::is_implicit_tag,
    CacheEntry, CacheError, Result,
};

/// How absolute expiry is applied to stored values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExpirationStrategy {
    /// `SET key value EXAT ts` in one command.
    ExAt,
    /// `SET key value` followed by `EXPIREAT key ts`, for stores without the
    /// combined form.
    #[default]
    ExpireAt,
}

impl std::str::FromStr for ExpirationStrategy {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "EXAT" => Ok(Self::ExAt),
            "EXPIREAT" => Ok(Self::ExpireAt),
            other => Err(CacheError::invalid_config(format!(
                "invalid key expiration strategy: {other}"
            ))),
        }
    }
}

/// Remote handler options
#[derive(Debug, Clone)]
pub struct RemoteHandlerOptions {
    /// Prepended to every value key and to the index hash names.
    pub key_prefix: String,
    pub shared_tags_key: String,
    pub shared_tags_ttl_key: String,
    /// Per-call deadline; zero disables it.
    pub timeout: Duration,
    pub expiration_strategy: ExpirationStrategy,
    /// HSCAN page size used when scanning the index.
    pub revalidate_tag_query_size: usize,
}

impl Default for RemoteHandlerOptions {
    fn default() -> Self {
        Self {
            key_prefix: String::new(),
            shared_tags_key: DEFAULT_SHARED_TAGS_KEY.to_string(),
            shared_tags_ttl_key: DEFAULT_SHARED_TAGS_TTL_KEY.to_string(),
            timeout: DEFAULT_TIMEOUT,
            expiration_strategy: ExpirationStrategy::default(),
            revalidate_tag_query_size: DEFAULT_SCAN_COUNT,
        }
    }
}

/// Tier handler backed by a shared remote store.
pub struct RemoteHandler {
    client: StoreClient,
    index: TagIndex,
    key_prefix: String,
    strategy: ExpirationStrategy,
}

impl RemoteHandler {
    pub fn new(store: Arc<dyn KeyValueStore>, options: RemoteHandlerOptions) -> Result<Self> {
        if options.revalidate_tag_query_size == 0 {
            return Err(CacheError::invalid_config(
                "revalidate_tag_query_size must be greater than zero",
            ));
        }

        let client = StoreClient::new(store).with_timeout(options.timeout);
        let prefix = options.key_prefix;
        let index = TagIndex::new(client.clone(), &prefix)
            .with_hash_keys(
                format!("{prefix}{}", options.shared_tags_key),
                format!("{prefix}{}", options.shared_tags_ttl_key),
            )
            .with_scan_count(options.revalidate_tag_query_size);

        Ok(Self {
            client,
            index,
            key_prefix: prefix,
            strategy: options.expiration_strategy,
        })
    }

    fn raw_key(&self, key: &str) -> String {
        format!("{}{key}", self.key_prefix)
    }

    /// Delete every key whose recorded expiry has passed, along with its
    /// index rows. Returns the number of keys purged.
    pub async fn revalidate_shared_keys(&self) -> Result<usize> {
        self.client.ensure_ready()?;
        let expired = self.index.expired_keys(unix_now_ms()).await?;
        let purged = expired.len();
        self.purge(expired).await?;
        if purged > 0 {
            debug!(purged, "Swept expired keys");
        }
        Ok(purged)
    }

    async fn purge_tag(&self, tag: &str) -> Result<usize> {
        let tagged = self.index.keys_tagged(tag).await?;
        let purged = tagged.len();
        self.purge(tagged).await?;
        Ok(purged)
    }

    async fn purge(&self, keys: Vec<String>) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let raw_keys: Vec<String> = keys.iter().map(|key| self.raw_key(key)).collect();
        tokio::try_join!(self.client.unlink(&raw_keys), self.index.remove(&keys))?;
        Ok(())
    }

    /// Best-effort removal of a raw value found to be unusable on read.
    async fn discard(&self, key: &str) {
        if let Err(e) = self.client.unlink(&[self.raw_key(key)]).await {
            warn!(key = %key, error = %e, "Failed to discard cache key");
        }
    }

    async fn store_value(&self, raw_key: &str, payload: &str, expire_at: Option<u64>) -> Result<()> {
        match self.strategy {
            ExpirationStrategy::ExAt => self.client.set(raw_key, payload, expire_at).await,
            ExpirationStrategy::ExpireAt => {
                self.client.set(raw_key, payload, None).await?;
                if let Some(expire_at) = expire_at {
                    self.client.expire_at(raw_key, expire_at).await?;
                }
                Ok(())
            }
        }
    }
}

#[async_trait]
impl Handler for RemoteHandler {
    fn name(&self) -> &str {
        "redis-strings"
    }

    async fn get(&self, key: &str, meta: &GetMeta) -> Result<Option<CacheEntry>> {
        self.client.ensure_ready()?;

        let Some(raw) = self.client.get(&self.raw_key(key)).await? else {
            return Ok(None);
        };

        let entry = match codec::decode_entry(key, &raw) {
            Ok(Some(entry)) => entry,
            Ok(None) => return Ok(None),
            Err(e @ CacheError::MalformedEntry { .. }) => {
                warn!(error = %e, "Treating malformed entry as a miss");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        if !self.index.contains(key).await? {
            let orphan = CacheError::OrphanedKey {
                key: key.to_string(),
            };
            debug!(error = %orphan, "Removing orphaned value");
            self.discard(key).await;
            return Ok(None);
        }

        let combined = meta.combined_tags(&entry);
        if combined.is_empty() {
            return Ok(Some(entry));
        }

        let revalidated = self
            .index
            .revalidated_at(&combined)
            .await?
            .into_iter()
            .flatten()
            .any(|at| at > entry.last_modified);
        if revalidated {
            debug!(key = %key, "Entry predates a tag revalidation");
            self.discard(key).await;
            return Ok(None);
        }

        Ok(Some(entry))
    }

    async fn set(&self, key: &str, entry: &CacheEntry) -> Result<()> {
        self.client.ensure_ready()?;

        let payload = codec::encode_entry(entry)?;
        let raw_key = self.raw_key(key);
        let expire_at = entry.expire_at();

        tokio::try_join!(
            self.index.record(key, &entry.tags, expire_at),
            self.store_value(&raw_key, &payload, expire_at),
        )?;
        Ok(())
    }

    async fn revalidate_tag(
        &self,
        tag: &str,
        _durations: Option<RevalidateDurations>,
    ) -> Result<()> {
        self.client.ensure_ready()?;

        if is_implicit_tag(tag) {
            self.index.stamp_revalidated(tag, unix_now_ms()).await?;
        }

        let (purged, swept) =
            tokio::try_join!(self.purge_tag(tag), self.revalidate_shared_keys())?;
        debug!(tag = %tag, purged, swept, "Revalidated tag");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.client.ensure_ready()?;
        self.client.unlink(&[self.raw_key(key)]).await?;
        self.index.remove(&[key.to_string()]).await
    }
}
