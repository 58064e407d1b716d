//! Debug tracing around a wrapped handler

use std::time::Instant;

use async_trait::async_trait;
use tracing::debug;

use super::{GetMeta, Handler, RevalidateDurations, SharedHandler};
use crate::{CacheEntry, Result};

/// Emits a `debug!` event around every call of the inner handler.
pub struct LoggingHandler {
    inner: SharedHandler,
}

impl LoggingHandler {
    pub fn new(inner: SharedHandler) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl Handler for LoggingHandler {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn get(&self, key: &str, meta: &GetMeta) -> Result<Option<CacheEntry>> {
        let handler = self.inner.name();
        debug!(handler, key = %key, implicit_tags = ?meta.implicit_tags, "get");
        let started = Instant::now();
        let result = self.inner.get(key, meta).await;
        match &result {
            Ok(found) => debug!(
                handler,
                key = %key,
                hit = found.is_some(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "get done"
            ),
            Err(e) => debug!(handler, key = %key, error = %e, "get failed"),
        }
        result
    }

    async fn set(&self, key: &str, entry: &CacheEntry) -> Result<()> {
        let handler = self.inner.name();
        debug!(handler, key = %key, tags = ?entry.tags, expire_at = ?entry.expire_at(), "set");
        let result = self.inner.set(key, entry).await;
        if let Err(e) = &result {
            debug!(handler, key = %key, error = %e, "set failed");
        }
        result
    }

    async fn revalidate_tag(
        &self,
        tag: &str,
        durations: Option<RevalidateDurations>,
    ) -> Result<()> {
        let handler = self.inner.name();
        debug!(handler, tag = %tag, ?durations, "revalidate_tag");
        let started = Instant::now();
        let result = self.inner.revalidate_tag(tag, durations).await;
        match &result {
            Ok(()) => debug!(
                handler,
                tag = %tag,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "revalidate_tag done"
            ),
            Err(e) => debug!(handler, tag = %tag, error = %e, "revalidate_tag failed"),
        }
        result
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let handler = self.inner.name();
        debug!(handler, key = %key, "delete");
        let result = self.inner.delete(key).await;
        if let Err(e) = &result {
            debug!(handler, key = %key, error = %e, "delete failed");
        }
        result
    }
}
