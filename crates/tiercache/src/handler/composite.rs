//! Ordered fan-out across several tiers
//!
//! Reads try each tier in order and stop at the first hit, without copying
//! the value into earlier tiers. Writes go to exactly one tier chosen by a
//! [`SetStrategy`]. Revalidation and delete run on every tier concurrently;
//! all tiers are driven to completion and the first failure, in tier order,
//! is returned.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use tracing::warn;

use super::{GetMeta, Handler, RevalidateDurations, SharedHandler};
use crate::{CacheEntry, CacheError, Result};

/// Maps an entry to the index of the tier that stores it.
pub type SetStrategy = Arc<dyn Fn(&CacheEntry) -> usize + Send + Sync>;

/// Handler composed of two or more tiers.
pub struct CompositeHandler {
    handlers: Vec<SharedHandler>,
    strategy: Option<SetStrategy>,
}

impl CompositeHandler {
    pub fn new(handlers: Vec<SharedHandler>) -> Result<Self> {
        if handlers.len() < 2 {
            return Err(CacheError::invalid_config(
                "composite handler requires at least two handlers",
            ));
        }
        Ok(Self {
            handlers,
            strategy: None,
        })
    }

    /// Route writes with `strategy`; without one every write goes to tier 0.
    pub fn with_set_strategy<F>(mut self, strategy: F) -> Self
    where
        F: Fn(&CacheEntry) -> usize + Send + Sync + 'static,
    {
        self.strategy = Some(Arc::new(strategy));
        self
    }

    pub fn handlers(&self) -> &[SharedHandler] {
        &self.handlers
    }

    fn target(&self, entry: &CacheEntry) -> &SharedHandler {
        let index = self.strategy.as_ref().map_or(0, |strategy| strategy(entry));
        self.handlers.get(index).unwrap_or(&self.handlers[0])
    }
}

/// Keep the first error of a broadcast, logging the rest.
fn first_failure(operation: &str, results: Vec<Result<()>>) -> Result<()> {
    let mut first = None;
    for error in results.into_iter().filter_map(|result| result.err()) {
        if first.is_none() {
            first = Some(error);
        } else {
            warn!(operation, error = %error, "Additional tier failure");
        }
    }
    first.map_or(Ok(()), Err)
}

#[async_trait]
impl Handler for CompositeHandler {
    fn name(&self) -> &str {
        "composite"
    }

    async fn get(&self, key: &str, meta: &GetMeta) -> Result<Option<CacheEntry>> {
        for handler in &self.handlers {
            if let Some(entry) = handler.get(key, meta).await? {
                return Ok(Some(entry));
            }
        }
        Ok(None)
    }

    async fn set(&self, key: &str, entry: &CacheEntry) -> Result<()> {
        self.target(entry).set(key, entry).await
    }

    async fn revalidate_tag(
        &self,
        tag: &str,
        durations: Option<RevalidateDurations>,
    ) -> Result<()> {
        let results = join_all(
            self.handlers
                .iter()
                .map(|handler| handler.revalidate_tag(tag, durations)),
        )
        .await;
        first_failure("revalidate_tag", results)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let results = join_all(self.handlers.iter().map(|handler| handler.delete(key))).await;
        first_failure("delete", results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{LocalHandler, LocalHandlerOptions};

    fn tier() -> Arc<LocalHandler> {
        Arc::new(LocalHandler::new(LocalHandlerOptions::default()).unwrap())
    }

    #[test]
    fn test_requires_two_handlers() {
        let result = CompositeHandler::new(vec![tier() as SharedHandler]);
        assert!(matches!(result, Err(CacheError::InvalidConfiguration { .. })));
    }

    #[tokio::test]
    async fn test_out_of_range_strategy_falls_back_to_first_tier() {
        let (a, b) = (tier(), tier());
        let composite = CompositeHandler::new(vec![a.clone() as SharedHandler, b.clone()])
            .unwrap()
            .with_set_strategy(|_| 7);

        composite.set("k", &CacheEntry::new("v")).await.unwrap();

        assert_eq!(a.len(), 1);
        assert!(b.is_empty());
    }

    #[tokio::test]
    async fn test_strategy_routes_by_tag() {
        let (a, b) = (tier(), tier());
        let composite = CompositeHandler::new(vec![a.clone() as SharedHandler, b.clone()])
            .unwrap()
            .with_set_strategy(|entry| usize::from(!entry.has_tag("memory-cache")));

        composite
            .set("local", &CacheEntry::new("v").with_tags(["memory-cache"]))
            .await
            .unwrap();
        composite.set("remote", &CacheEntry::new("v")).await.unwrap();

        assert_eq!(a.keys(), vec!["local"]);
        assert_eq!(b.keys(), vec!["remote"]);
    }

    #[tokio::test]
    async fn test_delete_reaches_every_tier() {
        let (a, b) = (tier(), tier());
        a.set("k", &CacheEntry::new("a")).await.unwrap();
        b.set("k", &CacheEntry::new("b")).await.unwrap();
        let composite = CompositeHandler::new(vec![a.clone() as SharedHandler, b.clone()]).unwrap();

        composite.delete("k").await.unwrap();

        assert!(a.is_empty() && b.is_empty());
    }
}
