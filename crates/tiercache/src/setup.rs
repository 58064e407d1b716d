//! Default handler wiring
//!
//! With a reachable Redis the handler set is a composite of the local tier
//! and the remote tier; entries tagged [`MEMORY_CACHE_TAG`] are written to the
//! local tier, everything else to Redis. Without Redis the local tier serves
//! alone.

use std::sync::Arc;

use tracing::{info, warn};

use crate::{
    handler::{CompositeHandler, LocalHandler, LoggingHandler, RemoteHandler, SharedHandler},
    orchestrator::{CacheHandler, CacheHandlerConfig},
    registry::{CreationContext, Registry},
    settings::Settings,
    store::{KeyValueStore, RedisStore},
    CacheError, Result,
};

/// Entries carrying this tag stay in process memory.
pub const MEMORY_CACHE_TAG: &str = "memory-cache";

/// Connect to Redis (when configured) and build the handler set.
pub async fn create_cache_config(
    settings: &Settings,
    ctx: CreationContext,
) -> Result<CacheHandlerConfig> {
    let store = match settings.redis_url.as_deref() {
        Some(url) => connect(settings, url, &ctx).await?,
        None => {
            info!("No Redis URL configured");
            None
        }
    };
    build_handlers(settings, &ctx, store)
}

async fn connect(
    settings: &Settings,
    url: &str,
    ctx: &CreationContext,
) -> Result<Option<Arc<dyn KeyValueStore>>> {
    info!("Connecting Redis client...");
    match RedisStore::connect(url, settings.timeout()).await {
        Ok(store) => {
            if settings.single_connection {
                let registry = ctx.registry.clone();
                store.on_connection_error(Arc::new(move |error: &CacheError| {
                    warn!(error = %error, "Redis connection failed, clearing cache configuration");
                    registry.invalidate();
                }));
            }
            let store: Arc<dyn KeyValueStore> = Arc::new(store);
            Ok(Some(store))
        }
        Err(e @ CacheError::InvalidConfiguration { .. }) => Err(e),
        Err(e) => {
            warn!(error = %e, "Failed to connect Redis client");
            Ok(None)
        }
    }
}

/// Assemble the handler set over an already-connected remote store.
pub fn build_handlers(
    settings: &Settings,
    ctx: &CreationContext,
    remote: Option<Arc<dyn KeyValueStore>>,
) -> Result<CacheHandlerConfig> {
    let local = wrap(settings, Arc::new(LocalHandler::new(settings.local_options())?));

    let Some(store) = remote else {
        warn!("Using local cache only");
        return Ok(CacheHandlerConfig::new(vec![local]).with_ttl(settings.ttl()));
    };

    let remote = RemoteHandler::new(store, settings.remote_options(ctx.build_id.as_deref()))?;
    let remote = wrap(settings, Arc::new(remote));
    let composite = CompositeHandler::new(vec![local, remote])?
        .with_set_strategy(|entry| if entry.has_tag(MEMORY_CACHE_TAG) { 0 } else { 1 });

    info!("Using composite cache (local + Redis)");
    Ok(CacheHandlerConfig::new(vec![Arc::new(composite)]).with_ttl(settings.ttl()))
}

fn wrap(settings: &Settings, handler: SharedHandler) -> SharedHandler {
    if settings.debug {
        Arc::new(LoggingHandler::new(handler))
    } else {
        handler
    }
}

/// Build a [`CacheHandler`] whose handler set is created from `settings` on
/// first use.
pub fn cache_handler(settings: Settings) -> CacheHandler {
    let build_id = settings.build_id.clone();
    let settings = Arc::new(settings);
    let registry = Registry::with_build_id(build_id, move |ctx| {
        let settings = settings.clone();
        async move { create_cache_config(&settings, ctx).await }
    });
    CacheHandler::new(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        handler::{GetMeta, Handler},
        store::MemoryStore,
        CacheEntry,
    };

    fn context() -> CreationContext {
        CreationContext::detached(None)
    }

    #[tokio::test]
    async fn test_local_only_without_url() {
        let config = create_cache_config(&Settings::default(), context())
            .await
            .unwrap();
        assert_eq!(config.handlers.len(), 1);
        assert_eq!(config.handlers[0].name(), "local-lru");
    }

    #[tokio::test]
    async fn test_invalid_url_is_fatal() {
        let settings = Settings {
            redis_url: Some("not a url".to_string()),
            ..Default::default()
        };
        let err = create_cache_config(&settings, context()).await.err().unwrap();
        assert!(matches!(err, CacheError::InvalidConfiguration { .. }));
    }

    #[tokio::test]
    async fn test_memory_cache_tag_routes_to_local_tier() {
        let store = Arc::new(MemoryStore::new());
        let settings = Settings {
            debug: true,
            ..Default::default()
        };
        let config = build_handlers(&settings, &context(), Some(store.clone())).unwrap();
        let composite = &config.handlers[0];
        assert_eq!(composite.name(), "composite");

        composite
            .set("hot", &CacheEntry::new("v").with_tags([MEMORY_CACHE_TAG]))
            .await
            .unwrap();
        composite.set("cold", &CacheEntry::new("v")).await.unwrap();

        assert!(!store.contains_key("nextjs:hot"));
        assert!(store.contains_key("nextjs:cold"));
        assert!(composite
            .get("hot", &GetMeta::default())
            .await
            .unwrap()
            .is_some());
    }
}
