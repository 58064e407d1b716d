//! Read order and broadcast behaviour of the composite tier

use std::sync::Arc;

use tiercache::{
    handler::{
        CompositeHandler, LocalHandler, LocalHandlerOptions, RemoteHandler, RemoteHandlerOptions,
    },
    store::MemoryStore,
    CacheEntry, CacheError, GetMeta, Handler, Payload, SharedHandler,
};

struct Tiers {
    local: Arc<LocalHandler>,
    remote: Arc<RemoteHandler>,
    store: Arc<MemoryStore>,
    composite: CompositeHandler,
}

fn tiers() -> Tiers {
    let store = Arc::new(MemoryStore::new());
    let local = Arc::new(LocalHandler::new(LocalHandlerOptions::default()).unwrap());
    let remote = Arc::new(RemoteHandler::new(store.clone(), RemoteHandlerOptions::default()).unwrap());
    let composite =
        CompositeHandler::new(vec![local.clone() as SharedHandler, remote.clone()]).unwrap();
    Tiers {
        local,
        remote,
        store,
        composite,
    }
}

#[tokio::test]
async fn test_first_hit_wins_without_promotion() {
    let tiers = tiers();
    let meta = GetMeta::default();
    tiers
        .remote
        .set("k", &CacheEntry::new("from-remote"))
        .await
        .unwrap();

    let found = tiers.composite.get("k", &meta).await.unwrap().unwrap();
    assert_eq!(found.value, Some(Payload::from("from-remote")));
    assert!(tiers.local.is_empty());

    tiers
        .local
        .set("k", &CacheEntry::new("from-local"))
        .await
        .unwrap();
    tiers.store.set_ready(false);

    let found = tiers.composite.get("k", &meta).await.unwrap().unwrap();
    assert_eq!(found.value, Some(Payload::from("from-local")));
}

#[tokio::test]
async fn test_default_strategy_writes_only_the_first_tier() {
    let tiers = tiers();

    tiers
        .composite
        .set("k", &CacheEntry::new("v"))
        .await
        .unwrap();

    assert_eq!(tiers.local.len(), 1);
    assert!(!tiers.store.contains_key("k"));
}

#[tokio::test]
async fn test_failing_tier_fails_the_broadcast_after_the_others_ran() {
    let tiers = tiers();
    tiers
        .local
        .set("k", &CacheEntry::new("v").with_tags(["t"]))
        .await
        .unwrap();
    tiers.store.set_ready(false);

    let err = tiers.composite.revalidate_tag("t", None).await.unwrap_err();

    assert!(matches!(err, CacheError::BackendNotReady { .. }));
    assert!(tiers.local.is_empty());
}

#[tokio::test]
async fn test_revalidate_reaches_every_tier() {
    let tiers = tiers();
    let meta = GetMeta::default();
    tiers
        .local
        .set("a", &CacheEntry::new("v").with_tags(["t"]))
        .await
        .unwrap();
    tiers
        .remote
        .set("b", &CacheEntry::new("v").with_tags(["t"]))
        .await
        .unwrap();

    tiers.composite.revalidate_tag("t", None).await.unwrap();

    assert!(tiers.composite.get("a", &meta).await.unwrap().is_none());
    assert!(tiers.composite.get("b", &meta).await.unwrap().is_none());
}
