//! Host-facing cache facade
//!
//! [`CacheHandler`] resolves the handler set from its [`Registry`] on first
//! use, stamps writes with lifespans, merges host-supplied implicit tags into
//! reads and memoizes reads for the duration of one logical request.
//!
//! Memoization only happens inside [`CacheHandler::request_scope`]; each
//! scope owns its own map, so concurrent requests never observe each other's
//! reads.

use std::{
    collections::HashMap,
    future::Future,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use futures::future::join_all;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::{
    entry::{unix_now_ms, unix_now_secs},
    handler::{GetMeta, RevalidateDurations, SharedHandler},
    metrics::{CacheMetrics, CacheStats, OperationTimer},
    registry::Registry,
    tags::{implicit_tag_for_path, validate_tag},
    CacheEntry, Payload, Result, Revalidate, TtlParameters,
};

/// Handler set produced by the setup routine.
#[derive(Clone)]
pub struct CacheHandlerConfig {
    /// Consulted in order on read; every handler receives writes.
    pub handlers: Vec<SharedHandler>,
    pub ttl: TtlParameters,
}

impl CacheHandlerConfig {
    pub fn new(handlers: Vec<SharedHandler>) -> Self {
        Self {
            handlers,
            ttl: TtlParameters::default(),
        }
    }

    pub fn with_ttl(mut self, ttl: TtlParameters) -> Self {
        self.ttl = ttl;
        self
    }
}

/// Per-write options supplied by the host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetOptions {
    /// Explicit tags of the entry.
    pub tags: Vec<String>,
    /// `None` stores an always-fresh entry.
    pub revalidate: Option<Revalidate>,
    /// Overrides the write timestamp (ms).
    pub last_modified: Option<u64>,
}

impl SetOptions {
    pub fn tagged<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tags: tags.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn with_revalidate(mut self, revalidate: Revalidate) -> Self {
        self.revalidate = Some(revalidate);
        self
    }
}

tokio::task_local! {
    static REQUEST_SCOPE: RequestScope;
}

static NEXT_HANDLER_ID: AtomicU64 = AtomicU64::new(1);

/// Reads memoized by one handler during one logical request.
struct RequestScope {
    owner: u64,
    reads: Mutex<HashMap<String, Option<CacheEntry>>>,
}

/// Facade over the configured handler set.
pub struct CacheHandler {
    id: u64,
    registry: Arc<Registry>,
    metrics: CacheMetrics,
}

impl CacheHandler {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            id: NEXT_HANDLER_ID.fetch_add(1, Ordering::Relaxed),
            registry,
            metrics: CacheMetrics::new(),
        }
    }

    /// Run `fut` as one logical request: repeated reads of a key inside it
    /// are served from a memo that is dropped when `fut` completes.
    pub async fn request_scope<F: Future>(&self, fut: F) -> F::Output {
        let scope = RequestScope {
            owner: self.id,
            reads: Mutex::new(HashMap::new()),
        };
        REQUEST_SCOPE.scope(scope, fut).await
    }

    /// Apply `f` to this handler's memo in the current scope, if any.
    fn with_memo<R, F>(&self, f: F) -> Option<R>
    where
        F: FnOnce(&mut HashMap<String, Option<CacheEntry>>) -> R,
    {
        REQUEST_SCOPE
            .try_with(|scope| (scope.owner == self.id).then(|| f(&mut scope.reads.lock())))
            .ok()
            .flatten()
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Describes the resolved handler set without triggering setup.
    pub fn name(&self) -> String {
        match self.registry.peek() {
            Some(config) => format!("cache-handler with {} Handlers", config.handlers.len()),
            None => "cache-handler is not configured yet".to_string(),
        }
    }

    pub fn stats(&self) -> CacheStats {
        self.metrics.snapshot()
    }

    /// Fetch `key`, checking `implicit_tags` against revalidations.
    ///
    /// A handler failure is logged and the next handler is tried. Expired
    /// entries are deleted from every handler and reported as a miss.
    pub async fn get(&self, key: &str, implicit_tags: &[String]) -> Result<Option<CacheEntry>> {
        if let Some(cached) = self.with_memo(|reads| reads.get(key).cloned()).flatten() {
            self.metrics.record_request_cache_hit();
            return Ok(cached);
        }

        let config = self.registry.resolve().await?;
        let timer = OperationTimer::start();
        let meta = GetMeta {
            implicit_tags: implicit_tags.to_vec(),
        };

        let mut found = None;
        for handler in &config.handlers {
            match handler.get(key, &meta).await {
                Ok(Some(entry)) => {
                    found = Some(entry);
                    break;
                }
                Ok(None) => {}
                Err(e) => {
                    self.metrics.record_error();
                    warn!(handler = handler.name(), key = %key, error = %e, "Cache read failed");
                }
            }
        }

        if let Some(entry) = &found {
            if entry.is_expired_at(unix_now_secs()) {
                debug!(key = %key, "Dropping expired entry");
                self.metrics.record_expired();
                self.delete_everywhere(&config.handlers, key).await;
                found = None;
            }
        }

        match &found {
            Some(_) => self.metrics.record_hit(timer.elapsed()),
            None => self.metrics.record_miss(timer.elapsed()),
        }
        self.with_memo(|reads| reads.insert(key.to_string(), found.clone()));
        Ok(found)
    }

    /// Store `value` at `key` in every handler.
    ///
    /// Every handler is attempted; the first failure is returned.
    pub async fn set(&self, key: &str, value: Option<Payload>, options: &SetOptions) -> Result<()> {
        for tag in &options.tags {
            validate_tag(tag)?;
        }

        let config = self.registry.resolve().await?;
        let timer = OperationTimer::start();
        let last_modified = options.last_modified.unwrap_or_else(unix_now_ms);
        let entry = CacheEntry {
            value,
            last_modified,
            tags: options.tags.clone(),
            lifespan: config.ttl.lifespan_for(last_modified, options.revalidate),
        };

        self.with_memo(|reads| reads.remove(key));

        let results = join_all(config.handlers.iter().map(|handler| handler.set(key, &entry))).await;
        let outcome = self.first_failure("set", results);
        if outcome.is_ok() {
            self.metrics.record_store(timer.elapsed());
        }
        outcome
    }

    /// Invalidate every entry carrying `tag` in every handler.
    pub async fn revalidate_tag(&self, tag: &str, durations: Option<RevalidateDurations>) -> Result<()> {
        validate_tag(tag)?;
        let config = self.registry.resolve().await?;

        self.reset_request_cache();
        let results = join_all(
            config
                .handlers
                .iter()
                .map(|handler| handler.revalidate_tag(tag, durations)),
        )
        .await;
        let outcome = self.first_failure("revalidate_tag", results);
        if outcome.is_ok() {
            self.metrics.record_invalidation();
        }
        outcome
    }

    /// Revalidate the implicit tag of `path`.
    pub async fn revalidate_path(&self, path: &str) -> Result<()> {
        self.revalidate_tag(&implicit_tag_for_path(path), None).await
    }

    /// Forget reads memoized so far in the current request scope.
    pub fn reset_request_cache(&self) {
        self.with_memo(|reads| reads.clear());
    }

    async fn delete_everywhere(&self, handlers: &[SharedHandler], key: &str) {
        let results = join_all(handlers.iter().map(|handler| handler.delete(key))).await;
        if let Err(e) = self.first_failure("delete", results) {
            warn!(key = %key, error = %e, "Failed to delete expired entry");
        }
    }

    fn first_failure(&self, operation: &str, results: Vec<Result<()>>) -> Result<()> {
        let mut first = None;
        for error in results.into_iter().filter_map(|result| result.err()) {
            self.metrics.record_error();
            warn!(operation, error = %error, "Cache handler failed");
            first.get_or_insert(error);
        }
        first.map_or(Ok(()), Err)
    }
}
