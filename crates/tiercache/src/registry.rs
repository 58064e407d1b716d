//! One-shot, shared initialization of the handler set
//!
//! The first caller of [`Registry::resolve`] runs the initializer; every
//! caller arriving while it is in flight awaits the same shared future. A
//! successful result is memoized until [`Registry::invalidate`] (or a
//! [`RegistryHandle`] held by a connection-error listener) clears it. A failed
//! initialization is handed to all waiters and is not memoized.

use std::{
    future::Future,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Weak,
    },
};

use futures::{
    future::{BoxFuture, Shared},
    FutureExt,
};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::{orchestrator::CacheHandlerConfig, CacheError, Result};

type SharedInit =
    Shared<BoxFuture<'static, std::result::Result<Arc<CacheHandlerConfig>, Arc<CacheError>>>>;

type Initializer =
    Arc<dyn Fn(CreationContext) -> BoxFuture<'static, Result<CacheHandlerConfig>> + Send + Sync>;

enum InitState {
    Idle,
    Pending { generation: u64, init: SharedInit },
    Ready { generation: u64, config: Arc<CacheHandlerConfig> },
}

/// Inputs handed to the initializer.
#[derive(Clone)]
pub struct CreationContext {
    /// Deployment identifier used to namespace keys.
    pub build_id: Option<String>,
    /// Lets the produced handlers clear this configuration later.
    pub registry: RegistryHandle,
}

impl CreationContext {
    /// Context not attached to any registry.
    pub fn detached(build_id: Option<String>) -> Self {
        Self {
            build_id,
            registry: RegistryHandle {
                registry: Weak::new(),
                generation: 0,
            },
        }
    }
}

/// Weak reference to a [`Registry`], scoped to one initialization.
#[derive(Clone)]
pub struct RegistryHandle {
    registry: Weak<Registry>,
    generation: u64,
}

impl RegistryHandle {
    /// Clear the configuration this handle was created for. A newer
    /// configuration is left untouched.
    pub fn invalidate(&self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.invalidate_generation(self.generation);
        }
    }
}

/// Memoized source of the process-wide [`CacheHandlerConfig`].
pub struct Registry {
    initializer: Initializer,
    build_id: Option<String>,
    state: Mutex<InitState>,
    generations: AtomicU64,
}

impl Registry {
    pub fn new<F, Fut>(initializer: F) -> Arc<Self>
    where
        F: Fn(CreationContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<CacheHandlerConfig>> + Send + 'static,
    {
        Self::with_build_id(None, initializer)
    }

    /// Registry whose initializer receives `build_id` in its context.
    pub fn with_build_id<F, Fut>(build_id: Option<String>, initializer: F) -> Arc<Self>
    where
        F: Fn(CreationContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<CacheHandlerConfig>> + Send + 'static,
    {
        Arc::new(Self {
            initializer: Arc::new(move |ctx: CreationContext| initializer(ctx).boxed()),
            build_id,
            state: Mutex::new(InitState::Idle),
            generations: AtomicU64::new(0),
        })
    }

    /// The memoized configuration, if setup has completed.
    pub fn peek(&self) -> Option<Arc<CacheHandlerConfig>> {
        match &*self.state.lock() {
            InitState::Ready { config, .. } => Some(config.clone()),
            _ => None,
        }
    }

    /// Return the configuration, running setup at most once concurrently.
    pub async fn resolve(self: &Arc<Self>) -> Result<Arc<CacheHandlerConfig>> {
        let (generation, init) = {
            let mut state = self.state.lock();
            let in_flight = match &*state {
                InitState::Ready { config, .. } => return Ok(config.clone()),
                InitState::Pending { generation, init } => Some((*generation, init.clone())),
                InitState::Idle => None,
            };
            match in_flight {
                Some(in_flight) => in_flight,
                None => {
                    let generation = self.generations.fetch_add(1, Ordering::SeqCst) + 1;
                    let ctx = CreationContext {
                        build_id: self.build_id.clone(),
                        registry: RegistryHandle {
                            registry: Arc::downgrade(self),
                            generation,
                        },
                    };
                    debug!(generation, "Initializing cache handlers");
                    let init = (self.initializer)(ctx)
                        .map(|result| result.map(Arc::new).map_err(Arc::new))
                        .boxed()
                        .shared();
                    *state = InitState::Pending {
                        generation,
                        init: init.clone(),
                    };
                    (generation, init)
                }
            }
        };

        let outcome = init.await;

        let mut state = self.state.lock();
        let current = matches!(
            &*state,
            InitState::Pending { generation: pending, .. } if *pending == generation
        );
        match outcome {
            Ok(config) => {
                if current {
                    info!(generation, handlers = config.handlers.len(), "Cache handlers ready");
                    *state = InitState::Ready {
                        generation,
                        config: config.clone(),
                    };
                }
                Ok(config)
            }
            Err(error) => {
                if current {
                    *state = InitState::Idle;
                }
                Err(CacheError::Initialization(error))
            }
        }
    }

    /// Drop any memoized or in-flight configuration.
    pub fn invalidate(&self) {
        *self.state.lock() = InitState::Idle;
    }

    fn invalidate_generation(&self, generation: u64) {
        let mut state = self.state.lock();
        let matches = match &*state {
            InitState::Pending { generation: g, .. } | InitState::Ready { generation: g, .. } => {
                *g == generation
            }
            InitState::Idle => false,
        };
        if matches {
            info!(generation, "Cache configuration invalidated");
            *state = InitState::Idle;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::atomic::AtomicUsize, time::Duration};

    use super::*;

    fn counting_registry(calls: Arc<AtomicUsize>) -> Arc<Registry> {
        Registry::new(move |_| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok(CacheHandlerConfig::new(Vec::new()))
            }
        })
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_initialization() {
        let calls = Arc::new(AtomicUsize::new(0));
        let registry = counting_registry(calls.clone());

        let results = futures::future::join_all((0..8).map(|_| registry.resolve())).await;

        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(registry.peek().is_some());
    }

    #[tokio::test]
    async fn test_invalidate_forces_rebuild() {
        let calls = Arc::new(AtomicUsize::new(0));
        let registry = counting_registry(calls.clone());

        registry.resolve().await.unwrap();
        registry.invalidate();
        assert!(registry.peek().is_none());
        registry.resolve().await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_stale_handle_leaves_newer_config() {
        let handles = Arc::new(Mutex::new(Vec::new()));
        let captured = handles.clone();
        let registry = Registry::new(move |ctx: CreationContext| {
            captured.lock().push(ctx.registry);
            async { Ok(CacheHandlerConfig::new(Vec::new())) }
        });

        registry.resolve().await.unwrap();
        let first = handles.lock()[0].clone();
        first.invalidate();
        registry.resolve().await.unwrap();

        first.invalidate();
        assert!(registry.peek().is_some());

        let second = handles.lock()[1].clone();
        second.invalidate();
        assert!(registry.peek().is_none());
    }

    #[tokio::test]
    async fn test_failure_is_shared_and_not_memoized() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let registry = Registry::new(move |_| {
            let attempt = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt == 0 {
                    Err(CacheError::not_ready("connection refused"))
                } else {
                    Ok(CacheHandlerConfig::new(Vec::new()))
                }
            }
        });

        let err = registry.resolve().await.err().unwrap();
        assert!(err.is_connection_error());
        assert!(registry.resolve().await.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
