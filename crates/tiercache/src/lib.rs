//! # tiercache
//!
//! Multi-tier cache handlers with time-based staleness and tag-based
//! invalidation that stays correct across processes sharing one Redis.
//!
//! ## Features
//!
//! - **Remote tier**: values, a shared tag index and a revalidation ledger in
//!   a Redis-compatible store; tag revalidation by index scan plus a lazy
//!   check on every read
//! - **Local tier**: bounded LRU map in process memory
//! - **Composite tier**: ordered reads, routed writes, broadcast invalidation
//! - **Orchestrator**: lifespans from revalidate durations, implicit tags,
//!   per-request read memoization, one-shot shared setup
//!
//! ```no_run
//! use tiercache::{setup, Settings, SetOptions, Revalidate};
//!
//! # async fn run() -> tiercache::Result<()> {
//! let cache = setup::cache_handler(Settings::load()?);
//! let options = SetOptions::tagged(["posts"]).with_revalidate(Revalidate::Seconds(60));
//! cache.set("/blog/1", Some("<html/>".into()), &options).await?;
//!
//! let page_tags = tiercache::tags::implicit_tags_for_path("/blog/1");
//! assert!(cache.get("/blog/1", &page_tags).await?.is_some());
//!
//! cache.revalidate_tag("posts", None).await?;
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod entry;
pub mod error;
pub mod handler;
pub mod metrics;
pub mod orchestrator;
pub mod registry;
pub mod settings;
pub mod setup;
pub mod store;
pub mod tag_index;
pub mod tags;

pub use entry::{CacheEntry, Lifespan, Payload, Revalidate, TtlParameters};
pub use error::{CacheError, Result};
pub use handler::{GetMeta, Handler, RevalidateDurations, SharedHandler};
pub use metrics::{CacheMetrics, CacheStats};
pub use orchestrator::{CacheHandler, CacheHandlerConfig, SetOptions};
pub use registry::{CreationContext, Registry, RegistryHandle};
pub use settings::Settings;
