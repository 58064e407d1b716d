//! Cache tier handlers
//!
//! Every tier, and the composite that fans out across tiers, implements
//! [`Handler`]. Tiers are picked when the handler set is assembled; the
//! orchestrator only ever sees trait objects.

pub mod composite;
pub mod local;
pub mod logging;
pub mod remote;

use std::{collections::BTreeSet, sync::Arc};

use async_trait::async_trait;

use crate::{CacheEntry, Result};

pub use composite::{CompositeHandler, SetStrategy};
pub use local::{LocalHandler, LocalHandlerOptions};
pub use logging::LoggingHandler;
pub use remote::{ExpirationStrategy, RemoteHandler, RemoteHandlerOptions};

/// Shared handle to any tier.
pub type SharedHandler = Arc<dyn Handler>;

/// Per-read context supplied by the host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GetMeta {
    /// Framework-derived tags that apply to this read in addition to the
    /// entry's own tags.
    pub implicit_tags: Vec<String>,
}

impl GetMeta {
    pub fn new<I, S>(implicit_tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            implicit_tags: implicit_tags.into_iter().map(Into::into).collect(),
        }
    }

    /// `entry.tags ∪ implicit_tags`, deduplicated.
    pub fn combined_tags(&self, entry: &CacheEntry) -> Vec<String> {
        let combined: BTreeSet<&String> = entry.tags.iter().chain(&self.implicit_tags).collect();
        combined.into_iter().cloned().collect()
    }
}

/// Optional durations passed along with a tag revalidation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RevalidateDurations {
    /// Seconds after which revalidated entries expire.
    pub expire: Option<u64>,
}

/// Storage tier contract.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Fetch the entry at `key`, or `None` on a miss.
    async fn get(&self, key: &str, meta: &GetMeta) -> Result<Option<CacheEntry>>;

    /// Store `entry` at `key`, replacing any previous version.
    async fn set(&self, key: &str, entry: &CacheEntry) -> Result<()>;

    /// Invalidate every entry carrying `tag`.
    async fn revalidate_tag(&self, tag: &str, durations: Option<RevalidateDurations>)
        -> Result<()>;

    /// Remove the entry at `key`.
    async fn delete(&self, key: &str) -> Result<()>;
}
