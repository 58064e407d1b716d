//! Request and response models

use serde::{Deserialize, Serialize};
use tiercache::{CacheEntry, Payload, Revalidate};

/// `?tag=` query
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TagQuery {
    pub tag: Option<String>,
}

/// `?path=` query
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathQuery {
    pub path: Option<String>,
}

/// `?action=` query of the debug endpoint
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DebugQuery {
    pub action: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevalidateTagResponse {
    pub revalidated: bool,
    pub tag: String,
    /// RFC 3339
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevalidatePathResponse {
    pub revalidated: bool,
    pub path: String,
    /// RFC 3339
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime: u64,
    pub cache_handler: String,
}

/// Body of `PUT /api/cache/*key`
#[derive(Debug, Clone, Deserialize)]
pub struct PutEntryRequest {
    pub value: Option<Payload>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// `false` or seconds; absent means never stale
    pub revalidate: Option<Revalidate>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EntryResponse {
    pub key: String,
    pub entry: CacheEntry,
}
