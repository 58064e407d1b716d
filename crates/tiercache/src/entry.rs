//! Cache entry data model
//!
//! A [`CacheEntry`] is what every tier stores: an opaque [`Payload`], the
//! explicit tags attached at write time, the write timestamp, and an optional
//! [`Lifespan`] derived from a relative revalidate duration.

use std::{
    collections::BTreeMap,
    fmt,
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use serde::{Deserialize, Serialize};

/// One year, in seconds.
pub const DEFAULT_STALE_AGE: u64 = 31_536_000;

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn unix_now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Current wall-clock time in seconds since the Unix epoch.
pub fn unix_now_secs() -> u64 {
    unix_now_ms() / 1000
}

/// Application payload stored inside an entry.
///
/// Text and binary data are distinguished explicitly; binary leaves are
/// base64-encoded at the serialization boundary (see [`crate::codec`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum Payload {
    Text(String),
    #[serde(with = "crate::codec::base64_bytes")]
    Binary(Vec<u8>),
    Json(serde_json::Value),
    Map(BTreeMap<String, Payload>),
}

impl Payload {
    /// Build a map payload from `(name, payload)` pairs.
    pub fn map<K, I>(fields: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Payload)>,
    {
        Payload::Map(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Approximate in-memory size, used by the local tier's item limit.
    pub fn size_hint(&self) -> usize {
        match self {
            Payload::Text(text) => text.len(),
            Payload::Binary(bytes) => bytes.len(),
            Payload::Json(value) => value.to_string().len(),
            Payload::Map(fields) => fields
                .iter()
                .map(|(name, payload)| name.len() + payload.size_hint())
                .sum(),
        }
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::Text(text.to_string())
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Payload::Text(text)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Payload::Binary(bytes)
    }
}

/// Relative revalidate option supplied by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawRevalidate", into = "RawRevalidate")]
pub enum Revalidate {
    /// `revalidate: false`: never revalidated on a timer.
    Never,
    /// Revalidate after the given number of seconds.
    Seconds(u64),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawRevalidate {
    Flag(bool),
    Seconds(u64),
}

impl TryFrom<RawRevalidate> for Revalidate {
    type Error = String;

    fn try_from(raw: RawRevalidate) -> Result<Self, Self::Error> {
        match raw {
            RawRevalidate::Flag(false) => Ok(Revalidate::Never),
            RawRevalidate::Flag(true) => Err("revalidate must be false or a number".to_string()),
            RawRevalidate::Seconds(secs) => Ok(Revalidate::Seconds(secs)),
        }
    }
}

impl From<Revalidate> for RawRevalidate {
    fn from(revalidate: Revalidate) -> Self {
        match revalidate {
            Revalidate::Never => RawRevalidate::Flag(false),
            Revalidate::Seconds(secs) => RawRevalidate::Seconds(secs),
        }
    }
}

/// Absolute and relative staleness timestamps of an entry, in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lifespan {
    pub last_modified_at: u64,
    pub stale_at: u64,
    pub expire_at: u64,
    pub stale_age: u64,
    pub expire_age: u64,
    pub revalidate: Option<Revalidate>,
}

/// The unit of storage shared by every tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub value: Option<Payload>,
    /// Milliseconds since the Unix epoch.
    pub last_modified: u64,
    #[serde(default)]
    pub tags: Vec<String>,
    pub lifespan: Option<Lifespan>,
}

impl CacheEntry {
    /// Create an always-fresh entry stamped with the current time.
    pub fn new(value: impl Into<Payload>) -> Self {
        Self {
            value: Some(value.into()),
            last_modified: unix_now_ms(),
            tags: Vec::new(),
            lifespan: None,
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_lifespan(mut self, lifespan: Lifespan) -> Self {
        self.lifespan = Some(lifespan);
        self
    }

    pub fn with_last_modified(mut self, last_modified_ms: u64) -> Self {
        self.last_modified = last_modified_ms;
        self
    }

    /// Absolute expiry in seconds, if the entry has a lifespan.
    pub fn expire_at(&self) -> Option<u64> {
        self.lifespan.as_ref().map(|lifespan| lifespan.expire_at)
    }

    /// Past `expireAt`: must not be served.
    pub fn is_expired_at(&self, now_secs: u64) -> bool {
        self.expire_at().is_some_and(|expire_at| expire_at < now_secs)
    }

    /// Past `staleAt`: may be served while a refresh happens.
    pub fn is_stale_at(&self, now_secs: u64) -> bool {
        self.lifespan
            .as_ref()
            .is_some_and(|lifespan| lifespan.stale_at < now_secs)
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    pub fn size_hint(&self) -> usize {
        self.value.as_ref().map_or(0, Payload::size_hint)
            + self.tags.iter().map(String::len).sum::<usize>()
    }
}

/// Maps a stale age to an expire age.
pub type ExpireAgeEstimator = Arc<dyn Fn(u64) -> u64 + Send + Sync>;

/// Time-to-live parameters used to derive lifespans.
#[derive(Clone)]
pub struct TtlParameters {
    /// Stale age used for `revalidate: false`, in seconds.
    pub default_stale_age: u64,
    estimate_expire_age: ExpireAgeEstimator,
}

impl TtlParameters {
    pub fn new(default_stale_age: u64) -> Self {
        Self {
            default_stale_age,
            estimate_expire_age: Arc::new(default_expire_age),
        }
    }

    /// Replace the stale-to-expire estimator.
    pub fn with_estimator<F>(mut self, estimator: F) -> Self
    where
        F: Fn(u64) -> u64 + Send + Sync + 'static,
    {
        self.estimate_expire_age = Arc::new(estimator);
        self
    }

    /// Expire age for `stale_age`; never shorter than the stale age itself.
    pub fn expire_age(&self, stale_age: u64) -> u64 {
        (self.estimate_expire_age)(stale_age).max(stale_age)
    }

    /// Derive the lifespan of an entry written at `last_modified_ms`.
    ///
    /// Returns `None` when the host supplied no revalidate option, meaning the
    /// entry is always fresh.
    pub fn lifespan_for(
        &self,
        last_modified_ms: u64,
        revalidate: Option<Revalidate>,
    ) -> Option<Lifespan> {
        let revalidate = revalidate?;
        let stale_age = match revalidate {
            Revalidate::Never => self.default_stale_age,
            Revalidate::Seconds(secs) => secs,
        };
        let expire_age = self.expire_age(stale_age);
        let last_modified_at = last_modified_ms / 1000;

        Some(Lifespan {
            last_modified_at,
            stale_at: last_modified_at.saturating_add(stale_age),
            expire_at: last_modified_at.saturating_add(expire_age),
            stale_age,
            expire_age,
            revalidate: Some(revalidate),
        })
    }
}

impl Default for TtlParameters {
    fn default() -> Self {
        Self::new(DEFAULT_STALE_AGE)
    }
}

impl fmt::Debug for TtlParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TtlParameters")
            .field("default_stale_age", &self.default_stale_age)
            .finish_non_exhaustive()
    }
}

/// `staleAge * 1.5`, rounded down.
pub fn default_expire_age(stale_age: u64) -> u64 {
    stale_age.saturating_add(stale_age / 2)
}
