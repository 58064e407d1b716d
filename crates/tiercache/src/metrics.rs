//! Cache handler metrics

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use serde::{Deserialize, Serialize};

/// Point-in-time view of [`CacheMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Reads answered by a tier
    pub hits: u64,
    /// Reads no tier could answer
    pub misses: u64,
    /// Reads answered by the per-request cache without touching a tier
    pub request_cache_hits: u64,
    /// Entries dropped on read because they had expired
    pub expired: u64,
    /// Successful writes
    pub stores: u64,
    /// Tag and path revalidations
    pub invalidations: u64,
    /// Operations that returned an error
    pub errors: u64,
    /// Average tier read time (milliseconds)
    pub avg_retrieval_time_ms: f64,
    /// Average write time (milliseconds)
    pub avg_store_time_ms: f64,
    pub uptime_secs: u64,
}

impl CacheStats {
    /// Hit rate as a percentage (0.0 to 100.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }

    /// Miss rate as a percentage (0.0 to 100.0)
    pub fn miss_rate(&self) -> f64 {
        if self.hits + self.misses == 0 {
            0.0
        } else {
            100.0 - self.hit_rate()
        }
    }
}

/// Thread-safe counters shared by clones.
#[derive(Debug, Clone)]
pub struct CacheMetrics {
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
    request_cache_hits: Arc<AtomicU64>,
    expired: Arc<AtomicU64>,
    stores: Arc<AtomicU64>,
    invalidations: Arc<AtomicU64>,
    errors: Arc<AtomicU64>,
    total_retrieval_time_us: Arc<AtomicU64>,
    total_store_time_us: Arc<AtomicU64>,
    created_at: Instant,
}

impl CacheMetrics {
    pub fn new() -> Self {
        Self {
            hits: Arc::new(AtomicU64::new(0)),
            misses: Arc::new(AtomicU64::new(0)),
            request_cache_hits: Arc::new(AtomicU64::new(0)),
            expired: Arc::new(AtomicU64::new(0)),
            stores: Arc::new(AtomicU64::new(0)),
            invalidations: Arc::new(AtomicU64::new(0)),
            errors: Arc::new(AtomicU64::new(0)),
            total_retrieval_time_us: Arc::new(AtomicU64::new(0)),
            total_store_time_us: Arc::new(AtomicU64::new(0)),
            created_at: Instant::now(),
        }
    }

    pub fn record_hit(&self, elapsed: Duration) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        self.total_retrieval_time_us
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_miss(&self, elapsed: Duration) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        self.total_retrieval_time_us
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_request_cache_hit(&self) {
        self.request_cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_expired(&self) {
        self.expired.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_store(&self, elapsed: Duration) {
        self.stores.fetch_add(1, Ordering::Relaxed);
        self.total_store_time_us
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_invalidation(&self) {
        self.invalidations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let stores = self.stores.load(Ordering::Relaxed);
        let retrieval_us = self.total_retrieval_time_us.load(Ordering::Relaxed);
        let store_us = self.total_store_time_us.load(Ordering::Relaxed);

        CacheStats {
            hits,
            misses,
            request_cache_hits: self.request_cache_hits.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
            stores,
            invalidations: self.invalidations.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            avg_retrieval_time_ms: average_ms(retrieval_us, hits + misses),
            avg_store_time_ms: average_ms(store_us, stores),
            uptime_secs: self.created_at.elapsed().as_secs(),
        }
    }

    pub fn reset(&self) {
        for counter in [
            &self.hits,
            &self.misses,
            &self.request_cache_hits,
            &self.expired,
            &self.stores,
            &self.invalidations,
            &self.errors,
            &self.total_retrieval_time_us,
            &self.total_store_time_us,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

impl Default for CacheMetrics {
    fn default() -> Self {
        Self::new()
    }
}

fn average_ms(total_us: u64, count: u64) -> f64 {
    if count == 0 {
        0.0
    } else {
        total_us as f64 / count as f64 / 1000.0
    }
}

/// Operation timing helper
#[derive(Debug)]
pub struct OperationTimer {
    start_time: Instant,
}

impl OperationTimer {
    pub fn start() -> Self {
        Self {
            start_time: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }
}
