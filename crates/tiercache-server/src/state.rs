//! Application state shared by all handlers

use std::{sync::Arc, time::Instant};

use tiercache::{setup, CacheHandler, Settings};

/// Application state
#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<CacheHandler>,
    pub settings: Arc<Settings>,
    /// Server start time for uptime calculation
    pub start_time: Instant,
}

impl AppState {
    pub fn new(cache: Arc<CacheHandler>, settings: Settings) -> Self {
        Self {
            cache,
            settings: Arc::new(settings),
            start_time: Instant::now(),
        }
    }

    /// State whose cache is built from `settings` on first use.
    pub fn from_settings(settings: Settings) -> Self {
        let cache = Arc::new(setup::cache_handler(settings.clone()));
        Self::new(cache, settings)
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Remote key prefix in effect, for inspection hints.
    pub fn key_prefix(&self) -> String {
        self.settings.effective_key_prefix(None)
    }
}
