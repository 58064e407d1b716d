//! Runtime configuration
//!
//! Settings come from an optional TOML file overlaid with `TIERCACHE_*`
//! environment variables, e.g. `TIERCACHE_REDIS_URL`,
//! `TIERCACHE_SINGLE_CONNECTION`, `TIERCACHE_DEBUG`, `TIERCACHE_BUILD_ID`.

use std::{path::Path, time::Duration};

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::{
    entry::DEFAULT_STALE_AGE,
    handler::{ExpirationStrategy, LocalHandlerOptions, RemoteHandlerOptions},
    tag_index::DEFAULT_SCAN_COUNT,
    CacheError, Result, TtlParameters,
};

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "TIERCACHE";

/// Configuration file read by [`Settings::load`] when present.
pub const DEFAULT_CONFIG_FILE: &str = "tiercache.toml";

/// Cache settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Remote store URL; without one only the local tier is used.
    pub redis_url: Option<String>,
    /// Clear the memoized handler set when the connection fails.
    pub single_connection: bool,
    /// Wrap every tier in a debug logging handler.
    pub debug: bool,
    /// Deployment identifier appended to the key prefix.
    pub build_id: Option<String>,
    pub key_prefix: String,
    /// Per-call remote deadline; 0 disables it.
    pub timeout_ms: u64,
    pub revalidate_tag_query_size: usize,
    pub expiration_strategy: ExpirationStrategy,
    /// Seconds; applies to entries written with `revalidate: false`.
    pub default_stale_age: u64,
    pub local_max_items: usize,
    pub local_max_item_size_bytes: usize,
    /// Listen address of the HTTP server.
    pub bind_addr: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            redis_url: None,
            single_connection: false,
            debug: false,
            build_id: None,
            key_prefix: "nextjs:".to_string(),
            timeout_ms: 5_000,
            revalidate_tag_query_size: DEFAULT_SCAN_COUNT,
            expiration_strategy: ExpirationStrategy::default(),
            default_stale_age: DEFAULT_STALE_AGE,
            local_max_items: 1_000,
            local_max_item_size_bytes: 100 * 1024 * 1024,
            bind_addr: "127.0.0.1:3000".to_string(),
        }
    }
}

impl Settings {
    /// Load from `tiercache.toml` (if present) and `TIERCACHE_*` variables.
    pub fn load() -> Result<Self> {
        Self::from_sources(Some(Path::new(DEFAULT_CONFIG_FILE)), ENV_PREFIX)
    }

    /// Load from an optional file and environment variables under `env_prefix`.
    pub fn from_sources(file: Option<&Path>, env_prefix: &str) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(File::from(path).required(false));
        }
        builder = builder.add_source(Environment::with_prefix(env_prefix).try_parsing(true));

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.revalidate_tag_query_size == 0 {
            return Err(CacheError::invalid_config(
                "revalidate_tag_query_size must be greater than 0",
            ));
        }
        if self.local_max_items == 0 {
            return Err(CacheError::invalid_config(
                "local_max_items must be greater than 0",
            ));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Key prefix namespaced by `build_id` when one is known.
    pub fn effective_key_prefix(&self, build_id: Option<&str>) -> String {
        match build_id.or(self.build_id.as_deref()) {
            Some(build_id) if !build_id.is_empty() => format!("{}{build_id}:", self.key_prefix),
            _ => self.key_prefix.clone(),
        }
    }

    pub fn remote_options(&self, build_id: Option<&str>) -> RemoteHandlerOptions {
        RemoteHandlerOptions {
            key_prefix: self.effective_key_prefix(build_id),
            timeout: self.timeout(),
            expiration_strategy: self.expiration_strategy,
            revalidate_tag_query_size: self.revalidate_tag_query_size,
            ..Default::default()
        }
    }

    pub fn local_options(&self) -> LocalHandlerOptions {
        LocalHandlerOptions {
            max_items: self.local_max_items,
            max_item_size_bytes: self.local_max_item_size_bytes,
        }
    }

    pub fn ttl(&self) -> TtlParameters {
        TtlParameters::new(self.default_stale_age)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_defaults_without_sources() {
        let settings = Settings::from_sources(None, "TIERCACHE_TEST_EMPTY").unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.effective_key_prefix(None), "nextjs:");
    }

    #[test]
    fn test_file_and_environment_are_merged() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "redis_url = \"redis://cache:6379\"\nexpiration_strategy = \"EXAT\"\ntimeout_ms = 250"
        )
        .unwrap();
        std::env::set_var("TIERCACHE_TEST_MERGE_BUILD_ID", "b42");
        std::env::set_var("TIERCACHE_TEST_MERGE_SINGLE_CONNECTION", "true");

        let settings = Settings::from_sources(Some(file.path()), "TIERCACHE_TEST_MERGE").unwrap();

        assert_eq!(settings.redis_url.as_deref(), Some("redis://cache:6379"));
        assert_eq!(settings.expiration_strategy, ExpirationStrategy::ExAt);
        assert_eq!(settings.timeout(), Duration::from_millis(250));
        assert!(settings.single_connection);
        assert_eq!(settings.effective_key_prefix(None), "nextjs:b42:");
        assert_eq!(settings.remote_options(Some("ctx")).key_prefix, "nextjs:ctx:");
    }

    #[test]
    fn test_unknown_strategy_is_invalid_configuration() {
        std::env::set_var("TIERCACHE_TEST_STRATEGY_EXPIRATION_STRATEGY", "PX");
        let err = Settings::from_sources(None, "TIERCACHE_TEST_STRATEGY").unwrap_err();
        assert!(matches!(err, CacheError::InvalidConfiguration { .. }));
    }

    #[test]
    fn test_validation_rejects_zero_sizes() {
        let settings = Settings {
            revalidate_tag_query_size: 0,
            ..Default::default()
        };
        assert!(settings.validate().is_err());

        let settings = Settings {
            local_max_items: 0,
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }
}
