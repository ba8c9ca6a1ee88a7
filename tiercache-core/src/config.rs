//! Configuration types

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

const DAY_SECS: u64 = 24 * 60 * 60;

pub const DEFAULT_PARTITION_VERSION: u32 = 1;
pub const DEFAULT_STORE_MAX_SIZE_MB: usize = 256;
pub const DEFAULT_EPHEMERAL_MAX_SIZE: usize = 100;
pub const DEFAULT_EPHEMERAL_TTL_SECS: u64 = 5 * 60;
pub const DEFAULT_EPHEMERAL_SWEEP_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_IMAGE_FRESHNESS_SECS: u64 = 30 * DAY_SECS;
pub const DEFAULT_API_FRESHNESS_SECS: u64 = 5 * 60;
pub const DEFAULT_STATIC_FRESHNESS_SECS: u64 = 7 * DAY_SECS;
pub const DEFAULT_PAGE_FRESHNESS_SECS: u64 = DAY_SECS;
pub const DEFAULT_PAGE_ROOT: &str = "/";

/// Master configuration for a tiercache engine.
///
/// Every field has a default so a host can deserialize a partial TOML file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierCacheConfig {
    /// Active partition version `N` (`<purpose>-v<N>`).
    pub partition_version: u32,
    /// LMDB directory for the durable tier. In-memory store when unset.
    pub store_path: Option<PathBuf>,
    /// LMDB map size in megabytes.
    pub store_max_size_mb: usize,

    // Ephemeral tier
    pub ephemeral_max_size: usize,
    pub ephemeral_ttl_secs: u64,
    pub ephemeral_sweep_interval_secs: u64,

    /// Per-fetch timeout in milliseconds. Disabled when unset.
    pub fetch_timeout_ms: Option<u64>,

    // Freshness windows per bucket
    pub image_freshness_secs: u64,
    pub api_freshness_secs: u64,
    pub static_freshness_secs: u64,
    pub page_freshness_secs: u64,

    /// The single page path that may be served from cache after a network failure.
    pub page_root: String,
    /// Absolute URLs fetched into the new partitions before a version is activated.
    pub precache: Vec<String>,
}

impl Default for TierCacheConfig {
    fn default() -> Self {
        Self {
            partition_version: DEFAULT_PARTITION_VERSION,
            store_path: None,
            store_max_size_mb: DEFAULT_STORE_MAX_SIZE_MB,
            ephemeral_max_size: DEFAULT_EPHEMERAL_MAX_SIZE,
            ephemeral_ttl_secs: DEFAULT_EPHEMERAL_TTL_SECS,
            ephemeral_sweep_interval_secs: DEFAULT_EPHEMERAL_SWEEP_INTERVAL_SECS,
            fetch_timeout_ms: None,
            image_freshness_secs: DEFAULT_IMAGE_FRESHNESS_SECS,
            api_freshness_secs: DEFAULT_API_FRESHNESS_SECS,
            static_freshness_secs: DEFAULT_STATIC_FRESHNESS_SECS,
            page_freshness_secs: DEFAULT_PAGE_FRESHNESS_SECS,
            page_root: DEFAULT_PAGE_ROOT.to_string(),
            precache: Vec::new(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

impl TierCacheConfig {
    /// Create from environment variables with fallback to defaults.
    ///
    /// Environment variables:
    /// - `TIERCACHE_PARTITION_VERSION` (default: 1)
    /// - `TIERCACHE_STORE_PATH` (default: unset, in-memory store)
    /// - `TIERCACHE_STORE_MAX_SIZE_MB` (default: 256)
    /// - `TIERCACHE_EPHEMERAL_MAX_SIZE` (default: 100)
    /// - `TIERCACHE_EPHEMERAL_TTL_SECS` (default: 300)
    /// - `TIERCACHE_EPHEMERAL_SWEEP_INTERVAL_SECS` (default: 60)
    /// - `TIERCACHE_FETCH_TIMEOUT_MS` (default: unset)
    /// - `TIERCACHE_IMAGE_FRESHNESS_SECS`, `TIERCACHE_API_FRESHNESS_SECS`,
    ///   `TIERCACHE_STATIC_FRESHNESS_SECS`, `TIERCACHE_PAGE_FRESHNESS_SECS`
    /// - `TIERCACHE_PAGE_ROOT` (default: `/`)
    /// - `TIERCACHE_PRECACHE`: comma-separated absolute URLs (default: empty)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            partition_version: env_parse("TIERCACHE_PARTITION_VERSION")
                .unwrap_or(defaults.partition_version),
            store_path: std::env::var("TIERCACHE_STORE_PATH")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),
            store_max_size_mb: env_parse("TIERCACHE_STORE_MAX_SIZE_MB")
                .unwrap_or(defaults.store_max_size_mb),
            ephemeral_max_size: env_parse("TIERCACHE_EPHEMERAL_MAX_SIZE")
                .unwrap_or(defaults.ephemeral_max_size),
            ephemeral_ttl_secs: env_parse("TIERCACHE_EPHEMERAL_TTL_SECS")
                .unwrap_or(defaults.ephemeral_ttl_secs),
            ephemeral_sweep_interval_secs: env_parse("TIERCACHE_EPHEMERAL_SWEEP_INTERVAL_SECS")
                .unwrap_or(defaults.ephemeral_sweep_interval_secs),
            fetch_timeout_ms: env_parse("TIERCACHE_FETCH_TIMEOUT_MS"),
            image_freshness_secs: env_parse("TIERCACHE_IMAGE_FRESHNESS_SECS")
                .unwrap_or(defaults.image_freshness_secs),
            api_freshness_secs: env_parse("TIERCACHE_API_FRESHNESS_SECS")
                .unwrap_or(defaults.api_freshness_secs),
            static_freshness_secs: env_parse("TIERCACHE_STATIC_FRESHNESS_SECS")
                .unwrap_or(defaults.static_freshness_secs),
            page_freshness_secs: env_parse("TIERCACHE_PAGE_FRESHNESS_SECS")
                .unwrap_or(defaults.page_freshness_secs),
            page_root: std::env::var("TIERCACHE_PAGE_ROOT")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.page_root),
            precache: std::env::var("TIERCACHE_PRECACHE")
                .map(|s| {
                    s.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or(defaults.precache),
        }
    }

    /// Parse a TOML document. Missing fields take their defaults.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })
    }

    /// Load and validate a TOML file.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let config = Self::from_toml_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// Validates:
    /// - partition_version > 0
    /// - store_max_size_mb > 0 when a store path is set
    /// - sweep interval, ephemeral ttl and every freshness window are positive
    /// - fetch_timeout_ms, when set, is positive
    /// - page_root is an absolute path
    /// - precache entries are non-empty
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.partition_version == 0 {
            return Err(invalid(
                "partition_version",
                self.partition_version,
                "partition_version must be greater than 0",
            ));
        }

        if self.store_path.is_some() && self.store_max_size_mb == 0 {
            return Err(invalid(
                "store_max_size_mb",
                self.store_max_size_mb,
                "store_max_size_mb must be positive when store_path is set",
            ));
        }

        let positive = [
            ("ephemeral_ttl_secs", self.ephemeral_ttl_secs),
            ("ephemeral_sweep_interval_secs", self.ephemeral_sweep_interval_secs),
            ("image_freshness_secs", self.image_freshness_secs),
            ("api_freshness_secs", self.api_freshness_secs),
            ("static_freshness_secs", self.static_freshness_secs),
            ("page_freshness_secs", self.page_freshness_secs),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(invalid(field, value, "must be positive"));
            }
        }

        if self.fetch_timeout_ms == Some(0) {
            return Err(invalid("fetch_timeout_ms", 0, "must be positive when set"));
        }

        if !self.page_root.starts_with('/') {
            return Err(invalid(
                "page_root",
                &self.page_root,
                "page_root must be an absolute path",
            ));
        }

        if let Some(entry) = self.precache.iter().find(|e| e.trim().is_empty()) {
            return Err(invalid("precache", entry, "precache entries must not be empty"));
        }

        Ok(())
    }

    pub fn ephemeral_ttl(&self) -> Duration {
        Duration::from_secs(self.ephemeral_ttl_secs)
    }

    pub fn ephemeral_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.ephemeral_sweep_interval_secs)
    }

    pub fn fetch_timeout(&self) -> Option<Duration> {
        self.fetch_timeout_ms.map(Duration::from_millis)
    }

    pub fn image_freshness(&self) -> Duration {
        Duration::from_secs(self.image_freshness_secs)
    }

    pub fn api_freshness(&self) -> Duration {
        Duration::from_secs(self.api_freshness_secs)
    }

    pub fn static_freshness(&self) -> Duration {
        Duration::from_secs(self.static_freshness_secs)
    }

    pub fn page_freshness(&self) -> Duration {
        Duration::from_secs(self.page_freshness_secs)
    }
}

fn invalid(field: &str, value: impl ToString, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
