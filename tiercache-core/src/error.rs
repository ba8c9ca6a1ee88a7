//! Error types for tiercache operations

use std::time::Duration;
use thiserror::Error;

/// Request-level failures surfaced by `respond`.
///
/// These never escape as raw errors: the engine folds them into a structured
/// resolution that callers can inspect.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResourceError {
    #[error("Network unavailable for {key}: {reason}")]
    NetworkUnavailable { key: String, reason: String },

    #[error("Resource not found: {key}")]
    NotFound { key: String },

    #[error("Unclassified request: {reason}")]
    Unclassified { reason: String },
}

impl ResourceError {
    /// Stable machine-readable name of the failure kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NetworkUnavailable { .. } => "network_unavailable",
            Self::NotFound { .. } => "not_found",
            Self::Unclassified { .. } => "unclassified",
        }
    }
}

/// Partition store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Partition gone: {partition}")]
    PartitionGone { partition: String },

    #[error("Storage backend failure: {reason}")]
    Backend { reason: String },

    #[error("Record codec failure: {reason}")]
    Codec { reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Network transport errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("Connection to {url} failed: {reason}")]
    Connect { url: String, reason: String },

    #[error("Fetch of {url} timed out after {after:?}")]
    Timeout { url: String, after: Duration },

    #[error("Failed to read response body from {url}: {reason}")]
    Body { url: String, reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to read config file {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Failed to parse config TOML: {reason}")]
    Parse { reason: String },
}

/// Master error type for all tiercache errors.
#[derive(Debug, Clone, Error)]
pub enum TierCacheError {
    #[error("Resource error: {0}")]
    Resource(#[from] ResourceError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for tiercache operations.
pub type TierCacheResult<T> = Result<T, TierCacheError>;

// =============================================================================
// TESTS
// =============================================================================
