//! TIERCACHE Core - Data Types
//!
//! Pure data structures shared by every tiercache crate: resource requests and
//! their canonical cache keys, cache records, partitions, policy vocabulary,
//! the error taxonomy and configuration. This crate performs no I/O.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

pub mod clock;
pub mod config;
pub mod enums;
pub mod error;
pub mod partition;
pub mod record;
pub mod request;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::TierCacheConfig;
pub use enums::{Diagnostic, Strategy};
pub use error::{
    ConfigError, ResourceError, StorageError, TierCacheError, TierCacheResult, TransportError,
};
pub use partition::{Partition, PartitionName, Purpose};
pub use record::{CacheRecord, Metadata, ResourceResponse};
pub use request::{CacheKey, ResourceRequest};

// ============================================================================
// IDENTITY TYPES
// ============================================================================

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// SHA-256 digest of a cache key, used where key length is bounded.
pub type KeyDigest = [u8; 32];

/// Metadata tag carried by every response produced by the engine.
pub const STATUS_TAG: &str = "x-tiercache-status";

/// Compute the SHA-256 digest of arbitrary bytes.
pub fn compute_key_digest(content: &[u8]) -> KeyDigest {
    let mut hasher = Sha256::new();
    hasher.update(content);
    let result = hasher.finalize();
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&result);
    hash
}
