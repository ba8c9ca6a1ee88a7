//! Partition store trait and handle type.
//!
//! This module defines the contract every durable backend implements. Keys
//! are canonical resource identities; records are independent snapshots, so
//! writes are atomic per record but never transactional across keys.

use async_trait::async_trait;
use std::fmt;
use tiercache_core::{CacheKey, CacheRecord, Partition, StorageError};

use crate::stats::CacheStats;

/// Result type alias for partition store operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Handle to an opened partition.
///
/// Handles are cheap to clone and carry only the partition name. A handle
/// outlives the partition it points at if the partition is garbage-collected:
/// reads through it then miss and writes report [`StorageError::PartitionGone`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PartitionHandle {
    name: String,
}

impl PartitionHandle {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Name of the partition this handle points at.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for PartitionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Durable, named storage of request→response records.
///
/// # Semantics
///
/// - `open` is idempotent and keeps the original creation time.
/// - `put` is last-write-wins. Concurrent writers for one key may race; the
///   last write to complete is the stored value.
/// - No reader observes a partially written record.
/// - `delete_all_except` removes every partition whose name is not listed,
///   including foreign partitions that do not follow the versioned scheme.
#[async_trait]
pub trait PartitionStore: Send + Sync {
    /// Create the partition if needed and return a handle to it.
    async fn open(&self, name: &str) -> StorageResult<PartitionHandle>;

    /// Read a record.
    async fn get(&self, handle: &PartitionHandle, key: &CacheKey)
        -> StorageResult<Option<CacheRecord>>;

    /// Store a record, replacing any previous one for the key.
    async fn put(
        &self,
        handle: &PartitionHandle,
        key: &CacheKey,
        record: CacheRecord,
    ) -> StorageResult<()>;

    /// Remove a single record. Returns whether a record was removed.
    async fn delete(&self, handle: &PartitionHandle, key: &CacheKey) -> StorageResult<bool>;

    /// Enumerate existing partitions, ordered by name.
    async fn list(&self) -> StorageResult<Vec<Partition>>;

    /// Delete every partition not named in `active`. Returns the deleted names.
    async fn delete_all_except(&self, active: &[String]) -> StorageResult<Vec<String>>;

    /// Get store statistics.
    async fn stats(&self) -> StorageResult<CacheStats>;
}
