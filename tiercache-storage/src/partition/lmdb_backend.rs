//! LMDB-backed partition store.
//!
//! Uses the heed crate (Rust bindings for LMDB) to provide a durable,
//! memory-mapped record store.
//!
//! # Layout
//!
//! - `partitions` database: partition name → JSON [`Partition`] metadata.
//! - `records` database: prefixed record keys (see `record_codec`) → framed
//!   record values.
//!
//! # Atomicity
//!
//! Every `put` runs in its own write transaction that first checks the
//! partition still exists, so a record is either fully written into a live
//! partition or not written at all. Deleting partitions removes their
//! registry entries and every record of their prefix in a single write
//! transaction.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use heed::types::{Bytes, Str};
use heed::{Database, Env, EnvOpenOptions};
use tiercache_core::{CacheKey, CacheRecord, Partition, SharedClock, StorageError, SystemClock};

use super::record_codec::{decode_record, encode_record, partition_prefix, record_key};
use super::traits::{PartitionHandle, PartitionStore, StorageResult};
use crate::stats::{CacheStats, StatsRecorder};

const PARTITIONS_DB: &str = "partitions";
const RECORDS_DB: &str = "records";

/// LMDB partition store failures.
#[derive(Debug, thiserror::Error)]
pub enum LmdbStoreError {
    #[error("Cannot open partition store at {}: {reason}", path.display())]
    Open { path: PathBuf, reason: String },

    #[error("LMDB transaction failed: {0}")]
    Txn(#[from] heed::Error),

    #[error("Unreadable partition entry: {0}")]
    Codec(String),
}

impl From<LmdbStoreError> for StorageError {
    fn from(e: LmdbStoreError) -> Self {
        match e {
            LmdbStoreError::Codec(reason) => StorageError::Codec { reason },
            other => StorageError::Backend {
                reason: other.to_string(),
            },
        }
    }
}

fn txn_error(e: heed::Error) -> LmdbStoreError {
    LmdbStoreError::Txn(e)
}

/// LMDB-backed partition store.
///
/// # Example
///
/// ```ignore
/// use tiercache_storage::{LmdbPartitionStore, PartitionStore};
///
/// let store = LmdbPartitionStore::new("/var/cache/tiercache", 256)?;
/// let images = store.open("images-v3").await?;
/// store.put(&images, &key, record).await?;
/// let cached = store.get(&images, &key).await?;
/// ```
#[derive(Debug)]
pub struct LmdbPartitionStore {
    /// The LMDB environment.
    env: Env,
    /// Partition registry.
    partitions: Database<Str, Bytes>,
    /// Records of every partition.
    records: Database<Bytes, Bytes>,
    clock: SharedClock,
    stats: StatsRecorder,
}

impl LmdbPartitionStore {
    /// Create a new LMDB partition store.
    ///
    /// # Arguments
    ///
    /// * `path` - Directory where LMDB files will be stored
    /// * `max_size_mb` - Maximum size of the database in megabytes
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory cannot be created
    /// - LMDB environment cannot be opened
    /// - The databases cannot be created
    pub fn new<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, LmdbStoreError> {
        Self::with_clock(path, max_size_mb, SystemClock::shared())
    }

    /// Create a store whose partition creation times come from `clock`.
    pub fn with_clock<P: AsRef<Path>>(
        path: P,
        max_size_mb: usize,
        clock: SharedClock,
    ) -> Result<Self, LmdbStoreError> {
        let path = path.as_ref();
        let open_error = |reason: String| LmdbStoreError::Open {
            path: path.to_path_buf(),
            reason,
        };
        std::fs::create_dir_all(path).map_err(|e| open_error(e.to_string()))?;

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb * 1024 * 1024)
                .max_dbs(2)
                .open(path)
        }
        .map_err(|e| open_error(e.to_string()))?;

        let mut wtxn = env.write_txn()?;
        let partitions: Database<Str, Bytes> =
            env.create_database(&mut wtxn, Some(PARTITIONS_DB))?;
        let records: Database<Bytes, Bytes> = env.create_database(&mut wtxn, Some(RECORDS_DB))?;
        wtxn.commit()?;

        Ok(Self {
            env,
            partitions,
            records,
            clock,
            stats: StatsRecorder::default(),
        })
    }

    fn open_partition(&self, name: &str) -> Result<(), LmdbStoreError> {
        let mut wtxn = self.env.write_txn().map_err(txn_error)?;
        if self.partitions.get(&wtxn, name).map_err(txn_error)?.is_some() {
            return Ok(());
        }

        let info = Partition::new(name, self.clock.now());
        let bytes = serde_json::to_vec(&info)
            .map_err(|e| LmdbStoreError::Codec(e.to_string()))?;
        self.partitions
            .put(&mut wtxn, name, &bytes)
            .map_err(txn_error)?;
        wtxn.commit().map_err(txn_error)?;

        tracing::debug!(partition = name, "Created partition");
        Ok(())
    }

    fn read_record(
        &self,
        partition: &str,
        key: &CacheKey,
    ) -> Result<Option<CacheRecord>, LmdbStoreError> {
        let rtxn = self.env.read_txn().map_err(txn_error)?;
        let encoded_key = record_key(partition, key);

        match self.records.get(&rtxn, &encoded_key).map_err(txn_error)? {
            Some(bytes) => decode_record(bytes, key).map_err(LmdbStoreError::Codec),
            None => Ok(None),
        }
    }

    fn write_record(
        &self,
        partition: &str,
        key: &CacheKey,
        record: &CacheRecord,
    ) -> StorageResult<()> {
        let value = encode_record(record)
            .map_err(|e| LmdbStoreError::Codec(e.to_string()))?;
        let encoded_key = record_key(partition, key);

        let mut wtxn = self.env.write_txn().map_err(txn_error)?;
        if self
            .partitions
            .get(&wtxn, partition)
            .map_err(txn_error)?
            .is_none()
        {
            wtxn.abort();
            return Err(StorageError::PartitionGone {
                partition: partition.to_string(),
            });
        }

        self.records
            .put(&mut wtxn, &encoded_key, &value)
            .map_err(txn_error)?;
        wtxn.commit().map_err(txn_error)?;
        Ok(())
    }

    fn remove_record(&self, partition: &str, key: &CacheKey) -> Result<bool, LmdbStoreError> {
        let mut wtxn = self.env.write_txn().map_err(txn_error)?;
        let deleted = self
            .records
            .delete(&mut wtxn, &record_key(partition, key))
            .map_err(txn_error)?;
        wtxn.commit().map_err(txn_error)?;
        Ok(deleted)
    }

    fn list_partitions(&self) -> Result<Vec<Partition>, LmdbStoreError> {
        let rtxn = self.env.read_txn().map_err(txn_error)?;
        let mut partitions = Vec::new();
        for entry in self.partitions.iter(&rtxn).map_err(txn_error)? {
            let (_, bytes) = entry.map_err(txn_error)?;
            let info: Partition = serde_json::from_slice(bytes)
                .map_err(|e| LmdbStoreError::Codec(e.to_string()))?;
            partitions.push(info);
        }
        Ok(partitions)
    }

    fn drop_partitions_except(&self, active: &[String]) -> Result<Vec<String>, LmdbStoreError> {
        let mut wtxn = self.env.write_txn().map_err(txn_error)?;

        let doomed: Vec<String> = {
            let mut names = Vec::new();
            for entry in self.partitions.iter(&wtxn).map_err(txn_error)? {
                let (name, _) = entry.map_err(txn_error)?;
                if !active.iter().any(|a| a == name) {
                    names.push(name.to_string());
                }
            }
            names
        };

        for name in &doomed {
            let prefix = partition_prefix(name);
            let keys: Vec<Vec<u8>> = {
                let mut keys = Vec::new();
                for entry in self.records.prefix_iter(&wtxn, &prefix).map_err(txn_error)? {
                    let (key, _) = entry.map_err(txn_error)?;
                    keys.push(key.to_vec());
                }
                keys
            };
            for key in &keys {
                self.records.delete(&mut wtxn, key).map_err(txn_error)?;
            }
            self.partitions
                .delete(&mut wtxn, name)
                .map_err(txn_error)?;
            tracing::debug!(partition = %name, records = keys.len(), "Dropped partition");
        }

        wtxn.commit().map_err(txn_error)?;
        Ok(doomed)
    }

    fn record_count(&self) -> Result<u64, LmdbStoreError> {
        let rtxn = self.env.read_txn().map_err(txn_error)?;
        self.records.len(&rtxn).map_err(txn_error)
    }
}

#[async_trait]
impl PartitionStore for LmdbPartitionStore {
    async fn open(&self, name: &str) -> StorageResult<PartitionHandle> {
        self.open_partition(name)?;
        Ok(PartitionHandle::new(name))
    }

    async fn get(
        &self,
        handle: &PartitionHandle,
        key: &CacheKey,
    ) -> StorageResult<Option<CacheRecord>> {
        match self.read_record(handle.name(), key) {
            Ok(Some(record)) => {
                self.stats.hit();
                Ok(Some(record))
            }
            Ok(None) => {
                self.stats.miss();
                Ok(None)
            }
            Err(e) => {
                self.stats.miss();
                Err(e.into())
            }
        }
    }

    async fn put(
        &self,
        handle: &PartitionHandle,
        key: &CacheKey,
        record: CacheRecord,
    ) -> StorageResult<()> {
        self.write_record(handle.name(), key, &record)
    }

    async fn delete(&self, handle: &PartitionHandle, key: &CacheKey) -> StorageResult<bool> {
        Ok(self.remove_record(handle.name(), key)?)
    }

    async fn list(&self) -> StorageResult<Vec<Partition>> {
        Ok(self.list_partitions()?)
    }

    async fn delete_all_except(&self, active: &[String]) -> StorageResult<Vec<String>> {
        Ok(self.drop_partitions_except(active)?)
    }

    async fn stats(&self) -> StorageResult<CacheStats> {
        let entries = self.record_count()?;
        Ok(self.stats.snapshot(entries))
    }
}
