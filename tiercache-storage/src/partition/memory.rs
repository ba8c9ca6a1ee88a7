//! In-memory partition store.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;
use tiercache_core::{CacheKey, CacheRecord, Partition, SharedClock, StorageError, SystemClock};

use super::traits::{PartitionHandle, PartitionStore, StorageResult};
use crate::stats::{CacheStats, StatsRecorder};

#[derive(Debug)]
struct MemoryPartition {
    info: Partition,
    records: HashMap<CacheKey, CacheRecord>,
}

/// Partition store held entirely in process memory.
///
/// Every operation takes the map lock once, so each `put` is atomic with
/// respect to readers.
#[derive(Debug)]
pub struct InMemoryPartitionStore {
    partitions: RwLock<BTreeMap<String, MemoryPartition>>,
    clock: SharedClock,
    stats: StatsRecorder,
}

impl Default for InMemoryPartitionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryPartitionStore {
    pub fn new() -> Self {
        Self::with_clock(SystemClock::shared())
    }

    /// Store whose partition creation times come from `clock`.
    pub fn with_clock(clock: SharedClock) -> Self {
        Self {
            partitions: RwLock::new(BTreeMap::new()),
            clock,
            stats: StatsRecorder::default(),
        }
    }
}

#[async_trait]
impl PartitionStore for InMemoryPartitionStore {
    async fn open(&self, name: &str) -> StorageResult<PartitionHandle> {
        let mut partitions = self
            .partitions
            .write()
            .map_err(|_| StorageError::LockPoisoned)?;
        if !partitions.contains_key(name) {
            partitions.insert(
                name.to_string(),
                MemoryPartition {
                    info: Partition::new(name, self.clock.now()),
                    records: HashMap::new(),
                },
            );
        }
        Ok(PartitionHandle::new(name))
    }

    async fn get(
        &self,
        handle: &PartitionHandle,
        key: &CacheKey,
    ) -> StorageResult<Option<CacheRecord>> {
        let partitions = self
            .partitions
            .read()
            .map_err(|_| StorageError::LockPoisoned)?;
        let record = partitions
            .get(handle.name())
            .and_then(|partition| partition.records.get(key))
            .cloned();
        match record {
            Some(_) => self.stats.hit(),
            None => self.stats.miss(),
        }
        Ok(record)
    }

    async fn put(
        &self,
        handle: &PartitionHandle,
        key: &CacheKey,
        record: CacheRecord,
    ) -> StorageResult<()> {
        let mut partitions = self
            .partitions
            .write()
            .map_err(|_| StorageError::LockPoisoned)?;
        let partition =
            partitions
                .get_mut(handle.name())
                .ok_or_else(|| StorageError::PartitionGone {
                    partition: handle.name().to_string(),
                })?;
        partition.records.insert(key.clone(), record);
        Ok(())
    }

    async fn delete(&self, handle: &PartitionHandle, key: &CacheKey) -> StorageResult<bool> {
        let mut partitions = self
            .partitions
            .write()
            .map_err(|_| StorageError::LockPoisoned)?;
        Ok(partitions
            .get_mut(handle.name())
            .map(|partition| partition.records.remove(key).is_some())
            .unwrap_or(false))
    }

    async fn list(&self) -> StorageResult<Vec<Partition>> {
        let partitions = self
            .partitions
            .read()
            .map_err(|_| StorageError::LockPoisoned)?;
        Ok(partitions.values().map(|p| p.info.clone()).collect())
    }

    async fn delete_all_except(&self, active: &[String]) -> StorageResult<Vec<String>> {
        let mut partitions = self
            .partitions
            .write()
            .map_err(|_| StorageError::LockPoisoned)?;
        let doomed: Vec<String> = partitions
            .keys()
            .filter(|name| !active.contains(*name))
            .cloned()
            .collect();
        for name in &doomed {
            partitions.remove(name);
        }
        Ok(doomed)
    }

    async fn stats(&self) -> StorageResult<CacheStats> {
        let partitions = self
            .partitions
            .read()
            .map_err(|_| StorageError::LockPoisoned)?;
        let entries: usize = partitions.values().map(|p| p.records.len()).sum();
        Ok(self.stats.snapshot(entries as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::Arc;
    use std::time::Duration;
    use tiercache_core::{ManualClock, ResourceResponse, Strategy};

    fn record(key: &CacheKey, payload: &[u8]) -> CacheRecord {
        let now = Utc::now();
        CacheRecord::from_response(
            key.clone(),
            &ResourceResponse::ok(payload.to_vec(), now),
            now,
            Duration::from_secs(60),
            Strategy::CacheFirst,
        )
    }

    fn key(path: &str) -> CacheKey {
        CacheKey::from_canonical(format!("GET https://example.com{}", path))
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let store = InMemoryPartitionStore::new();
        let handle = store.open("images-v1").await.expect("open should succeed");
        let k = key("/logo.png");

        store
            .put(&handle, &k, record(&k, b"png-bytes"))
            .await
            .expect("put should succeed");

        let cached = store.get(&handle, &k).await.expect("get should succeed");
        assert_eq!(cached.expect("record").payload, b"png-bytes".to_vec());
    }

    #[tokio::test]
    async fn test_overwrite_is_last_write_wins() {
        let store = InMemoryPartitionStore::new();
        let handle = store.open("api-v1").await.expect("open should succeed");
        let k = key("/api/products");

        store.put(&handle, &k, record(&k, b"first")).await.expect("put");
        store.put(&handle, &k, record(&k, b"second")).await.expect("put");

        let cached = store.get(&handle, &k).await.expect("get").expect("record");
        assert_eq!(cached.payload, b"second".to_vec());
    }

    #[tokio::test]
    async fn test_partitions_are_isolated() {
        let store = InMemoryPartitionStore::new();
        let images = store.open("images-v1").await.expect("open");
        let api = store.open("api-v1").await.expect("open");
        let k = key("/shared");

        store.put(&images, &k, record(&k, b"image")).await.expect("put");
        assert!(store.get(&api, &k).await.expect("get").is_none());
    }

    #[tokio::test]
    async fn test_open_is_idempotent() {
        let clock = Arc::new(ManualClock::starting_now());
        let store = InMemoryPartitionStore::with_clock(clock.clone());
        store.open("static-v1").await.expect("open");
        let created = store.list().await.expect("list")[0].created_at;

        clock.advance(Duration::from_secs(30));
        store.open("static-v1").await.expect("reopen");

        let partitions = store.list().await.expect("list");
        assert_eq!(partitions.len(), 1);
        assert_eq!(partitions[0].created_at, created);
        assert_eq!(partitions[0].version, Some(1));
    }

    #[tokio::test]
    async fn test_delete_all_except() {
        let store = InMemoryPartitionStore::new();
        for name in ["images-v1", "api-v1", "images-v2", "api-v2", "legacy-cache"] {
            store.open(name).await.expect("open");
        }

        let mut deleted = store
            .delete_all_except(&["images-v2".to_string(), "api-v2".to_string()])
            .await
            .expect("gc");
        deleted.sort();
        assert_eq!(deleted, vec!["api-v1", "images-v1", "legacy-cache"]);

        let remaining: Vec<String> = store
            .list()
            .await
            .expect("list")
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(remaining, vec!["api-v2", "images-v2"]);
    }

    #[tokio::test]
    async fn test_put_into_deleted_partition_reports_gone() {
        let store = InMemoryPartitionStore::new();
        let handle = store.open("pages-v1").await.expect("open");
        store.delete_all_except(&[]).await.expect("gc");

        let k = key("/");
        let err = store
            .put(&handle, &k, record(&k, b"<html>"))
            .await
            .expect_err("partition is gone");
        assert!(matches!(err, StorageError::PartitionGone { .. }));
        assert!(store.get(&handle, &k).await.expect("get").is_none());
    }

    #[tokio::test]
    async fn test_delete_record() {
        let store = InMemoryPartitionStore::new();
        let handle = store.open("api-v1").await.expect("open");
        let k = key("/api/orders");
        store.put(&handle, &k, record(&k, b"[]")).await.expect("put");

        assert!(store.delete(&handle, &k).await.expect("delete"));
        assert!(!store.delete(&handle, &k).await.expect("delete again"));
    }

    #[tokio::test]
    async fn test_stats() {
        let store = InMemoryPartitionStore::new();
        let handle = store.open("api-v1").await.expect("open");
        let k = key("/api/orders");

        let _ = store.get(&handle, &k).await;
        store.put(&handle, &k, record(&k, b"[]")).await.expect("put");
        let _ = store.get(&handle, &k).await;
        let _ = store.get(&handle, &k).await;

        let stats = store.stats().await.expect("stats");
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.entry_count, 1);
    }
}
