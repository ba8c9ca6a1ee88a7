//! Ephemeral value cache.
//!
//! A bounded, process-memory cache of already-decoded values sitting in front
//! of the partition store. Losing its contents only costs extra round-trips.
//!
//! # Eviction
//!
//! Capacity is enforced by insertion order, not access order: reads never
//! protect an entry. Overwriting a key counts as a fresh insertion.
//!
//! # Expiration
//!
//! An entry is dead once `now - inserted_at >= ttl`. Dead entries are dropped
//! lazily on `get`, before any live entry is evicted, and by the periodic
//! sweep started with [`EphemeralCache::start`].

mod sweeper;

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tiercache_core::{SharedClock, SystemClock, Timestamp};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::stats::{CacheStats, StatsRecorder};

#[derive(Debug)]
struct Entry<V> {
    value: V,
    inserted_at: Timestamp,
    ttl: Duration,
    seq: u64,
}

impl<V> Entry<V> {
    fn is_live(&self, now: Timestamp) -> bool {
        let age = now
            .signed_duration_since(self.inserted_at)
            .to_std()
            .unwrap_or(Duration::ZERO);
        age < self.ttl
    }
}

#[derive(Debug)]
struct Slots<V> {
    entries: HashMap<String, Entry<V>>,
    /// Insertion sequence → key, oldest first.
    order: BTreeMap<u64, String>,
    next_seq: u64,
}

impl<V> Slots<V> {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            order: BTreeMap::new(),
            next_seq: 0,
        }
    }

    fn remove(&mut self, key: &str) -> Option<Entry<V>> {
        let entry = self.entries.remove(key)?;
        self.order.remove(&entry.seq);
        Some(entry)
    }

    fn purge_expired(&mut self, now: Timestamp) -> usize {
        let dead: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| !entry.is_live(now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &dead {
            self.remove(key);
        }
        dead.len()
    }

    fn evict_oldest(&mut self) -> bool {
        match self.order.pop_first() {
            Some((_, key)) => {
                self.entries.remove(&key);
                true
            }
            None => false,
        }
    }
}

#[derive(Debug)]
pub(crate) struct Shared<V> {
    slots: Mutex<Slots<V>>,
    max_size: usize,
    clock: SharedClock,
    stats: StatsRecorder,
}

impl<V> Shared<V> {
    fn lock(&self) -> MutexGuard<'_, Slots<V>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn sweep(&self) -> usize {
        let now = self.clock.now();
        let removed = self.lock().purge_expired(now);
        self.stats.expired(removed as u64);
        removed
    }
}

#[derive(Debug)]
struct SweeperHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Bounded TTL cache for computed values.
///
/// Cloning yields another handle to the same cache.
///
/// # Example
///
/// ```ignore
/// use std::time::Duration;
/// use tiercache_storage::EphemeralCache;
///
/// let cache: EphemeralCache<Vec<u8>> = EphemeralCache::new(100);
/// cache.start(Duration::from_secs(60));
/// cache.set("GET https://shop.example/api/products", body, Duration::from_secs(300));
/// ```
#[derive(Debug)]
pub struct EphemeralCache<V> {
    shared: Arc<Shared<V>>,
    sweeper: Arc<Mutex<Option<SweeperHandle>>>,
}

impl<V> Clone for EphemeralCache<V> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            sweeper: Arc::clone(&self.sweeper),
        }
    }
}

impl<V: Clone> EphemeralCache<V> {
    /// Create a cache holding at most `max_size` entries. `0` disables it.
    pub fn new(max_size: usize) -> Self {
        Self::with_clock(max_size, SystemClock::shared())
    }

    /// Create a cache whose TTLs are measured against `clock`.
    pub fn with_clock(max_size: usize, clock: SharedClock) -> Self {
        Self {
            shared: Arc::new(Shared {
                slots: Mutex::new(Slots::new()),
                max_size,
                clock,
                stats: StatsRecorder::default(),
            }),
            sweeper: Arc::new(Mutex::new(None)),
        }
    }

    pub fn max_size(&self) -> usize {
        self.shared.max_size
    }

    /// Live value for `key`. Expired entries are removed and reported absent.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = self.shared.clock.now();
        let mut slots = self.shared.lock();

        let live = match slots.entries.get(key) {
            Some(entry) => entry.is_live(now),
            None => {
                self.shared.stats.miss();
                return None;
            }
        };

        if live {
            self.shared.stats.hit();
            slots.entries.get(key).map(|entry| entry.value.clone())
        } else {
            slots.remove(key);
            self.shared.stats.expired(1);
            self.shared.stats.miss();
            None
        }
    }

    /// Insert or overwrite `key`. Overwriting resets the value, timestamp and ttl.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let mut slots = self.shared.lock();
        self.insert_locked(&mut slots, key.into(), value, ttl);
    }

    /// Return the live value for `key`, or compute, store and return a new one.
    ///
    /// `compute` runs without the cache lock held and may use this cache. If
    /// another caller stored a live value for `key` meanwhile, that value wins.
    pub fn get_or_insert_with<F>(&self, key: &str, ttl: Duration, compute: F) -> V
    where
        F: FnOnce() -> V,
    {
        if let Some(value) = self.live_value(key) {
            self.shared.stats.hit();
            return value;
        }

        self.shared.stats.miss();
        let value = compute();

        let mut slots = self.shared.lock();
        let now = self.shared.clock.now();
        if let Some(entry) = slots.entries.get(key) {
            if entry.is_live(now) {
                return entry.value.clone();
            }
        }
        self.insert_locked(&mut slots, key.to_string(), value.clone(), ttl);
        value
    }

    fn live_value(&self, key: &str) -> Option<V> {
        let now = self.shared.clock.now();
        self.shared
            .lock()
            .entries
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.clone())
    }

    /// Remove `key`. Returns whether an entry was present.
    pub fn delete(&self, key: &str) -> bool {
        self.shared.lock().remove(key).is_some()
    }

    pub fn clear(&self) {
        let mut slots = self.shared.lock();
        slots.entries.clear();
        slots.order.clear();
    }

    /// Number of stored entries, including dead ones not yet swept.
    pub fn len(&self) -> usize {
        self.shared.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        self.shared.sweep()
    }

    pub fn stats(&self) -> CacheStats {
        let entries = self.len() as u64;
        self.shared.stats.snapshot(entries)
    }

    fn insert_locked(&self, slots: &mut Slots<V>, key: String, value: V, ttl: Duration) {
        if self.shared.max_size == 0 {
            return;
        }

        let now = self.shared.clock.now();
        slots.remove(&key);

        let seq = slots.next_seq;
        slots.next_seq += 1;
        slots.order.insert(seq, key.clone());
        slots.entries.insert(
            key,
            Entry {
                value,
                inserted_at: now,
                ttl,
                seq,
            },
        );

        if slots.entries.len() > self.shared.max_size {
            let purged = slots.purge_expired(now);
            self.shared.stats.expired(purged as u64);
        }
        while slots.entries.len() > self.shared.max_size {
            if !slots.evict_oldest() {
                break;
            }
            self.shared.stats.evicted();
        }
    }
}

impl<V: Clone + Send + 'static> EphemeralCache<V> {
    /// Start the periodic sweep on the current tokio runtime.
    ///
    /// No-op if a sweeper is already running.
    pub fn start(&self, interval: Duration) {
        let mut sweeper = self.sweeper.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = sweeper.as_ref() {
            if !handle.task.is_finished() {
                return;
            }
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(sweeper::sweep_loop(
            Arc::downgrade(&self.shared),
            interval,
            shutdown_rx,
        ));
        *sweeper = Some(SweeperHandle { shutdown_tx, task });
    }

    /// Signal the sweeper to stop. Returns whether one was running.
    pub fn stop(&self) -> bool {
        let handle = self
            .sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match handle {
            Some(handle) => {
                let running = !handle.task.is_finished();
                let _ = handle.shutdown_tx.send(true);
                running
            }
            None => false,
        }
    }

    /// Whether the periodic sweep is currently running.
    pub fn is_running(&self) -> bool {
        self.sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|handle| !handle.task.is_finished())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tiercache_core::ManualClock;

    fn cache_with_clock(max_size: usize) -> (EphemeralCache<String>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::starting_now());
        (EphemeralCache::with_clock(max_size, clock.clone()), clock)
    }

    const TTL: Duration = Duration::from_secs(300);

    #[test]
    fn test_set_and_get() {
        let (cache, _clock) = cache_with_clock(10);
        cache.set("a", "alpha".to_string(), TTL);
        assert_eq!(cache.get("a"), Some("alpha".to_string()));
        assert_eq!(cache.get("b"), None);
    }

    #[test]
    fn test_insertion_order_eviction() {
        let (cache, _clock) = cache_with_clock(3);
        for key in ["k1", "k2", "k3", "k4", "k5"] {
            cache.set(key, key.to_uppercase(), TTL);
        }

        assert_eq!(cache.get("k1"), None);
        assert_eq!(cache.get("k2"), None);
        assert_eq!(cache.get("k3"), Some("K3".to_string()));
        assert_eq!(cache.get("k4"), Some("K4".to_string()));
        assert_eq!(cache.get("k5"), Some("K5".to_string()));
        assert_eq!(cache.stats().evictions, 2);
    }

    #[test]
    fn test_reads_do_not_protect_from_eviction() {
        let (cache, _clock) = cache_with_clock(2);
        cache.set("old", "o".to_string(), TTL);
        cache.set("mid", "m".to_string(), TTL);
        for _ in 0..5 {
            assert!(cache.get("old").is_some());
        }
        cache.set("new", "n".to_string(), TTL);

        assert_eq!(cache.get("old"), None);
        assert!(cache.get("mid").is_some());
        assert!(cache.get("new").is_some());
    }

    #[test]
    fn test_overwrite_resets_position_and_ttl() {
        let (cache, clock) = cache_with_clock(2);
        cache.set("a", "1".to_string(), Duration::from_secs(10));
        cache.set("b", "2".to_string(), TTL);

        clock.advance(Duration::from_secs(8));
        cache.set("a", "3".to_string(), Duration::from_secs(10));
        clock.advance(Duration::from_secs(5));

        // Refreshed ttl keeps "a" alive past its original deadline
        assert_eq!(cache.get("a"), Some("3".to_string()));

        // "a" is now newest, so "b" is evicted
        cache.set("c", "4".to_string(), TTL);
        assert_eq!(cache.get("b"), None);
        assert_eq!(cache.get("a"), Some("3".to_string()));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_ttl_boundary() {
        let (cache, clock) = cache_with_clock(10);
        cache.set("a", "alpha".to_string(), Duration::from_secs(60));

        clock.advance(Duration::from_secs(59));
        assert!(cache.get("a").is_some());

        clock.advance(Duration::from_secs(1));
        assert!(cache.get("a").is_none());
        // Lazily removed on read
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.stats().expirations, 1);
    }

    #[test]
    fn test_expired_entries_are_purged_before_eviction() {
        let (cache, clock) = cache_with_clock(2);
        cache.set("short", "s".to_string(), Duration::from_secs(1));
        cache.set("long", "l".to_string(), TTL);
        clock.advance(Duration::from_secs(2));

        cache.set("newest", "n".to_string(), TTL);
        assert!(cache.get("long").is_some());
        assert!(cache.get("newest").is_some());
        assert_eq!(cache.stats().evictions, 0);
    }

    #[test]
    fn test_zero_capacity_disables_cache() {
        let (cache, _clock) = cache_with_clock(0);
        cache.set("a", "alpha".to_string(), TTL);
        assert!(cache.is_empty());
        assert_eq!(cache.get("a"), None);
    }

    #[test]
    fn test_delete_and_clear() {
        let (cache, _clock) = cache_with_clock(10);
        cache.set("a", "1".to_string(), TTL);
        cache.set("b", "2".to_string(), TTL);

        assert!(cache.delete("a"));
        assert!(!cache.delete("a"));
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());

        // Order bookkeeping was reset too
        cache.set("c", "3".to_string(), TTL);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_sweep_removes_only_dead_entries() {
        let (cache, clock) = cache_with_clock(10);
        cache.set("short", "s".to_string(), Duration::from_secs(5));
        cache.set("long", "l".to_string(), TTL);
        clock.advance(Duration::from_secs(5));

        assert_eq!(cache.sweep(), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.sweep(), 0);
    }

    #[test]
    fn test_get_or_insert_with_computes_once() {
        let (cache, clock) = cache_with_clock(10);
        let mut calls = 0;

        let first = cache.get_or_insert_with("a", Duration::from_secs(10), || {
            calls += 1;
            "computed".to_string()
        });
        let second = cache.get_or_insert_with("a", Duration::from_secs(10), || {
            calls += 1;
            "recomputed".to_string()
        });
        assert_eq!(first, "computed");
        assert_eq!(second, "computed");
        assert_eq!(calls, 1);

        clock.advance(Duration::from_secs(10));
        let third = cache.get_or_insert_with("a", Duration::from_secs(10), || {
            "recomputed".to_string()
        });
        assert_eq!(third, "recomputed");
    }

    #[test]
    fn test_get_or_insert_with_compute_may_use_cache() {
        let (cache, _clock) = cache_with_clock(10);
        cache.set("base", "b".to_string(), TTL);

        let derived = cache.get_or_insert_with("derived", TTL, || {
            let base = cache.get("base").unwrap_or_default();
            format!("{}-derived", base)
        });
        assert_eq!(derived, "b-derived");

        // A value stored while computing is kept
        let raced = cache.get_or_insert_with("raced", TTL, || {
            cache.set("raced", "first".to_string(), TTL);
            "second".to_string()
        });
        assert_eq!(raced, "first");
        assert_eq!(cache.get("raced"), Some("first".to_string()));
    }

    #[test]
    fn test_clones_share_entries() {
        let (cache, _clock) = cache_with_clock(10);
        let other = cache.clone();
        cache.set("a", "1".to_string(), TTL);
        assert_eq!(other.get("a"), Some("1".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_start_and_stop() {
        let (cache, clock) = cache_with_clock(10);
        cache.set("a", "1".to_string(), Duration::from_secs(1));
        cache.set("b", "2".to_string(), Duration::from_secs(1));
        clock.advance(Duration::from_secs(2));

        cache.start(Duration::from_secs(1));
        cache.start(Duration::from_secs(1));
        assert!(cache.is_running());

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.stats().expirations, 2);

        assert!(cache.stop());
        assert!(!cache.stop());
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!cache.is_running());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Property: with no intervening reads, inserting max_size + 1 distinct
        /// keys leaves exactly the first-inserted key absent.
        #[test]
        fn prop_overflow_evicts_first_inserted(max_size in 1usize..32) {
            let (cache, _clock) = cache_with_clock(max_size);
            let keys: Vec<String> = (0..=max_size).map(|i| format!("key-{}", i)).collect();
            for key in &keys {
                cache.set(key.clone(), key.clone(), TTL);
            }

            prop_assert_eq!(cache.get(&keys[0]), None);
            for key in &keys[1..] {
                prop_assert_eq!(cache.get(key), Some(key.clone()));
            }
        }

        /// Property: an entry with ttl T is present before T and absent from T on.
        #[test]
        fn prop_ttl_boundary(ttl_ms in 1u64..100_000, probe_ms in 0u64..200_000) {
            let (cache, clock) = cache_with_clock(4);
            cache.set("k", "v".to_string(), Duration::from_millis(ttl_ms));
            clock.advance(Duration::from_millis(probe_ms));

            prop_assert_eq!(cache.get("k").is_some(), probe_ms < ttl_ms);
        }
    }
}
