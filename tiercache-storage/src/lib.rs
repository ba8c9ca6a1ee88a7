//! TIERCACHE Storage - Partition Store and Ephemeral Value Cache
//!
//! The durable tier is a set of named, versioned partitions behind the
//! [`PartitionStore`] trait, with in-memory and LMDB backends. The ephemeral
//! tier is a bounded in-process TTL cache with an optional periodic sweep.

pub mod ephemeral;
pub mod partition;
pub mod stats;

pub use ephemeral::EphemeralCache;
pub use partition::{
    InMemoryPartitionStore, LmdbPartitionStore, LmdbStoreError, PartitionHandle, PartitionStore,
    StorageResult,
};
pub use stats::CacheStats;
