//! Durable partition store.
//!
//! Provides the [`PartitionStore`] contract plus two backends:
//! - [`InMemoryPartitionStore`]: process-memory maps, used in tests and by
//!   hosts without a durable directory
//! - [`LmdbPartitionStore`]: LMDB-backed, survives restarts

mod lmdb_backend;
mod memory;
mod record_codec;
mod traits;

pub use lmdb_backend::{LmdbPartitionStore, LmdbStoreError};
pub use memory::InMemoryPartitionStore;
pub use traits::{PartitionHandle, PartitionStore, StorageResult};
