//! Lifecycle Manager
//!
//! Two-phase partition version activation:
//!
//! 1. Ensure every partition of the new version exists and precache the
//!    plan's resources into them. Any failure here aborts the activation and
//!    leaves the previous version serving, untouched.
//! 2. Swap the active set, then delete every partition outside it.
//!
//! Requests snapshot the active set when they start, so a request that
//! finishes after garbage collection only sees misses and skipped writes.
//! Activations run one at a time.

use futures_util::future::join_all;
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tiercache_core::{
    CacheKey, CacheRecord, PartitionName, Purpose, ResourceError, ResourceRequest, SharedClock,
    StorageError, Strategy,
};
use tiercache_storage::{PartitionHandle, PartitionStore};

use crate::router::PolicyRouter;
use crate::transport::{fetch_with_timeout, NetworkTransport};

/// Activation failures. The previous version stays active on every variant.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ActivationError {
    #[error("Storage error during activation: {0}")]
    Storage(#[from] StorageError),

    #[error("Invalid precache request: {0}")]
    InvalidPrecache(#[from] ResourceError),

    #[error("Precache of {url} failed: {reason}")]
    PrecacheFailed { url: String, reason: String },
}

/// What to activate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivationPlan {
    pub version: u32,
    /// Resources fetched into the new partitions before activation.
    pub precache: Vec<ResourceRequest>,
}

impl ActivationPlan {
    pub fn new(version: u32) -> Self {
        Self {
            version,
            precache: Vec::new(),
        }
    }

    /// Add `GET` precache requests for absolute URLs.
    pub fn with_precache<I, S>(mut self, urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.precache
            .extend(urls.into_iter().map(ResourceRequest::get));
        self
    }
}

/// Outcome of a successful activation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivationReport {
    pub version: u32,
    /// Partitions that did not exist before this activation.
    pub created: Vec<String>,
    /// Partitions removed by garbage collection.
    pub deleted: Vec<String>,
    /// Number of precached resources.
    pub precached: usize,
}

/// Partitions of the active version, one per purpose.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveSet {
    version: u32,
    handles: BTreeMap<Purpose, PartitionHandle>,
}

impl ActiveSet {
    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn handle(&self, purpose: Purpose) -> Option<&PartitionHandle> {
        self.handles.get(&purpose)
    }

    /// Names of every active partition.
    pub fn names(&self) -> Vec<String> {
        self.handles.values().map(|h| h.name().to_string()).collect()
    }
}

/// Owns the active partition set and drives version changes.
pub struct LifecycleManager {
    store: Arc<dyn PartitionStore>,
    clock: SharedClock,
    active: RwLock<Option<Arc<ActiveSet>>>,
    /// Held for a whole create, precache, swap and collect sequence.
    activation: Mutex<()>,
    fetch_timeout: Option<Duration>,
}

impl LifecycleManager {
    pub fn new(store: Arc<dyn PartitionStore>, clock: SharedClock) -> Self {
        Self {
            store,
            clock,
            active: RwLock::new(None),
            activation: Mutex::new(()),
            fetch_timeout: None,
        }
    }

    /// Bound each precache fetch by `limit`.
    pub fn with_fetch_timeout(mut self, limit: Option<Duration>) -> Self {
        self.fetch_timeout = limit;
        self
    }

    /// Snapshot of the active set, if any version was activated.
    pub fn snapshot(&self) -> Option<Arc<ActiveSet>> {
        self.active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn active_version(&self) -> Option<u32> {
        self.snapshot().map(|set| set.version)
    }

    /// Activate `plan.version`, precaching through `router` and `transport`.
    ///
    /// Re-activating the active version only re-runs garbage collection.
    pub async fn activate(
        &self,
        plan: &ActivationPlan,
        router: &PolicyRouter,
        transport: &dyn NetworkTransport,
    ) -> Result<ActivationReport, ActivationError> {
        let _activation = self.activation.lock().await;

        if let Some(active) = self.snapshot().filter(|set| set.version == plan.version) {
            let deleted = self.store.delete_all_except(&active.names()).await?;
            tracing::info!(
                version = plan.version,
                deleted = deleted.len(),
                "Partition version already active, garbage collection re-run"
            );
            return Ok(ActivationReport {
                version: plan.version,
                deleted,
                ..Default::default()
            });
        }

        // Phase 1: create
        let existing: Vec<String> = self
            .store
            .list()
            .await?
            .into_iter()
            .map(|partition| partition.name)
            .collect();

        let mut handles = BTreeMap::new();
        let mut created = Vec::new();
        for name in PartitionName::for_version(plan.version) {
            let name_str = name.to_string();
            let handle = self.store.open(&name_str).await?;
            if !existing.contains(&name_str) {
                created.push(name_str);
            }
            handles.insert(name.purpose(), handle);
        }

        let precached = self.precache(plan, router, transport, &handles).await?;

        // Phase 2: swap, then collect garbage
        let next = Arc::new(ActiveSet {
            version: plan.version,
            handles,
        });
        let previous = self
            .active
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(Arc::clone(&next))
            .map(|set| set.version);

        let deleted = self.store.delete_all_except(&next.names()).await?;

        tracing::info!(
            version = plan.version,
            previous_version = ?previous,
            created = created.len(),
            deleted = deleted.len(),
            precached,
            "Partition version activated"
        );

        Ok(ActivationReport {
            version: plan.version,
            created,
            deleted,
            precached,
        })
    }

    async fn precache(
        &self,
        plan: &ActivationPlan,
        router: &PolicyRouter,
        transport: &dyn NetworkTransport,
        handles: &BTreeMap<Purpose, PartitionHandle>,
    ) -> Result<usize, ActivationError> {
        let mut targets = Vec::with_capacity(plan.precache.len());
        for request in &plan.precache {
            let url = request.parsed_url()?;
            let rule = router.route_parsed(request, &url);
            if rule.strategy() == Strategy::NetworkOnly {
                return Err(ActivationError::PrecacheFailed {
                    url: request.url().to_string(),
                    reason: format!("{} requests are not cacheable", request.method()),
                });
            }
            targets.push((request, CacheKey::from_parts(request.method(), &url), rule));
        }

        let responses = join_all(
            targets
                .iter()
                .map(|(request, _, _)| {
                    fetch_with_timeout(transport, request, self.fetch_timeout)
                }),
        )
        .await;

        // All-or-nothing: validate every fetch before writing any record
        let mut records = Vec::with_capacity(targets.len());
        for ((request, key, rule), response) in targets.iter().zip(responses) {
            let response = response.map_err(|e| ActivationError::PrecacheFailed {
                url: request.url().to_string(),
                reason: e.to_string(),
            })?;
            if !response.is_success() {
                return Err(ActivationError::PrecacheFailed {
                    url: request.url().to_string(),
                    reason: format!("status {}", response.status),
                });
            }
            let record = CacheRecord::from_response(
                key.clone(),
                &response,
                self.clock.now(),
                rule.freshness_window(),
                rule.strategy(),
            );
            records.push((rule.purpose(), key, record));
        }

        for (purpose, key, record) in records {
            if let Some(handle) = handles.get(&purpose) {
                self.store.put(handle, key, record).await?;
            }
        }

        Ok(targets.len())
    }
}
