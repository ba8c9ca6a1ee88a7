//! Strategy Executors
//!
//! One executor per [`Strategy`]. Executors never write: they return the
//! outcome plus an optional [`Writeback`] that the engine applies after the
//! executor finishes, so a request dropped mid-fetch leaves no partial state.
//! Transport errors are always caught here and never cross this boundary.

mod cache_first;
mod network_first;
mod network_only;

use std::time::Duration;

use tiercache_core::{
    CacheKey, CacheRecord, Clock, Diagnostic, ResourceError, ResourceRequest, ResourceResponse,
    Strategy, TransportError,
};
use tiercache_storage::{EphemeralCache, PartitionHandle, PartitionStore};
use url::Url;

use crate::router::PolicyRule;
use crate::transport::{fetch_with_timeout, NetworkTransport};

/// Everything an executor may touch for one request.
pub struct StrategyContext<'a> {
    pub request: &'a ResourceRequest,
    /// Normalized request URL.
    pub url: &'a Url,
    pub key: &'a CacheKey,
    pub rule: &'a PolicyRule,
    /// Active partition for the rule, if any version is active.
    pub partition: Option<&'a PartitionHandle>,
    pub store: &'a dyn PartitionStore,
    pub transport: &'a dyn NetworkTransport,
    pub ephemeral: &'a EphemeralCache<CacheRecord>,
    /// Upper bound for ephemeral write-backs.
    pub ephemeral_ttl: Duration,
    pub fetch_timeout: Option<Duration>,
    pub clock: &'a dyn Clock,
}

/// Result of running an executor, before fallback resolution.
#[derive(Debug, Clone, PartialEq)]
pub enum StrategyOutcome {
    /// Fresh cached record, no network call.
    Fresh(ResourceResponse),
    /// Network response (any status).
    Fetched(ResourceResponse),
    /// Cached record served because the network failed.
    Stale {
        response: ResourceResponse,
        cause: ResourceError,
    },
    /// Neither network nor an eligible cached record.
    Failed(ResourceError),
}

impl StrategyOutcome {
    pub fn diagnostic(&self) -> Diagnostic {
        match self {
            Self::Fresh(_) => Diagnostic::Hit,
            Self::Fetched(_) => Diagnostic::Miss,
            Self::Stale { .. } => Diagnostic::Degraded,
            Self::Failed(_) => Diagnostic::Failure,
        }
    }
}

/// Deferred write of a successful network response.
#[derive(Debug, Clone, PartialEq)]
pub struct Writeback {
    pub record: CacheRecord,
    /// Also store in the ephemeral tier with this ttl.
    pub ephemeral_ttl: Option<Duration>,
}

/// Executor output.
#[derive(Debug, Clone, PartialEq)]
pub struct Execution {
    pub outcome: StrategyOutcome,
    pub writeback: Option<Writeback>,
}

impl Execution {
    fn outcome(outcome: StrategyOutcome) -> Self {
        Self {
            outcome,
            writeback: None,
        }
    }
}

/// Run the executor selected by the rule's strategy.
pub async fn execute(ctx: &StrategyContext<'_>) -> Execution {
    match ctx.rule.strategy() {
        Strategy::CacheFirst => cache_first::execute(ctx).await,
        Strategy::NetworkFirst => network_first::execute(ctx).await,
        Strategy::NetworkOnly => network_only::execute(ctx).await,
    }
}

/// Fetch through the transport, honoring the optional per-fetch timeout.
pub(crate) async fn fetch(
    ctx: &StrategyContext<'_>,
    request: &ResourceRequest,
) -> Result<ResourceResponse, TransportError> {
    fetch_with_timeout(ctx.transport, request, ctx.fetch_timeout).await
}

/// Read a record from the active partition. Storage faults count as a miss.
pub(crate) async fn read_partition(
    ctx: &StrategyContext<'_>,
    key: &CacheKey,
) -> Option<CacheRecord> {
    let partition = ctx.partition?;
    match ctx.store.get(partition, key).await {
        Ok(record) => record,
        Err(e) => {
            tracing::warn!(
                error = %e,
                key = %key,
                partition = %partition,
                "Partition read failed, treating as miss"
            );
            None
        }
    }
}

/// Write-back for a network response, if it is cacheable.
pub(crate) fn writeback_for(
    ctx: &StrategyContext<'_>,
    key: &CacheKey,
    response: &ResourceResponse,
) -> Option<Writeback> {
    if !response.is_success() || !ctx.rule.strategy().writes_back() {
        return None;
    }

    let record = CacheRecord::from_response(
        key.clone(),
        response,
        ctx.clock.now(),
        ctx.rule.freshness_window(),
        ctx.rule.strategy(),
    );
    let ephemeral_ttl = ctx
        .rule
        .use_ephemeral()
        .then(|| ctx.rule.freshness_window().min(ctx.ephemeral_ttl));

    Some(Writeback {
        record,
        ephemeral_ttl,
    })
}

/// Ephemeral-tier key for `key` within `partition`.
///
/// Entries are scoped to the partition they were fetched for, so a value
/// cached under one version is never read once another version is active.
pub fn ephemeral_key(partition: &PartitionHandle, key: &CacheKey) -> String {
    format!("{}|{}", partition.name(), key)
}

pub(crate) fn unavailable(key: &CacheKey, e: &TransportError) -> ResourceError {
    ResourceError::NetworkUnavailable {
        key: key.to_string(),
        reason: e.to_string(),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Minimal in-crate stubs; the shared stubs live in tiercache-test-utils.

    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tiercache_core::ManualClock;
    use tiercache_storage::InMemoryPartitionStore;

    use crate::router::PolicyRouter;

    /// Transport answering every fetch with a fixed result.
    pub struct FixedTransport {
        result: Mutex<Result<ResourceResponse, TransportError>>,
        pub calls: AtomicUsize,
        pub last_url: Mutex<Option<String>>,
    }

    impl FixedTransport {
        pub fn ok(payload: &[u8], clock: &ManualClock) -> Self {
            Self::with(Ok(ResourceResponse::ok(payload.to_vec(), clock.now())))
        }

        pub fn status(status: u16, clock: &ManualClock) -> Self {
            Self::with(Ok(ResourceResponse::new(status, b"error".to_vec(), clock.now())))
        }

        pub fn failing() -> Self {
            Self::with(Err(TransportError::Connect {
                url: "stub".to_string(),
                reason: "offline".to_string(),
            }))
        }

        fn with(result: Result<ResourceResponse, TransportError>) -> Self {
            Self {
                result: Mutex::new(result),
                calls: AtomicUsize::new(0),
                last_url: Mutex::new(None),
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl NetworkTransport for FixedTransport {
        async fn fetch(
            &self,
            request: &ResourceRequest,
        ) -> Result<ResourceResponse, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_url.lock().expect("lock") = Some(request.url().to_string());
            self.result.lock().expect("lock").clone()
        }
    }

    /// Owned pieces a [`StrategyContext`] borrows from.
    pub struct Harness {
        pub router: PolicyRouter,
        pub store: InMemoryPartitionStore,
        pub ephemeral: EphemeralCache<CacheRecord>,
        pub clock: std::sync::Arc<ManualClock>,
        pub partition: PartitionHandle,
    }

    impl Harness {
        pub async fn new(partition: &str) -> Self {
            let clock = std::sync::Arc::new(ManualClock::starting_now());
            let store = InMemoryPartitionStore::with_clock(clock.clone());
            let partition = store.open(partition).await.expect("open");
            Self {
                router: PolicyRouter::from_config(&tiercache_core::TierCacheConfig::default())
                    .expect("rules"),
                store,
                ephemeral: EphemeralCache::with_clock(16, clock.clone()),
                clock,
                partition,
            }
        }

        /// Run the routed executor for `request` against `transport`.
        pub async fn run(
            &self,
            request: &ResourceRequest,
            transport: &dyn NetworkTransport,
        ) -> Execution {
            let url = request.parsed_url().expect("valid url");
            let key = CacheKey::from_parts(request.method(), &url);
            let rule = self.router.route_parsed(request, &url);
            let ctx = StrategyContext {
                request,
                url: &url,
                key: &key,
                rule,
                partition: Some(&self.partition),
                store: &self.store,
                transport,
                ephemeral: &self.ephemeral,
                ephemeral_ttl: Duration::from_secs(300),
                fetch_timeout: None,
                clock: self.clock.as_ref(),
            };
            execute(&ctx).await
        }

        /// Seed a record stored `age` ago.
        pub async fn seed(&self, request: &ResourceRequest, payload: &[u8], age: Duration) {
            let url = request.parsed_url().expect("valid url");
            let key = CacheKey::from_parts(request.method(), &url);
            let rule = self.router.route_parsed(request, &url);
            let stored_at = self.clock.now() - chrono::Duration::from_std(age).expect("age");
            let record = CacheRecord::from_response(
                key.clone(),
                &ResourceResponse::ok(payload.to_vec(), stored_at),
                stored_at,
                rule.freshness_window(),
                rule.strategy(),
            );
            self.store
                .put(&self.partition, &key, record)
                .await
                .expect("seed put");
        }
    }
}
