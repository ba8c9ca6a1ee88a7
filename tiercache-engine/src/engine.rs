//! The `respond` entry point.
//!
//! [`TierCache`] wires the router, both cache tiers, the transport and the
//! lifecycle manager together. Every cacheable fetch goes through
//! [`TierCache::respond`], which never returns an error: failures come back
//! as a structured [`Resolution`].

use std::sync::Arc;
use std::time::Duration;

use tiercache_core::{
    CacheKey, CacheRecord, ResourceRequest, SharedClock, StorageError, SystemClock,
    TierCacheConfig, TierCacheResult,
};
use tiercache_storage::{
    EphemeralCache, InMemoryPartitionStore, LmdbPartitionStore, PartitionHandle, PartitionStore,
};

use crate::fallback::{self, Resolution};
use crate::lifecycle::{ActivationError, ActivationPlan, ActivationReport, LifecycleManager};
use crate::metrics::{RespondMetrics, RespondMetricsSnapshot};
use crate::router::PolicyRouter;
use crate::strategy::{self, StrategyContext, Writeback};
use crate::transport::{NetworkTransport, ReqwestTransport};

/// Builder for [`TierCache`]. Unset parts are derived from the config.
pub struct TierCacheBuilder {
    config: TierCacheConfig,
    store: Option<Arc<dyn PartitionStore>>,
    transport: Option<Arc<dyn NetworkTransport>>,
    router: Option<PolicyRouter>,
    clock: Option<SharedClock>,
}

impl TierCacheBuilder {
    pub fn new(config: TierCacheConfig) -> Self {
        Self {
            config,
            store: None,
            transport: None,
            router: None,
            clock: None,
        }
    }

    pub fn store(mut self, store: Arc<dyn PartitionStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn NetworkTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn router(mut self, router: PolicyRouter) -> Self {
        self.router = Some(router);
        self
    }

    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Validate the config and build the engine.
    ///
    /// Defaults: LMDB store when `store_path` is set (in-memory otherwise),
    /// reqwest transport, and the standard rule set.
    pub fn build(self) -> TierCacheResult<TierCache> {
        self.config.validate()?;
        let clock = self.clock.unwrap_or_else(SystemClock::shared);

        let store: Arc<dyn PartitionStore> = match self.store {
            Some(store) => store,
            None => match &self.config.store_path {
                Some(path) => Arc::new(
                    LmdbPartitionStore::with_clock(
                        path,
                        self.config.store_max_size_mb,
                        clock.clone(),
                    )
                    .map_err(StorageError::from)?,
                ),
                None => Arc::new(InMemoryPartitionStore::with_clock(clock.clone())),
            },
        };

        let transport: Arc<dyn NetworkTransport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new(self.config.fetch_timeout())?),
        };

        let router = match self.router {
            Some(router) => router,
            None => PolicyRouter::from_config(&self.config)?,
        };

        Ok(TierCache {
            ephemeral: EphemeralCache::with_clock(self.config.ephemeral_max_size, clock.clone()),
            lifecycle: LifecycleManager::new(Arc::clone(&store), clock.clone())
                .with_fetch_timeout(self.config.fetch_timeout()),
            metrics: Arc::new(RespondMetrics::new()),
            router,
            store,
            transport,
            clock,
            config: self.config,
        })
    }
}

/// Tiered resource cache.
pub struct TierCache {
    config: TierCacheConfig,
    router: PolicyRouter,
    store: Arc<dyn PartitionStore>,
    ephemeral: EphemeralCache<CacheRecord>,
    transport: Arc<dyn NetworkTransport>,
    lifecycle: LifecycleManager,
    clock: SharedClock,
    metrics: Arc<RespondMetrics>,
}

impl TierCache {
    pub fn builder(config: TierCacheConfig) -> TierCacheBuilder {
        TierCacheBuilder::new(config)
    }

    /// Resolve a resource request through the cache tiers and network.
    pub async fn respond(&self, request: &ResourceRequest) -> Resolution {
        let url = match request.parsed_url() {
            Ok(url) => url,
            Err(error) => {
                tracing::debug!(
                    method = request.method(),
                    url = request.url(),
                    error = %error,
                    "Rejected unclassified request"
                );
                self.metrics
                    .unclassified
                    .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                let resolution = fallback::unavailable(error, self.clock.now());
                self.metrics.record(resolution.diagnostic());
                return resolution;
            }
        };

        let key = CacheKey::from_parts(request.method(), &url);
        let rule = self.router.route_parsed(request, &url);
        let active = self.lifecycle.snapshot();
        let partition = if rule.strategy().writes_back() {
            active.as_ref().and_then(|set| set.handle(rule.purpose()))
        } else {
            None
        };

        let ctx = StrategyContext {
            request,
            url: &url,
            key: &key,
            rule,
            partition,
            store: self.store.as_ref(),
            transport: self.transport.as_ref(),
            ephemeral: &self.ephemeral,
            ephemeral_ttl: self.config.ephemeral_ttl(),
            fetch_timeout: self.config.fetch_timeout(),
            clock: self.clock.as_ref(),
        };
        let execution = strategy::execute(&ctx).await;

        if let Some(writeback) = execution.writeback {
            self.apply_writeback(partition, writeback).await;
        }

        let resolution = fallback::resolve(execution.outcome, rule, self.clock.now());
        self.metrics.record(resolution.diagnostic());

        tracing::debug!(
            key = %key,
            rule = rule.name(),
            strategy = %rule.strategy(),
            diagnostic = ?resolution.diagnostic(),
            status_tag = resolution.status_tag(),
            "Request resolved"
        );

        resolution
    }

    async fn apply_writeback(&self, partition: Option<&PartitionHandle>, writeback: Writeback) {
        let Writeback {
            record,
            ephemeral_ttl,
        } = writeback;

        let Some(partition) = partition else {
            self.count_skipped();
            return;
        };

        if let Some(ttl) = ephemeral_ttl {
            self.ephemeral
                .set(strategy::ephemeral_key(partition, &record.key), record.clone(), ttl);
        }

        let key = record.key.clone();
        match self.store.put(partition, &key, record).await {
            Ok(()) => {
                self.metrics
                    .writebacks
                    .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            }
            Err(StorageError::PartitionGone { partition }) => {
                tracing::debug!(key = %key, partition = %partition, "Partition gone, write-back skipped");
                self.count_skipped();
            }
            Err(e) => {
                tracing::warn!(key = %key, partition = %partition, error = %e, "Write-back failed");
                self.count_skipped();
            }
        }
    }

    fn count_skipped(&self) {
        self.metrics
            .writebacks_skipped
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    }

    /// Activate a partition version.
    ///
    /// On success the ephemeral tier is emptied along with the superseded
    /// partitions.
    pub async fn activate(
        &self,
        plan: &ActivationPlan,
    ) -> Result<ActivationReport, ActivationError> {
        let report = self
            .lifecycle
            .activate(plan, &self.router, self.transport.as_ref())
            .await?;
        self.ephemeral.clear();
        Ok(report)
    }

    /// Activate the configured version with the configured precache list.
    pub async fn activate_configured(&self) -> Result<ActivationReport, ActivationError> {
        let plan = ActivationPlan::new(self.config.partition_version)
            .with_precache(self.config.precache.iter().cloned());
        self.activate(&plan).await
    }

    /// Start the ephemeral sweep on the current tokio runtime.
    pub fn start(&self) {
        self.start_with_interval(self.config.ephemeral_sweep_interval());
    }

    pub fn start_with_interval(&self, interval: Duration) {
        self.ephemeral.start(interval);
    }

    /// Stop the ephemeral sweep.
    pub fn stop(&self) -> bool {
        self.ephemeral.stop()
    }

    pub fn active_version(&self) -> Option<u32> {
        self.lifecycle.active_version()
    }

    pub fn metrics(&self) -> RespondMetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn config(&self) -> &TierCacheConfig {
        &self.config
    }

    pub fn router(&self) -> &PolicyRouter {
        &self.router
    }

    pub fn store(&self) -> &Arc<dyn PartitionStore> {
        &self.store
    }

    pub fn ephemeral(&self) -> &EphemeralCache<CacheRecord> {
        &self.ephemeral
    }

    pub fn lifecycle(&self) -> &LifecycleManager {
        &self.lifecycle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::test_support::FixedTransport;
    use tempfile::TempDir;
    use tiercache_core::{Diagnostic, ManualClock};

    fn engine_with(
        transport: Arc<FixedTransport>,
        clock: Arc<ManualClock>,
    ) -> (TierCache, Arc<InMemoryPartitionStore>) {
        let store = Arc::new(InMemoryPartitionStore::with_clock(clock.clone()));
        let engine = TierCache::builder(TierCacheConfig::default())
            .store(store.clone())
            .transport(transport)
            .clock(clock)
            .build()
            .expect("engine should build");
        (engine, store)
    }

    #[tokio::test]
    async fn test_unclassified_request_is_rejected_without_fetch() {
        let clock = Arc::new(ManualClock::starting_now());
        let transport = Arc::new(FixedTransport::ok(b"x", &clock));
        let (engine, _store) = engine_with(transport.clone(), clock);

        let resolution = engine.respond(&ResourceRequest::get("/relative")).await;
        assert!(resolution.is_unavailable());
        assert_eq!(resolution.error().map(|e| e.kind()), Some("unclassified"));
        assert_eq!(transport.calls(), 0);
        assert_eq!(engine.metrics().unclassified, 1);
    }

    #[tokio::test]
    async fn test_network_first_success_is_written_to_both_tiers() {
        let clock = Arc::new(ManualClock::starting_now());
        let transport = Arc::new(FixedTransport::ok(b"[42]", &clock));
        let (engine, store) = engine_with(transport, clock);
        engine
            .activate(&ActivationPlan::new(1))
            .await
            .expect("activation");

        let request = ResourceRequest::get("https://shop.example/api/products");
        let resolution = engine.respond(&request).await;
        assert_eq!(resolution.diagnostic(), Diagnostic::Miss);

        let key = request.cache_key().expect("key");
        let handle = store.open("api-v1").await.expect("open");
        let stored = store.get(&handle, &key).await.expect("get").expect("record");
        assert_eq!(stored.payload, b"[42]".to_vec());
        assert!(engine
            .ephemeral()
            .get(&strategy::ephemeral_key(&handle, &key))
            .is_some());
        assert_eq!(engine.metrics().writebacks, 1);
    }

    #[tokio::test]
    async fn test_writeback_without_active_version_is_skipped() {
        let clock = Arc::new(ManualClock::starting_now());
        let transport = Arc::new(FixedTransport::ok(b"bytes", &clock));
        let (engine, store) = engine_with(transport, clock);

        let resolution = engine
            .respond(&ResourceRequest::get("https://shop.example/img/a.png"))
            .await;
        assert_eq!(resolution.diagnostic(), Diagnostic::Miss);
        assert_eq!(engine.metrics().writebacks_skipped, 1);
        assert_eq!(store.stats().await.expect("stats").entry_count, 0);
    }

    #[tokio::test]
    async fn test_writeback_into_collected_partition_is_skipped() {
        let clock = Arc::new(ManualClock::starting_now());
        let transport = Arc::new(FixedTransport::ok(b"bytes", &clock));
        let (engine, store) = engine_with(transport, clock);
        engine
            .activate(&ActivationPlan::new(1))
            .await
            .expect("activation");

        // Simulate a GC racing an in-flight request
        store.delete_all_except(&[]).await.expect("gc");

        let resolution = engine
            .respond(&ResourceRequest::get("https://shop.example/app.css"))
            .await;
        assert_eq!(resolution.diagnostic(), Diagnostic::Miss);
        assert_eq!(engine.metrics().writebacks_skipped, 1);
    }

    #[tokio::test]
    async fn test_lmdb_store_from_config() {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let config = TierCacheConfig {
            store_path: Some(temp_dir.path().to_path_buf()),
            store_max_size_mb: 10,
            ..Default::default()
        };
        let clock = Arc::new(ManualClock::starting_now());
        let transport = Arc::new(FixedTransport::ok(b"<svg/>", &clock));
        let engine = TierCache::builder(config)
            .transport(transport.clone())
            .clock(clock)
            .build()
            .expect("engine should build");
        engine.activate_configured().await.expect("activation");

        let request = ResourceRequest::get("https://shop.example/logo.svg");
        assert_eq!(engine.respond(&request).await.diagnostic(), Diagnostic::Miss);
        assert_eq!(engine.respond(&request).await.diagnostic(), Diagnostic::Hit);
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_invalid_config_fails_build() {
        let config = TierCacheConfig {
            partition_version: 0,
            ..Default::default()
        };
        assert!(TierCache::builder(config).build().is_err());
    }
}
