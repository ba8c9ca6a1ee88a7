//! TIERCACHE Test Utilities
//!
//! Shared test infrastructure for the tiercache workspace:
//! - Stub network transports (scripted, always-failing, counting)
//! - Fixtures for requests, configs and engines
//! - Proptest generators for paths, payloads and keys
//! - Assertions on resolutions

pub use tiercache_core::{
    CacheKey, CacheRecord, Diagnostic, ManualClock, Purpose, ResourceError, ResourceRequest,
    ResourceResponse, Strategy, TierCacheConfig, TransportError, STATUS_TAG,
};
pub use tiercache_engine::{NetworkTransport, Resolution, TierCache};
pub use tiercache_storage::{InMemoryPartitionStore, PartitionStore};

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

// ============================================================================
// STUB TRANSPORTS
// ============================================================================

/// Scripted transport: fixed responses per URL, switchable offline.
///
/// Unscripted URLs get the default response when one is set and a
/// connection error otherwise.
#[derive(Debug, Default)]
pub struct StubTransport {
    responses: Mutex<HashMap<String, (u16, Vec<u8>)>>,
    default: Mutex<Option<(u16, Vec<u8>)>>,
    offline: AtomicBool,
    calls: AtomicUsize,
    requested: Mutex<Vec<String>>,
}

impl StubTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `url` with `status` and `payload`.
    pub fn with_response(self, url: impl Into<String>, status: u16, payload: impl Into<Vec<u8>>) -> Self {
        self.set_response(url, status, payload);
        self
    }

    /// Answer every unscripted URL with `200` and `payload`.
    pub fn with_default(self, payload: impl Into<Vec<u8>>) -> Self {
        *self.default.lock().unwrap_or_else(PoisonError::into_inner) = Some((200, payload.into()));
        self
    }

    pub fn set_response(&self, url: impl Into<String>, status: u16, payload: impl Into<Vec<u8>>) {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(url.into(), (status, payload.into()));
    }

    /// Make every subsequent fetch fail (or succeed again).
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Total fetches attempted, including failed ones.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Fetches attempted for `url`.
    pub fn calls_for(&self, url: &str) -> usize {
        self.requested_urls().iter().filter(|u| u.as_str() == url).count()
    }

    pub fn requested_urls(&self) -> Vec<String> {
        self.requested
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl NetworkTransport for StubTransport {
    async fn fetch(&self, request: &ResourceRequest) -> Result<ResourceResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requested
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.url().to_string());

        if self.offline.load(Ordering::SeqCst) {
            return Err(offline_error(request));
        }

        let scripted = self
            .responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(request.url())
            .cloned();
        let answer = match scripted {
            Some(answer) => Some(answer),
            None => self
                .default
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        };

        match answer {
            Some((status, payload)) => Ok(ResourceResponse::new(status, payload, chrono::Utc::now())
                .with_metadata("content-type", "application/octet-stream")),
            None => Err(offline_error(request)),
        }
    }
}

fn offline_error(request: &ResourceRequest) -> TransportError {
    TransportError::Connect {
        url: request.url().to_string(),
        reason: "network unreachable".to_string(),
    }
}

/// Transport whose every fetch throws.
#[derive(Debug, Default)]
pub struct FailingTransport {
    calls: AtomicUsize,
}

impl FailingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NetworkTransport for FailingTransport {
    async fn fetch(&self, request: &ResourceRequest) -> Result<ResourceResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(offline_error(request))
    }
}

/// Counts fetches passing through to an inner transport.
pub struct CountingTransport {
    inner: Arc<dyn NetworkTransport>,
    calls: AtomicUsize,
}

impl CountingTransport {
    pub fn new(inner: Arc<dyn NetworkTransport>) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NetworkTransport for CountingTransport {
    async fn fetch(&self, request: &ResourceRequest) -> Result<ResourceResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.fetch(request).await
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for generating tiercache inputs.

    use proptest::prelude::*;

    /// Generate a lowercase path segment.
    pub fn arb_segment() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9-]{0,11}"
    }

    /// Generate an opaque payload.
    pub fn arb_payload() -> impl Strategy<Value = Vec<u8>> {
        prop::collection::vec(any::<u8>(), 1..256)
    }

    /// Generate an image path (`/img/<segment>.<ext>`).
    pub fn arb_image_path() -> impl Strategy<Value = String> {
        (
            arb_segment(),
            prop_oneof![Just("png"), Just("jpg"), Just("gif"), Just("svg"), Just("webp")],
        )
            .prop_map(|(name, ext)| format!("/img/{}.{}", name, ext))
    }

    /// Generate an API path (`/api/<segment>[/<segment>]`).
    pub fn arb_api_path() -> impl Strategy<Value = String> {
        prop::collection::vec(arb_segment(), 1..3)
            .prop_map(|segments| format!("/api/{}", segments.join("/")))
    }

    /// Generate a static asset path.
    pub fn arb_static_path() -> impl Strategy<Value = String> {
        (
            arb_segment(),
            prop_oneof![Just("js"), Just("css"), Just("woff2")],
        )
            .prop_map(|(name, ext)| format!("/static/{}.{}", name, ext))
    }

    /// Generate a distinct set of ephemeral keys.
    pub fn arb_distinct_keys(max: usize) -> impl Strategy<Value = Vec<String>> {
        prop::collection::hash_set(arb_segment(), 1..max.max(2))
            .prop_map(|keys| keys.into_iter().collect())
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built test fixtures for common testing scenarios.

    use super::*;

    /// Origin used by every fixture request.
    pub const ORIGIN: &str = "https://shop.example";

    pub fn url(path: &str) -> String {
        format!("{}{}", ORIGIN, path)
    }

    pub fn get(path: &str) -> ResourceRequest {
        ResourceRequest::get(url(path))
    }

    pub fn navigation(path: &str) -> ResourceRequest {
        ResourceRequest::navigation(url(path))
    }

    /// Engine over an in-memory store, with a manual clock and `transport`.
    pub fn engine(
        config: TierCacheConfig,
        transport: Arc<dyn NetworkTransport>,
        clock: Arc<ManualClock>,
    ) -> (TierCache, Arc<InMemoryPartitionStore>) {
        let store = Arc::new(InMemoryPartitionStore::with_clock(clock.clone()));
        let engine = TierCache::builder(config)
            .store(store.clone())
            .transport(transport)
            .clock(clock)
            .build()
            .expect("fixture engine should build");
        (engine, store)
    }

    /// Record for `request`, stored at `stored_at`.
    pub fn record(
        request: &ResourceRequest,
        payload: &[u8],
        stored_at: tiercache_core::Timestamp,
        freshness: std::time::Duration,
        strategy: Strategy,
    ) -> CacheRecord {
        let key = request.cache_key().expect("fixture request should be valid");
        CacheRecord::from_response(
            key,
            &ResourceResponse::ok(payload.to_vec(), stored_at),
            stored_at,
            freshness,
            strategy,
        )
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions on `respond` results.

    use super::*;

    /// Assert the resolution served `payload` with the given diagnostic.
    #[track_caller]
    pub fn assert_served(resolution: &Resolution, diagnostic: Diagnostic, payload: &[u8]) {
        assert_eq!(resolution.diagnostic(), diagnostic, "resolution: {:?}", resolution);
        let response = resolution
            .response()
            .unwrap_or_else(|| panic!("expected a response, got: {:?}", resolution));
        assert_eq!(response.payload, payload.to_vec(), "payload mismatch");
        assert_eq!(
            response.metadata.get(STATUS_TAG).map(String::as_str),
            Some(resolution.status_tag())
        );
    }

    /// Assert the resolution is a structured unavailable result of `kind`.
    #[track_caller]
    pub fn assert_unavailable(resolution: &Resolution, kind: &str) {
        match resolution {
            Resolution::Unavailable { error, .. } => {
                assert_eq!(error.kind(), kind, "wrong failure kind: {:?}", error)
            }
            other => panic!("Expected unavailable result, got: {:?}", other),
        }
    }

    /// Assert the resolution is the placeholder resource.
    #[track_caller]
    pub fn assert_placeholder(resolution: &Resolution) {
        match resolution {
            Resolution::Placeholder { response, .. } => {
                assert_eq!(response.status_tag(), Some("placeholder"))
            }
            other => panic!("Expected placeholder, got: {:?}", other),
        }
    }
}
