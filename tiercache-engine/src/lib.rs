//! TIERCACHE Engine - Routing, Strategies, Fallback and Lifecycle
//!
//! Request flow:
//!
//! ```text
//! respond(request)
//!   -> PolicyRouter::route         (rule: partition, strategy, freshness)
//!   -> strategy::execute           (cache-first | network-first | network-only)
//!   -> write-back                  (partition store, ephemeral cache)
//!   -> fallback::resolve           (hit | miss | degraded | placeholder | unavailable)
//! ```
//!
//! [`LifecycleManager`] owns which partition version is active and deletes
//! superseded versions once a new one is ready.

pub mod engine;
pub mod fallback;
pub mod lifecycle;
pub mod metrics;
pub mod router;
pub mod strategy;
pub mod telemetry;
pub mod transport;

pub use engine::{TierCache, TierCacheBuilder};
pub use fallback::{Resolution, UNAVAILABLE_STATUS};
pub use lifecycle::{ActivationError, ActivationPlan, ActivationReport, ActiveSet, LifecycleManager};
pub use metrics::{RespondMetrics, RespondMetricsSnapshot};
pub use router::{
    EncodingRewrite, FallbackResource, PolicyRouter, PolicyRule, RouteMatcher, StaleFallback,
};
pub use strategy::{ephemeral_key, Execution, StrategyContext, StrategyOutcome, Writeback};
pub use telemetry::{init_tracing, TelemetryConfig, TelemetryError};
pub use transport::{fetch_with_timeout, NetworkTransport, ReqwestTransport};
