//! Fallback Resolver
//!
//! Turns a strategy outcome into the final [`Resolution`]. Successes pass
//! through. Failures become a placeholder when the rule has a fallback
//! resource (images) and a tagged `unavailable` result otherwise. Every
//! response leaving here carries the `x-tiercache-status` tag.

use serde::Serialize;
use tiercache_core::{Diagnostic, ResourceError, ResourceResponse, Timestamp};

use crate::router::PolicyRule;
use crate::strategy::StrategyOutcome;

/// Status code of an unavailable result.
pub const UNAVAILABLE_STATUS: u16 = 503;

/// Values of the status tag.
pub mod tags {
    pub const HIT: &str = "hit";
    pub const MISS: &str = "miss";
    pub const DEGRADED: &str = "degraded";
    pub const PLACEHOLDER: &str = "placeholder";
    pub const UNAVAILABLE: &str = "unavailable";
}

#[derive(Debug, Serialize)]
struct UnavailableBody<'a> {
    error: &'static str,
    kind: &'static str,
    detail: &'a str,
}

/// Final result of `respond`.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Fresh cached record.
    Hit(ResourceResponse),
    /// Network response.
    Miss(ResourceResponse),
    /// Cached record served during a network outage.
    Degraded {
        response: ResourceResponse,
        cause: ResourceError,
    },
    /// Static placeholder served in place of a failed resource.
    Placeholder {
        response: ResourceResponse,
        cause: ResourceError,
    },
    /// Structured failure.
    Unavailable {
        error: ResourceError,
        at: Timestamp,
    },
}

impl Resolution {
    /// Per-request diagnostics classification.
    pub fn diagnostic(&self) -> Diagnostic {
        match self {
            Self::Hit(_) => Diagnostic::Hit,
            Self::Miss(_) => Diagnostic::Miss,
            Self::Degraded { .. } => Diagnostic::Degraded,
            Self::Placeholder { .. } | Self::Unavailable { .. } => Diagnostic::Failure,
        }
    }

    pub fn status_tag(&self) -> &'static str {
        match self {
            Self::Hit(_) => tags::HIT,
            Self::Miss(_) => tags::MISS,
            Self::Degraded { .. } => tags::DEGRADED,
            Self::Placeholder { .. } => tags::PLACEHOLDER,
            Self::Unavailable { .. } => tags::UNAVAILABLE,
        }
    }

    /// Response payload, if the resolution carries one.
    pub fn response(&self) -> Option<&ResourceResponse> {
        match self {
            Self::Hit(response) | Self::Miss(response) => Some(response),
            Self::Degraded { response, .. } | Self::Placeholder { response, .. } => Some(response),
            Self::Unavailable { .. } => None,
        }
    }

    /// Error behind a degraded, placeholder or unavailable result.
    pub fn error(&self) -> Option<&ResourceError> {
        match self {
            Self::Hit(_) | Self::Miss(_) => None,
            Self::Degraded { cause, .. } | Self::Placeholder { cause, .. } => Some(cause),
            Self::Unavailable { error, .. } => Some(error),
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }

    /// Response view; unavailable results become a `503` with a JSON body.
    pub fn into_response(self) -> ResourceResponse {
        match self {
            Self::Hit(response) | Self::Miss(response) => response,
            Self::Degraded { response, .. } | Self::Placeholder { response, .. } => response,
            Self::Unavailable { error, at } => unavailable_response(&error, at),
        }
    }
}

fn unavailable_response(error: &ResourceError, at: Timestamp) -> ResourceResponse {
    let detail = error.to_string();
    let body = UnavailableBody {
        error: "resource_unavailable",
        kind: error.kind(),
        detail: &detail,
    };
    // Serializing three string fields cannot fail
    let payload = serde_json::to_vec(&body).unwrap_or_default();

    ResourceResponse::new(UNAVAILABLE_STATUS, payload, at)
        .with_metadata("content-type", "application/json")
        .with_status_tag(tags::UNAVAILABLE)
}

/// Resolve an executor outcome under `rule`.
pub fn resolve(outcome: StrategyOutcome, rule: &PolicyRule, now: Timestamp) -> Resolution {
    match outcome {
        StrategyOutcome::Fresh(response) => Resolution::Hit(response.with_status_tag(tags::HIT)),
        StrategyOutcome::Fetched(response) => {
            Resolution::Miss(response.with_status_tag(tags::MISS))
        }
        StrategyOutcome::Stale { response, cause } => Resolution::Degraded {
            response: response.with_status_tag(tags::DEGRADED),
            cause,
        },
        StrategyOutcome::Failed(error) => match rule.fallback() {
            Some(fallback) => Resolution::Placeholder {
                response: ResourceResponse::ok(fallback.payload.clone(), now)
                    .with_metadata("content-type", fallback.content_type.clone())
                    .with_status_tag(tags::PLACEHOLDER),
                cause: error,
            },
            None => unavailable(error, now),
        },
    }
}

/// Unavailable result for a request that never reached an executor.
pub fn unavailable(error: ResourceError, now: Timestamp) -> Resolution {
    Resolution::Unavailable { error, at: now }
}
