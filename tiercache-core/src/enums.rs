//! Policy vocabulary shared across crates.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Consistency strategy governing whether cache or network is consulted first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Serve a fresh cached record without touching the network.
    CacheFirst,
    /// Always try the network; fall back to a fresh cached record on failure.
    NetworkFirst,
    /// Passthrough for requests that are never cached.
    NetworkOnly,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CacheFirst => "cache_first",
            Self::NetworkFirst => "network_first",
            Self::NetworkOnly => "network_only",
        }
    }

    /// Whether responses produced under this strategy are written back.
    pub fn writes_back(&self) -> bool {
        !matches!(self, Self::NetworkOnly)
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-request diagnostics classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Diagnostic {
    /// Served from cache without a network round-trip.
    Hit,
    /// Served from the network.
    Miss,
    /// Served from cache after a network failure.
    Degraded,
    /// No usable response; a placeholder or an unavailable result was produced.
    Failure,
}

impl Diagnostic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hit => "hit",
            Self::Miss => "miss",
            Self::Degraded => "degraded",
            Self::Failure => "failure",
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_writes_back() {
        assert!(Strategy::CacheFirst.writes_back());
        assert!(Strategy::NetworkFirst.writes_back());
        assert!(!Strategy::NetworkOnly.writes_back());
    }

    #[test]
    fn test_strategy_serde_names() {
        let json = serde_json::to_string(&Strategy::NetworkFirst).expect("serialize");
        assert_eq!(json, "\"network_first\"");
        let back: Strategy = serde_json::from_str("\"cache_first\"").expect("deserialize");
        assert_eq!(back, Strategy::CacheFirst);
    }

    #[test]
    fn test_diagnostic_display() {
        assert_eq!(Diagnostic::Degraded.to_string(), "degraded");
        assert_eq!(Diagnostic::Hit.to_string(), "hit");
    }
}
