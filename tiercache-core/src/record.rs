//! Cache records and tagged responses.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::enums::Strategy;
use crate::request::CacheKey;
use crate::{Timestamp, STATUS_TAG};

/// Response metadata (headers and engine tags).
pub type Metadata = BTreeMap<String, String>;

/// Tagged response record handed back to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceResponse {
    pub status: u16,
    pub payload: Vec<u8>,
    pub metadata: Metadata,
    /// When the payload was produced (fetched, or originally stored for cache hits).
    pub stored_at: Timestamp,
}

impl ResourceResponse {
    pub fn new(status: u16, payload: impl Into<Vec<u8>>, stored_at: Timestamp) -> Self {
        Self {
            status,
            payload: payload.into(),
            metadata: Metadata::new(),
            stored_at,
        }
    }

    /// `200` response.
    pub fn ok(payload: impl Into<Vec<u8>>, stored_at: Timestamp) -> Self {
        Self::new(200, payload, stored_at)
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Whether the status is in the 2xx range. Only those are written back.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.metadata.get("content-type").map(String::as_str)
    }

    /// Engine status tag (`hit`, `miss`, `degraded`, `placeholder`, `unavailable`).
    pub fn status_tag(&self) -> Option<&str> {
        self.metadata.get(STATUS_TAG).map(String::as_str)
    }

    /// Set the engine status tag.
    pub fn with_status_tag(mut self, tag: &str) -> Self {
        self.metadata.insert(STATUS_TAG.to_string(), tag.to_string());
        self
    }
}

/// A stored request→response record.
///
/// Records are immutable snapshots: a refresh replaces the whole record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheRecord {
    pub key: CacheKey,
    pub status: u16,
    pub payload: Vec<u8>,
    pub metadata: Metadata,
    pub stored_at: Timestamp,
    pub freshness_window: Duration,
    pub source_strategy: Strategy,
}

impl CacheRecord {
    /// Snapshot a network response.
    pub fn from_response(
        key: CacheKey,
        response: &ResourceResponse,
        stored_at: Timestamp,
        freshness_window: Duration,
        source_strategy: Strategy,
    ) -> Self {
        let mut metadata = response.metadata.clone();
        metadata.remove(STATUS_TAG);
        Self {
            key,
            status: response.status,
            payload: response.payload.clone(),
            metadata,
            stored_at,
            freshness_window,
            source_strategy,
        }
    }

    /// Time since the record was stored. Clock skew never yields a negative age.
    pub fn age(&self, now: Timestamp) -> Duration {
        now.signed_duration_since(self.stored_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    /// `now - stored_at < freshness_window`.
    pub fn is_fresh(&self, now: Timestamp) -> bool {
        self.age(now) < self.freshness_window
    }

    /// Response view of this record.
    pub fn to_response(&self) -> ResourceResponse {
        ResourceResponse {
            status: self.status,
            payload: self.payload.clone(),
            metadata: self.metadata.clone(),
            stored_at: self.stored_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record_stored_at(stored_at: Timestamp, freshness: Duration) -> CacheRecord {
        let response = ResourceResponse::ok(b"payload".to_vec(), stored_at)
            .with_metadata("content-type", "application/json");
        CacheRecord::from_response(
            CacheKey::from_canonical("GET https://example.com/api/products"),
            &response,
            stored_at,
            freshness,
            Strategy::NetworkFirst,
        )
    }

    #[test]
    fn test_freshness_window_is_exclusive() {
        let stored_at = Utc::now();
        let record = record_stored_at(stored_at, Duration::from_secs(60));

        assert!(record.is_fresh(stored_at));
        assert!(record.is_fresh(stored_at + chrono::Duration::seconds(59)));
        assert!(!record.is_fresh(stored_at + chrono::Duration::seconds(60)));
        assert!(!record.is_fresh(stored_at + chrono::Duration::seconds(61)));
    }

    #[test]
    fn test_age_never_negative() {
        let stored_at = Utc::now();
        let record = record_stored_at(stored_at, Duration::from_secs(60));
        let earlier = stored_at - chrono::Duration::seconds(10);
        assert_eq!(record.age(earlier), Duration::ZERO);
    }

    #[test]
    fn test_record_drops_engine_tag() {
        let now = Utc::now();
        let response = ResourceResponse::ok(b"x".to_vec(), now).with_status_tag("miss");
        let record = CacheRecord::from_response(
            CacheKey::from_canonical("GET https://example.com/a.png"),
            &response,
            now,
            Duration::from_secs(1),
            Strategy::CacheFirst,
        );
        assert!(record.to_response().status_tag().is_none());
    }

    #[test]
    fn test_success_range() {
        let now = Utc::now();
        assert!(ResourceResponse::new(204, Vec::new(), now).is_success());
        assert!(!ResourceResponse::new(304, Vec::new(), now).is_success());
        assert!(!ResourceResponse::new(503, Vec::new(), now).is_success());
    }
}
