//! Network transport abstraction.
//!
//! Executors only ever see [`NetworkTransport`]; the reqwest-backed
//! [`ReqwestTransport`] is the production implementation and tests supply
//! stubs.

use async_trait::async_trait;
use reqwest::header::{HeaderName, HeaderValue};
use std::time::Duration;
use tiercache_core::{Metadata, ResourceRequest, ResourceResponse, SharedClock, SystemClock, TransportError};

/// Async fetch of a single resource.
///
/// Any status the server answers with is a resolved fetch (`Ok`); `Err` is
/// reserved for the fetch throwing or never resolving.
#[async_trait]
pub trait NetworkTransport: Send + Sync {
    async fn fetch(&self, request: &ResourceRequest) -> Result<ResourceResponse, TransportError>;
}

/// Fetch through `transport`, failing with [`TransportError::Timeout`] once
/// `limit` elapses. Dropping the returned future drops the fetch.
pub async fn fetch_with_timeout(
    transport: &dyn NetworkTransport,
    request: &ResourceRequest,
    limit: Option<Duration>,
) -> Result<ResourceResponse, TransportError> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, transport.fetch(request))
            .await
            .unwrap_or_else(|_| {
                Err(TransportError::Timeout {
                    url: request.url().to_string(),
                    after: limit,
                })
            }),
        None => transport.fetch(request).await,
    }
}

/// HTTP transport over a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    timeout: Option<Duration>,
    clock: SharedClock,
}

impl ReqwestTransport {
    /// Transport with an optional whole-request timeout.
    pub fn new(timeout: Option<Duration>) -> Result<Self, TransportError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(|e| TransportError::Connect {
            url: String::new(),
            reason: format!("failed to build HTTP client: {}", e),
        })?;
        Ok(Self::with_client(client, timeout))
    }

    /// Wrap an already configured client.
    pub fn with_client(client: reqwest::Client, timeout: Option<Duration>) -> Self {
        Self {
            client,
            timeout,
            clock: SystemClock::shared(),
        }
    }

    fn classify(&self, url: &str, e: reqwest::Error) -> TransportError {
        if e.is_timeout() {
            TransportError::Timeout {
                url: url.to_string(),
                after: self.timeout.unwrap_or_default(),
            }
        } else {
            TransportError::Connect {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    }
}

#[async_trait]
impl NetworkTransport for ReqwestTransport {
    async fn fetch(&self, request: &ResourceRequest) -> Result<ResourceResponse, TransportError> {
        let url = request.url();
        let method = reqwest::Method::from_bytes(request.method().to_ascii_uppercase().as_bytes())
            .map_err(|e| TransportError::Connect {
                url: url.to_string(),
                reason: format!("invalid method: {}", e),
            })?;

        let mut builder = self.client.request(method, url);
        for (name, value) in request.headers() {
            // Unrepresentable headers are dropped rather than failing the fetch
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                builder = builder.header(name, value);
            }
        }

        let response = builder.send().await.map_err(|e| self.classify(url, e))?;

        let status = response.status().as_u16();
        let mut metadata = Metadata::new();
        for (name, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                metadata.insert(name.as_str().to_string(), value.to_string());
            }
        }

        let payload = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                self.classify(url, e)
            } else {
                TransportError::Body {
                    url: url.to_string(),
                    reason: e.to_string(),
                }
            }
        })?;

        tracing::trace!(url, status, bytes = payload.len(), "Fetched resource");

        Ok(ResourceResponse {
            status,
            payload: payload.to_vec(),
            metadata,
            stored_at: self.clock.now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unreachable_host_is_a_transport_error() {
        let transport =
            ReqwestTransport::new(Some(Duration::from_secs(2))).expect("client should build");
        // Port 9 on loopback (discard) is closed in test environments
        let request = ResourceRequest::get("http://127.0.0.1:9/api/products");

        let err = transport.fetch(&request).await.expect_err("fetch should fail");
        assert!(matches!(
            err,
            TransportError::Connect { .. } | TransportError::Timeout { .. }
        ));
    }

    #[tokio::test]
    async fn test_invalid_method_is_rejected() {
        let transport = ReqwestTransport::new(None).expect("client should build");
        let request = ResourceRequest::new("GE T", "http://127.0.0.1:9/");
        let err = transport.fetch(&request).await.expect_err("fetch should fail");
        assert!(matches!(err, TransportError::Connect { .. }));
    }
}
