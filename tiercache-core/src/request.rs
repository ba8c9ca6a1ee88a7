//! Resource requests and their canonical cache identity.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use url::Url;

use crate::error::ResourceError;

/// Descriptor of an outgoing resource fetch: method, absolute URL and headers.
///
/// Header names are stored lowercased so lookups are case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRequest {
    method: String,
    url: String,
    headers: BTreeMap<String, String>,
}

impl ResourceRequest {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            headers: BTreeMap::new(),
        }
    }

    /// `GET` request for `url`.
    pub fn get(url: impl Into<String>) -> Self {
        Self::new("GET", url)
    }

    /// Top-level page navigation for `url`.
    pub fn navigation(url: impl Into<String>) -> Self {
        Self::get(url)
            .with_header("sec-fetch-mode", "navigate")
            .with_header("accept", "text/html,application/xhtml+xml")
    }

    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
        self
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Whether the caller advertises support for `media_type` in `accept`.
    pub fn accepts(&self, media_type: &str) -> bool {
        self.header("accept")
            .map(|accept| {
                accept
                    .split(',')
                    .filter_map(|part| part.split(';').next())
                    .any(|part| part.trim().eq_ignore_ascii_case(media_type))
            })
            .unwrap_or(false)
    }

    /// Whether this is a top-level page navigation.
    pub fn is_navigation(&self) -> bool {
        self.header("sec-fetch-mode")
            .map(|mode| mode.eq_ignore_ascii_case("navigate"))
            .unwrap_or(false)
            || self.accepts("text/html")
    }

    pub fn is_get(&self) -> bool {
        self.method.eq_ignore_ascii_case("GET")
    }

    /// Same request pointed at another URL.
    pub fn with_url(&self, url: impl Into<String>) -> Self {
        Self {
            method: self.method.clone(),
            url: url.into(),
            headers: self.headers.clone(),
        }
    }

    /// Validate the descriptor and return its parsed, normalized URL.
    ///
    /// Rejects empty or non-token methods and anything that is not an
    /// absolute `http`/`https` URL.
    pub fn parsed_url(&self) -> Result<Url, ResourceError> {
        if self.method.is_empty() || !self.method.bytes().all(|b| b.is_ascii_alphabetic()) {
            return Err(ResourceError::Unclassified {
                reason: format!("invalid method {:?}", self.method),
            });
        }

        let mut url = Url::parse(self.url.trim()).map_err(|e| ResourceError::Unclassified {
            reason: format!("invalid url {:?}: {}", self.url, e),
        })?;

        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            return Err(ResourceError::Unclassified {
                reason: format!("unsupported url {:?}", self.url),
            });
        }

        url.set_fragment(None);
        let mut pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        if pairs.is_empty() {
            url.set_query(None);
        } else {
            pairs.sort();
            url.query_pairs_mut().clear().extend_pairs(pairs);
        }

        Ok(url)
    }

    /// Canonical cache identity of this request.
    pub fn cache_key(&self) -> Result<CacheKey, ResourceError> {
        let url = self.parsed_url()?;
        Ok(CacheKey::from_parts(&self.method, &url))
    }
}

/// Canonical resource identity: uppercased method plus normalized URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    /// Wrap an already canonical key, e.g. one read back from storage.
    pub fn from_canonical(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Key for `method` against an already normalized URL.
    pub fn from_parts(method: &str, url: &Url) -> Self {
        Self(format!("{} {}", method.to_ascii_uppercase(), url.as_str()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
