//! Policy Router
//!
//! Classifies every request into exactly one [`PolicyRule`]. Rules are
//! evaluated in declaration order and the first match wins; anything
//! unmatched falls through to a network-first default. Non-`GET` requests
//! are never cached and always get the network-only passthrough rule.

use regex::Regex;
use std::time::Duration;
use tiercache_core::{ConfigError, Purpose, ResourceError, ResourceRequest, Strategy, TierCacheConfig};
use url::Url;

// ============================================================================
// MATCHERS
// ============================================================================

/// Predicate deciding whether a rule applies to a request.
#[derive(Debug, Clone)]
pub enum RouteMatcher {
    /// Regex over the URL path.
    Path(Regex),
    /// Top-level page navigations.
    Navigation,
    /// Any of the inner matchers.
    AnyOf(Vec<RouteMatcher>),
    /// Every request.
    Always,
}

impl RouteMatcher {
    /// Match a raw path regex.
    pub fn pattern(pattern: &str) -> Result<Self, ConfigError> {
        Regex::new(pattern)
            .map(Self::Path)
            .map_err(|e| ConfigError::InvalidValue {
                field: "route pattern".to_string(),
                value: pattern.to_string(),
                reason: e.to_string(),
            })
    }

    /// Match paths ending in one of `extensions` (case-insensitive).
    pub fn extensions(extensions: &[&str]) -> Result<Self, ConfigError> {
        let alternatives: Vec<String> = extensions.iter().map(|ext| regex::escape(ext)).collect();
        Self::pattern(&format!(r"(?i)\.({})$", alternatives.join("|")))
    }

    /// Match paths starting with `prefix`.
    pub fn path_prefix(prefix: &str) -> Result<Self, ConfigError> {
        Self::pattern(&format!("^{}", regex::escape(prefix)))
    }

    pub fn matches(&self, request: &ResourceRequest, path: &str) -> bool {
        match self {
            Self::Path(re) => re.is_match(path),
            Self::Navigation => request.is_navigation(),
            Self::AnyOf(inner) => inner.iter().any(|m| m.matches(request, path)),
            Self::Always => true,
        }
    }
}

// ============================================================================
// RULE PARTS
// ============================================================================

/// Which keys a network-first rule may serve from cache after a network failure.
///
/// Served records must still be within their freshness window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StaleFallback {
    /// Never serve from cache on failure.
    Disabled,
    /// Any cached key.
    AnyKey,
    /// Only the listed paths.
    Only(Vec<String>),
}

impl StaleFallback {
    pub fn allows(&self, path: &str) -> bool {
        match self {
            Self::Disabled => false,
            Self::AnyKey => true,
            Self::Only(paths) => paths.iter().any(|p| p == path),
        }
    }
}

/// Static resource served in place of a failed fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackResource {
    pub content_type: String,
    pub payload: Vec<u8>,
}

const PLACEHOLDER_SVG: &str = concat!(
    r#"<svg xmlns="http://www.w3.org/2000/svg" width="1" height="1" viewBox="0 0 1 1">"#,
    r##"<rect width="1" height="1" fill="#e5e7eb"/></svg>"##
);

impl FallbackResource {
    pub fn new(content_type: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            content_type: content_type.into(),
            payload: payload.into(),
        }
    }

    /// Neutral grey placeholder image.
    pub fn placeholder_image() -> Self {
        Self::new("image/svg+xml", PLACEHOLDER_SVG.as_bytes())
    }
}

/// Rewrite to an alternate encoding the caller advertises support for.
///
/// Only the key and URL change; the rule's strategy does not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodingRewrite {
    /// Media type the caller must accept.
    pub media_type: String,
    /// Extensions eligible for rewriting (lowercase, no dot).
    pub from_extensions: Vec<String>,
    /// Replacement extension (no dot).
    pub to_extension: String,
}

impl EncodingRewrite {
    /// `photo.jpg` → `photo.webp` for callers accepting `image/webp`.
    pub fn webp() -> Self {
        Self {
            media_type: "image/webp".to_string(),
            from_extensions: vec!["jpg".to_string(), "jpeg".to_string(), "png".to_string()],
            to_extension: "webp".to_string(),
        }
    }

    /// Rewritten URL, or `None` when the request does not qualify.
    pub fn apply(&self, request: &ResourceRequest, url: &Url) -> Option<Url> {
        if !request.accepts(&self.media_type) {
            return None;
        }

        let path = url.path();
        let dot = path.rfind('.')?;
        if path[dot..].contains('/') {
            return None;
        }
        let extension = path[dot + 1..].to_ascii_lowercase();
        if !self.from_extensions.iter().any(|e| *e == extension) {
            return None;
        }

        let mut rewritten = url.clone();
        rewritten.set_path(&format!("{}.{}", &path[..dot], self.to_extension));
        Some(rewritten)
    }
}

// ============================================================================
// POLICY RULE
// ============================================================================

/// Static routing decision: where a request is cached and how.
#[derive(Debug, Clone)]
pub struct PolicyRule {
    name: String,
    matcher: RouteMatcher,
    purpose: Purpose,
    strategy: Strategy,
    freshness_window: Duration,
    fallback: Option<FallbackResource>,
    stale_fallback: StaleFallback,
    encoding_rewrite: Option<EncodingRewrite>,
    use_ephemeral: bool,
}

impl PolicyRule {
    /// Start building a rule. Defaults: no fallback resource, stale fallback
    /// for any key, no rewrite, no ephemeral tier.
    pub fn new(
        name: impl Into<String>,
        matcher: RouteMatcher,
        purpose: Purpose,
        strategy: Strategy,
        freshness_window: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            matcher,
            purpose,
            strategy,
            freshness_window,
            fallback: None,
            stale_fallback: StaleFallback::AnyKey,
            encoding_rewrite: None,
            use_ephemeral: false,
        }
    }

    pub fn with_fallback(mut self, fallback: FallbackResource) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn with_stale_fallback(mut self, stale_fallback: StaleFallback) -> Self {
        self.stale_fallback = stale_fallback;
        self
    }

    pub fn with_encoding_rewrite(mut self, rewrite: EncodingRewrite) -> Self {
        self.encoding_rewrite = Some(rewrite);
        self
    }

    pub fn with_ephemeral(mut self, enabled: bool) -> Self {
        self.use_ephemeral = enabled;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn purpose(&self) -> Purpose {
        self.purpose
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub fn freshness_window(&self) -> Duration {
        self.freshness_window
    }

    pub fn fallback(&self) -> Option<&FallbackResource> {
        self.fallback.as_ref()
    }

    pub fn stale_fallback(&self) -> &StaleFallback {
        &self.stale_fallback
    }

    pub fn encoding_rewrite(&self) -> Option<&EncodingRewrite> {
        self.encoding_rewrite.as_ref()
    }

    pub fn use_ephemeral(&self) -> bool {
        self.use_ephemeral
    }

    pub fn matches(&self, request: &ResourceRequest, path: &str) -> bool {
        self.matcher.matches(request, path)
    }
}

// ============================================================================
// ROUTER
// ============================================================================

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "svg", "avif", "ico"];
const STATIC_EXTENSIONS: &[&str] = &["js", "mjs", "css", "woff", "woff2", "ttf", "json", "map"];

/// Ordered rule set with a deterministic default.
#[derive(Debug, Clone)]
pub struct PolicyRouter {
    rules: Vec<PolicyRule>,
    default_rule: PolicyRule,
    passthrough: PolicyRule,
}

impl PolicyRouter {
    /// Router over `rules` (first match wins) with `default_rule` for the rest.
    pub fn new(rules: Vec<PolicyRule>, default_rule: PolicyRule) -> Self {
        Self {
            rules,
            default_rule,
            passthrough: PolicyRule::new(
                "passthrough",
                RouteMatcher::Always,
                Purpose::Pages,
                Strategy::NetworkOnly,
                Duration::ZERO,
            )
            .with_stale_fallback(StaleFallback::Disabled),
        }
    }

    /// Standard images / api / static / pages rule set.
    pub fn from_config(config: &TierCacheConfig) -> Result<Self, ConfigError> {
        let images = PolicyRule::new(
            "images",
            RouteMatcher::extensions(IMAGE_EXTENSIONS)?,
            Purpose::Images,
            Strategy::CacheFirst,
            config.image_freshness(),
        )
        .with_fallback(FallbackResource::placeholder_image())
        .with_encoding_rewrite(EncodingRewrite::webp());

        let api = PolicyRule::new(
            "api",
            RouteMatcher::path_prefix("/api/")?,
            Purpose::Api,
            Strategy::NetworkFirst,
            config.api_freshness(),
        )
        .with_stale_fallback(StaleFallback::AnyKey)
        .with_ephemeral(true);

        let static_assets = PolicyRule::new(
            "static",
            RouteMatcher::AnyOf(vec![
                RouteMatcher::extensions(STATIC_EXTENSIONS)?,
                RouteMatcher::path_prefix("/static/")?,
                RouteMatcher::path_prefix("/assets/")?,
            ]),
            Purpose::Static,
            Strategy::CacheFirst,
            config.static_freshness(),
        );

        let pages = PolicyRule::new(
            "pages",
            RouteMatcher::Navigation,
            Purpose::Pages,
            Strategy::NetworkFirst,
            config.page_freshness(),
        )
        .with_stale_fallback(StaleFallback::Only(vec![config.page_root.clone()]));

        let default_rule = PolicyRule::new(
            "default",
            RouteMatcher::Always,
            Purpose::Pages,
            Strategy::NetworkFirst,
            config.page_freshness(),
        )
        .with_stale_fallback(StaleFallback::Disabled);

        Ok(Self::new(
            vec![images, api, static_assets, pages],
            default_rule,
        ))
    }

    pub fn rules(&self) -> &[PolicyRule] {
        &self.rules
    }

    /// Validate `request` and select its rule.
    ///
    /// # Errors
    ///
    /// [`ResourceError::Unclassified`] for an empty or invalid method or a
    /// URL that is not absolute `http(s)`.
    pub fn route(&self, request: &ResourceRequest) -> Result<&PolicyRule, ResourceError> {
        let url = request.parsed_url()?;
        Ok(self.route_parsed(request, &url))
    }

    /// Select the rule for a request whose URL was already validated.
    pub fn route_parsed(&self, request: &ResourceRequest, url: &Url) -> &PolicyRule {
        if !request.is_get() {
            return &self.passthrough;
        }

        let path = url.path();
        self.rules
            .iter()
            .find(|rule| rule.matches(request, path))
            .unwrap_or(&self.default_rule)
    }
}
