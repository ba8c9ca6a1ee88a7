//! Tracing subscriber initialization.

use thiserror::Error;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "tiercache_engine=info,tiercache_storage=info,warn";

/// Telemetry configuration from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Filter used when `RUST_LOG` is unset
    pub default_filter: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            default_filter: DEFAULT_FILTER.to_string(),
            json: true,
        }
    }
}

impl TelemetryConfig {
    /// Read configuration from the environment.
    ///
    /// - `TIERCACHE_LOG_FILTER`: default filter (default: engine/storage at info)
    /// - `TIERCACHE_LOG_FORMAT`: `json` or `pretty` (default: json)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            default_filter: std::env::var("TIERCACHE_LOG_FILTER")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.default_filter),
            json: std::env::var("TIERCACHE_LOG_FORMAT")
                .map(|s| !s.eq_ignore_ascii_case("pretty"))
                .unwrap_or(defaults.json),
        }
    }
}

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("Invalid log filter {filter:?}: {reason}")]
    InvalidFilter { filter: String, reason: String },

    #[error("Failed to init subscriber: {0}")]
    Init(String),
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over the configured default filter. Fails if a
/// global subscriber is already installed.
pub fn init_tracing(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.default_filter).map_err(|e| {
            TelemetryError::InvalidFilter {
                filter: config.default_filter.clone(),
                reason: e.to_string(),
            }
        })?,
    };

    let json_layer = config.json.then(|| fmt::layer().json());
    let text_layer = (!config.json).then(fmt::layer);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .try_init()
        .map_err(|e| TelemetryError::Init(e.to_string()))?;

    tracing::info!(json = config.json, "Telemetry initialized");
    Ok(())
}
