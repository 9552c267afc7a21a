//! Configuration structures.
//!
//! Configuration is loaded from defaults, an optional JSON config file, and
//! environment variables (in that order of precedence, lowest first).

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use super::errors::{Error, Result};

/// Environment variable overriding [`ServerConfig::listen_addr`].
pub const ENV_LISTEN_ADDR: &str = "RELAY_LISTEN_ADDR";
/// Environment variable overriding [`UpstreamConfig::base_url`].
pub const ENV_UPSTREAM_URL: &str = "RELAY_UPSTREAM_URL";
/// Environment variable overriding [`UpstreamConfig::connect_timeout`].
pub const ENV_CONNECT_TIMEOUT: &str = "RELAY_CONNECT_TIMEOUT";

/// Global relay configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Upstream backend configuration.
    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// Per-session relay limits.
    #[serde(default)]
    pub relay: RelayConfig,

    /// Observability configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Build the effective configuration: defaults, then `path` (JSON), then env.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)?;
                serde_json::from_str(&raw)?
            }
            None => Config::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Overlay values from an environment lookup.
    ///
    /// Takes the lookup as a closure so tests don't have to mutate the
    /// process environment.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = lookup(ENV_LISTEN_ADDR).filter(|v| !v.trim().is_empty()) {
            self.server.listen_addr = addr.trim().to_string();
        }
        if let Some(url) = lookup(ENV_UPSTREAM_URL).filter(|v| !v.trim().is_empty()) {
            self.upstream.base_url = url.trim().trim_end_matches('/').to_string();
        }
        if let Some(raw) = lookup(ENV_CONNECT_TIMEOUT).filter(|v| !v.trim().is_empty()) {
            self.upstream.connect_timeout = parse_duration(&raw)?;
        }
        Ok(())
    }
}

/// Parse a humantime duration such as `"60s"` or `"1m 30s"`.
pub fn parse_duration(raw: &str) -> Result<Duration> {
    humantime_serde::re::humantime::parse_duration(raw.trim())
        .map_err(|e| Error::config(format!("invalid duration {:?}: {}", raw, e)))
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Downstream HTTP bind address.
    pub listen_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:3000".to_string(),
        }
    }
}

/// Upstream backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Backend base URL, without trailing slash.
    pub base_url: String,

    /// Path of the event-stream endpoint.
    pub stream_path: String,

    /// Path of the health probe endpoint.
    pub health_path: String,

    /// Endpoint identifier used when the trigger omits one.
    pub default_endpoint: String,

    /// Budget for receiving upstream response headers.
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// Budget for the whole health probe.
    #[serde(with = "humantime_serde")]
    pub health_timeout: Duration,
}

impl UpstreamConfig {
    pub fn stream_url(&self) -> String {
        format!("{}{}", self.base_url, self.stream_path)
    }

    pub fn health_url(&self) -> String {
        format!("{}{}", self.base_url, self.health_path)
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            stream_path: "/generate-docs".to_string(),
            health_path: "/health".to_string(),
            default_endpoint: "generated-endpoint".to_string(),
            connect_timeout: Duration::from_secs(60),
            health_timeout: Duration::from_secs(5),
        }
    }
}

/// Per-session relay limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Bounded channel capacity (in frames) between session and downstream body.
    pub channel_capacity: usize,

    /// How long a single stalled downstream write may block the read loop.
    /// Consumers that cannot accept a frame within this window are dropped.
    #[serde(with = "humantime_serde")]
    pub write_timeout: Duration,

    /// Upper bound for the reassembly buffer. An upstream that never sends a
    /// frame delimiter would otherwise grow it without limit.
    pub max_buffer_bytes: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 64,
            write_timeout: Duration::from_secs(10),
            max_buffer_bytes: 1024 * 1024,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Tracing log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable JSON log formatting.
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}
