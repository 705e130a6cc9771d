//! Gateway configuration

use serde::Deserialize;

mod defaults {
    pub const fn enabled() -> bool {
        true
    }

    pub fn listen_address() -> String {
        "[::]:8080".to_string()
    }

    pub const fn burst() -> u32 {
        60
    }

    pub const fn per_second() -> f64 {
        1.0
    }
}

/// ```ron
/// gateway: (
///     listen_address: "127.0.0.1:8080",
///     ingest_token: Some("change-me"),
///     rate_limit: (burst: 120, per_second: 2.0),
/// ),
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GatewayConfig {
    /// When disabled, neither the probes nor the enqueue endpoint are served
    #[serde(default = "defaults::enabled")]
    pub enabled: bool,

    /// Common values:
    /// - `[::]:8080` (IPv6 any address)
    /// - `0.0.0.0:8080` (IPv4 any address)
    /// - `127.0.0.1:8080` (localhost only)
    #[serde(default = "defaults::listen_address")]
    pub listen_address: String,

    /// Bearer token required by `POST /v1/events`. Unset leaves it open.
    #[serde(default)]
    pub ingest_token: Option<String>,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            enabled: defaults::enabled(),
            listen_address: defaults::listen_address(),
            ingest_token: None,
            rate_limit: RateLimitConfig::default(),
        }
    }
}

/// Token bucket applied per client address.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct RateLimitConfig {
    /// Requests a client may make back to back
    #[serde(default = "defaults::burst")]
    pub burst: u32,

    /// Sustained requests per second once the burst is spent
    #[serde(default = "defaults::per_second")]
    pub per_second: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            burst: defaults::burst(),
            per_second: defaults::per_second(),
        }
    }
}
