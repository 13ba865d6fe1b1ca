//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the broker.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Default landing page for requests that do not ask for a tunnel.
pub const DEFAULT_LANDING_PAGE: &str = "https://localtunnel.github.io/www/";

/// Root configuration for the tunnel broker.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct BrokerConfig {
    /// Public listener (bind address, connection limits).
    pub listener: ListenerConfig,

    /// Tunnel routing and bootstrap settings.
    pub tunnels: TunnelConfig,

    /// In-memory registry and tunnel agent settings.
    pub registry: RegistryConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,

    /// How long in-flight connections may drain on shutdown.
    pub drain_timeout_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:80".to_string(),
            max_connections: 10_000,
            drain_timeout_secs: 10,
        }
    }
}

/// Settings consumed by the router and the control-plane API.
///
/// This is the hot-reloadable part of the configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct TunnelConfig {
    /// Restrict tunnel hostnames to subdomains of this domain.
    pub domain: Option<String>,

    /// Use `https` when synthesizing public tunnel URLs.
    pub secure: bool,

    /// Where `GET /` without `?new` is redirected.
    pub landing_page: String,

    /// Shared bearer secret gating the bootstrap endpoints.
    pub auth: Option<String>,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            domain: None,
            secure: false,
            landing_page: DEFAULT_LANDING_PAGE.to_string(),
            auth: None,
        }
    }
}

impl TunnelConfig {
    /// URL scheme used for public tunnel URLs.
    pub fn scheme(&self) -> &'static str {
        if self.secure {
            "https"
        } else {
            "http"
        }
    }
}

/// In-memory registry configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct RegistryConfig {
    /// Address tunnel agents bind their per-tenant ports on.
    pub agent_bind_address: String,

    /// Maximum tunnel sockets a single client may keep open.
    pub max_sockets: usize,

    /// Maximum registered tunnels (0 = unlimited).
    pub max_tunnels: usize,

    /// A tunnel with no connected sockets for this long is evicted.
    pub grace_timeout_ms: u64,

    /// How long a routed request waits for an idle tunnel socket.
    pub socket_wait_timeout_ms: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            agent_bind_address: "0.0.0.0".to_string(),
            max_sockets: 10,
            max_tunnels: 0,
            grace_timeout_ms: 1_000,
            socket_wait_timeout_ms: 5_000,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit logs as JSON lines.
    pub json_logs: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
