//! Tenant registry subsystem.
//!
//! # Data Flow
//! ```text
//! bootstrap → TunnelRegistry::register(id)
//!     → memory.rs (atomic insert, reassign id on collision)
//!     → agent.rs (per-tenant port, pool of client sockets)
//!
//! routed request → TunnelRegistry::lookup(id) → TunnelHandle
//!     → tunnel.rs (HTTP/1.1 over a pooled socket, or upgrade bridge)
//! ```
//!
//! # Design Decisions
//! - The router only sees the traits below, never `MemoryRegistry`
//! - Uniqueness is enforced here, not by callers
//! - Tenants with no connected sockets are evicted after a grace period

pub mod agent;
pub mod memory;
pub mod tunnel;

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use serde::{Deserialize, Serialize};

pub use agent::{AgentError, TunnelAgent};
pub use memory::MemoryRegistry;
pub use tunnel::{Tunnel, TunnelError};

/// What the registry reports about a freshly registered tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TunnelInfo {
    /// Identity actually assigned; may differ from the requested one.
    pub id: String,

    /// Port the tunnel client connects its sockets to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Maximum sockets the client may open.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_conn_count: Option<usize>,
}

/// Aggregate registry statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    pub tunnels: usize,
}

/// Per-tenant statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TunnelStats {
    pub connected_sockets: usize,
}

/// Registration failures.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// No free identity could be found.
    #[error("tunnel id '{0}' is already in use")]
    Conflict(String),

    /// The registry refuses new tenants.
    #[error("{0}")]
    Unavailable(String),

    /// The tenant's agent could not be started.
    #[error("failed to start tunnel agent: {0}")]
    Agent(#[from] AgentError),
}

impl RegistryError {
    /// HTTP status reported to the bootstrapping client.
    pub fn status(&self) -> StatusCode {
        match self {
            RegistryError::Conflict(_) => StatusCode::CONFLICT,
            RegistryError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            RegistryError::Agent(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Capability set the router consumes.
#[async_trait]
pub trait TunnelRegistry: Send + Sync {
    /// Register a tenant under `id` (or a substitute if `id` is taken).
    async fn register(&self, id: &str) -> Result<TunnelInfo, RegistryError>;

    /// Find a registered tenant.
    async fn lookup(&self, id: &str) -> Option<Arc<dyn TunnelHandle>>;

    /// Aggregate statistics.
    fn stats(&self) -> RegistryStats;
}

/// A registered tenant able to serve routed traffic.
#[async_trait]
pub trait TunnelHandle: Send + Sync {
    fn id(&self) -> &str;

    fn stats(&self) -> TunnelStats;

    /// Serve a plain HTTP request.
    async fn handle_request(&self, request: Request<Body>) -> Result<Response<Body>, TunnelError>;

    /// Serve an upgrade handshake. The returned response is written to the
    /// client; a `101` hands both transports over to the tenant.
    async fn handle_upgrade(&self, request: Request<Body>) -> Result<Response<Body>, TunnelError>;
}
