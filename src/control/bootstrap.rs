//! Tunnel bootstrap: turn a new-tunnel request into a registered tenant.
//!
//! ```text
//! candidate? ──none──▶ IdGenerator::generate()
//!     │                        │
//!     └──some──▶ validate ─────┴──▶ TunnelRegistry::register ──▶ descriptor
//! ```

use axum::http::{HeaderName, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::identity::{is_valid_identity, IdGenerator};
use crate::observability::metrics;
use crate::registry::TunnelRegistry;
use crate::routing::RouteError;

pub const SUBDOMAIN_HEADER: HeaderName = HeaderName::from_static("x-localtunnel-subdomain");
pub const ENDPOINT_HEADER: HeaderName = HeaderName::from_static("x-localtunnel-endpoint");

/// Inputs for one bootstrap.
#[derive(Debug, Clone)]
pub struct BootstrapRequest {
    /// Requested id; `None` asks for a generated one.
    pub candidate: Option<String>,
    /// Address the request came from, echoed back to the client.
    pub endpoint: String,
    /// Public host of the tunnel URLs: the base domain or the request Host.
    pub public_host: String,
    pub scheme: &'static str,
}

/// What a tunnel client needs to start serving.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TunnelDescriptor {
    pub id: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_conn_count: Option<usize>,
}

/// A successful bootstrap, rendered with the `x-localtunnel-*` headers.
#[derive(Debug)]
pub struct Bootstrapped {
    pub descriptor: TunnelDescriptor,
    pub endpoint: String,
}

impl IntoResponse for Bootstrapped {
    fn into_response(self) -> Response {
        let mut response = Json(&self.descriptor).into_response();
        let headers = response.headers_mut();
        if let Ok(id) = HeaderValue::from_str(&self.descriptor.id) {
            headers.insert(SUBDOMAIN_HEADER, id);
        }
        if let Ok(endpoint) = HeaderValue::from_str(&self.endpoint) {
            headers.insert(ENDPOINT_HEADER, endpoint);
        }
        response
    }
}

/// Validate or generate an id, register it, and describe the new tunnel.
///
/// An invalid candidate fails before the registry is consulted.
pub async fn bootstrap(
    registry: &dyn TunnelRegistry,
    generator: &dyn IdGenerator,
    request: BootstrapRequest,
) -> Result<Bootstrapped, RouteError> {
    let candidate = match request.candidate {
        Some(name) => name,
        None => generator.generate(),
    };

    if !is_valid_identity(&candidate) {
        metrics::record_bootstrap("invalid");
        tracing::debug!(candidate = %candidate, "Rejected invalid tunnel id");
        return Err(RouteError::InvalidIdentitySyntax(candidate));
    }

    let info = registry.register(&candidate).await.map_err(|e| {
        metrics::record_bootstrap("failed");
        tracing::warn!(candidate = %candidate, error = %e, "Tunnel registration failed");
        e
    })?;

    metrics::record_bootstrap("ok");
    tracing::info!(
        tunnel_id = %info.id,
        endpoint = %request.endpoint,
        "Tunnel bootstrapped"
    );

    let url = format!("{}://{}.{}", request.scheme, info.id, request.public_host);
    Ok(Bootstrapped {
        descriptor: TunnelDescriptor {
            id: info.id,
            url,
            port: info.port,
            max_conn_count: info.max_conn_count,
        },
        endpoint: request.endpoint,
    })
}
