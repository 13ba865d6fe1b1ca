//! Connection router: decides who serves each incoming request.
//!
//! Every request (plain or upgrade) is classified by its Host header alone:
//!
//! | Host                          | plain request        | upgrade            |
//! |-------------------------------|----------------------|--------------------|
//! | missing                       | `400`                | connection dropped |
//! | names no tenant               | control plane        | connection dropped |
//! | names an unregistered tenant  | `404`                | connection dropped |
//! | names a registered tenant     | forwarded to tenant  | forwarded to tenant|

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{Request, Response};
use axum::response::IntoResponse;
use axum::Router;
use tower::ServiceExt;

use crate::control;
use crate::http::request::{is_upgrade_request, request_host};
use crate::http::server::AppState;
use crate::observability::metrics;
use crate::registry::TunnelHandle;
use crate::routing::error::{RouteError, UpgradeRejected};
use crate::routing::resolver::resolve;

/// Where a request's Host header points.
pub enum RoutingOutcome {
    NoHost,
    /// The host names no tenant; the control plane answers.
    Unmatched,
    UnknownTenant(String),
    Matched(Arc<dyn TunnelHandle>),
}

impl RoutingOutcome {
    fn label(&self) -> &'static str {
        match self {
            RoutingOutcome::NoHost => "no_host",
            RoutingOutcome::Unmatched => "control",
            RoutingOutcome::UnknownTenant(_) => "unknown_tenant",
            RoutingOutcome::Matched(_) => "tenant",
        }
    }
}

impl std::fmt::Debug for RoutingOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RoutingOutcome::Matched(handle) => f.debug_tuple("Matched").field(&handle.id()).finish(),
            RoutingOutcome::UnknownTenant(id) => f.debug_tuple("UnknownTenant").field(id).finish(),
            other => f.write_str(other.label()),
        }
    }
}

/// Front door shared by every connection.
#[derive(Clone)]
pub struct ConnectionRouter {
    state: AppState,
    control: Router,
}

impl ConnectionRouter {
    pub fn new(state: AppState) -> Self {
        let control = control::control_router(state.clone());
        Self { state, control }
    }

    /// Classify a request by the host it is addressed to.
    pub async fn classify(&self, host: Option<&str>) -> RoutingOutcome {
        let Some(host) = host else {
            return RoutingOutcome::NoHost;
        };

        let domain = self.state.tunnels.load().domain.clone();
        let Some(candidate) = resolve(host, domain.as_deref()) else {
            return RoutingOutcome::Unmatched;
        };

        match self.state.registry.lookup(&candidate).await {
            Some(handle) => RoutingOutcome::Matched(handle),
            None => RoutingOutcome::UnknownTenant(candidate),
        }
    }

    /// Route one request. An `Err` tells the server to drop the connection
    /// without writing a response.
    pub async fn route(
        &self,
        request: Request<Body>,
        peer: SocketAddr,
    ) -> Result<Response<Body>, UpgradeRejected> {
        if is_upgrade_request(&request) {
            self.route_upgrade(request).await
        } else {
            Ok(self.route_request(request, peer).await)
        }
    }

    /// Route a plain request. Always produces a response.
    pub async fn route_request(&self, mut request: Request<Body>, peer: SocketAddr) -> Response<Body> {
        let host = request_host(&request).map(str::to_owned);
        let outcome = self.classify(host.as_deref()).await;
        metrics::record_request(outcome.label());
        tracing::debug!(
            method = %request.method(),
            uri = %request.uri(),
            outcome = ?outcome,
            "Routing request"
        );

        match outcome {
            RoutingOutcome::NoHost => RouteError::MalformedRequest.into_response(),
            RoutingOutcome::Unmatched => {
                request.extensions_mut().insert(ConnectInfo(peer));
                match self.control.clone().oneshot(request).await {
                    Ok(response) => response,
                    Err(infallible) => match infallible {},
                }
            }
            RoutingOutcome::UnknownTenant(id) => RouteError::UnknownTenant(id).into_response(),
            RoutingOutcome::Matched(handle) => match handle.handle_request(request).await {
                Ok(response) => response,
                Err(e) => RouteError::Tunnel(e).into_response(),
            },
        }
    }

    /// Route an upgrade handshake. Anything but a tenant match is rejected.
    pub async fn route_upgrade(&self, request: Request<Body>) -> Result<Response<Body>, UpgradeRejected> {
        let host = request_host(&request).map(str::to_owned);
        let outcome = self.classify(host.as_deref()).await;
        metrics::record_request(outcome.label());

        let rejected = match outcome {
            RoutingOutcome::Matched(handle) => {
                tracing::debug!(tunnel_id = %handle.id(), uri = %request.uri(), "Forwarding upgrade");
                return handle.handle_upgrade(request).await.map_err(UpgradeRejected::from);
            }
            RoutingOutcome::NoHost => UpgradeRejected::NoHost,
            RoutingOutcome::Unmatched => UpgradeRejected::NoTenant(host.unwrap_or_default()),
            RoutingOutcome::UnknownTenant(id) => UpgradeRejected::UnknownTenant(id),
        };

        tracing::debug!(reason = %rejected, "Dropping upgrade connection");
        Err(rejected)
    }
}
