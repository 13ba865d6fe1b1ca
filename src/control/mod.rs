//! Control plane: served whenever the Host header names no tenant.
//!
//! # Routes
//! ```text
//! GET /api/status               → tenant count and process memory
//! GET /api/tunnels/{id}/status  → connected sockets of one tenant
//!     (both also answer with a trailing slash)
//! ── bearer gate (when a secret is configured) ──
//! GET /?new                     → bootstrap with a generated id
//! GET /                         → 302 to the landing page
//! GET /{name}                   → bootstrap with a requested id
//! anything else                 → 404
//! ```

pub mod auth;
pub mod bootstrap;
pub mod handlers;
pub mod route;

use axum::{middleware, routing::get, Router};
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use self::auth::bearer_auth;
use self::handlers::{bootstrap_or_redirect, get_status, get_tunnel_status};
use crate::http::request::MakeRequestUuidV4;
use crate::http::server::AppState;

pub use bootstrap::{bootstrap, BootstrapRequest, TunnelDescriptor};
pub use route::ControlRoute;

pub fn control_router(state: AppState) -> Router {
    let gated = Router::new()
        .fallback(bootstrap_or_redirect)
        .layer(middleware::from_fn_with_state(state.clone(), bearer_auth))
        .with_state(state.clone());

    Router::new()
        .route("/api/status", get(get_status))
        .route("/api/status/", get(get_status))
        .route("/api/tunnels/{id}/status", get(get_tunnel_status))
        .route("/api/tunnels/{id}/status/", get(get_tunnel_status))
        .with_state(state)
        .fallback_service(gated)
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuidV4))
}
