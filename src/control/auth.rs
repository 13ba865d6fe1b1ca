use axum::{
    body::Body,
    extract::State,
    http::{header, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::http::server::AppState;
use crate::observability::metrics;
use crate::routing::RouteError;

/// Bearer check in front of the bootstrap routes. Open when no secret is set.
pub async fn bearer_auth(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let authorized = {
        let tunnels = state.tunnels.load();
        match tunnels.auth.as_deref() {
            None => true,
            Some(secret) => request
                .headers()
                .get(header::AUTHORIZATION)
                .and_then(|h| h.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "))
                .is_some_and(|token| token == secret),
        }
    };

    if authorized {
        return next.run(request).await;
    }

    tracing::debug!(uri = %request.uri(), "Rejected unauthenticated control request");
    metrics::record_bootstrap("unauthorized");
    RouteError::Unauthorized.into_response()
}
