//! Failures a routed connection can end with.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::identity::INVALID_IDENTITY_MESSAGE;
use crate::registry::{RegistryError, TunnelError};

/// JSON error body used by the control plane.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub message: String,
}

/// Errors answered with an HTTP status.
#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    /// The request carries no usable Host header.
    #[error("Host header is required")]
    MalformedRequest,

    /// The Host names a tenant that is not registered.
    #[error("no tunnel registered for '{0}'")]
    UnknownTenant(String),

    /// A bootstrap candidate failed the identity syntax rule.
    #[error("invalid tunnel id '{0}'")]
    InvalidIdentitySyntax(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("not found")]
    NotFound,

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Tunnel(#[from] TunnelError),
}

impl RouteError {
    pub fn status(&self) -> StatusCode {
        match self {
            RouteError::MalformedRequest => StatusCode::BAD_REQUEST,
            RouteError::UnknownTenant(_) | RouteError::NotFound => StatusCode::NOT_FOUND,
            RouteError::InvalidIdentitySyntax(_) => StatusCode::FORBIDDEN,
            RouteError::Unauthorized => StatusCode::UNAUTHORIZED,
            RouteError::Registry(e) => e.status(),
            RouteError::Tunnel(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for RouteError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            // Tenant-host traffic gets plain text; it may not be JSON-aware.
            RouteError::MalformedRequest => (status, "Host header is required").into_response(),
            RouteError::UnknownTenant(_) => (status, "404").into_response(),
            RouteError::Tunnel(e) => {
                tracing::warn!(error = %e, "Tunnel forwarding failed");
                (status, "502 Bad Gateway").into_response()
            }
            RouteError::InvalidIdentitySyntax(_) => (
                status,
                Json(ErrorBody {
                    message: INVALID_IDENTITY_MESSAGE.to_string(),
                }),
            )
                .into_response(),
            other => (
                status,
                Json(ErrorBody {
                    message: other.to_string(),
                }),
            )
                .into_response(),
        }
    }
}

/// Reasons an upgrade handshake is dropped without a response.
#[derive(Debug, thiserror::Error)]
pub enum UpgradeRejected {
    #[error("upgrade without Host header")]
    NoHost,

    #[error("upgrade for '{0}' names no tunnel")]
    NoTenant(String),

    #[error("upgrade for unknown tunnel '{0}'")]
    UnknownTenant(String),

    #[error("upgrade forwarding failed: {0}")]
    Tunnel(#[from] TunnelError),
}
