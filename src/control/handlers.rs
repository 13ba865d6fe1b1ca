use std::net::SocketAddr;

use axum::{
    body::Body,
    extract::{ConnectInfo, Path, State},
    http::{header, Request, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use sysinfo::{ProcessesToUpdate, System};

use crate::control::bootstrap::{bootstrap, BootstrapRequest};
use crate::control::route::{wants_new_tunnel, ControlRoute};
use crate::http::request::{endpoint_ip, request_host};
use crate::http::server::AppState;
use crate::registry::TunnelStats;
use crate::routing::RouteError;

#[derive(Debug, Default, Serialize)]
pub struct MemoryUsage {
    pub rss: u64,
    #[serde(rename = "virtual")]
    pub virtual_memory: u64,
}

#[derive(Debug, Serialize)]
pub struct BrokerStatus {
    pub tunnels: usize,
    pub mem: MemoryUsage,
}

/// Resident and virtual memory of this process, zero if unavailable.
pub fn process_memory() -> MemoryUsage {
    let Ok(pid) = sysinfo::get_current_pid() else {
        return MemoryUsage::default();
    };

    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
    system
        .process(pid)
        .map(|process| MemoryUsage {
            rss: process.memory(),
            virtual_memory: process.virtual_memory(),
        })
        .unwrap_or_default()
}

pub async fn get_status(State(state): State<AppState>) -> Json<BrokerStatus> {
    Json(BrokerStatus {
        tunnels: state.registry.stats().tunnels,
        mem: process_memory(),
    })
}

pub async fn get_tunnel_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TunnelStats>, RouteError> {
    state
        .registry
        .lookup(&id)
        .await
        .map(|tunnel| Json(tunnel.stats()))
        .ok_or(RouteError::NotFound)
}

/// Everything under the bearer gate: landing redirect and bootstrap.
pub async fn bootstrap_or_redirect(State(state): State<AppState>, request: Request<Body>) -> Response {
    let tunnels = state.tunnels.load_full();

    let candidate = match ControlRoute::classify(request.uri().path()) {
        ControlRoute::Root if wants_new_tunnel(request.uri().query()) => None,
        ControlRoute::Root => {
            return (StatusCode::FOUND, [(header::LOCATION, tunnels.landing_page.clone())])
                .into_response();
        }
        ControlRoute::SingleSegment(name) => Some(name),
        ControlRoute::MultiSegment => return RouteError::NotFound.into_response(),
    };

    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let endpoint = endpoint_ip(request.headers(), peer);
    let public_host = match tunnels.domain.clone() {
        Some(domain) => domain,
        None => request_host(&request).unwrap_or_default().to_string(),
    };

    let outcome = bootstrap(
        state.registry.as_ref(),
        state.generator.as_ref(),
        BootstrapRequest {
            candidate,
            endpoint,
            public_host,
            scheme: tunnels.scheme(),
        },
    )
    .await;

    match outcome {
        Ok(done) => done.into_response(),
        Err(e) => e.into_response(),
    }
}
