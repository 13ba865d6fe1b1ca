//! HTTP server for the tunnel broker.
//!
//! # Responsibilities
//! - Accept connections through the bounded [`Listener`]
//! - Serve HTTP/1.1 (with upgrades) and HTTP/2 on each connection
//! - Hand every request to the [`ConnectionRouter`]
//! - Drain open connections on shutdown
//!
//! # Design Decisions
//! - hyper is driven directly so a rejected upgrade can drop the connection
//!   without writing any response
//! - Connections get a graceful-shutdown nudge, then `drain_timeout_secs`
//!   to finish

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use tokio::net::TcpStream;
use tokio::sync::broadcast;

use crate::config::{BrokerConfig, SharedTunnelConfig};
use crate::identity::IdGenerator;
use crate::net::{ConnectionGuard, ConnectionTracker, Listener};
use crate::net::listener::ConnectionPermit;
use crate::registry::TunnelRegistry;
use crate::routing::ConnectionRouter;

/// Application state injected into the router and control handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<dyn TunnelRegistry>,
    pub generator: Arc<dyn IdGenerator>,
    /// Live tunnel settings; swapped on config reload.
    pub tunnels: SharedTunnelConfig,
}

/// HTTP server for the broker.
pub struct HttpServer {
    router: ConnectionRouter,
    config: BrokerConfig,
    tracker: ConnectionTracker,
}

impl HttpServer {
    pub fn new(config: BrokerConfig, state: AppState) -> Self {
        Self {
            router: ConnectionRouter::new(state),
            config,
            tracker: ConnectionTracker::new(),
        }
    }

    /// Accept connections until `shutdown` fires, then drain.
    pub async fn run(
        self,
        listener: Listener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        loop {
            let accepted = tokio::select! {
                accepted = listener.accept() => accepted,
                _ = shutdown.recv() => break,
            };

            match accepted {
                Ok((stream, peer, permit)) => {
                    let connection = Connection {
                        router: self.router.clone(),
                        peer,
                        _permit: permit,
                        guard: self.tracker.track(),
                    };
                    tokio::spawn(connection.serve(stream, shutdown.resubscribe()));
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Accept failed");
                    // Usually fd exhaustion; back off instead of spinning.
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
            }
        }

        let open = self.tracker.active_count();
        tracing::info!(open_connections = open, "HTTP server draining");

        let drain_timeout = Duration::from_secs(self.config.listener.drain_timeout_secs);
        if !self.tracker.drain(drain_timeout).await {
            tracing::warn!(
                open_connections = self.tracker.active_count(),
                "Drain timeout elapsed, closing remaining connections"
            );
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// One accepted client connection.
struct Connection {
    router: ConnectionRouter,
    peer: SocketAddr,
    _permit: ConnectionPermit,
    guard: ConnectionGuard,
}

impl Connection {
    async fn serve(self, stream: TcpStream, mut shutdown: broadcast::Receiver<()>) {
        let Connection { router, peer, guard, .. } = &self;
        let connection_id = guard.id();

        let service = service_fn({
            let router = router.clone();
            let peer = *peer;
            move |request: Request<Incoming>| {
                let router = router.clone();
                async move { router.route(request.map(Body::new), peer).await }
            }
        });

        let builder = auto::Builder::new(TokioExecutor::new());
        let conn = builder.serve_connection_with_upgrades(TokioIo::new(stream), service);
        tokio::pin!(conn);

        let mut draining = false;
        let result = loop {
            tokio::select! {
                result = conn.as_mut() => break result,
                _ = shutdown.recv(), if !draining => {
                    conn.as_mut().graceful_shutdown();
                    draining = true;
                }
            }
        };

        if let Err(e) = result {
            tracing::debug!(
                connection_id = %connection_id,
                peer_addr = %peer,
                error = %e,
                "Connection closed with error"
            );
        }
    }
}
