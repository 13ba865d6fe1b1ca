//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

use tunnel_broker::config::{BrokerConfig, TunnelConfig};
use tunnel_broker::identity::SequenceGenerator;
use tunnel_broker::lifecycle::{Broker, Shutdown, StartupError};
use tunnel_broker::registry::{MemoryRegistry, TunnelRegistry};

pub const BASE_DOMAIN: &str = "example.com";

/// A broker serving on an ephemeral localhost port.
pub struct TestBroker {
    pub addr: SocketAddr,
    pub registry: MemoryRegistry,
    shutdown: Shutdown,
    task: JoinHandle<Result<(), StartupError>>,
}

impl TestBroker {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Wait until tunnel `id` has at least `sockets` connected sockets.
    pub async fn wait_for_sockets(&self, id: &str, sockets: usize) {
        let wait = async {
            loop {
                if let Some(tunnel) = self.registry.lookup(id).await {
                    if tunnel.stats().connected_sockets >= sockets {
                        return;
                    }
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        };
        tokio::time::timeout(Duration::from_secs(5), wait)
            .await
            .expect("tunnel sockets never connected");
    }

    pub async fn stop(self) {
        self.shutdown.trigger();
        let _ = tokio::time::timeout(Duration::from_secs(5), self.task).await;
    }
}

pub fn test_config(tunnels: TunnelConfig) -> BrokerConfig {
    let mut config = BrokerConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.listener.drain_timeout_secs = 1;
    config.registry.agent_bind_address = "127.0.0.1".into();
    config.registry.grace_timeout_ms = 30_000;
    config.tunnels = tunnels;
    config
}

pub fn domain_tunnels() -> TunnelConfig {
    TunnelConfig {
        domain: Some(BASE_DOMAIN.into()),
        ..TunnelConfig::default()
    }
}

/// Start a broker whose generator hands out `ids` first.
pub async fn start_broker_with(config: BrokerConfig, ids: &[&str]) -> TestBroker {
    let generator = Arc::new(SequenceGenerator::new(ids.to_vec()));
    let broker = Broker::start(config, generator, None).await.unwrap();
    let addr = broker.local_addr().unwrap();
    let registry = broker.registry().clone();

    let shutdown = Shutdown::new();
    let run_shutdown = shutdown.clone();
    let task = tokio::spawn(async move { broker.run(&run_shutdown).await });

    TestBroker {
        addr,
        registry,
        shutdown,
        task,
    }
}

pub async fn start_broker(tunnels: TunnelConfig) -> TestBroker {
    start_broker_with(test_config(tunnels), &[]).await
}

/// Client that reports redirects instead of following them.
pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}

/// Send raw bytes and read until the broker closes the connection.
pub async fn raw_request(addr: SocketAddr, request: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut response = Vec::new();
    let _ = tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut response)).await;
    String::from_utf8_lossy(&response).into_owned()
}

/// Tunnel client serving HTTP on `sockets` sockets, reconnecting each one
/// after every exchange. Answers `hello from {path}`.
pub fn spawn_http_tunnel_client(port: u16, sockets: usize) {
    for _ in 0..sockets {
        tokio::spawn(async move {
            loop {
                let Ok(stream) = TcpStream::connect(("127.0.0.1", port)).await else {
                    return;
                };
                let service = service_fn(|request: Request<Incoming>| async move {
                    Ok::<_, Infallible>(Response::new(format!("hello from {}", request.uri())))
                });
                let _ = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service)
                    .await;
            }
        });
    }
}

/// Tunnel client accepting one WebSocket per socket and echoing messages.
pub fn spawn_ws_tunnel_client(port: u16) {
    tokio::spawn(async move {
        let Ok(stream) = TcpStream::connect(("127.0.0.1", port)).await else {
            return;
        };
        let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
            return;
        };
        while let Some(Ok(message)) = ws.next().await {
            if message.is_text() || message.is_binary() {
                if ws.send(message).await.is_err() {
                    return;
                }
            }
        }
    });
}
