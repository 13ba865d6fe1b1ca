//! A registered tenant: forwards routed traffic over its agent's sockets.
//!
//! # Responsibilities
//! - Speak HTTP/1.1 to the tunnel client over one leased socket per request,
//!   rewriting HTTP/2 requests into origin form with a `Host` header
//! - Bridge upgraded connections byte for byte once the tenant answers 101
//!
//! # Design Decisions
//! - One socket per exchange; the tunnel client reopens sockets it loses
//! - The socket stays counted as connected until its exchange ends

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, HeaderValue, Request, Response, StatusCode, Uri, Version};
use hyper::client::conn::http1;
use hyper_util::rt::TokioIo;
use tokio::net::TcpStream;

use crate::registry::agent::{AgentError, SocketGuard, TunnelAgent, TunnelSocket};
use crate::registry::{TunnelHandle, TunnelStats};

type Exchange = (
    http1::SendRequest<Body>,
    http1::Connection<TokioIo<TcpStream>, Body>,
    Arc<SocketGuard>,
);

/// Forwarding failures. The router turns these into `502` for plain requests
/// and into an aborted connection for upgrades.
#[derive(Debug, thiserror::Error)]
pub enum TunnelError {
    #[error(transparent)]
    Agent(#[from] AgentError),

    #[error("tunnel exchange failed: {0}")]
    Http(#[from] hyper::Error),
}

/// A tenant backed by a [`TunnelAgent`].
#[derive(Debug)]
pub struct Tunnel {
    id: String,
    agent: Arc<TunnelAgent>,
    socket_wait: Duration,
}

impl Tunnel {
    pub fn new(id: impl Into<String>, agent: Arc<TunnelAgent>, socket_wait: Duration) -> Self {
        Self {
            id: id.into(),
            agent,
            socket_wait,
        }
    }

    pub fn agent(&self) -> &Arc<TunnelAgent> {
        &self.agent
    }

    async fn open_exchange(&self) -> Result<Exchange, TunnelError> {
        let TunnelSocket { stream, guard } = self.agent.checkout(self.socket_wait).await?;
        let (sender, conn) = http1::handshake(TokioIo::new(stream)).await?;
        Ok((sender, conn, Arc::new(guard)))
    }
}

/// Shape an HTTP/2 request for the HTTP/1.1 tunnel socket.
fn into_http1(mut request: Request<Body>) -> Request<Body> {
    if request.version() != Version::HTTP_2 {
        return request;
    }

    let authority = request
        .uri()
        .authority()
        .and_then(|a| HeaderValue::from_str(a.as_str()).ok());
    if let Some(host) = authority {
        if !request.headers().contains_key(header::HOST) {
            request.headers_mut().insert(header::HOST, host);
        }
    }
    let origin = request
        .uri()
        .path_and_query()
        .cloned()
        .map_or_else(|| Uri::from_static("/"), Uri::from);
    *request.uri_mut() = origin;
    *request.version_mut() = Version::HTTP_11;
    request
}

#[async_trait]
impl TunnelHandle for Tunnel {
    fn id(&self) -> &str {
        &self.id
    }

    fn stats(&self) -> TunnelStats {
        TunnelStats {
            connected_sockets: self.agent.connected_sockets(),
        }
    }

    async fn handle_request(&self, request: Request<Body>) -> Result<Response<Body>, TunnelError> {
        let (mut sender, conn, guard) = self.open_exchange().await?;

        let tunnel_id = self.id.clone();
        tokio::spawn(async move {
            let _guard = guard;
            if let Err(e) = conn.await {
                tracing::debug!(tunnel_id = %tunnel_id, error = %e, "Tunnel connection ended with error");
            }
        });

        let response = sender.send_request(into_http1(request)).await?;
        Ok(response.map(Body::new))
    }

    async fn handle_upgrade(&self, mut request: Request<Body>) -> Result<Response<Body>, TunnelError> {
        let client_upgrade = hyper::upgrade::on(&mut request);
        let (mut sender, conn, guard) = self.open_exchange().await?;

        let tunnel_id = self.id.clone();
        let conn_guard = Arc::clone(&guard);
        tokio::spawn(async move {
            let _guard = conn_guard;
            if let Err(e) = conn.with_upgrades().await {
                tracing::debug!(tunnel_id = %tunnel_id, error = %e, "Tunnel upgrade connection ended with error");
            }
        });

        let mut response = sender.send_request(request).await?;
        if response.status() != StatusCode::SWITCHING_PROTOCOLS {
            return Ok(response.map(Body::new));
        }

        let tenant_upgrade = hyper::upgrade::on(&mut response);
        let tunnel_id = self.id.clone();
        tokio::spawn(async move {
            let _guard = guard;
            let (client, tenant) = match tokio::try_join!(client_upgrade, tenant_upgrade) {
                Ok(upgraded) => upgraded,
                Err(e) => {
                    tracing::debug!(tunnel_id = %tunnel_id, error = %e, "Upgrade did not complete");
                    return;
                }
            };

            let mut client = TokioIo::new(client);
            let mut tenant = TokioIo::new(tenant);
            match tokio::io::copy_bidirectional(&mut client, &mut tenant).await {
                Ok((to_tenant, to_client)) => tracing::debug!(
                    tunnel_id = %tunnel_id,
                    to_tenant,
                    to_client,
                    "Upgraded connection closed"
                ),
                Err(e) => tracing::debug!(tunnel_id = %tunnel_id, error = %e, "Upgraded connection failed"),
            }
        });

        Ok(response.map(Body::new))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};
    use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};

    const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

    async fn tunnel_with_client() -> (Tunnel, TcpStream) {
        let agent = TunnelAgent::bind("abcd", LOCALHOST, 4).await.unwrap();
        agent.start();
        let client = TcpStream::connect((LOCALHOST, agent.port())).await.unwrap();

        let mut connected = agent.subscribe_connected();
        crate::registry::agent::wait_until(&mut connected, |n| n == 1).await;

        (Tunnel::new("abcd", agent, Duration::from_secs(2)), client)
    }

    #[tokio::test]
    async fn forwards_request_over_tunnel_socket() {
        let (tunnel, client) = tunnel_with_client().await;
        assert_eq!(tunnel.stats().connected_sockets, 1);

        let local = tokio::spawn(async move {
            let mut reader = BufReader::new(client);
            let mut head = String::new();
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).await.unwrap();
                if line == "\r\n" {
                    break;
                }
                head.push_str(&line);
            }
            reader
                .get_mut()
                .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 5\r\n\r\nhello")
                .await
                .unwrap();
            head
        });

        let request = Request::builder()
            .uri("/greeting?x=1")
            .header("host", "abcd.example.com")
            .body(Body::empty())
            .unwrap();
        let response = tunnel.handle_request(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"hello");

        let head = local.await.unwrap();
        assert!(head.starts_with("GET /greeting?x=1 HTTP/1.1\r\n"), "{head}");
        assert!(head.to_lowercase().contains("host: abcd.example.com"));
    }

    #[test]
    fn http2_request_becomes_origin_form() {
        let request = Request::builder()
            .version(Version::HTTP_2)
            .uri("https://abcd.example.com/feed?page=2")
            .body(Body::empty())
            .unwrap();
        let request = into_http1(request);

        assert_eq!(request.version(), Version::HTTP_11);
        assert_eq!(request.uri(), "/feed?page=2");
        assert_eq!(request.headers()[header::HOST], "abcd.example.com");
    }

    #[test]
    fn http1_request_is_untouched() {
        let request = Request::builder()
            .uri("http://abcd.example.com/x")
            .body(Body::empty())
            .unwrap();
        let request = into_http1(request);

        assert_eq!(request.uri(), "http://abcd.example.com/x");
        assert!(!request.headers().contains_key(header::HOST));
    }

    #[tokio::test]
    async fn no_socket_is_an_error() {
        let agent = TunnelAgent::bind("abcd", LOCALHOST, 1).await.unwrap();
        agent.start();
        let tunnel = Tunnel::new("abcd", agent, Duration::from_millis(50));

        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let err = tunnel.handle_request(request).await.unwrap_err();
        assert!(matches!(err, TunnelError::Agent(AgentError::NoSocket(_))));
    }

    #[tokio::test]
    async fn non_switching_upgrade_reply_passes_through() {
        let (tunnel, mut client) = tunnel_with_client().await;

        let local = tokio::spawn(async move {
            let mut buf = vec![0u8; 1024];
            let _ = client.read(&mut buf).await.unwrap();
            client
                .write_all(b"HTTP/1.1 426 Upgrade Required\r\ncontent-length: 0\r\n\r\n")
                .await
                .unwrap();
        });

        let request = Request::builder()
            .uri("/socket")
            .header("host", "abcd.example.com")
            .header("connection", "upgrade")
            .header("upgrade", "websocket")
            .body(Body::empty())
            .unwrap();
        let response = tunnel.handle_upgrade(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UPGRADE_REQUIRED);
        local.await.unwrap();
    }
}
