//! Per-tenant socket pool.
//!
//! # Responsibilities
//! - Bind a dedicated TCP port for one tenant
//! - Accept tunnel sockets from the tenant's client, up to `max_sockets`
//! - Lease idle sockets to routed requests
//! - Notice sockets the client closed while idle
//!
//! # Data Flow
//! ```text
//! tunnel client ──TCP──▶ accept loop ──▶ one holder task per socket
//!                                            │ waits for a lease
//! routed request ── checkout() ──lease──────▶│
//!                 ◀── TunnelSocket ──────────┘
//! ```

use std::io::ErrorKind;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot, watch, Mutex};

/// Outstanding lease requests before `checkout` has to wait.
const LEASE_QUEUE_DEPTH: usize = 1024;

/// Errors raised by the agent.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("failed to bind tunnel port: {0}")]
    Bind(#[source] std::io::Error),

    #[error("no tunnel socket became available within {0:?}")]
    NoSocket(Duration),

    #[error("tunnel agent is closed")]
    Closed,
}

/// Decrements the connected-socket count when the socket is gone.
#[derive(Debug)]
pub struct SocketGuard {
    connected: Arc<watch::Sender<usize>>,
}

impl SocketGuard {
    fn new(connected: Arc<watch::Sender<usize>>) -> Self {
        connected.send_modify(|n| *n += 1);
        Self { connected }
    }
}

impl Drop for SocketGuard {
    fn drop(&mut self) {
        self.connected.send_modify(|n| *n = n.saturating_sub(1));
    }
}

/// A leased tunnel socket. It counts as connected until the guard drops.
#[derive(Debug)]
pub struct TunnelSocket {
    pub stream: TcpStream,
    pub guard: SocketGuard,
}

type Lease = oneshot::Sender<TunnelSocket>;

/// Pool of raw sockets opened by one tunnel client.
#[derive(Debug)]
pub struct TunnelAgent {
    id: String,
    local_addr: SocketAddr,
    max_sockets: usize,
    listener: std::sync::Mutex<Option<TcpListener>>,
    connected: Arc<watch::Sender<usize>>,
    closed: watch::Sender<bool>,
    lease_tx: mpsc::Sender<Lease>,
    lease_rx: Mutex<mpsc::Receiver<Lease>>,
}

impl TunnelAgent {
    /// Bind an ephemeral port on `ip`. Sockets are not accepted until
    /// [`TunnelAgent::start`] is called.
    pub async fn bind(id: &str, ip: IpAddr, max_sockets: usize) -> Result<Arc<Self>, AgentError> {
        let listener = TcpListener::bind(SocketAddr::new(ip, 0))
            .await
            .map_err(AgentError::Bind)?;
        let local_addr = listener.local_addr().map_err(AgentError::Bind)?;

        let (lease_tx, lease_rx) = mpsc::channel(LEASE_QUEUE_DEPTH);
        let (connected, _) = watch::channel(0);
        let (closed, _) = watch::channel(false);

        Ok(Arc::new(Self {
            id: id.to_string(),
            local_addr,
            max_sockets,
            listener: std::sync::Mutex::new(Some(listener)),
            connected: Arc::new(connected),
            closed,
            lease_tx,
            lease_rx: Mutex::new(lease_rx),
        }))
    }

    /// Start accepting tunnel sockets. Calling it twice is a no-op.
    pub fn start(self: &Arc<Self>) {
        let listener = match self.listener.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        let Some(listener) = listener else {
            return;
        };

        tracing::debug!(
            tunnel_id = %self.id,
            port = self.local_addr.port(),
            max_sockets = self.max_sockets,
            "Tunnel agent accepting sockets"
        );
        tokio::spawn(Arc::clone(self).accept_loop(listener));
    }

    /// Port the tunnel client should connect to.
    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    pub fn max_sockets(&self) -> usize {
        self.max_sockets
    }

    /// Sockets currently connected, idle or leased.
    pub fn connected_sockets(&self) -> usize {
        *self.connected.borrow()
    }

    /// Watch the connected-socket count.
    pub fn subscribe_connected(&self) -> watch::Receiver<usize> {
        self.connected.subscribe()
    }

    /// Stop accepting and drop every idle socket.
    pub fn close(&self) {
        self.closed.send_replace(true);
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Lease an idle socket, waiting up to `wait` for one to show up.
    pub async fn checkout(&self, wait: Duration) -> Result<TunnelSocket, AgentError> {
        if self.is_closed() {
            return Err(AgentError::Closed);
        }

        let (lease, socket) = oneshot::channel();
        let leased = tokio::time::timeout(wait, async {
            self.lease_tx
                .send(lease)
                .await
                .map_err(|_| AgentError::Closed)?;
            socket.await.map_err(|_| AgentError::Closed)
        })
        .await;

        match leased {
            Ok(result) => result,
            Err(_) => Err(AgentError::NoSocket(wait)),
        }
    }

    async fn accept_loop(self: Arc<Self>, listener: TcpListener) {
        let mut closed = self.closed.subscribe();
        loop {
            let accepted = tokio::select! {
                accepted = listener.accept() => accepted,
                _ = wait_until(&mut closed, |closed| closed) => break,
            };

            let (stream, peer) = match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::warn!(tunnel_id = %self.id, error = %e, "Failed to accept tunnel socket");
                    continue;
                }
            };

            if self.connected_sockets() >= self.max_sockets {
                tracing::debug!(
                    tunnel_id = %self.id,
                    peer_addr = %peer,
                    max_sockets = self.max_sockets,
                    "Socket limit reached, dropping tunnel socket"
                );
                continue;
            }

            let socket = TunnelSocket {
                stream,
                guard: SocketGuard::new(Arc::clone(&self.connected)),
            };
            tracing::trace!(
                tunnel_id = %self.id,
                peer_addr = %peer,
                connected = self.connected_sockets(),
                "Tunnel socket connected"
            );
            tokio::spawn(Arc::clone(&self).hold_socket(socket));
        }

        tracing::debug!(tunnel_id = %self.id, "Tunnel agent stopped accepting");
    }

    /// Keep an idle socket until a request leases it or the client closes it.
    async fn hold_socket(self: Arc<Self>, mut socket: TunnelSocket) {
        enum Event {
            Lease(Option<Lease>),
            Readable(std::io::Result<()>),
            Closed,
        }

        let mut closed = self.closed.subscribe();
        loop {
            let event = tokio::select! {
                lease = self.next_lease() => Event::Lease(lease),
                ready = socket.stream.readable() => Event::Readable(ready),
                _ = wait_until(&mut closed, |closed| closed) => Event::Closed,
            };

            match event {
                Event::Lease(Some(lease)) => match lease.send(socket) {
                    Ok(()) => return,
                    // The requester gave up; keep the socket idle.
                    Err(returned) => socket = returned,
                },
                Event::Lease(None) | Event::Closed => return,
                Event::Readable(Err(_)) => return,
                Event::Readable(Ok(())) => {
                    if !still_idle(&socket.stream) {
                        tracing::trace!(tunnel_id = %self.id, "Idle tunnel socket closed by client");
                        return;
                    }
                }
            }
        }
    }

    async fn next_lease(&self) -> Option<Lease> {
        self.lease_rx.lock().await.recv().await
    }
}

/// Wait until the watched value satisfies `pred`. Returns false if the
/// sender is gone first.
pub(crate) async fn wait_until<T: Copy>(
    rx: &mut watch::Receiver<T>,
    pred: impl Fn(T) -> bool,
) -> bool {
    loop {
        let current = *rx.borrow_and_update();
        if pred(current) {
            return true;
        }
        if rx.changed().await.is_err() {
            return false;
        }
    }
}

/// An idle socket must not have anything to read: EOF means the client hung
/// up and unsolicited bytes mean it is not speaking the tunnel protocol.
fn still_idle(stream: &TcpStream) -> bool {
    let mut probe = [0u8; 1];
    match stream.try_read(&mut probe) {
        Err(e) => e.kind() == ErrorKind::WouldBlock,
        Ok(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

    async fn wait_connected(agent: &TunnelAgent, expected: usize) {
        let mut rx = agent.subscribe_connected();
        let reached = tokio::time::timeout(Duration::from_secs(2), wait_until(&mut rx, |n| n == expected))
            .await
            .expect("timed out waiting for socket count");
        assert!(reached);
    }

    #[tokio::test]
    async fn leases_connected_socket() {
        let agent = TunnelAgent::bind("abcd", LOCALHOST, 2).await.unwrap();
        agent.start();

        let mut client = TcpStream::connect((LOCALHOST, agent.port())).await.unwrap();
        wait_connected(&agent, 1).await;

        let mut socket = agent.checkout(Duration::from_secs(1)).await.unwrap();
        socket.stream.write_all(b"ping").await.unwrap();

        let mut buf = [0u8; 4];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        drop(socket);
        wait_connected(&agent, 0).await;
    }

    #[tokio::test]
    async fn enforces_socket_limit() {
        let agent = TunnelAgent::bind("abcd", LOCALHOST, 1).await.unwrap();
        agent.start();

        let _first = TcpStream::connect((LOCALHOST, agent.port())).await.unwrap();
        wait_connected(&agent, 1).await;

        let mut second = TcpStream::connect((LOCALHOST, agent.port())).await.unwrap();
        let mut buf = [0u8; 1];
        let read = tokio::time::timeout(Duration::from_secs(2), second.read(&mut buf))
            .await
            .unwrap();
        assert!(matches!(read, Ok(0) | Err(_)), "extra socket should be dropped");
        assert_eq!(agent.connected_sockets(), 1);
    }

    #[tokio::test]
    async fn checkout_times_out_without_sockets() {
        let agent = TunnelAgent::bind("abcd", LOCALHOST, 1).await.unwrap();
        agent.start();

        let err = agent.checkout(Duration::from_millis(50)).await.unwrap_err();
        assert!(matches!(err, AgentError::NoSocket(_)));
    }

    #[tokio::test]
    async fn idle_socket_closed_by_client_is_released() {
        let agent = TunnelAgent::bind("abcd", LOCALHOST, 2).await.unwrap();
        agent.start();

        let client = TcpStream::connect((LOCALHOST, agent.port())).await.unwrap();
        wait_connected(&agent, 1).await;

        drop(client);
        wait_connected(&agent, 0).await;
    }

    #[tokio::test]
    async fn closed_agent_refuses_checkout() {
        let agent = TunnelAgent::bind("abcd", LOCALHOST, 1).await.unwrap();
        agent.start();
        agent.close();

        let err = agent.checkout(Duration::from_millis(50)).await.unwrap_err();
        assert!(matches!(err, AgentError::Closed));
    }
}
