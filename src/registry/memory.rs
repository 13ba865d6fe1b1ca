//! In-memory tenant registry.
//!
//! # Responsibilities
//! - Assign unique identities (substitute a generated id on collision)
//! - Start one [`TunnelAgent`] per tenant
//! - Evict tenants whose client stays disconnected past the grace period
//!
//! # Design Decisions
//! - DashMap entry API makes "check then insert" atomic per id
//! - The agent port is bound before the id is claimed so no await happens
//!   while a map shard is locked
//! - Eviction tasks hold a weak reference and die with the registry
//! - `max_tunnels` is enforced with an atomic slot count reserved before the
//!   id is claimed, so concurrent registrations cannot overshoot it

use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::config::RegistryConfig;
use crate::identity::IdGenerator;
use crate::observability::metrics;
use crate::registry::agent::{wait_until, TunnelAgent};
use crate::registry::tunnel::Tunnel;
use crate::registry::{
    RegistryError, RegistryStats, TunnelHandle, TunnelInfo, TunnelRegistry,
};

/// Generated substitutes tried before a registration gives up.
const MAX_ID_ATTEMPTS: usize = 16;

#[derive(Debug)]
struct RegistryInner {
    tunnels: DashMap<String, Arc<Tunnel>>,
    /// Registered tunnels plus registrations in flight.
    slots: AtomicUsize,
    config: RegistryConfig,
    bind_ip: IpAddr,
    generator: Arc<dyn IdGenerator>,
}

/// Registry keeping every tenant in process memory.
#[derive(Debug, Clone)]
pub struct MemoryRegistry {
    inner: Arc<RegistryInner>,
}

impl MemoryRegistry {
    pub fn new(config: RegistryConfig, generator: Arc<dyn IdGenerator>) -> Self {
        let bind_ip = config.agent_bind_address.parse().unwrap_or_else(|_| {
            tracing::warn!(
                agent_bind_address = %config.agent_bind_address,
                "Invalid agent bind address, using 0.0.0.0"
            );
            IpAddr::V4(Ipv4Addr::UNSPECIFIED)
        });

        Self {
            inner: Arc::new(RegistryInner {
                tunnels: DashMap::new(),
                slots: AtomicUsize::new(0),
                config,
                bind_ip,
                generator,
            }),
        }
    }

    /// Remove a tenant and stop its agent. Returns whether it existed.
    pub fn remove(&self, id: &str) -> bool {
        self.inner.remove(id)
    }

    /// Stop every agent, e.g. on shutdown.
    pub fn close_all(&self) {
        let ids: Vec<String> = self.inner.tunnels.iter().map(|t| t.key().clone()).collect();
        for id in ids {
            self.inner.remove(&id);
        }
    }

    /// Claim `candidate`, or a generated substitute if it is taken.
    async fn claim(&self, requested: &str) -> Result<Arc<Tunnel>, RegistryError> {
        let inner = &self.inner;
        let mut candidate = requested.to_string();

        for _ in 0..MAX_ID_ATTEMPTS {
            if inner.tunnels.contains_key(&candidate) {
                tracing::debug!(requested = %requested, taken = %candidate, "Tunnel id in use, drawing another");
                candidate = inner.generator.generate();
                continue;
            }

            let agent = TunnelAgent::bind(&candidate, inner.bind_ip, inner.config.max_sockets).await?;
            let tunnel = Arc::new(Tunnel::new(
                candidate.clone(),
                agent,
                Duration::from_millis(inner.config.socket_wait_timeout_ms),
            ));

            match inner.tunnels.entry(candidate.clone()) {
                Entry::Vacant(slot) => {
                    slot.insert(Arc::clone(&tunnel));
                    return Ok(tunnel);
                }
                Entry::Occupied(_) => {
                    // Lost a race for the same id.
                    tunnel.agent().close();
                    candidate = inner.generator.generate();
                }
            }
        }

        Err(RegistryError::Conflict(requested.to_string()))
    }
}

/// A tunnel slot held while an id is claimed. Released on drop unless
/// committed.
struct SlotReservation<'a> {
    slots: &'a AtomicUsize,
    committed: bool,
}

impl SlotReservation<'_> {
    fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for SlotReservation<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.slots.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl RegistryInner {
    fn reserve_slot(&self) -> Result<SlotReservation<'_>, RegistryError> {
        let max_tunnels = self.config.max_tunnels;
        self.slots
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (max_tunnels == 0 || n < max_tunnels).then_some(n + 1)
            })
            .map_err(|_| {
                RegistryError::Unavailable(format!("tunnel limit of {max_tunnels} reached"))
            })?;

        Ok(SlotReservation {
            slots: &self.slots,
            committed: false,
        })
    }

    fn remove(&self, id: &str) -> bool {
        match self.tunnels.remove(id) {
            Some((_, tunnel)) => {
                self.slots.fetch_sub(1, Ordering::SeqCst);
                tunnel.agent().close();
                metrics::set_tunnel_count(self.tunnels.len());
                tracing::info!(tunnel_id = %id, tunnels = self.tunnels.len(), "Tunnel removed");
                true
            }
            None => false,
        }
    }

    /// Remove `id` only if it still maps to `tunnel`.
    fn evict(&self, id: &str, tunnel: &Arc<Tunnel>) {
        let removed = self
            .tunnels
            .remove_if(id, |_, current| Arc::ptr_eq(current, tunnel));
        if removed.is_some() {
            self.slots.fetch_sub(1, Ordering::SeqCst);
            tunnel.agent().close();
            metrics::set_tunnel_count(self.tunnels.len());
            tracing::info!(tunnel_id = %id, tunnels = self.tunnels.len(), "Tunnel went offline, evicted");
        }
    }
}

/// Evict the tunnel once it has had no sockets for a whole grace period.
async fn watch_offline(registry: Weak<RegistryInner>, tunnel: Arc<Tunnel>, grace: Duration) {
    let mut connected = tunnel.agent().subscribe_connected();
    loop {
        if !wait_until(&mut connected, |n| n == 0).await {
            return;
        }
        match tokio::time::timeout(grace, wait_until(&mut connected, |n| n > 0)).await {
            Ok(true) => continue,
            Ok(false) => return,
            Err(_) => break,
        }
    }

    if let Some(registry) = registry.upgrade() {
        registry.evict(tunnel.id(), &tunnel);
    }
}

#[async_trait]
impl TunnelRegistry for MemoryRegistry {
    async fn register(&self, id: &str) -> Result<TunnelInfo, RegistryError> {
        let slot = self.inner.reserve_slot()?;
        let tunnel = self.claim(id).await?;
        slot.commit();
        let agent = tunnel.agent();
        agent.start();

        tokio::spawn(watch_offline(
            Arc::downgrade(&self.inner),
            Arc::clone(&tunnel),
            Duration::from_millis(self.inner.config.grace_timeout_ms),
        ));

        metrics::set_tunnel_count(self.inner.tunnels.len());
        tracing::info!(
            requested = %id,
            tunnel_id = %tunnel.id(),
            port = agent.port(),
            tunnels = self.inner.tunnels.len(),
            "Tunnel registered"
        );

        Ok(TunnelInfo {
            id: tunnel.id().to_string(),
            port: Some(agent.port()),
            max_conn_count: Some(agent.max_sockets()),
        })
    }

    async fn lookup(&self, id: &str) -> Option<Arc<dyn TunnelHandle>> {
        self.inner
            .tunnels
            .get(id)
            .map(|entry| Arc::clone(entry.value()) as Arc<dyn TunnelHandle>)
    }

    fn stats(&self) -> RegistryStats {
        RegistryStats {
            tunnels: self.inner.tunnels.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::SequenceGenerator;
    use tokio::net::TcpStream;

    fn test_config() -> RegistryConfig {
        RegistryConfig {
            agent_bind_address: "127.0.0.1".into(),
            grace_timeout_ms: 60_000,
            ..RegistryConfig::default()
        }
    }

    fn registry(ids: &[&str]) -> MemoryRegistry {
        MemoryRegistry::new(test_config(), Arc::new(SequenceGenerator::new(ids.to_vec())))
    }

    #[tokio::test]
    async fn registers_requested_id() {
        let registry = registry(&[]);
        let info = registry.register("my-app").await.unwrap();

        assert_eq!(info.id, "my-app");
        assert!(info.port.is_some_and(|p| p > 0));
        assert_eq!(info.max_conn_count, Some(10));
        assert_eq!(registry.stats().tunnels, 1);
        assert!(registry.lookup("my-app").await.is_some());
        assert!(registry.lookup("other").await.is_none());
    }

    #[tokio::test]
    async fn taken_id_gets_substitute() {
        let registry = registry(&["fallback-id"]);
        registry.register("my-app").await.unwrap();

        let info = registry.register("my-app").await.unwrap();
        assert_eq!(info.id, "fallback-id");
        assert_eq!(registry.stats().tunnels, 2);
    }

    #[tokio::test]
    async fn concurrent_registrations_never_share_an_id() {
        let registry = registry(&[]);
        let (a, b) = tokio::join!(registry.register("same-name"), registry.register("same-name"));
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_ne!(a.id, b.id);
        assert!(a.id == "same-name" || b.id == "same-name");
    }

    #[tokio::test]
    async fn gives_up_when_every_substitute_collides() {
        let registry = registry(&["busy"; MAX_ID_ATTEMPTS + 1]);
        registry.register("busy").await.unwrap();

        let err = registry.register("busy").await.unwrap_err();
        assert!(matches!(err, RegistryError::Conflict(ref id) if id == "busy"));
    }

    #[tokio::test]
    async fn enforces_tunnel_limit() {
        let config = RegistryConfig {
            max_tunnels: 1,
            ..test_config()
        };
        let registry = MemoryRegistry::new(config, Arc::new(SequenceGenerator::new(Vec::<String>::new())));
        registry.register("first").await.unwrap();

        let err = registry.register("second").await.unwrap_err();
        assert!(matches!(err, RegistryError::Unavailable(_)));
    }

    #[tokio::test]
    async fn concurrent_registrations_respect_tunnel_limit() {
        let config = RegistryConfig {
            max_tunnels: 1,
            ..test_config()
        };
        let registry = MemoryRegistry::new(config, Arc::new(SequenceGenerator::new(Vec::<String>::new())));

        let (a, b) = tokio::join!(registry.register("first-app"), registry.register("second-app"));
        assert_eq!(a.is_ok() as usize + b.is_ok() as usize, 1);
        assert_eq!(registry.stats().tunnels, 1);
    }

    #[tokio::test]
    async fn failed_or_removed_registrations_free_their_slot() {
        let config = RegistryConfig {
            max_tunnels: 2,
            ..test_config()
        };
        let registry = MemoryRegistry::new(
            config,
            Arc::new(SequenceGenerator::new(vec!["busy"; MAX_ID_ATTEMPTS + 1])),
        );
        registry.register("busy").await.unwrap();
        assert!(registry.register("busy").await.is_err());

        registry.register("other").await.unwrap();
        assert!(matches!(
            registry.register("third").await,
            Err(RegistryError::Unavailable(_))
        ));

        assert!(registry.remove("other"));
        registry.register("third").await.unwrap();
    }

    #[tokio::test]
    async fn remove_closes_agent() {
        let registry = registry(&[]);
        registry.register("gone-soon").await.unwrap();
        let handle = registry.lookup("gone-soon").await.unwrap();

        assert!(registry.remove("gone-soon"));
        assert!(!registry.remove("gone-soon"));
        assert!(registry.lookup("gone-soon").await.is_none());
        assert_eq!(handle.id(), "gone-soon");
    }

    #[tokio::test]
    async fn evicts_tunnel_that_never_connects() {
        let config = RegistryConfig {
            grace_timeout_ms: 50,
            ..test_config()
        };
        let registry = MemoryRegistry::new(config, Arc::new(SequenceGenerator::new(Vec::<String>::new())));
        registry.register("ghost").await.unwrap();

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(registry.lookup("ghost").await.is_none());
        assert_eq!(registry.stats().tunnels, 0);
    }

    #[tokio::test]
    async fn connected_tunnel_survives_grace_period() {
        let config = RegistryConfig {
            grace_timeout_ms: 100,
            ..test_config()
        };
        let registry = MemoryRegistry::new(config, Arc::new(SequenceGenerator::new(Vec::<String>::new())));
        let info = registry.register("alive").await.unwrap();
        let _socket = TcpStream::connect(("127.0.0.1", info.port.unwrap())).await.unwrap();

        tokio::time::sleep(Duration::from_millis(400)).await;
        let handle = registry.lookup("alive").await.unwrap();
        assert_eq!(handle.stats().connected_sockets, 1);
    }
}
