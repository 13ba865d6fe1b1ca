//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the registry, the shared tunnel settings and the router state
//! - Start the config watcher when the config came from a file
//! - Bind the listener last, so traffic only arrives once everything is ready
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Shutdown stops accepting, drains connections, then closes every tunnel

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use arc_swap::ArcSwap;
use notify::RecommendedWatcher;

use crate::config::watcher::apply_updates;
use crate::config::{BrokerConfig, ConfigOverrides, ConfigWatcher, SharedTunnelConfig};
use crate::http::{AppState, HttpServer};
use crate::identity::IdGenerator;
use crate::lifecycle::Shutdown;
use crate::net::{Listener, ListenerError};
use crate::registry::MemoryRegistry;

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error("server error: {0}")]
    Io(#[from] std::io::Error),
}

/// Where to reload the config from, and what to layer over it.
#[derive(Debug, Clone)]
pub struct ConfigReload {
    pub path: PathBuf,
    pub overrides: ConfigOverrides,
}

/// A fully wired broker, bound but not yet serving.
pub struct Broker {
    server: HttpServer,
    listener: Listener,
    registry: MemoryRegistry,
    _watcher: Option<RecommendedWatcher>,
}

impl Broker {
    pub async fn start(
        config: BrokerConfig,
        generator: Arc<dyn IdGenerator>,
        reload: Option<ConfigReload>,
    ) -> Result<Self, StartupError> {
        let tunnels: SharedTunnelConfig = Arc::new(ArcSwap::from_pointee(config.tunnels.clone()));
        let registry = MemoryRegistry::new(config.registry.clone(), Arc::clone(&generator));

        let watcher = reload.and_then(|reload| {
            let (watcher, updates) = ConfigWatcher::new(&reload.path);
            match watcher.run() {
                Ok(watcher) => {
                    tokio::spawn(apply_updates(Arc::clone(&tunnels), updates, reload.overrides));
                    Some(watcher)
                }
                Err(e) => {
                    tracing::warn!(path = ?reload.path, error = %e, "Config hot reload disabled");
                    None
                }
            }
        });

        let listener = Listener::bind(&config.listener).await?;

        tracing::info!(
            domain = ?config.tunnels.domain,
            secure = config.tunnels.secure,
            auth = config.tunnels.auth.is_some(),
            max_sockets = config.registry.max_sockets,
            "Broker configured"
        );

        let state = AppState {
            registry: Arc::new(registry.clone()),
            generator,
            tunnels,
        };

        Ok(Self {
            server: HttpServer::new(config, state),
            listener,
            registry,
            _watcher: watcher,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn registry(&self) -> &MemoryRegistry {
        &self.registry
    }

    /// Serve until `shutdown` fires, then drain and close every tunnel.
    pub async fn run(self, shutdown: &Shutdown) -> Result<(), StartupError> {
        let Broker {
            server,
            listener,
            registry,
            ..
        } = self;

        server.run(listener, shutdown.subscribe()).await?;
        registry.close_all();
        tracing::info!("Shutdown complete");
        Ok(())
    }
}
