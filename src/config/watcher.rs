//! Configuration file watcher for hot reload.
//!
//! Only the `[tunnels]` section is applied live; listener, registry and
//! observability changes are reported and take effect on restart.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::overrides::ConfigOverrides;
use crate::config::schema::{BrokerConfig, TunnelConfig};

/// Tunnel settings shared with every request handler.
pub type SharedTunnelConfig = Arc<ArcSwap<TunnelConfig>>;

/// A watcher that monitors the configuration file for changes.
pub struct ConfigWatcher {
    path: PathBuf,
    update_tx: mpsc::UnboundedSender<BrokerConfig>,
}

impl ConfigWatcher {
    /// Create a new ConfigWatcher.
    ///
    /// Returns the watcher and a receiver for configuration updates.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<BrokerConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();

        (
            Self {
                path: path.to_path_buf(),
                update_tx,
            },
            update_rx,
        )
    }

    /// Start watching the file in a background thread.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.update_tx.clone();
        let path = self.path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if event.kind.is_modify() || event.kind.is_create() {
                        tracing::info!("Config file change detected, reloading...");
                        match load_config(&path) {
                            Ok(new_config) => {
                                let _ = tx.send(new_config);
                            }
                            Err(e) => {
                                tracing::error!(
                                    "Failed to reload config: {}. Keeping current configuration.",
                                    e
                                );
                            }
                        }
                    }
                }
                Err(e) => tracing::error!("Watch error: {:?}", e),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Config watcher started");
        Ok(watcher)
    }
}

/// Apply reloaded configurations to the live tunnel settings until the
/// update channel closes. Command-line overrides are layered on each one.
pub async fn apply_updates(
    shared: SharedTunnelConfig,
    mut updates: mpsc::UnboundedReceiver<BrokerConfig>,
    overrides: ConfigOverrides,
) {
    while let Some(mut config) = updates.recv().await {
        overrides.apply(&mut config);
        apply_update(&shared, config.tunnels);
    }
}

/// Swap in new tunnel settings. Returns whether anything changed.
pub fn apply_update(shared: &SharedTunnelConfig, tunnels: TunnelConfig) -> bool {
    if **shared.load() == tunnels {
        tracing::debug!("Tunnel settings unchanged");
        return false;
    }

    tracing::info!(
        domain = ?tunnels.domain,
        secure = tunnels.secure,
        landing_page = %tunnels.landing_page,
        auth = tunnels.auth.is_some(),
        "Tunnel settings reloaded"
    );
    shared.store(Arc::new(tunnels));
    true
}
