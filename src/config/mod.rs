//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → overrides.rs (CLI flags win)
//!     → validation.rs (semantic checks)
//!     → BrokerConfig (validated, immutable)
//!     → [tunnels] section shared via ArcSwap with the router
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → atomic swap of the tunnel settings
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod overrides;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use overrides::ConfigOverrides;
pub use schema::{
    BrokerConfig, ListenerConfig, ObservabilityConfig, RegistryConfig, TunnelConfig,
};
pub use watcher::{ConfigWatcher, SharedTunnelConfig};
