//! Tunnel broker
//!
//! # Architecture Overview
//!
//! ```text
//!                        ┌──────────────────────────────────────────────────┐
//!                        │                  TUNNEL BROKER                    │
//!   Client request       │  ┌──────────┐   ┌────────┐   ┌────────────────┐  │
//!   ─────────────────────┼─▶│   net    │──▶│  http  │──▶│    routing     │  │
//!                        │  │ listener │   │ server │   │ Host → tenant  │  │
//!                        │  └──────────┘   └────────┘   └───┬────────┬───┘  │
//!                        │                                  │        │      │
//!                        │                     no tenant    │        │ tenant
//!                        │                                  ▼        ▼      │
//!                        │                         ┌─────────┐  ┌─────────┐ │
//!                        │                         │ control │  │registry │─┼──▶ tunnel
//!                        │                         │  plane  │─▶│ + agent │ │    client
//!                        │                         └─────────┘  └─────────┘ │
//!                        │    config · identity · observability · lifecycle │
//!                        └──────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use tunnel_broker::config::validation::validate_config;
use tunnel_broker::config::{load_config, BrokerConfig, ConfigOverrides};
use tunnel_broker::identity::HumanIdGenerator;
use tunnel_broker::lifecycle::signals::spawn_signal_handler;
use tunnel_broker::lifecycle::{Broker, ConfigReload, Shutdown};
use tunnel_broker::observability::{logging, metrics};

#[derive(Parser, Debug)]
#[command(name = "tunnel-broker", version, about = "Reverse-tunnel broker")]
struct Cli {
    /// TOML config file; watched for changes to the [tunnels] section
    #[arg(short, long, env = "TUNNEL_BROKER_CONFIG")]
    config: Option<PathBuf>,

    /// Listen on this port
    #[arg(short, long, env = "TUNNEL_BROKER_PORT")]
    port: Option<u16>,

    /// Listen on this address
    #[arg(long, env = "TUNNEL_BROKER_ADDRESS")]
    address: Option<String>,

    /// Base domain tenants live under, e.g. `example.com`
    #[arg(short, long, env = "TUNNEL_BROKER_DOMAIN")]
    domain: Option<String>,

    /// Hand out https:// tunnel URLs
    #[arg(long, env = "TUNNEL_BROKER_SECURE")]
    secure: bool,

    /// Sockets each tunnel client may open
    #[arg(long, env = "TUNNEL_BROKER_MAX_SOCKETS")]
    max_sockets: Option<usize>,

    /// Where `/` redirects to
    #[arg(long, env = "TUNNEL_BROKER_LANDING")]
    landing: Option<String>,

    /// Bearer secret required for bootstrap requests
    #[arg(long, env = "TUNNEL_BROKER_AUTH")]
    auth: Option<String>,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            port: self.port,
            address: self.address.clone(),
            domain: self.domain.clone(),
            secure: self.secure,
            max_sockets: self.max_sockets,
            landing: self.landing.clone(),
            auth: self.auth.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let overrides = cli.overrides();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => BrokerConfig::default(),
    };
    overrides.apply(&mut config);
    if let Err(errors) = validate_config(&config) {
        for error in &errors {
            eprintln!("invalid configuration: {}", error);
        }
        return Err(format!("{} configuration error(s)", errors.len()).into());
    }

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "tunnel-broker starting");

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let reload = cli.config.clone().map(|path| ConfigReload { path, overrides });
    let broker = Broker::start(config, Arc::new(HumanIdGenerator), reload).await?;
    tracing::info!(address = %broker.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    spawn_signal_handler(shutdown.clone());
    broker.run(&shutdown).await?;

    Ok(())
}
