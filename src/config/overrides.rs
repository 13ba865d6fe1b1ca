//! Command-line overrides layered on top of the config file.

use crate::config::schema::BrokerConfig;

/// Settings given on the command line. They win over the file, including
/// after a hot reload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub port: Option<u16>,
    pub address: Option<String>,
    pub domain: Option<String>,
    pub secure: bool,
    pub max_sockets: Option<usize>,
    pub landing: Option<String>,
    pub auth: Option<String>,
}

impl ConfigOverrides {
    pub fn apply(&self, config: &mut BrokerConfig) {
        if self.port.is_some() || self.address.is_some() {
            let (file_host, file_port) = split_bind_address(&config.listener.bind_address);
            let host = self.address.clone().unwrap_or(file_host);
            let port = self.port.or(file_port).unwrap_or(80);
            config.listener.bind_address = join_bind_address(&host, port);
        }
        if let Some(domain) = &self.domain {
            config.tunnels.domain = Some(domain.clone());
        }
        if self.secure {
            config.tunnels.secure = true;
        }
        if let Some(max_sockets) = self.max_sockets {
            config.registry.max_sockets = max_sockets;
        }
        if let Some(landing) = &self.landing {
            config.tunnels.landing_page = landing.clone();
        }
        if let Some(auth) = &self.auth {
            config.tunnels.auth = Some(auth.clone());
        }
    }
}

fn split_bind_address(bind: &str) -> (String, Option<u16>) {
    match bind.rsplit_once(':') {
        Some((host, port)) => (
            host.trim_start_matches('[').trim_end_matches(']').to_string(),
            port.parse().ok(),
        ),
        None => (bind.to_string(), None),
    }
}

fn join_bind_address(host: &str, port: u16) -> String {
    if host.contains(':') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}
