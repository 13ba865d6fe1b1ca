//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (limits > 0, addresses parse)
//! - Check the landing page and base domain are usable
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: BrokerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::{IpAddr, SocketAddr};

use crate::config::schema::{BrokerConfig, TunnelConfig};

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Validate a full broker configuration.
pub fn validate_config(config: &BrokerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::new(
            "listener.max_connections",
            "must be greater than zero",
        ));
    }

    if config.registry.agent_bind_address.parse::<IpAddr>().is_err() {
        errors.push(ValidationError::new(
            "registry.agent_bind_address",
            format!("'{}' is not an IP address", config.registry.agent_bind_address),
        ));
    }
    if config.registry.max_sockets == 0 {
        errors.push(ValidationError::new(
            "registry.max_sockets",
            "must be greater than zero",
        ));
    }

    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!(
                "'{}' is not a socket address",
                config.observability.metrics_address
            ),
        ));
    }

    errors.extend(validate_tunnels(&config.tunnels));

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate the hot-reloadable tunnel settings.
pub fn validate_tunnels(tunnels: &TunnelConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    match url::Url::parse(&tunnels.landing_page) {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
        Ok(url) => errors.push(ValidationError::new(
            "tunnels.landing_page",
            format!("unsupported scheme '{}'", url.scheme()),
        )),
        Err(e) => errors.push(ValidationError::new(
            "tunnels.landing_page",
            format!("invalid URL: {}", e),
        )),
    }

    if let Some(domain) = &tunnels.domain {
        if domain.is_empty()
            || domain.starts_with('.')
            || domain.ends_with('.')
            || domain.contains([':', '/', ' '])
        {
            errors.push(ValidationError::new(
                "tunnels.domain",
                format!("'{}' is not a bare domain name", domain),
            ));
        }
    }

    if matches!(&tunnels.auth, Some(secret) if secret.trim().is_empty()) {
        errors.push(ValidationError::new(
            "tunnels.auth",
            "secret must not be empty when set",
        ));
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&BrokerConfig::default()).is_ok());
    }

    #[test]
    fn collects_every_error() {
        let mut config = BrokerConfig::default();
        config.listener.bind_address = "nope".into();
        config.registry.max_sockets = 0;
        config.tunnels.landing_page = "ftp://example.com".into();
        config.tunnels.domain = Some("example.com:8080".into());

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec![
                "listener.bind_address",
                "registry.max_sockets",
                "tunnels.landing_page",
                "tunnels.domain",
            ]
        );
    }

    #[test]
    fn empty_secret_rejected() {
        let tunnels = TunnelConfig {
            auth: Some("  ".into()),
            ..TunnelConfig::default()
        };
        let errors = validate_tunnels(&tunnels);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "tunnels.auth");
    }
}
