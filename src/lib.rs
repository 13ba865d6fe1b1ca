//! Front door of a reverse-tunnel broker.
//!
//! Routes every incoming connection by its Host header: to a registered
//! tenant's tunnel, to the control plane, or to an error.

pub mod config;
pub mod control;
pub mod http;
pub mod identity;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod registry;
pub mod routing;

pub use config::schema::BrokerConfig;
pub use http::HttpServer;
pub use lifecycle::{Broker, Shutdown};
