//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (hyper auto builder: HTTP/1.1 with upgrades, HTTP/2)
//!     → request.rs (Host, upgrade detection, endpoint address)
//!     → routing::ConnectionRouter (tenant, control plane or error)
//!     → response written back, or connection dropped for a rejected upgrade
//! ```

pub mod request;
pub mod server;

pub use server::{AppState, HttpServer};
