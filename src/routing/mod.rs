//! Host-based connection routing.
//!
//! # Data Flow
//! ```text
//! Incoming request (Host header)
//!     → resolver.rs (Host → tenant id candidate, or none)
//!     → registry lookup
//!     → router.rs: tenant, control plane, 400 or 404
//! ```
//!
//! # Design Decisions
//! - Only the Host header decides; paths never select a tenant
//! - Plain requests always get a response, upgrades are dropped on any miss

pub mod error;
pub mod resolver;
pub mod router;

pub use error::{RouteError, UpgradeRejected};
pub use resolver::resolve;
pub use router::{ConnectionRouter, RoutingOutcome};
