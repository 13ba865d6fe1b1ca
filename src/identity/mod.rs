//! Tunnel identity allocation.
//!
//! # Data Flow
//! ```text
//! bootstrap without a name → generator.rs (random human-readable id)
//! bootstrap with a name    → validate.rs (syntax check, fail fast)
//!     → candidate handed to the registry, which enforces uniqueness
//! ```

pub mod generator;
pub mod validate;

pub use generator::{HumanIdGenerator, IdGenerator, SequenceGenerator};
pub use validate::{is_valid_identity, INVALID_IDENTITY_MESSAGE};
