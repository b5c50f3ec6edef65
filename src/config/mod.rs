//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! process environment (LOG_LEVEL, XDG_RUNTIME_DIR, WG_* handoff variables)
//!     → loader.rs (read & parse once at startup)
//!     → validation.rs (interface name checks)
//!     → DaemonConfig (immutable, passed by reference to every subsystem)
//! ```
//!
//! # Design Decisions
//! - The environment is read in exactly one place; nothing else calls `std::env::var`
//! - The runtime directory is resolved once, not recomputed per socket
//! - Unknown `LOG_LEVEL` values fall back to the default rather than failing

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{from_env, from_lookup, ConfigError};
pub use schema::{DaemonConfig, DescriptorKind, InheritedDescriptor, LogLevel};
