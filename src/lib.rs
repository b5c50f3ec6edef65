//! Userspace WireGuard loop daemon library.

pub mod config;
pub mod control;
pub mod device;
pub mod engine;
pub mod lifecycle;
pub mod observability;

pub use config::DaemonConfig;
pub use device::{LoopDevice, PacketDevice};
pub use engine::{Engine, LoopbackEngine};
pub use lifecycle::{Shutdown, TerminationReason};
