//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Environment → control channel (inherited or bootstrapped)
//!
//! Handoff (daemonize.rs):
//!     Listener → child process at fd 3 → parent exits
//!
//! Running (startup.rs, shutdown.rs):
//!     Accept control connections → first termination source → teardown
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → operator-signal termination
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config, device, control socket, then daemonize or serve
//! - Ordered shutdown: stop accepting, close engine and device, remove socket
//! - Teardown runs at most once

pub mod daemonize;
pub mod shutdown;
pub mod signals;
pub mod startup;

pub use daemonize::{daemonize, should_daemonize, DaemonizeError};
pub use shutdown::{Shutdown, ShutdownCoordinator, TerminationReason};
pub use signals::TerminationSignals;
pub use startup::{open_control_channel, ControlChannel, SetupError};
