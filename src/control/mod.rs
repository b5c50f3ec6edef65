//! Control channel subsystem.
//!
//! # Data Flow
//! ```text
//! socket.rs (bind or recover <runtime>/wireguard-loop/<iface>.sock)
//!     → raw listening descriptor (possibly handed to a daemon child)
//!     → listener.rs (accept loop, or one inherited endpoint)
//!     → protocol.rs (get/set requests, errno responses)
//!     → engine
//! ```
//!
//! # Design Decisions
//! - Socket setup is synchronous and happens before the runtime starts
//! - Accept failures end the loop and are reported to the shutdown coordinator

pub mod listener;
pub mod protocol;
pub mod socket;

pub use listener::{ControlListener, ControlLoopExit};
pub use socket::{BootstrapError, ControlSocket};
