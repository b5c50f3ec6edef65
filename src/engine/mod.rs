//! Protocol engine seam.
//!
//! The real engine (handshakes, peers, cryptography) lives elsewhere. The
//! daemon only needs to hand it a packet device, pass it control
//! connections, learn when it has finished, and close it.

pub mod loopback;

use std::future::Future;
use std::io;

use tokio::net::UnixStream;

pub use loopback::LoopbackEngine;

pub trait Engine: Send + Sync + 'static {
    /// Serve one control connection until the peer closes it.
    fn serve_control(&self, stream: UnixStream) -> impl Future<Output = io::Result<()>> + Send;

    /// Resolves once the engine stops on its own or is closed.
    fn completed(&self) -> impl Future<Output = ()> + Send + 'static;

    /// Stop the engine and close its device.
    fn close(&self);
}
