//! Control connection serving.
//!
//! # Responsibilities
//! - Accept control connections from the inherited or bootstrapped listener
//! - Serve a single pre-connected endpoint instead, when one was handed over
//! - Stop when the shutdown broadcast fires, report failures otherwise

use std::io;
use std::os::fd::OwnedFd;
use std::sync::Arc;

use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast;

use crate::engine::Engine;
use crate::observability::metrics;

/// How a control loop ended.
#[derive(Debug)]
pub enum ControlLoopExit {
    /// The shutdown broadcast fired.
    Stopped,
    /// The loop ended on its own; the daemon should shut down.
    Failed(String),
}

/// Listening control socket registered with the runtime.
pub struct ControlListener {
    inner: UnixListener,
}

impl ControlListener {
    /// Adopt a listening descriptor. Must be called inside a tokio runtime.
    pub fn from_fd(fd: OwnedFd) -> io::Result<Self> {
        let std_listener = std::os::unix::net::UnixListener::from(fd);
        std_listener.set_nonblocking(true)?;
        Ok(Self {
            inner: UnixListener::from_std(std_listener)?,
        })
    }

    pub async fn accept(&self) -> io::Result<UnixStream> {
        let (stream, _) = self.inner.accept().await?;
        metrics::record_control_connection();
        tracing::debug!("Control connection accepted");
        Ok(stream)
    }
}

/// Adopt a connected endpoint descriptor. Must be called inside a tokio runtime.
pub fn endpoint_from_fd(fd: OwnedFd) -> io::Result<UnixStream> {
    let std_stream = std::os::unix::net::UnixStream::from(fd);
    std_stream.set_nonblocking(true)?;
    UnixStream::from_std(std_stream)
}

/// Accept connections until shutdown, handing each one to the engine.
pub async fn serve<E: Engine>(
    listener: ControlListener,
    engine: Arc<E>,
    mut shutdown: broadcast::Receiver<()>,
) -> ControlLoopExit {
    tracing::debug!("UAPI listener started");
    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::debug!("Control listener stopping");
                return ControlLoopExit::Stopped;
            }
            accepted = listener.accept() => match accepted {
                Ok(stream) => {
                    let engine = Arc::clone(&engine);
                    tokio::spawn(async move {
                        if let Err(e) = engine.serve_control(stream).await {
                            tracing::debug!(error = %e, "Control connection ended with error");
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "Control listener accept failed");
                    return ControlLoopExit::Failed(e.to_string());
                }
            }
        }
    }
}

/// Serve one pre-connected endpoint. Its closing ends the daemon.
pub async fn serve_endpoint<E: Engine>(
    stream: UnixStream,
    engine: Arc<E>,
    mut shutdown: broadcast::Receiver<()>,
) -> ControlLoopExit {
    tracing::debug!("Using connected endpoint socket");
    tokio::select! {
        _ = shutdown.recv() => ControlLoopExit::Stopped,
        result = engine.serve_control(stream) => {
            let reason = match result {
                Ok(()) => "endpoint connection closed".to_string(),
                Err(e) => format!("endpoint connection closed: {e}"),
            };
            tracing::debug!(reason = %reason, "Endpoint closed");
            ControlLoopExit::Failed(reason)
        }
    }
}
