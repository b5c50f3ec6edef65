//! OS signal handling.
//!
//! # Responsibilities
//! - Register SIGTERM and SIGINT handlers before the daemon starts serving
//! - Resolve once either arrives, as the operator-signal termination source

use std::io;

use tokio::signal::unix::{signal, Signal, SignalKind};

/// Registered termination handlers.
pub struct TerminationSignals {
    sigterm: Signal,
    sigint: Signal,
}

impl TerminationSignals {
    /// Install the handlers. Must be called inside a tokio runtime.
    pub fn install() -> io::Result<Self> {
        Ok(Self {
            sigterm: signal(SignalKind::terminate())?,
            sigint: signal(SignalKind::interrupt())?,
        })
    }

    /// Wait for SIGTERM or SIGINT.
    pub async fn recv(mut self) {
        tokio::select! {
            _ = self.sigterm.recv() => tracing::debug!("Received SIGTERM"),
            _ = self.sigint.recv() => tracing::debug!("Received SIGINT"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn sigterm_resolves() {
        let signals = TerminationSignals::install().unwrap();
        let waiter = tokio::spawn(signals.recv());

        // SAFETY: raise only queues a signal for this process.
        unsafe {
            libc::raise(libc::SIGTERM);
        }

        tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .expect("SIGTERM should resolve the waiter")
            .unwrap();
    }
}
