//! Shutdown coordination for the daemon.
//!
//! # Responsibilities
//! - Race the operator signal, control-loop failures and engine completion
//! - Run the teardown exactly once, whichever source fires first
//! - Broadcast "stop accepting" to long-running tasks before tearing down
//!
//! # Design Decisions
//! - No timeout path: shutdown is purely event-triggered
//! - Events arriving after teardown has begun are logged and dropped

use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};

use crate::observability::metrics;

/// Broadcast channel that long-running tasks subscribe to.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    /// Subscribe to the shutdown signal.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Trigger the shutdown signal.
    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Why the daemon is stopping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminationReason {
    /// SIGTERM or SIGINT.
    OperatorSignal,
    /// The control accept loop failed or the endpoint closed.
    ControlLoopError(String),
    /// The engine finished on its own.
    EngineCompleted,
}

impl TerminationReason {
    pub fn label(&self) -> &'static str {
        match self {
            Self::OperatorSignal => "signal",
            Self::ControlLoopError(_) => "control_loop",
            Self::EngineCompleted => "engine",
        }
    }
}

/// Coordinator phase. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Phase {
    Running = 0,
    Stopping = 1,
    Stopped = 2,
}

impl Phase {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Running,
            1 => Self::Stopping,
            _ => Self::Stopped,
        }
    }
}

/// Ordered release of daemon resources.
pub trait Teardown {
    fn teardown(&mut self, reason: &TerminationReason);
}

/// Cloneable handle for tasks that need to stop the daemon.
#[derive(Debug, Clone)]
pub struct TerminationReporter {
    tx: mpsc::UnboundedSender<TerminationReason>,
}

impl TerminationReporter {
    /// Ask the coordinator to stop. Ignored once it is already stopping.
    pub fn report(&self, reason: TerminationReason) {
        let _ = self.tx.send(reason);
    }
}

pub struct ShutdownCoordinator {
    shutdown: Shutdown,
    phase: Arc<AtomicU8>,
    reasons_tx: mpsc::UnboundedSender<TerminationReason>,
    reasons_rx: mpsc::UnboundedReceiver<TerminationReason>,
}

impl ShutdownCoordinator {
    pub fn new(shutdown: Shutdown) -> Self {
        let (reasons_tx, reasons_rx) = mpsc::unbounded_channel();
        Self {
            shutdown,
            phase: Arc::new(AtomicU8::new(Phase::Running as u8)),
            reasons_tx,
            reasons_rx,
        }
    }

    pub fn reporter(&self) -> TerminationReporter {
        TerminationReporter {
            tx: self.reasons_tx.clone(),
        }
    }

    pub fn phase(&self) -> Phase {
        Phase::from_u8(self.phase.load(Ordering::SeqCst))
    }

    /// Wait for the first termination source.
    pub async fn wait<S, C>(&mut self, signal: S, engine_done: C) -> TerminationReason
    where
        S: Future<Output = ()>,
        C: Future<Output = ()>,
    {
        tokio::select! {
            _ = signal => TerminationReason::OperatorSignal,
            Some(reason) = self.reasons_rx.recv() => reason,
            _ = engine_done => TerminationReason::EngineCompleted,
        }
    }

    /// Move to `Stopping`, tear down, and finish in `Stopped`.
    ///
    /// Returns `false` without doing anything if a stop already happened.
    pub fn stop<T: Teardown>(&self, reason: &TerminationReason, teardown: &mut T) -> bool {
        if self
            .phase
            .compare_exchange(
                Phase::Running as u8,
                Phase::Stopping as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_err()
        {
            tracing::debug!(reason = reason.label(), "Already stopping, ignoring");
            return false;
        }

        match reason {
            TerminationReason::ControlLoopError(error) => {
                tracing::debug!(error = %error, "Shutting down after control loop error")
            }
            _ => tracing::debug!(reason = reason.label(), "Shutting down"),
        }
        metrics::record_shutdown(reason.label());

        self.shutdown.trigger();
        teardown.teardown(reason);

        self.phase.store(Phase::Stopped as u8, Ordering::SeqCst);
        true
    }

    /// Wait for the first termination source, then tear down once.
    pub async fn run<S, C, T>(
        mut self,
        signal: S,
        engine_done: C,
        teardown: &mut T,
    ) -> TerminationReason
    where
        S: Future<Output = ()>,
        C: Future<Output = ()>,
        T: Teardown,
    {
        let reason = self.wait(signal, engine_done).await;
        self.stop(&reason, teardown);

        while let Ok(late) = self.reasons_rx.try_recv() {
            tracing::debug!(reason = late.label(), "Ignoring termination after shutdown");
        }
        reason
    }
}
