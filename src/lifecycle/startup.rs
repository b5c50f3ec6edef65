//! Startup orchestration.
//!
//! # Responsibilities
//! - Obtain the control channel: inherited endpoint, inherited listener, or a
//!   freshly bootstrapped socket
//! - Serve control connections and block in the shutdown coordinator
//! - Tear down in order: stop accepting, close engine and device, remove the
//!   socket file this daemon owns
//!
//! # Design Decisions
//! - Fail fast: every setup error is fatal and maps to exit code 1
//! - Socket setup and daemonizing happen before any runtime work

use std::future::Future;
use std::io;
use std::os::fd::{FromRawFd, OwnedFd, RawFd};
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tokio::net::UnixStream;

use crate::config::{ConfigError, DaemonConfig, DescriptorKind};
use crate::control::listener::{self, ControlListener, ControlLoopExit};
use crate::control::{socket, BootstrapError};
use crate::device::{LoopDevice, PacketDevice};
use crate::engine::Engine;
use crate::lifecycle::daemonize::DaemonizeError;
use crate::lifecycle::shutdown::{
    Shutdown, ShutdownCoordinator, Teardown, TerminationReason, TerminationReporter,
};

/// Fatal errors before the daemon reaches its running state.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("UAPI listen error: {0}")]
    Bootstrap(#[from] BootstrapError),

    #[error(transparent)]
    Daemonize(#[from] DaemonizeError),

    #[error("Inherited descriptor {fd} from {var} is not open: {source}")]
    BadDescriptor {
        var: &'static str,
        fd: RawFd,
        source: io::Error,
    },

    #[error("Failed to set up control channel: {0}")]
    Io(#[from] io::Error),
}

/// Where control connections come from.
#[derive(Debug)]
pub enum ControlChannel {
    /// A listening socket. `socket_file` is removed on teardown when set.
    Listener {
        fd: OwnedFd,
        socket_file: Option<PathBuf>,
    },
    /// One connected stream supplied by a supervisor.
    Endpoint(OwnedFd),
}

impl ControlChannel {
    pub fn is_endpoint(&self) -> bool {
        matches!(self, Self::Endpoint(_))
    }
}

/// Adopt the inherited descriptor from the environment, or bootstrap a socket.
///
/// A listener inherited from our own daemonizing parent (foreground marker
/// set) owns the socket file at the derived path.
pub fn open_control_channel(
    config: &DaemonConfig,
    interface: &str,
) -> Result<ControlChannel, SetupError> {
    match config.inherited {
        Some(inherited) => {
            let fd = adopt_descriptor(inherited.kind.env_var(), inherited.fd)?;
            match inherited.kind {
                DescriptorKind::Endpoint => Ok(ControlChannel::Endpoint(fd)),
                DescriptorKind::Listener => Ok(ControlChannel::Listener {
                    fd,
                    socket_file: config
                        .foreground
                        .then(|| socket::socket_path(config, interface)),
                }),
            }
        }
        None => {
            let (fd, path) = socket::open(config, interface)?.into_parts();
            Ok(ControlChannel::Listener {
                fd,
                socket_file: Some(path),
            })
        }
    }
}

fn adopt_descriptor(var: &'static str, fd: RawFd) -> Result<OwnedFd, SetupError> {
    // SAFETY: F_GETFD only inspects the descriptor table.
    if unsafe { libc::fcntl(fd, libc::F_GETFD) } < 0 {
        return Err(SetupError::BadDescriptor {
            var,
            fd,
            source: io::Error::last_os_error(),
        });
    }
    // SAFETY: the descriptor is open and was handed to this process for its
    // exclusive use; nothing else in the process wraps it.
    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

/// Ordered release of the running daemon's resources.
pub struct DaemonTeardown<E: Engine> {
    engine: Arc<E>,
    device: Arc<LoopDevice>,
    socket_file: Option<PathBuf>,
}

impl<E: Engine> DaemonTeardown<E> {
    pub fn new(engine: Arc<E>, device: Arc<LoopDevice>, socket_file: Option<PathBuf>) -> Self {
        Self {
            engine,
            device,
            socket_file,
        }
    }

    /// Close the engine and device, then remove an owned socket file.
    /// Safe to call more than once.
    pub fn release(&mut self) {
        self.engine.close();
        self.device.close();

        if let Some(path) = self.socket_file.take() {
            match std::fs::remove_file(&path) {
                Ok(()) => tracing::debug!(path = %path.display(), "Control socket removed"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to remove control socket")
                }
            }
        }
    }
}

impl<E: Engine> Teardown for DaemonTeardown<E> {
    fn teardown(&mut self, _reason: &TerminationReason) {
        self.release();
    }
}

/// Control channel registered with the runtime.
enum AdoptedChannel {
    Listener(ControlListener),
    Endpoint(UnixStream),
}

/// Serve control connections until a termination source fires, then tear down.
///
/// The engine may already be running. If the channel cannot be registered
/// with the runtime, everything is released before the error is returned.
/// Must be called inside a tokio runtime.
pub async fn run<E, S>(
    engine: Arc<E>,
    device: Arc<LoopDevice>,
    channel: ControlChannel,
    signal: S,
) -> Result<TerminationReason, SetupError>
where
    E: Engine,
    S: Future<Output = ()>,
{
    let shutdown = Shutdown::new();
    let coordinator = ShutdownCoordinator::new(shutdown.clone());
    let reporter = coordinator.reporter();

    let (adopted, socket_file) = match channel {
        ControlChannel::Listener { fd, socket_file } => (
            ControlListener::from_fd(fd).map(AdoptedChannel::Listener),
            socket_file,
        ),
        ControlChannel::Endpoint(fd) => (
            listener::endpoint_from_fd(fd).map(AdoptedChannel::Endpoint),
            None,
        ),
    };

    let name = device.name().to_string();
    let mut teardown = DaemonTeardown::new(Arc::clone(&engine), device, socket_file);

    let control_task = match adopted {
        Ok(AdoptedChannel::Listener(listener)) => tokio::spawn(report_exit(
            listener::serve(listener, Arc::clone(&engine), shutdown.subscribe()),
            reporter,
        )),
        Ok(AdoptedChannel::Endpoint(stream)) => tokio::spawn(report_exit(
            listener::serve_endpoint(stream, Arc::clone(&engine), shutdown.subscribe()),
            reporter,
        )),
        Err(e) => {
            teardown.release();
            return Err(e.into());
        }
    };

    tracing::debug!(device = %name, "Device started");

    let reason = coordinator
        .run(signal, engine.completed(), &mut teardown)
        .await;

    if let Err(e) = control_task.await {
        tracing::warn!(error = %e, "Control task failed");
    }

    tracing::debug!("Shutting down");
    Ok(reason)
}

async fn report_exit<F>(control_loop: F, reporter: TerminationReporter)
where
    F: Future<Output = ControlLoopExit>,
{
    if let ControlLoopExit::Failed(error) = control_loop.await {
        reporter.report(TerminationReason::ControlLoopError(error));
    }
}
