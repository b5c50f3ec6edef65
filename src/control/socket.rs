//! Control socket bootstrap.
//!
//! # Responsibilities
//! - Create the per-user socket directory
//! - Bind `<socket-dir>/<interface>.sock` with owner-only permissions
//! - Detect a live instance holding the socket, or clean up a stale file
//!
//! # Design Decisions
//! - Returns the raw listening descriptor so it can be handed to a child
//! - A stale file is removed and the bind retried exactly once; a second
//!   process racing us between the removal and the retry is not handled

use std::fs::DirBuilder;
use std::io;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::os::unix::fs::DirBuilderExt;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::DaemonConfig;

const SOCKET_DIR_MODE: u32 = 0o700;
const SOCKET_UMASK: libc::mode_t = 0o077;

/// Error type for control socket setup. All variants are fatal.
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("Failed to create socket directory {}: {source}", .path.display())]
    CreateDir { path: PathBuf, source: io::Error },

    #[error("Control socket {} is in use", .path.display())]
    InUse { path: PathBuf },

    #[error("Failed to remove stale control socket {}: {source}", .path.display())]
    RemoveStale { path: PathBuf, source: io::Error },

    #[error("Failed to bind control socket {}: {source}", .path.display())]
    Bind { path: PathBuf, source: io::Error },
}

/// A bound, listening control socket.
#[derive(Debug)]
pub struct ControlSocket {
    fd: OwnedFd,
    path: PathBuf,
}

impl ControlSocket {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }

    /// Give up the descriptor, e.g. to hand it to a child process.
    pub fn into_parts(self) -> (OwnedFd, PathBuf) {
        (self.fd, self.path)
    }
}

/// Path of the control socket for `interface`.
pub fn socket_path(config: &DaemonConfig, interface: &str) -> PathBuf {
    config.socket_dir().join(format!("{interface}.sock"))
}

/// Create or recover the control socket for `interface`.
pub fn open(config: &DaemonConfig, interface: &str) -> Result<ControlSocket, BootstrapError> {
    let dir = config.socket_dir();
    DirBuilder::new()
        .recursive(true)
        .mode(SOCKET_DIR_MODE)
        .create(&dir)
        .map_err(|source| BootstrapError::CreateDir {
            path: dir.clone(),
            source,
        })?;

    let path = socket_path(config, interface);

    let listener = {
        let _umask = UmaskGuard::set(SOCKET_UMASK);
        match UnixListener::bind(&path) {
            Ok(listener) => listener,
            Err(e) if e.kind() == io::ErrorKind::AddrInUse => recover_stale(&path)?,
            Err(source) => return Err(BootstrapError::Bind { path, source }),
        }
    };

    tracing::debug!(path = %path.display(), "Control socket bound");

    Ok(ControlSocket {
        fd: OwnedFd::from(listener),
        path,
    })
}

fn recover_stale(path: &Path) -> Result<UnixListener, BootstrapError> {
    if UnixStream::connect(path).is_ok() {
        return Err(BootstrapError::InUse {
            path: path.to_path_buf(),
        });
    }

    tracing::debug!(path = %path.display(), "Removing stale control socket");
    std::fs::remove_file(path).map_err(|source| BootstrapError::RemoveStale {
        path: path.to_path_buf(),
        source,
    })?;

    UnixListener::bind(path).map_err(|source| BootstrapError::Bind {
        path: path.to_path_buf(),
        source,
    })
}

/// Restores the previous process umask on drop.
struct UmaskGuard(libc::mode_t);

impl UmaskGuard {
    fn set(mask: libc::mode_t) -> Self {
        // SAFETY: umask has no failure mode and touches no memory.
        Self(unsafe { libc::umask(mask) })
    }
}

impl Drop for UmaskGuard {
    fn drop(&mut self) {
        // SAFETY: as above.
        unsafe {
            libc::umask(self.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::os::unix::fs::{FileTypeExt, PermissionsExt};

    fn config_in(dir: &Path) -> DaemonConfig {
        DaemonConfig {
            runtime_dir: dir.to_path_buf(),
            ..DaemonConfig::default()
        }
    }

    #[test]
    fn path_layout() {
        let config = config_in(Path::new("/run/user/7"));
        assert_eq!(
            socket_path(&config, "wg0"),
            PathBuf::from("/run/user/7/wireguard-loop/wg0.sock")
        );
    }

    #[test]
    #[serial]
    fn creates_private_directory_and_socket() {
        let runtime = tempfile::tempdir().unwrap();
        let config = config_in(runtime.path());

        let socket = open(&config, "wg0").unwrap();
        assert_eq!(socket.path(), socket_path(&config, "wg0"));

        let dir_mode = std::fs::metadata(config.socket_dir())
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(dir_mode & 0o077, 0, "directory mode {dir_mode:o}");

        let meta = std::fs::metadata(socket.path()).unwrap();
        assert!(meta.file_type().is_socket());
        assert_eq!(meta.permissions().mode() & 0o077, 0);
    }

    #[test]
    #[serial]
    fn umask_is_restored() {
        let runtime = tempfile::tempdir().unwrap();
        // SAFETY: umask has no failure mode.
        let before = unsafe { libc::umask(0o022) };
        let _socket = open(&config_in(runtime.path()), "wg0").unwrap();
        let after = unsafe { libc::umask(before) };
        assert_eq!(after, 0o022);
    }

    #[test]
    #[serial]
    fn unwritable_runtime_dir_fails() {
        let runtime = tempfile::tempdir().unwrap();
        let file = runtime.path().join("not-a-dir");
        std::fs::write(&file, b"x").unwrap();

        let err = open(&config_in(&file), "wg0").unwrap_err();
        assert!(matches!(err, BootstrapError::CreateDir { .. }));
    }
}
