//! Process handoff for daemonizing.
//!
//! # Responsibilities
//! - Decide whether this process should re-execute itself in the background
//! - Spawn the child with the listening control socket installed at a fixed
//!   descriptor slot, announced through the environment
//! - Release the child and the parent's copy of the descriptor
//!
//! # Design Decisions
//! - The child never repeats the socket bootstrap; it adopts the descriptor
//! - The parent does not wait for the child and does not clean up the socket
//!   file on failure; whichever process holds the descriptor owns it

use std::ffi::OsStr;
use std::io;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Command, Stdio};

use thiserror::Error;

use crate::config::schema::ENV_PROCESS_FOREGROUND;
use crate::config::{DaemonConfig, DescriptorKind};

/// Descriptor slot of the listening socket in the child.
pub const CHILD_LISTENER_FD: RawFd = 3;

#[derive(Debug, Error)]
pub enum DaemonizeError {
    #[error("Failed to determine executable: {0}")]
    Executable(#[source] io::Error),

    #[error("Failed to daemonize: {0}")]
    Spawn(#[source] io::Error),
}

/// What the child learns from its environment about the inherited descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandoffRecord {
    pub kind: DescriptorKind,
    pub fd: RawFd,
    pub foreground: bool,
}

impl HandoffRecord {
    /// Record for a listening socket at [`CHILD_LISTENER_FD`].
    pub fn listener() -> Self {
        Self {
            kind: DescriptorKind::Listener,
            fd: CHILD_LISTENER_FD,
            foreground: true,
        }
    }

    /// Environment variables that carry this record.
    pub fn env(&self) -> Vec<(&'static str, String)> {
        let mut vars = vec![(self.kind.env_var(), self.fd.to_string())];
        if self.foreground {
            vars.push((ENV_PROCESS_FOREGROUND, "1".to_string()));
        }
        vars
    }
}

/// Whether to re-execute in the background.
///
/// A supervisor-supplied endpoint implies the process is already managed.
pub fn should_daemonize(foreground_flag: bool, config: &DaemonConfig) -> bool {
    !(foreground_flag || config.foreground || config.has_endpoint())
}

/// Re-execute the current program in the background with `listener` inherited.
///
/// Returns the child's pid. The parent's copy of `listener` is closed.
pub fn daemonize(listener: OwnedFd, config: &DaemonConfig) -> Result<u32, DaemonizeError> {
    let program = std::env::current_exe().map_err(DaemonizeError::Executable)?;
    spawn_detached(
        &program,
        std::env::args_os().skip(1),
        listener,
        config.inherit_stdio(),
    )
}

/// Spawn `program` detached, installing `listener` at [`CHILD_LISTENER_FD`].
pub fn spawn_detached<I, S>(
    program: &Path,
    args: I,
    listener: OwnedFd,
    inherit_stdio: bool,
) -> Result<u32, DaemonizeError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let record = HandoffRecord::listener();

    let mut cmd = Command::new(program);
    cmd.args(args)
        .envs(record.env())
        .current_dir(".")
        .stdin(Stdio::null());

    if inherit_stdio {
        cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit());
    } else {
        cmd.stdout(Stdio::null()).stderr(Stdio::null());
    }

    let source = listener.as_raw_fd();
    let target = record.fd;
    // SAFETY: the closure only makes async-signal-safe libc calls.
    unsafe {
        cmd.pre_exec(move || install_descriptor(source, target));
    }

    let child = cmd.spawn().map_err(DaemonizeError::Spawn)?;
    let pid = child.id();

    // Released without waiting; the child now owns the socket.
    drop(child);
    drop(listener);

    tracing::debug!(pid, "Daemon child started");
    Ok(pid)
}

/// Runs in the forked child before exec.
fn install_descriptor(source: RawFd, target: RawFd) -> io::Result<()> {
    // SAFETY: plain syscalls on descriptors owned by the forked child.
    unsafe {
        // Fails only if already a session leader.
        libc::setsid();

        if source == target {
            let flags = libc::fcntl(target, libc::F_GETFD);
            if flags < 0 || libc::fcntl(target, libc::F_SETFD, flags & !libc::FD_CLOEXEC) < 0 {
                return Err(io::Error::last_os_error());
            }
        } else if libc::dup2(source, target) < 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{InheritedDescriptor, LogLevel};
    use serial_test::serial;
    use std::os::unix::net::UnixListener;
    use std::time::{Duration, Instant};

    #[test]
    fn handoff_env_marks_foreground() {
        let env = HandoffRecord::listener().env();
        assert_eq!(
            env,
            vec![
                ("WG_UAPI_FD", "3".to_string()),
                ("WG_PROCESS_FOREGROUND", "1".to_string()),
            ]
        );
    }

    #[test]
    fn daemonize_decision() {
        let mut config = DaemonConfig::default();
        assert!(should_daemonize(false, &config));
        assert!(!should_daemonize(true, &config));

        config.foreground = true;
        assert!(!should_daemonize(false, &config));

        config.foreground = false;
        config.inherited = Some(InheritedDescriptor {
            kind: DescriptorKind::Endpoint,
            fd: 9,
        });
        assert!(!should_daemonize(false, &config));

        config.inherited = Some(InheritedDescriptor {
            kind: DescriptorKind::Listener,
            fd: 3,
        });
        assert!(should_daemonize(false, &config));
    }

    #[test]
    fn stdio_follows_log_level() {
        let config = DaemonConfig {
            log_level: LogLevel::Verbose,
            log_level_set: true,
            ..DaemonConfig::default()
        };
        assert!(config.inherit_stdio());
    }

    #[cfg(target_os = "linux")]
    #[test]
    #[serial]
    fn child_receives_listener_at_fixed_slot() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("wg0.sock");
        let out = dir.path().join("child.out");
        let listener = UnixListener::bind(&socket).unwrap();

        let script = r#"if [ -e /dev/fd/3 ]; then echo "$WG_UAPI_FD $WG_PROCESS_FOREGROUND" > "$1.tmp" && mv "$1.tmp" "$1"; fi"#;
        let pid = spawn_detached(
            Path::new("/bin/sh"),
            ["-c", script, "sh", out.to_str().unwrap()],
            OwnedFd::from(listener),
            false,
        )
        .unwrap();
        assert!(pid > 0);

        let deadline = Instant::now() + Duration::from_secs(10);
        while !out.exists() {
            assert!(Instant::now() < deadline, "child never reported");
            std::thread::sleep(Duration::from_millis(20));
        }
        assert_eq!(std::fs::read_to_string(&out).unwrap().trim(), "3 1");
    }

    #[test]
    fn missing_program_is_a_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let listener = UnixListener::bind(dir.path().join("wg0.sock")).unwrap();
        let err = spawn_detached(
            Path::new("/nonexistent/wireguard-loop"),
            std::iter::empty::<&str>(),
            OwnedFd::from(listener),
            false,
        )
        .unwrap_err();
        assert!(matches!(err, DaemonizeError::Spawn(_)));
    }
}
