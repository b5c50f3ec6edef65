//! Configuration schema definitions.
//!
//! Everything the daemon learns from its environment ends up in [`DaemonConfig`].

use std::os::fd::RawFd;
use std::path::PathBuf;

/// Descriptor of a pre-created listening control socket.
pub const ENV_UAPI_FD: &str = "WG_UAPI_FD";

/// Descriptor of a single pre-connected control connection.
pub const ENV_UAPI_EP_FD: &str = "WG_UAPI_EP_FD";

/// Set to `"1"` in the daemonized child so it does not respawn itself.
pub const ENV_PROCESS_FOREGROUND: &str = "WG_PROCESS_FOREGROUND";

pub const ENV_LOG_LEVEL: &str = "LOG_LEVEL";

pub const ENV_RUNTIME_DIR: &str = "XDG_RUNTIME_DIR";

/// Directory under the runtime dir that holds control sockets.
pub const SOCKET_SUBDIR: &str = "wireguard-loop";

/// Diagnostic verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    /// `verbose` or `debug`.
    Verbose,
    /// `error`, also the default.
    #[default]
    Error,
    /// `silent`: no output at all.
    Silent,
}

impl LogLevel {
    /// Parse a `LOG_LEVEL` value. Unknown values map to the default.
    pub fn parse(value: &str) -> Self {
        match value {
            "verbose" | "debug" => Self::Verbose,
            "error" => Self::Error,
            "silent" => Self::Silent,
            _ => Self::default(),
        }
    }

    /// `EnvFilter` directive for this level.
    pub fn filter_directive(self) -> &'static str {
        match self {
            Self::Verbose => "debug",
            Self::Error => "error",
            Self::Silent => "off",
        }
    }
}

/// Role of a descriptor inherited from the parent process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorKind {
    /// A listening control socket; connections are accepted from it.
    Listener,
    /// One already-connected control stream.
    Endpoint,
}

impl DescriptorKind {
    /// Environment variable that carries a descriptor of this kind.
    pub fn env_var(self) -> &'static str {
        match self {
            Self::Listener => ENV_UAPI_FD,
            Self::Endpoint => ENV_UAPI_EP_FD,
        }
    }
}

/// A descriptor number announced by the environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InheritedDescriptor {
    pub kind: DescriptorKind,
    pub fd: RawFd,
}

/// Root configuration for the daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonConfig {
    /// Parsed `LOG_LEVEL`.
    pub log_level: LogLevel,

    /// Whether `LOG_LEVEL` was present at all.
    pub log_level_set: bool,

    /// Base directory for runtime files (`XDG_RUNTIME_DIR` or the temp dir).
    pub runtime_dir: PathBuf,

    /// `WG_PROCESS_FOREGROUND=1` was found.
    pub foreground: bool,

    /// Descriptor handed over by a parent or supervisor, endpoint taking priority.
    pub inherited: Option<InheritedDescriptor>,
}

impl DaemonConfig {
    /// Directory that holds the control sockets.
    pub fn socket_dir(&self) -> PathBuf {
        self.runtime_dir.join(SOCKET_SUBDIR)
    }

    /// Whether a daemonized child should keep stdout/stderr.
    pub fn inherit_stdio(&self) -> bool {
        self.log_level_set && self.log_level != LogLevel::Silent
    }

    /// An externally supplied endpoint implies supervision, so no daemonizing.
    pub fn has_endpoint(&self) -> bool {
        matches!(
            self.inherited,
            Some(InheritedDescriptor {
                kind: DescriptorKind::Endpoint,
                ..
            })
        )
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::default(),
            log_level_set: false,
            runtime_dir: std::env::temp_dir(),
            foreground: false,
            inherited: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_level_parsing() {
        assert_eq!(LogLevel::parse("verbose"), LogLevel::Verbose);
        assert_eq!(LogLevel::parse("debug"), LogLevel::Verbose);
        assert_eq!(LogLevel::parse("error"), LogLevel::Error);
        assert_eq!(LogLevel::parse("silent"), LogLevel::Silent);
        assert_eq!(LogLevel::parse("loud"), LogLevel::Error);
    }

    #[test]
    fn stdio_inherited_only_when_level_requested() {
        let mut config = DaemonConfig::default();
        assert!(!config.inherit_stdio());

        config.log_level_set = true;
        assert!(config.inherit_stdio());

        config.log_level = LogLevel::Silent;
        assert!(!config.inherit_stdio());
    }

    #[test]
    fn socket_dir_is_under_runtime_dir() {
        let config = DaemonConfig {
            runtime_dir: PathBuf::from("/run/user/1000"),
            ..DaemonConfig::default()
        };
        assert_eq!(
            config.socket_dir(),
            PathBuf::from("/run/user/1000/wireguard-loop")
        );
    }
}
