//! Configuration loading from the process environment.

use std::num::ParseIntError;
use std::os::fd::RawFd;
use std::path::PathBuf;

use thiserror::Error;

use crate::config::schema::{
    DaemonConfig, DescriptorKind, InheritedDescriptor, LogLevel, ENV_LOG_LEVEL,
    ENV_PROCESS_FOREGROUND, ENV_RUNTIME_DIR,
};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid {var}: {value:?} is not a descriptor number: {source}")]
    InvalidDescriptor {
        var: &'static str,
        value: String,
        source: ParseIntError,
    },

    #[error("Invalid {var}: descriptor {value} is out of range")]
    DescriptorOutOfRange { var: &'static str, value: u32 },

    #[error("Invalid interface name {name:?}: {reason}")]
    InvalidInterfaceName { name: String, reason: &'static str },
}

/// Load the configuration from the real process environment.
pub fn from_env() -> Result<DaemonConfig, ConfigError> {
    from_lookup(|key| std::env::var(key).ok())
}

/// Load the configuration through `lookup`. Empty values count as unset.
pub fn from_lookup<F>(lookup: F) -> Result<DaemonConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|value| !value.is_empty());

    let log_level_raw = get(ENV_LOG_LEVEL);
    let log_level = log_level_raw
        .as_deref()
        .map(LogLevel::parse)
        .unwrap_or_default();

    let runtime_dir = get(ENV_RUNTIME_DIR)
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir);

    let foreground = get(ENV_PROCESS_FOREGROUND).as_deref() == Some("1");

    // A connected endpoint takes priority over a listener.
    let mut inherited = None;
    for kind in [DescriptorKind::Endpoint, DescriptorKind::Listener] {
        if let Some(value) = get(kind.env_var()) {
            let fd = parse_descriptor(kind.env_var(), &value)?;
            inherited = Some(InheritedDescriptor { kind, fd });
            break;
        }
    }

    Ok(DaemonConfig {
        log_level,
        log_level_set: log_level_raw.is_some(),
        runtime_dir,
        foreground,
        inherited,
    })
}

fn parse_descriptor(var: &'static str, value: &str) -> Result<RawFd, ConfigError> {
    let raw: u32 = value
        .parse()
        .map_err(|source| ConfigError::InvalidDescriptor {
            var,
            value: value.to_string(),
            source,
        })?;
    RawFd::try_from(raw).map_err(|_| ConfigError::DescriptorOutOfRange { var, value: raw })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<DaemonConfig, ConfigError> {
        let env: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn empty_environment_uses_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.log_level, LogLevel::Error);
        assert!(!config.log_level_set);
        assert!(!config.foreground);
        assert_eq!(config.inherited, None);
        assert_eq!(config.runtime_dir, std::env::temp_dir());
    }

    #[test]
    fn runtime_dir_override() {
        let config = load(&[("XDG_RUNTIME_DIR", "/run/user/42")]).unwrap();
        assert_eq!(config.runtime_dir, PathBuf::from("/run/user/42"));

        let config = load(&[("XDG_RUNTIME_DIR", "")]).unwrap();
        assert_eq!(config.runtime_dir, std::env::temp_dir());
    }

    #[test]
    fn foreground_marker_requires_one() {
        assert!(load(&[("WG_PROCESS_FOREGROUND", "1")]).unwrap().foreground);
        assert!(!load(&[("WG_PROCESS_FOREGROUND", "yes")]).unwrap().foreground);
    }

    #[test]
    fn listener_descriptor_is_parsed() {
        let config = load(&[("WG_UAPI_FD", "3")]).unwrap();
        assert_eq!(
            config.inherited,
            Some(InheritedDescriptor {
                kind: DescriptorKind::Listener,
                fd: 3
            })
        );
        assert!(!config.has_endpoint());
    }

    #[test]
    fn endpoint_descriptor_wins_over_listener() {
        let config = load(&[("WG_UAPI_FD", "3"), ("WG_UAPI_EP_FD", "7")]).unwrap();
        assert_eq!(
            config.inherited,
            Some(InheritedDescriptor {
                kind: DescriptorKind::Endpoint,
                fd: 7
            })
        );
        assert!(config.has_endpoint());
    }

    #[test]
    fn invalid_descriptor_is_rejected() {
        let err = load(&[("WG_UAPI_FD", "three")]).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidDescriptor { var: "WG_UAPI_FD", .. }
        ));

        let err = load(&[("WG_UAPI_EP_FD", "-1")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidDescriptor { .. }));

        let err = load(&[("WG_UAPI_FD", "4294967295")]).unwrap_err();
        assert!(matches!(err, ConfigError::DescriptorOutOfRange { .. }));
    }

    #[test]
    fn log_level_presence_is_tracked() {
        let config = load(&[("LOG_LEVEL", "verbose")]).unwrap();
        assert_eq!(config.log_level, LogLevel::Verbose);
        assert!(config.log_level_set);
        assert!(config.inherit_stdio());

        let config = load(&[("LOG_LEVEL", "silent")]).unwrap();
        assert!(config.log_level_set);
        assert!(!config.inherit_stdio());
    }
}
