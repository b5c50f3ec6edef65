//! Interface name validation.
//!
//! The name becomes a file name under the socket directory, so it must not
//! be empty or able to escape that directory.

use crate::config::loader::ConfigError;

pub fn validate_interface_name(name: &str) -> Result<(), ConfigError> {
    let reason = if name.is_empty() {
        "name is empty"
    } else if name == "." || name == ".." {
        "name is a relative path component"
    } else if name.contains('/') {
        "name contains '/'"
    } else if name.contains('\0') {
        "name contains a NUL byte"
    } else {
        return Ok(());
    };

    Err(ConfigError::InvalidInterfaceName {
        name: name.to_string(),
        reason,
    })
}
