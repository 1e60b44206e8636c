//! Console user lookup.

use std::path::Path;

use nix::sys::stat::stat;
use tracing::debug;

/// Owner of the console device when a non-root user holds it.
pub fn current_console_user_id(console_device_path: &Path) -> Option<u32> {
    match stat(console_device_path) {
        Ok(st) if st.st_uid != 0 => Some(st.st_uid),
        Ok(_) => None,
        Err(e) => {
            debug!(path = %console_device_path.display(), error = %e, "console device not readable");
            None
        }
    }
}
