//! ## Logging Configuration
//!
//! This module sets up diagnostic logging automatically at program startup using the `ctor` crate.
//! Logging behavior is controlled by the `DEBUG_TRIP_CLEANER` environment variable:
//!
//! - **Disabled** (default): If the variable is unset, empty, or explicitly set to `"0"` or `"false"`,
//!   no subscriber is installed.
//! - **Enabled**: Any other value enables logging with a maximum log level of `DEBUG`.
//!
//! Diagnostic logging is separate from the exclusion log. Exclusion events are collected in an
//! [`ExclusionLog`](crate::audit::ExclusionLog) and are also emitted as `tracing` events, so they
//! show up here when logging is enabled.
//!
//! ### Usage Example
//!
//! ```sh
//! export DEBUG_TRIP_CLEANER=true
//! ```

use ctor::ctor;
use tracing::Level;

/// Name of the environment variable that switches diagnostic logging on.
pub const DEBUG_ENV_VAR: &str = "DEBUG_TRIP_CLEANER";

/// Returns true when the given value of [`DEBUG_ENV_VAR`] enables logging.
pub fn debug_enabled(value: Option<&str>) -> bool {
    value.is_some_and(|v| !(v.is_empty() || v == "0" || v == "false"))
}

#[ctor]
fn set_debug_level() {
    let value = std::env::var(DEBUG_ENV_VAR).ok();
    if debug_enabled(value.as_deref()) {
        // A host application may already own the global subscriber.
        let _ = tracing_subscriber::fmt()
            .with_max_level(Level::DEBUG)
            .try_init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_switch_values() {
        assert!(!debug_enabled(None));
        assert!(!debug_enabled(Some("")));
        assert!(!debug_enabled(Some("0")));
        assert!(!debug_enabled(Some("false")));
        assert!(debug_enabled(Some("1")));
        assert!(debug_enabled(Some("true")));
    }
}
