//! Default configuration values
//!
//! Single source of truth for defaults shared by the serde layer, the loader and the
//! binaries.

use std::time::Duration;

/// Environment variable prefix (`RPROXY_LISTEN`, `RPROXY_BACKEND_TRANSPORT`, ...)
pub const ENV_PREFIX: &str = "RPROXY";

/// Default log level as string
pub const LOG_LEVEL_STR: &str = "info";

/// Pause after a failed `accept()` so a persistent error (e.g. fd exhaustion) does not spin
pub const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// Upper bound on flushing a write half when a relay direction ends
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Largest accepted backend connect timeout in seconds
pub const MAX_CONNECT_TIMEOUT: u64 = 3600;

/// Largest accepted relay chunk in bytes (16MB)
pub const MAX_BUFFER_SIZE: usize = 16 * 1024 * 1024;

/// Default log level
pub fn log_level() -> String {
    LOG_LEVEL_STR.to_string()
}

/// Default relay chunk size (32KB)
pub fn buffer_size() -> usize {
    32 * 1024
}

/// Default backend connect timeout in seconds
pub fn connect_timeout() -> u64 {
    30
}
