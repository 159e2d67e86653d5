//! Network address helpers
//!
//! Addresses are kept as `host:port` strings and resolved when they are used, so a
//! backend given by name follows DNS changes between sessions.

use super::error::{ProxyError, Result};

/// Split a `host:port` address into its host and port
///
/// Bracketed IPv6 literals (`[::1]:443`) are accepted; the brackets are stripped from the
/// returned host.
pub fn split_host_port(addr: &str) -> Result<(&str, u16)> {
    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| ProxyError::Config(format!("Address must be host:port, got '{}'", addr)))?;

    let port = port
        .parse::<u16>()
        .map_err(|_| ProxyError::Config(format!("Invalid port in address '{}'", addr)))?;

    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);

    if host.is_empty() {
        return Err(ProxyError::Config(format!("Missing host in address '{}'", addr)));
    }

    Ok((host, port))
}
