//! Reporting sink for connection outcomes
//!
//! Per-connection failures never terminate the process. They are handed to a
//! [`SessionReporter`]; the default one writes them to the log.

use log::{debug, error, warn};
use std::net::SocketAddr;

use super::forwarder::RelayStats;
use crate::common::ProxyError;

/// Receives the outcome of every accept and session
pub trait SessionReporter: Send + Sync + 'static {
    /// `accept()` failed; the accept loop continues
    fn accept_failed(&self, error: &ProxyError);

    /// A session ended with an error (handshake, dial or relay)
    fn session_failed(&self, peer: SocketAddr, error: &ProxyError);

    /// A session ended cleanly
    fn session_closed(&self, peer: SocketAddr, stats: &RelayStats) {
        let _ = (peer, stats);
    }
}

/// Default reporter backed by the `log` facade
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl SessionReporter for LogReporter {
    fn accept_failed(&self, error: &ProxyError) {
        error!("Error accepting connection: {}", error);
    }

    fn session_failed(&self, peer: SocketAddr, error: &ProxyError) {
        match error {
            // Peers dropping mid-stream is routine
            ProxyError::Relay(e) => debug!("Session {} ended with relay error: {}", peer, e),
            e => warn!("Session {} failed: {}", peer, e),
        }
    }

    fn session_closed(&self, peer: SocketAddr, stats: &RelayStats) {
        debug!(
            "Session {} closed ({} bytes up, {} bytes down)",
            peer, stats.front_to_back, stats.back_to_front
        );
    }
}
