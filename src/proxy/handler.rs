//! Connection handler module
//!
//! Drives one session: front handshake, backend dial, relay.

use log::debug;
use tokio::io::AsyncWriteExt;
use tokio::time::timeout;

use super::dialer::Dialer;
use super::forwarder::{relay, RelayStats};
use super::listener::InboundConnection;
use crate::common::Result;
use crate::config::defaults::SHUTDOWN_GRACE;

/// Handle a single accepted connection
///
/// The front connection is closed on every exit path: it is dropped on handshake
/// failure, shut down and dropped on dial failure, and closed by the relay otherwise.
pub async fn handle_connection(
    inbound: InboundConnection,
    dialer: &Dialer,
    buffer_size: usize,
) -> Result<RelayStats> {
    let peer = inbound.peer_addr();

    // Peers failing mutual auth stop here and never cause a backend connection
    let mut front = inbound.establish().await?;

    let back = match dialer.dial().await {
        Ok(back) => back,
        Err(e) => {
            let _ = timeout(SHUTDOWN_GRACE, front.shutdown()).await;
            return Err(e);
        }
    };

    debug!("Relaying {} <-> {}", peer, dialer.address());
    relay(front, back, buffer_size).await
}
