//! Data forwarding module
//!
//! Copies bytes between the front and back connections of one session. Each direction
//! runs on its own task; the first one to finish flips a shared close flag, which makes
//! the other abandon its pending read or write. Both write halves are then shut down and
//! every half is dropped, so both connections are closed when `relay` returns.

use log::debug;
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::common::{ProxyError, Result};
use crate::config::defaults::SHUTDOWN_GRACE;

/// Byte counts for a finished session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    /// Bytes copied from the front peer to the backend
    pub front_to_back: u64,
    /// Bytes copied from the backend to the front peer
    pub back_to_front: u64,
}

/// Outcome of one copy direction
struct HalfOutcome {
    bytes: u64,
    error: Option<io::Error>,
}

/// Aborts the spawned direction if the relay future is dropped early (e.g. the session
/// task is aborted on shutdown), so its halves are released too
struct AbortOnDrop(JoinHandle<HalfOutcome>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Relay data between `front` and `back` until either side closes or fails
///
/// # Parameters
///
/// * `front` - Accepted client connection
/// * `back` - Dialed backend connection
/// * `buffer_size` - Maximum bytes moved per read/write
///
/// # Errors
///
/// `ProxyError::Relay` with the first I/O error observed in either direction. Both
/// connections are closed in every case.
pub async fn relay<F, B>(front: F, back: B, buffer_size: usize) -> Result<RelayStats>
where
    F: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    B: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (front_reader, front_writer) = tokio::io::split(front);
    let (back_reader, back_writer) = tokio::io::split(back);

    let (closed_tx, closed_rx) = watch::channel(false);
    let closed_tx = Arc::new(closed_tx);

    // Front to back on its own task
    let mut upstream_task = AbortOnDrop(tokio::spawn(copy_half(
        front_reader,
        back_writer,
        buffer_size,
        Arc::clone(&closed_tx),
        closed_rx.clone(),
    )));

    // Back to front on this task
    let downstream = copy_half(back_reader, front_writer, buffer_size, closed_tx, closed_rx).await;

    let upstream = (&mut upstream_task.0).await.unwrap_or_else(|e| HalfOutcome {
        bytes: 0,
        error: Some(io::Error::new(io::ErrorKind::Other, e)),
    });

    debug!(
        "Relay finished: {} bytes front->back, {} bytes back->front",
        upstream.bytes, downstream.bytes
    );

    match upstream.error.or(downstream.error) {
        Some(e) => Err(ProxyError::Relay(e)),
        None => Ok(RelayStats {
            front_to_back: upstream.bytes,
            back_to_front: downstream.bytes,
        }),
    }
}

async fn copy_half<R, W>(
    mut reader: ReadHalf<R>,
    mut writer: WriteHalf<W>,
    buffer_size: usize,
    closed_tx: Arc<watch::Sender<bool>>,
    mut closed_rx: watch::Receiver<bool>,
) -> HalfOutcome
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buffer = vec![0u8; buffer_size];
    let mut bytes = 0u64;
    let mut error = None;

    loop {
        if *closed_rx.borrow_and_update() {
            break;
        }

        let step = async {
            let n = reader.read(&mut buffer).await?;
            if n > 0 {
                writer.write_all(&buffer[..n]).await?;
                writer.flush().await?;
            }
            Ok::<usize, io::Error>(n)
        };

        tokio::select! {
            res = step => match res {
                Ok(0) => break,
                Ok(n) => bytes += n as u64,
                Err(e) => {
                    error = Some(e);
                    break;
                }
            },
            // Other direction finished
            _ = closed_rx.changed() => break,
        }
    }

    closed_tx.send_replace(true);

    // Best effort: the peer may already be gone
    let _ = timeout(SHUTDOWN_GRACE, writer.shutdown()).await;

    HalfOutcome { bytes, error }
}
