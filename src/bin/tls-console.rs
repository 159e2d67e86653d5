//! Manual test harness: a mutual-TLS endpoint wired to the console
//!
//! Accepts TLS connections whose client certificate chains to the root, prints whatever
//! each peer sends, and sends every line typed on stdin to all connected peers. Point an
//! rproxy with `--backend-transport tls` at it to exercise the backend side by hand.

use clap::Parser;
use log::{error, info, warn};
use openssl::ssl::Ssl;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_openssl::SslStream;

use rproxy::common::{init_logger, ProxyError, Result};
use rproxy::tls::{build_server_context, name_to_string, ServerTrust};

/// Mutual-TLS console endpoint for manual testing
#[derive(Parser, Debug)]
#[clap(version, about, long_about = None)]
struct Args {
    /// Listen address (host:port)
    #[clap(long, default_value = "127.0.0.1:23002")]
    listen: String,

    /// Root certificate used to verify clients
    #[clap(long, default_value = "certs/root_cert.pem")]
    root_cert: PathBuf,

    /// Server certificate
    #[clap(long, default_value = "certs/server_cert.pem")]
    cert: PathBuf,

    /// Server private key
    #[clap(long, default_value = "certs/server_key.pem")]
    key: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logger("info");

    let trust = Arc::new(build_server_context(&args.root_cert, &args.cert, &args.key)?);
    let listener = TcpListener::bind(&args.listen)
        .await
        .map_err(|source| ProxyError::Bind {
            addr: args.listen.clone(),
            source,
        })?;
    info!("Listening on {}, type lines to send them to every peer", args.listen);

    let (lines_tx, _) = broadcast::channel::<String>(1024);
    tokio::spawn(read_stdin(lines_tx.clone()));

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                error!("Accept error: {}", e);
                continue;
            }
        };

        let trust = Arc::clone(&trust);
        let lines = lines_tx.subscribe();
        tokio::spawn(async move {
            if let Err(e) = handle_peer(stream, &trust, lines).await {
                warn!("Peer {}: {}", peer, e);
            }
            info!("Peer {} disconnected", peer);
        });
    }
}

async fn read_stdin(lines_tx: broadcast::Sender<String>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                // No peers connected is fine
                let _ = lines_tx.send(line);
            }
            Ok(None) => break,
            Err(e) => {
                error!("stdin: {}", e);
                break;
            }
        }
    }
}

async fn handle_peer(
    stream: TcpStream,
    trust: &ServerTrust,
    mut lines: broadcast::Receiver<String>,
) -> Result<()> {
    let peer = stream.peer_addr()?;
    let ssl = Ssl::new(trust.acceptor().context())?;
    let mut stream = SslStream::new(ssl, stream)?;

    Pin::new(&mut stream)
        .accept()
        .await
        .map_err(|e| ProxyError::TlsHandshake(e.to_string()))?;

    let subject = stream
        .ssl()
        .peer_certificate()
        .map(|cert| name_to_string(cert.subject_name()))
        .unwrap_or_default();
    info!("Peer {} connected [{}]", peer, subject);

    let (mut reader, mut writer) = tokio::io::split(stream);
    let mut buffer = vec![0u8; 4096];

    loop {
        tokio::select! {
            read = reader.read(&mut buffer) => {
                let n = read?;
                if n == 0 {
                    return Ok(());
                }
                println!("{} > {}", peer, String::from_utf8_lossy(&buffer[..n]).trim_end());
            }
            line = lines.recv() => match line {
                Ok(line) => {
                    writer.write_all(line.as_bytes()).await?;
                    writer.write_all(b"\n").await?;
                    writer.flush().await?;
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Peer {} skipped {} console line(s)", peer, skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return Ok(()),
            },
        }
    }
}
