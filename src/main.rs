//! rproxy command line tool

use clap::Parser;
use log::{debug, error, info};
use std::path::PathBuf;
use std::process::ExitCode;

use rproxy::common::{init_logger, Result};
use rproxy::config::{ConfigOverrides, ProxyConfig, Transport};
use rproxy::{Proxy, APP_NAME, VERSION};

/// Reverse-proxy relay with independent TCP / mutual-TLS listen and backend sides
///
/// Every option can also come from a JSON file (--config-file) or from RPROXY_*
/// environment variables; command-line values win.
#[derive(Parser, Debug)]
#[clap(author, version = VERSION, about, long_about = None)]
struct Args {
    /// JSON configuration file
    #[clap(long)]
    config_file: Option<PathBuf>,

    /// Transport accepted from clients (tcp, tls)
    #[clap(long)]
    listen_transport: Option<Transport>,

    /// Listen address (host:port)
    #[clap(short, long)]
    listen: Option<String>,

    /// Transport used towards the backend (tcp, tls)
    #[clap(long)]
    backend_transport: Option<Transport>,

    /// Backend address (host:port)
    #[clap(short, long)]
    backend: Option<String>,

    /// Name the backend certificate must carry (defaults to the backend host)
    #[clap(long)]
    backend_server_name: Option<String>,

    /// Root certificate used to verify clients and the backend
    #[clap(long)]
    root_cert: Option<PathBuf>,

    /// Certificate presented to clients
    #[clap(long)]
    server_cert: Option<PathBuf>,

    /// Private key for --server-cert
    #[clap(long)]
    server_key: Option<PathBuf>,

    /// Certificate presented to the backend
    #[clap(long)]
    client_cert: Option<PathBuf>,

    /// Private key for --client-cert
    #[clap(long)]
    client_key: Option<PathBuf>,

    /// Backend connect timeout in seconds
    #[clap(long)]
    connect_timeout: Option<u64>,

    /// Relay buffer size in bytes
    #[clap(long)]
    buffer_size: Option<usize>,

    /// Log level (error, warn, info, debug, trace)
    #[clap(long)]
    log_level: Option<String>,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            listen_transport: self.listen_transport,
            listen: self.listen.clone(),
            backend_transport: self.backend_transport,
            backend: self.backend.clone(),
            backend_server_name: self.backend_server_name.clone(),
            root_cert: self.root_cert.clone(),
            server_cert: self.server_cert.clone(),
            server_key: self.server_key.clone(),
            client_cert: self.client_cert.clone(),
            client_key: self.client_key.clone(),
            connect_timeout: self.connect_timeout,
            buffer_size: self.buffer_size,
            log_level: self.log_level.clone(),
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let config = ProxyConfig::load(args.config_file.as_deref(), &args.overrides())?;

    init_logger(&config.log_level);
    info!("Starting {} v{}", APP_NAME, VERSION);

    let proxy = Proxy::new(config)?;
    if let Ok(json) = serde_json::to_string(proxy.config()) {
        debug!("Effective configuration: {}", json);
    }
    let listener = proxy.bind().await?;

    info!("Proxy service ready, press Ctrl+C to stop");

    proxy
        .serve_until(listener, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            // Configuration errors happen before the logger exists
            eprintln!("{}: {}", APP_NAME, e);
            ExitCode::FAILURE
        }
    }
}
