//! Proxy server module
//!
//! The supervisor: owns the validated configuration and the trust contexts, runs the
//! accept loop and gives every accepted connection its own task.

use log::{debug, info, warn};
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinSet;

use super::dialer::Dialer;
use super::handler::handle_connection;
use super::listener::Listener;
use super::report::{LogReporter, SessionReporter};
use crate::common::{ProxyError, Result};
use crate::config::{defaults::ACCEPT_ERROR_BACKOFF, ProxyConfig};
use crate::tls::{build_client_context, build_server_context, describe_certificate, ServerTrust};

/// Proxy server structure
///
/// Accepts connections on the listen side and relays each one to the backend.
pub struct Proxy {
    /// Validated configuration
    config: Arc<ProxyConfig>,
    /// Server-role context, present when the listen side is tls
    server_trust: Option<Arc<ServerTrust>>,
    /// Backend dialer, holding the client-role context when the backend is tls
    dialer: Arc<Dialer>,
    /// Where per-connection outcomes go
    reporter: Arc<dyn SessionReporter>,
}

impl Proxy {
    /// Create a proxy from a configuration
    ///
    /// Validates the configuration and loads every credential the configured transports
    /// need, so all fatal errors surface here rather than per connection.
    ///
    /// # Errors
    ///
    /// `ProxyError::Config`, `ProxyError::TrustLoad` or `ProxyError::IdentityLoad`.
    pub fn new(config: ProxyConfig) -> Result<Self> {
        config.validate()?;

        let server_trust = if config.listen_transport.is_encrypted() {
            let (root, cert, key) = (
                required(&config.root_cert, "root_cert")?,
                required(&config.server_cert, "server_cert")?,
                required(&config.server_key, "server_key")?,
            );
            log_identity("Server", cert);
            Some(Arc::new(build_server_context(root, cert, key)?))
        } else {
            None
        };

        let client_trust = if config.backend_transport.is_encrypted() {
            let (root, cert, key) = (
                required(&config.root_cert, "root_cert")?,
                required(&config.client_cert, "client_cert")?,
                required(&config.client_key, "client_key")?,
            );
            log_identity("Client", cert);
            Some(build_client_context(
                root,
                cert,
                key,
                &config.backend_server_name(),
            )?)
        } else {
            None
        };

        let dialer = Dialer::new(
            config.backend_transport,
            config.backend.clone(),
            client_trust,
            config.connect_timeout(),
        )?;

        Ok(Self {
            config: Arc::new(config),
            server_trust,
            dialer: Arc::new(dialer),
            reporter: Arc::new(LogReporter),
        })
    }

    /// Replace the default log-based reporter
    pub fn with_reporter(mut self, reporter: Arc<dyn SessionReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Configuration the proxy runs with
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Bind the listen side
    ///
    /// # Errors
    ///
    /// `ProxyError::Bind` if the address cannot be bound.
    pub async fn bind(&self) -> Result<Listener> {
        let listener = Listener::bind(
            self.config.listen_transport,
            &self.config.listen,
            self.server_trust.clone(),
        )
        .await?;

        info!(
            "Proxy listening on {} ({}) -> backend {} ({})",
            listener.local_addr()?,
            listener.transport(),
            self.config.backend,
            self.config.backend_transport
        );

        Ok(listener)
    }

    /// Bind and serve forever
    pub async fn run(&self) -> Result<()> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    /// Run the accept loop forever
    pub async fn serve(&self, listener: Listener) -> Result<()> {
        self.serve_until(listener, std::future::pending::<()>()).await
    }

    /// Run the accept loop until `shutdown` resolves
    ///
    /// Sessions still running at that point are aborted, which closes their connections.
    pub async fn serve_until<S>(&self, listener: Listener, shutdown: S) -> Result<()>
    where
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut sessions = JoinSet::new();

        loop {
            // Reap finished sessions without waiting
            while let Some(result) = sessions.try_join_next() {
                if let Err(e) = result {
                    if e.is_panic() {
                        warn!("Session task panicked: {}", e);
                    }
                }
            }

            let inbound = tokio::select! {
                _ = &mut shutdown => break,
                accepted = listener.accept() => accepted,
            };

            let inbound = match inbound {
                Ok(inbound) => inbound,
                Err(e) => {
                    self.reporter.accept_failed(&e);
                    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    continue;
                }
            };

            let peer = inbound.peer_addr();
            info!("Accepted connection from {}", peer);

            let dialer = Arc::clone(&self.dialer);
            let reporter = Arc::clone(&self.reporter);
            let buffer_size = self.config.buffer_size;

            sessions.spawn(async move {
                match handle_connection(inbound, &dialer, buffer_size).await {
                    Ok(stats) => reporter.session_closed(peer, &stats),
                    Err(e) => reporter.session_failed(peer, &e),
                }
            });
        }

        info!(
            "Proxy on {} shutting down, aborting {} active session(s)",
            self.config.listen,
            sessions.len()
        );
        sessions.shutdown().await;

        Ok(())
    }
}

fn required<'a>(path: &'a Option<std::path::PathBuf>, field: &str) -> Result<&'a std::path::Path> {
    path.as_deref()
        .ok_or_else(|| ProxyError::Config(format!("{} is required for tls", field)))
}

fn log_identity(role: &str, cert: &std::path::Path) {
    match describe_certificate(cert) {
        Ok(info) => info!("{} certificate: {}", role, info),
        Err(e) => debug!("Unable to describe {} certificate: {}", role.to_lowercase(), e),
    }
}
