//! Backend side: opens one connection to the fixed backend per session

use log::debug;
use std::pin::Pin;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::{timeout_at, Instant};
use tokio_openssl::SslStream;

use crate::common::{ProxyError, Result};
use crate::config::Transport;
use crate::proxy::stream::ProxyStream;
use crate::tls::ClientTrust;

/// Connects to the backend with the configured transport
pub struct Dialer {
    address: String,
    tls: Option<ClientTrust>,
    timeout: Duration,
}

impl Dialer {
    /// Create a dialer
    ///
    /// # Errors
    ///
    /// `ProxyError::Config` if `transport` is tls and no client context is supplied.
    pub fn new(
        transport: Transport,
        address: impl Into<String>,
        client_trust: Option<ClientTrust>,
        timeout: Duration,
    ) -> Result<Self> {
        let tls = match transport {
            Transport::Tcp => None,
            Transport::Tls => Some(client_trust.ok_or_else(|| {
                ProxyError::Config("tls backend requires a client TLS context".to_string())
            })?),
        };

        Ok(Self {
            address: address.into(),
            tls,
            timeout,
        })
    }

    /// Backend address
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Open a connection to the backend
    ///
    /// TCP connect and TLS handshake share one deadline.
    ///
    /// # Errors
    ///
    /// `ProxyError::BackendUnreachable` on refusal, resolution failure or timeout;
    /// `ProxyError::BackendAuth` if the TLS handshake or backend verification fails.
    pub async fn dial(&self) -> Result<ProxyStream> {
        let deadline = Instant::now().checked_add(self.timeout).ok_or_else(|| {
            self.unreachable(format!("invalid connect timeout {:?}", self.timeout))
        })?;

        let tcp = match timeout_at(deadline, TcpStream::connect(&self.address)).await {
            Ok(Ok(tcp)) => tcp,
            Ok(Err(e)) => return Err(self.unreachable(e.to_string())),
            Err(_) => {
                return Err(self.unreachable(format!(
                    "connect timed out after {:?}",
                    self.timeout
                )))
            }
        };

        if let Err(e) = tcp.set_nodelay(true) {
            debug!("Failed to set TCP_NODELAY towards {}: {}", self.address, e);
        }

        let Some(trust) = &self.tls else {
            return Ok(ProxyStream::Plain(tcp));
        };

        let ssl = trust
            .connector()
            .configure()
            .and_then(|c| c.into_ssl(trust.server_name()))
            .map_err(|e| self.auth_failed(e.to_string()))?;
        let mut stream = SslStream::new(ssl, tcp).map_err(|e| self.auth_failed(e.to_string()))?;

        match timeout_at(deadline, Pin::new(&mut stream).connect()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(self.auth_failed(e.to_string())),
            Err(_) => {
                return Err(self.unreachable(format!(
                    "TLS handshake timed out after {:?}",
                    self.timeout
                )))
            }
        }

        debug!("TLS session with backend {} established", self.address);
        Ok(ProxyStream::Tls(Box::new(stream)))
    }

    fn unreachable(&self, reason: String) -> ProxyError {
        ProxyError::BackendUnreachable {
            addr: self.address.clone(),
            reason,
        }
    }

    fn auth_failed(&self, reason: String) -> ProxyError {
        ProxyError::BackendAuth {
            addr: self.address.clone(),
            reason,
        }
    }
}
