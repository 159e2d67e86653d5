//! Listen side: binds the listen address and hands out accepted connections
//!
//! For tls the handshake is not performed in `accept()`; it runs in
//! [`InboundConnection::establish`] on the session's own task, so one slow or hostile
//! peer never holds up the accept loop.

use log::debug;
use openssl::ssl::Ssl;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio_openssl::SslStream;

use crate::common::{ProxyError, Result};
use crate::config::Transport;
use crate::proxy::stream::ProxyStream;
use crate::tls::{name_to_string, ServerTrust};

/// Bound listen socket plus the transport applied to every accepted connection
pub struct Listener {
    inner: TcpListener,
    tls: Option<Arc<ServerTrust>>,
}

impl Listener {
    /// Bind `address` for the given transport
    ///
    /// # Errors
    ///
    /// `ProxyError::Config` if `transport` is tls and no server context is supplied,
    /// `ProxyError::Bind` if the socket cannot be bound.
    pub async fn bind(
        transport: Transport,
        address: &str,
        server_trust: Option<Arc<ServerTrust>>,
    ) -> Result<Self> {
        let tls = match transport {
            Transport::Tcp => None,
            Transport::Tls => Some(server_trust.ok_or_else(|| {
                ProxyError::Config("tls listener requires a server TLS context".to_string())
            })?),
        };

        let inner = TcpListener::bind(address)
            .await
            .map_err(|source| ProxyError::Bind {
                addr: address.to_string(),
                source,
            })?;

        Ok(Self { inner, tls })
    }

    /// Address the socket is actually bound to
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.inner.local_addr()?)
    }

    /// Transport applied to accepted connections
    pub fn transport(&self) -> Transport {
        if self.tls.is_some() {
            Transport::Tls
        } else {
            Transport::Tcp
        }
    }

    /// Wait for the next connection
    ///
    /// # Errors
    ///
    /// `ProxyError::Accept`; the listener stays usable afterwards.
    pub async fn accept(&self) -> Result<InboundConnection> {
        let (stream, peer) = self.inner.accept().await.map_err(ProxyError::Accept)?;

        if let Err(e) = stream.set_nodelay(true) {
            debug!("Failed to set TCP_NODELAY for {}: {}", peer, e);
        }

        Ok(InboundConnection {
            stream,
            peer,
            tls: self.tls.clone(),
        })
    }
}

/// Accepted connection whose handshake (if any) has not run yet
pub struct InboundConnection {
    stream: TcpStream,
    peer: SocketAddr,
    tls: Option<Arc<ServerTrust>>,
}

impl InboundConnection {
    /// Remote address of the client
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Finish establishing the connection
    ///
    /// For tls this runs the server handshake, which fails unless the client presents a
    /// valid certificate chaining to the root. The connection is dropped (closed) on failure.
    pub async fn establish(self) -> Result<ProxyStream> {
        let Some(trust) = self.tls else {
            return Ok(ProxyStream::Plain(self.stream));
        };

        let ssl = Ssl::new(trust.acceptor().context())?;
        let mut stream = SslStream::new(ssl, self.stream)?;

        Pin::new(&mut stream)
            .accept()
            .await
            .map_err(|e| ProxyError::TlsHandshake(format!("{}: {}", self.peer, e)))?;

        match stream.ssl().peer_certificate() {
            Some(cert) => debug!(
                "TLS handshake with {} complete, client certificate [{}]",
                self.peer,
                name_to_string(cert.subject_name())
            ),
            None => debug!("TLS handshake with {} complete", self.peer),
        }

        Ok(ProxyStream::Tls(Box::new(stream)))
    }
}
