//! Error handling module
//!
//! This module defines the error types and result type aliases used in the application.
//! Startup errors (configuration, credentials, bind) are fatal; every other variant is
//! scoped to a single accepted connection.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// rproxy error type
#[derive(Error, Debug)]
pub enum ProxyError {
    /// Invalid or incomplete configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Root trust anchor could not be loaded
    #[error("Failed to load root certificate {path}: {reason}")]
    TrustLoad { path: PathBuf, reason: String },

    /// Local certificate/key pair could not be loaded
    #[error("Failed to load identity {cert} / {key}: {reason}")]
    IdentityLoad {
        cert: PathBuf,
        key: PathBuf,
        reason: String,
    },

    /// Listen address could not be bound
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// Accepting a connection failed
    #[error("Accept error: {0}")]
    Accept(#[source] io::Error),

    /// Certificate could not be inspected
    #[error("Certificate error: {0}")]
    Certificate(String),

    /// Front peer failed the TLS handshake
    #[error("TLS handshake error: {0}")]
    TlsHandshake(String),

    /// Backend refused, timed out or could not be resolved
    #[error("Backend {addr} unreachable: {reason}")]
    BackendUnreachable { addr: String, reason: String },

    /// Backend TLS handshake or identity verification failed
    #[error("Backend {addr} authentication failed: {reason}")]
    BackendAuth { addr: String, reason: String },

    /// Read or write failure while relaying
    #[error("Relay error: {0}")]
    Relay(#[source] io::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// OpenSSL error
    #[error("OpenSSL error: {0}")]
    Ssl(#[from] openssl::error::ErrorStack),
}

impl ProxyError {
    /// Whether this error prevents the proxy from serving at all.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Config(_) | Self::TrustLoad { .. } | Self::IdentityLoad { .. } | Self::Bind { .. }
        )
    }
}

impl From<config::ConfigError> for ProxyError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

/// Result type alias
///
/// This is a `Result` type alias that uses our custom `ProxyError`.
pub type Result<T> = std::result::Result<T, ProxyError>;
