//! Configuration types

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::common::{split_host_port, ProxyError};
use crate::config::defaults;

/// Transport used on one side of the proxy
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// Plain TCP
    Tcp,
    /// Mutually authenticated TLS over TCP
    Tls,
}

impl Transport {
    /// Whether this side needs certificates
    pub fn is_encrypted(self) -> bool {
        matches!(self, Self::Tls)
    }
}

// Case-insensitive, and reports the valid values on error
impl<'de> Deserialize<'de> for Transport {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Transport::from_str(&s).map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp => write!(f, "tcp"),
            Self::Tls => write!(f, "tls"),
        }
    }
}

impl FromStr for Transport {
    type Err = ProxyError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "tcp" => Ok(Self::Tcp),
            "tls" => Ok(Self::Tls),
            _ => Err(ProxyError::Config(format!(
                "Unsupported transport: {}. Valid values are: tcp, tls",
                s
            ))),
        }
    }
}

/// Proxy configuration
///
/// Built once by the loader (or directly in code), validated, and then shared read-only
/// behind an `Arc` by the supervisor and every session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ProxyConfig {
    // --- Listen side ---
    /// Transport accepted from clients
    pub listen_transport: Transport,

    /// Listen address (host:port)
    pub listen: String,

    // --- Backend side ---
    /// Transport used towards the backend
    pub backend_transport: Transport,

    /// Backend address (host:port)
    pub backend: String,

    /// Name the backend certificate must carry; defaults to the host part of `backend`
    #[serde(default)]
    pub backend_server_name: Option<String>,

    // --- Credentials ---
    /// Root certificate used to verify clients and the backend
    #[serde(default)]
    pub root_cert: Option<PathBuf>,

    /// Certificate presented to clients when `listen_transport` is tls
    #[serde(default)]
    pub server_cert: Option<PathBuf>,

    /// Private key for `server_cert`
    #[serde(default)]
    pub server_key: Option<PathBuf>,

    /// Certificate presented to the backend when `backend_transport` is tls
    #[serde(default)]
    pub client_cert: Option<PathBuf>,

    /// Private key for `client_cert`
    #[serde(default)]
    pub client_key: Option<PathBuf>,

    // --- General settings ---
    /// Backend connect timeout in seconds (TCP connect plus TLS handshake)
    #[serde(default = "defaults::connect_timeout")]
    pub connect_timeout: u64,

    /// Relay transfer chunk in bytes
    #[serde(default = "defaults::buffer_size")]
    pub buffer_size: usize,

    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "defaults::log_level")]
    pub log_level: String,
}

impl ProxyConfig {
    /// Configuration with the given sides, no credentials and default settings
    pub fn new(
        listen_transport: Transport,
        listen: impl Into<String>,
        backend_transport: Transport,
        backend: impl Into<String>,
    ) -> Self {
        Self {
            listen_transport,
            listen: listen.into(),
            backend_transport,
            backend: backend.into(),
            backend_server_name: None,
            root_cert: None,
            server_cert: None,
            server_key: None,
            client_cert: None,
            client_key: None,
            connect_timeout: defaults::connect_timeout(),
            buffer_size: defaults::buffer_size(),
            log_level: defaults::log_level(),
        }
    }

    /// Set the root trust anchor
    pub fn with_root_cert(mut self, path: impl Into<PathBuf>) -> Self {
        self.root_cert = Some(path.into());
        self
    }

    /// Set the identity presented to clients
    pub fn with_server_identity(
        mut self,
        cert: impl Into<PathBuf>,
        key: impl Into<PathBuf>,
    ) -> Self {
        self.server_cert = Some(cert.into());
        self.server_key = Some(key.into());
        self
    }

    /// Set the identity presented to the backend
    pub fn with_client_identity(
        mut self,
        cert: impl Into<PathBuf>,
        key: impl Into<PathBuf>,
    ) -> Self {
        self.client_cert = Some(cert.into());
        self.client_key = Some(key.into());
        self
    }

    /// Backend connect timeout
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }

    /// Name the backend certificate is checked against
    pub fn backend_server_name(&self) -> String {
        if let Some(name) = &self.backend_server_name {
            return name.clone();
        }

        match split_host_port(&self.backend) {
            Ok((host, _)) => host.to_string(),
            Err(_) => self.backend.clone(),
        }
    }
}
