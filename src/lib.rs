//! rproxy: reverse-proxy relay with independent TCP / mutual-TLS sides
//!
//! Accepts connections on a listen address, opens one connection per client to a fixed
//! backend, and copies bytes both ways until either side closes. Each side is plain TCP or
//! mutually authenticated TLS, so the proxy can terminate TLS, originate TLS, or both.
//!
//! # Example
//!
//! ```no_run
//! use rproxy::config::{ProxyConfig, Transport};
//! use rproxy::{Proxy, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config =
//!         ProxyConfig::new(Transport::Tls, "127.0.0.1:9000", Transport::Tcp, "127.0.0.1:9001")
//!             .with_root_cert("certs/root_cert.pem")
//!             .with_server_identity("certs/server_cert.pem", "certs/server_key.pem");
//!
//!     let proxy = Proxy::new(config)?;
//!     proxy.run().await
//! }
//! ```

pub mod common;
pub mod config;
pub mod proxy;
pub mod tls;

pub use common::{ProxyError, Result};
pub use proxy::Proxy;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
