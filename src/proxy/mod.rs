//! Proxy service module
//!
//! Listener, dialer, relay and the supervisor that ties them together.

mod dialer;
mod forwarder;
mod handler;
mod listener;
mod report;
pub mod server;
mod stream;

pub use dialer::Dialer;
pub use forwarder::{relay, RelayStats};
pub use handler::handle_connection;
pub use listener::{InboundConnection, Listener};
pub use report::{LogReporter, SessionReporter};
pub use server::Proxy;
pub use stream::ProxyStream;
