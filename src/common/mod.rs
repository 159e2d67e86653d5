//! Common module
//!
//! Shared errors and small utility functions used throughout the application.

pub mod error;
pub mod fs;
pub mod log;
pub mod net;

pub use self::error::{ProxyError, Result};
pub use self::fs::{check_file_exists, read_file};
pub use self::log::init_logger;
pub use self::net::split_host_port;
