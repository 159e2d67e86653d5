//! Configuration module
//!
//! Loads the proxy configuration from defaults, a JSON file, environment variables and
//! command-line overrides, and validates it before anything is bound.

pub mod defaults;
mod loader;
mod types;
mod validator;

pub use self::defaults::ENV_PREFIX;
pub use self::loader::ConfigOverrides;
pub use self::types::{ProxyConfig, Transport};
pub use self::validator::{check_warnings, validate_config};
