//! Configuration validator
//!
//! Everything that can be checked without touching the network is checked here, so a
//! bad configuration fails before the listener is bound.

use std::path::{Path, PathBuf};

use crate::common::{check_file_exists, split_host_port, ProxyError, Result};
use crate::config::defaults::{MAX_BUFFER_SIZE, MAX_CONNECT_TIMEOUT};
use crate::config::types::ProxyConfig;

/// Validate the configuration
pub fn validate_config(config: &ProxyConfig) -> Result<()> {
    validate_network_settings(config)?;
    validate_credentials(config)?;
    validate_general_settings(config)?;

    Ok(())
}

/// Validate network settings
fn validate_network_settings(config: &ProxyConfig) -> Result<()> {
    split_host_port(&config.listen)
        .map_err(|e| ProxyError::Config(format!("listen: {}", e)))?;
    split_host_port(&config.backend)
        .map_err(|e| ProxyError::Config(format!("backend: {}", e)))?;

    if config.listen == config.backend {
        return Err(ProxyError::Config(
            "Listen and backend addresses must be different".to_string(),
        ));
    }

    if let Some(name) = &config.backend_server_name {
        if name.trim().is_empty() {
            return Err(ProxyError::Config(
                "backend_server_name must not be empty".to_string(),
            ));
        }
    }

    Ok(())
}

/// A tls side needs the root and its own identity, all present on disk
fn validate_credentials(config: &ProxyConfig) -> Result<()> {
    if config.listen_transport.is_encrypted() {
        require_file(&config.root_cert, "root_cert", "listen")?;
        require_file(&config.server_cert, "server_cert", "listen")?;
        require_file(&config.server_key, "server_key", "listen")?;
    }

    if config.backend_transport.is_encrypted() {
        require_file(&config.root_cert, "root_cert", "backend")?;
        require_file(&config.client_cert, "client_cert", "backend")?;
        require_file(&config.client_key, "client_key", "backend")?;
    }

    Ok(())
}

fn require_file(path: &Option<PathBuf>, field: &str, side: &str) -> Result<()> {
    match path {
        Some(path) => check_file_exists(path, field),
        None => Err(ProxyError::Config(format!(
            "{} is required when the {} transport is tls",
            field, side
        ))),
    }
}

/// Validate general settings
fn validate_general_settings(config: &ProxyConfig) -> Result<()> {
    if config.buffer_size == 0 {
        return Err(ProxyError::Config(
            "buffer_size must be greater than 0".to_string(),
        ));
    }

    if config.buffer_size > MAX_BUFFER_SIZE {
        return Err(ProxyError::Config(format!(
            "buffer_size must not exceed {} bytes, got {}",
            MAX_BUFFER_SIZE, config.buffer_size
        )));
    }

    if config.connect_timeout == 0 {
        return Err(ProxyError::Config(
            "connect_timeout must be greater than 0".to_string(),
        ));
    }

    if config.connect_timeout > MAX_CONNECT_TIMEOUT {
        return Err(ProxyError::Config(format!(
            "connect_timeout must not exceed {} seconds, got {}",
            MAX_CONNECT_TIMEOUT, config.connect_timeout
        )));
    }

    Ok(())
}

/// Non-fatal oddities worth a log line
pub fn check_warnings(config: &ProxyConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    match config.log_level.as_str() {
        "error" | "warn" | "info" | "debug" | "trace" => {}
        level => warnings.push(format!("Unknown log level '{}', RUST_LOG syntax assumed", level)),
    }

    if !config.listen_transport.is_encrypted() {
        ignored(&mut warnings, &config.server_cert, "server_cert", "listen");
        ignored(&mut warnings, &config.server_key, "server_key", "listen");
    }

    if !config.backend_transport.is_encrypted() {
        ignored(&mut warnings, &config.client_cert, "client_cert", "backend");
        ignored(&mut warnings, &config.client_key, "client_key", "backend");
        if config.backend_server_name.is_some() {
            warnings.push("backend_server_name is ignored: backend transport is tcp".to_string());
        }
    }

    if !config.listen_transport.is_encrypted()
        && !config.backend_transport.is_encrypted()
        && config.root_cert.is_some()
    {
        warnings.push("root_cert is ignored: neither side uses tls".to_string());
    }

    warnings
}

fn ignored(warnings: &mut Vec<String>, path: &Option<PathBuf>, field: &str, side: &str) {
    if let Some(path) = path.as_deref().map(Path::display) {
        warnings.push(format!(
            "{} ({}) is ignored: {} transport is tcp",
            field, path, side
        ));
    }
}
