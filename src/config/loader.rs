//! Configuration loading
//!
//! Sources are layered with the `config` crate, lowest priority first:
//! 1. serde defaults
//! 2. JSON configuration file (optional)
//! 3. `RPROXY_*` environment variables
//! 4. command-line overrides

use config::{Config, Environment, File, FileFormat};
use log::{debug, warn};
use std::path::{Path, PathBuf};

use crate::common::Result;
use crate::config::defaults::ENV_PREFIX;
use crate::config::types::{ProxyConfig, Transport};
use crate::config::validator::{check_warnings, validate_config};

/// Values given on the command line; `None` leaves lower layers untouched
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub listen_transport: Option<Transport>,
    pub listen: Option<String>,
    pub backend_transport: Option<Transport>,
    pub backend: Option<String>,
    pub backend_server_name: Option<String>,
    pub root_cert: Option<PathBuf>,
    pub server_cert: Option<PathBuf>,
    pub server_key: Option<PathBuf>,
    pub client_cert: Option<PathBuf>,
    pub client_key: Option<PathBuf>,
    pub connect_timeout: Option<u64>,
    pub buffer_size: Option<usize>,
    pub log_level: Option<String>,
}

fn path_value(path: &Option<PathBuf>) -> Option<String> {
    path.as_ref().map(|p| p.to_string_lossy().into_owned())
}

impl ProxyConfig {
    /// Load a JSON configuration file on its own (no environment, no overrides)
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading configuration from {}", path.display());

        let config = Config::builder()
            .add_source(File::from(path).format(FileFormat::Json).required(true))
            .build()?
            .try_deserialize::<Self>()?;

        config.validate()?;
        Ok(config)
    }

    /// Load the layered configuration and validate it
    ///
    /// # Errors
    ///
    /// Returns `ProxyError::Config` if a source cannot be read or parsed, a required key is
    /// missing after layering, or validation fails.
    pub fn load(config_file: Option<&Path>, overrides: &ConfigOverrides) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = config_file {
            debug!("Adding configuration file {}", path.display());
            builder =
                builder.add_source(File::from(path).format(FileFormat::Json).required(true));
        }

        builder = builder
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .set_override_option(
                "listen_transport",
                overrides.listen_transport.map(|t| t.to_string()),
            )?
            .set_override_option("listen", overrides.listen.clone())?
            .set_override_option(
                "backend_transport",
                overrides.backend_transport.map(|t| t.to_string()),
            )?
            .set_override_option("backend", overrides.backend.clone())?
            .set_override_option("backend_server_name", overrides.backend_server_name.clone())?
            .set_override_option("root_cert", path_value(&overrides.root_cert))?
            .set_override_option("server_cert", path_value(&overrides.server_cert))?
            .set_override_option("server_key", path_value(&overrides.server_key))?
            .set_override_option("client_cert", path_value(&overrides.client_cert))?
            .set_override_option("client_key", path_value(&overrides.client_key))?
            .set_override_option("connect_timeout", overrides.connect_timeout)?
            .set_override_option("buffer_size", overrides.buffer_size.map(|b| b as u64))?
            .set_override_option("log_level", overrides.log_level.clone())?;

        let config = builder.build()?.try_deserialize::<Self>()?;
        config.validate()?;

        for warning in config.check_warnings() {
            warn!("{}", warning);
        }

        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        validate_config(self)
    }

    /// Non-fatal configuration warnings
    pub fn check_warnings(&self) -> Vec<String> {
        check_warnings(self)
    }
}
