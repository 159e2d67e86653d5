//! Logging setup

/// Initialize the global logger
///
/// `RUST_LOG` takes precedence over `level`. Calling this more than once is harmless;
/// later calls leave the first logger in place.
///
/// # Parameters
///
/// * `level` - Default filter when `RUST_LOG` is unset (error, warn, info, debug, trace)
pub fn init_logger(level: &str) {
    let env = env_logger::Env::default().filter_or("RUST_LOG", level);

    let _ = env_logger::Builder::from_env(env)
        .format_timestamp_millis()
        .try_init();
}
