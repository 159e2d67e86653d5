//! File system helpers

use std::fs;
use std::path::Path;

use super::error::{ProxyError, Result};

/// Check that `path` exists and is a regular file
///
/// `what` names the file in the error message (e.g. "root certificate").
pub fn check_file_exists(path: &Path, what: &str) -> Result<()> {
    if !path.exists() {
        return Err(ProxyError::Config(format!(
            "{} not found: {}",
            what,
            path.display()
        )));
    }

    if !path.is_file() {
        return Err(ProxyError::Config(format!(
            "{} is not a file: {}",
            what,
            path.display()
        )));
    }

    Ok(())
}

/// Read a whole file into memory
pub fn read_file(path: &Path) -> std::io::Result<Vec<u8>> {
    fs::read(path)
}
