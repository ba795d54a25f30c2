//! Filesystem locations

use std::path::PathBuf;

use bship_core::{Error, Result};
use directories::ProjectDirs;

/// Config file given on the command line, or `config.toml` in the platform
/// config directory
pub fn config_path(arg: Option<String>) -> Result<PathBuf> {
    if let Some(path) = arg {
        return Ok(PathBuf::from(path));
    }

    let dirs = ProjectDirs::from("dev", "bship", "bship").ok_or_else(|| {
        Error::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Could not determine config directory",
        ))
    })?;

    Ok(dirs.config_dir().join("config.toml"))
}
