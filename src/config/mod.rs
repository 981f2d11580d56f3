use std::env;
use std::path::{Path, PathBuf};

use crate::error::CatalogError;

/// Catalog file location override.
pub const CATALOG_ENV: &str = "IMETA_CATALOG";

/// Session identity commands run as.
pub const USER_ENV: &str = "IMETA_USER";

/// Log level filter (`trace`, `debug`, `info`, `warn`, `error`).
pub const LOG_ENV: &str = "IMETA_LOG";

/// Resolve the catalog path.
///
/// Resolution order:
/// 1. `--catalog` (clap also reads `IMETA_CATALOG` into it)
/// 2. `~/.imeta/catalog.json`
pub fn resolve_catalog_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit
        && !path.as_os_str().is_empty()
    {
        return path.to_path_buf();
    }
    let mut home = home_dir();
    home.push(".imeta");
    home.push("catalog.json");
    home
}

fn home_dir() -> PathBuf {
    env::var("HOME")
        .or_else(|_| env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

/// The session identity, which must be declared.
pub fn require_identity(explicit: Option<&str>) -> Result<String, CatalogError> {
    match explicit.map(str::trim) {
        Some(user) if !user.is_empty() => Ok(user.to_owned()),
        _ => Err(CatalogError::UnknownUser(format!(
            "<none>; set {USER_ENV} or pass --user"
        ))),
    }
}
