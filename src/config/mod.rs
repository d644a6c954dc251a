//! Configuration file loading and parsing.
//!
//! This module handles loading the configuration file from disk and
//! parsing it into validated, type-safe structures.
//!
//! # Configuration File Locations
//!
//! The configuration file is searched in the following order:
//!
//! 1. Path specified via `--config` CLI flag
//! 2. Default location:
//!    - **Linux/macOS:** `~/.mcp-server/config.json`
//!    - **Windows:** `%USERPROFILE%\.mcp-server\config.json`
//!
//! Absent a config file, [`Config::default`] is used — the server binds
//! to `127.0.0.1:8765` and sandboxes the filesystem tool to the current
//! directory.

mod settings;

pub use settings::{
    Config, CredentialConfig, LoggingConfig, ResourcesConfig, SecurityConfig, TlsConfig,
    ToolsConfig,
};

use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Returns the default configuration directory.
#[must_use]
pub fn default_config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|p| p.join(".mcp-server"))
}

/// Returns the platform-specific default configuration file path.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    default_config_dir().map(|p| p.join("config.json"))
}

/// Loads and parses the configuration file.
///
/// If `path` is `None` and no file exists at the default location, the
/// built-in [`Config::default`] is returned rather than failing — this
/// server should work with zero configuration for local experimentation.
///
/// # Errors
///
/// Returns an error if a path was given explicitly and it cannot be
/// read or parsed, or if the resulting configuration fails validation.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let config_path = match path {
        Some(p) => p.to_path_buf(),
        None => match default_config_path() {
            Some(p) if p.exists() => p,
            _ => return Ok(Config::default()),
        },
    };

    if !config_path.exists() {
        return Err(ConfigError::NotFound { path: config_path });
    }

    let contents = std::fs::read_to_string(&config_path).map_err(|e| ConfigError::ReadError {
        path: config_path.clone(),
        source: e,
    })?;

    let config: Config = serde_json::from_str(&contents).map_err(|e| ConfigError::ParseError {
        path: config_path.clone(),
        source: e,
    })?;

    config.validate()?;

    Ok(config)
}

/// Expands `~` to the user's home directory in a path string.
///
/// Returns the original path if `~` expansion fails or is not needed.
#[must_use]
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    } else if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}
