//! First-run setup.
//!
//! Writes the default configuration file when none exists yet.

use crate::config;
use std::path::Path;

/// Embedded default configuration template.
const DEFAULT_CONFIG: &str = include_str!("../../environments/mictape.toml");

/// Runs the setup process if the main config file is missing.
///
/// # Errors
/// Returns an error if the config directory or file cannot be written.
pub fn run_setup() -> anyhow::Result<()> {
    let config_path = config::config_path()?;
    if write_default_config(&config_path)? {
        tracing::info!("Created default config at {}", config_path.display());
    } else {
        tracing::debug!("Config present at {}", config_path.display());
    }
    Ok(())
}

/// Writes the template to `path` unless a file is already there.
///
/// Returns whether a file was written.
fn write_default_config(path: &Path) -> anyhow::Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, DEFAULT_CONFIG)?;
    Ok(true)
}
