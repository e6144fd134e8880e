//! Configuration file handling for gws-probe

use anyhow::{Context, Result};
use gws_diag::config::BusConfig;
use gws_diag::ProbeConfig;
use std::path::{Path, PathBuf};

/// Default config file location (`~/.config/gws-probe/config.toml`)
pub fn config_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .context("Could not determine config directory")?
        .join("gws-probe");

    Ok(config_dir.join("config.toml"))
}

/// Load the explicit config file, else the default one if present, else
/// built-in defaults
pub fn load(path: Option<&Path>) -> Result<ProbeConfig> {
    match path {
        Some(path) => load_from(path),
        None => match config_path() {
            Ok(default) if default.exists() => load_from(&default),
            _ => Ok(ProbeConfig::default()),
        },
    }
}

/// Load configuration from a specific path
pub fn load_from(path: &Path) -> Result<ProbeConfig> {
    ProbeConfig::load(path)
        .with_context(|| format!("Failed to load config file: {}", path.display()))
}

/// Apply command-line overrides
pub fn merge_with_args(mut config: ProbeConfig, interface: Option<&str>) -> ProbeConfig {
    if let Some(interface) = interface {
        config.bus = BusConfig::SocketCan {
            interface: interface.to_string(),
        };
    }
    config
}
