//! Loads the YAML config file, falling back to defaults when absent.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use crate::config::Config;

/// Reads and parses the config file. A missing file is not an error: the
/// defaults are returned with a warning so first runs work out of the box.
/// A file that exists but does not parse is a hard error.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    if !path_ref.exists() {
        warn!(config_path = ?path_ref, "Config file not found, using defaults");
        return Ok(Config::default());
    }

    let content = fs::read_to_string(path_ref)
        .with_context(|| format!("reading config file {}", path_ref.display()))?;

    let config: Config = match serde_yaml::from_str(&content) {
        Ok(config) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            config
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            return Err(anyhow::anyhow!(
                "failed to parse config YAML {}: {e}",
                path_ref.display()
            ));
        }
    };

    config.trace_loaded();
    Ok(config)
}

/// Writes the default configuration as YAML, creating parent directories.
/// Used by `init-config`.
pub fn write_default<P: AsRef<Path>>(path: P) -> Result<()> {
    let path_ref = path.as_ref();
    if let Some(parent) = path_ref.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating config directory {}", parent.display()))?;
        }
    }
    let body = serde_yaml::to_string(&Config::default()).context("serializing default config")?;
    fs::write(path_ref, body)
        .with_context(|| format!("writing config file {}", path_ref.display()))?;
    info!(config_path = ?path_ref, "Wrote default configuration file");
    Ok(())
}
