//! YAML configuration I/O
//!
//! Loading never fails: a missing, unreadable, malformed or invalid file
//! falls back to the defaults and logs why. Saving reports errors with
//! context so the caller can surface them.

use std::path::Path;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::PipelineConfig;

/// Read and parse a YAML file
fn read_yaml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read config file: {:?}", path))?;
    serde_yaml::from_str(&contents).with_context(|| format!("Failed to parse config file: {:?}", path))
}

/// Load the pipeline configuration from a YAML file
///
/// Returns the defaults when the file does not exist, cannot be parsed, or
/// describes an unsupported frame format.
///
/// ```ignore
/// let config = load_config(&default_config_path());
/// let pipeline = Pipeline::new(config)?;
/// ```
pub fn load_config(path: &Path) -> PipelineConfig {
    log::info!("load_config: Loading from {:?}", path);

    if !path.exists() {
        log::info!("load_config: Config file doesn't exist, using defaults");
        return PipelineConfig::default();
    }

    let config = match read_yaml::<PipelineConfig>(path) {
        Ok(config) => config,
        Err(e) => {
            log::error!("load_config: {:#}, using defaults", e);
            return PipelineConfig::default();
        }
    };

    match config.validate() {
        Ok(config) => {
            log::info!("load_config: Loaded {:?}", config.format().ok());
            config
        }
        Err(e) => {
            log::error!("load_config: Invalid pipeline config: {}, using defaults", e);
            PipelineConfig::default()
        }
    }
}

/// Save any serializable configuration as YAML
///
/// Creates parent directories if they don't exist.
pub fn save_config<T: Serialize>(config: &T, path: &Path) -> Result<()> {
    log::info!("save_config: Saving to {:?}", path);

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
    }

    let yaml = serde_yaml::to_string(config).context("Failed to serialize config to YAML")?;
    std::fs::write(path, yaml).with_context(|| format!("Failed to write config file: {:?}", path))?;

    log::info!("save_config: Config saved successfully");
    Ok(())
}
