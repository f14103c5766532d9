//! Standard locations for vox configuration files

use std::path::PathBuf;

/// Name of the pipeline configuration file
pub const CONFIG_FILE_NAME: &str = "vox.yaml";

/// Per-user configuration directory
///
/// Returns: `{config_dir}/vox` (e.g. `~/.config/vox` on Linux), or `./vox`
/// when the platform has no config directory.
pub fn config_dir() -> PathBuf {
    dirs::config_dir().unwrap_or_else(|| PathBuf::from(".")).join("vox")
}

/// Default pipeline configuration file
///
/// Returns: `{config_dir}/vox/vox.yaml`
pub fn default_config_path() -> PathBuf {
    config_dir().join(CONFIG_FILE_NAME)
}

/// Default directory for exported preset documents
pub fn default_preset_dir() -> PathBuf {
    config_dir().join("presets")
}
