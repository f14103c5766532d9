//! Pipeline configuration
//!
//! - [`PipelineConfig`]: session-wide settings with serde defaults
//! - YAML loading/saving that falls back to defaults on any problem
//! - Standard per-user config locations
//!
//! # Usage
//!
//! ```ignore
//! use vox_core::config::{default_config_path, load_config, save_config};
//!
//! let config = load_config(&default_config_path());
//! save_config(&config, &default_config_path())?;
//! ```

mod io;
mod paths;
mod pipeline;

pub use io::{load_config, save_config};
pub use paths::{config_dir, default_config_path, default_preset_dir, CONFIG_FILE_NAME};
pub use pipeline::PipelineConfig;
