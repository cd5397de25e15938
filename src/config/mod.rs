//! Configuration module
//!
//! Handles capture settings loaded from TOML

mod settings;

pub use settings::{CaptureConfig, ConfigError};

use directories::ProjectDirs;
use std::path::PathBuf;

/// Get the application configuration directory
pub fn config_dir() -> Option<PathBuf> {
    ProjectDirs::from("com", "uartcap", "Uartcap").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Default configuration file path
pub fn default_config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.toml"))
}
