//! Filesystem locations for config

use std::path::PathBuf;

use crate::constants;

/// Root config directory (`~/.lectio`)
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(constants::app::CONFIG_DIR_NAME))
        .unwrap_or_else(|| PathBuf::from(constants::app::CONFIG_DIR_NAME))
}

/// Path to the backend config file
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}
