use std::path::Path;

use crate::error::{AppError, AppResult, ConfigError};

use super::types::ConfigFile;

/// Loads and parses the YAML configuration file.
///
/// # Errors
///
/// Returns an error when the file is missing, unreadable or not valid YAML.
pub fn load_config(path: &Path) -> AppResult<ConfigFile> {
    if !path.exists() {
        return Err(AppError::config(ConfigError::FileNotFound {
            path: path.to_path_buf(),
        }));
    }
    let content = std::fs::read_to_string(path).map_err(|err| {
        AppError::config(ConfigError::ReadConfig {
            path: path.to_path_buf(),
            source: err,
        })
    })?;
    serde_yaml::from_str(&content).map_err(|err| {
        AppError::config(ConfigError::ParseYaml {
            path: path.to_path_buf(),
            source: err,
        })
    })
}
