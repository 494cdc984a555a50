use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("No configuration file specified. Use -f <path>.")]
    MissingPath,
    #[error("Could not find config file '{path}'.")]
    FileNotFound { path: PathBuf },
    #[error("Failed to read config '{path}': {source}")]
    ReadConfig {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse YAML config '{path}': {source}")]
    ParseYaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("Invalid placeholder pattern: {source}")]
    Pattern {
        #[from]
        source: regex::Error,
    },
    #[error("Request {index} must be a mapping with one of GET/POST/PUT/DELETE/RANDOM/SYNC.")]
    CartridgeMissingMethod { index: usize },
    #[error("Request {index}: children of '{method}' must be a sequence.")]
    CartridgeChildrenNotSequence { index: usize, method: String },
    #[error("Request {index}: '{key}' must be a mapping of name to value.")]
    FeatureMapExpected { index: usize, key: String },
    #[error("Request {index}: timeout must be a non-negative integer (seconds).")]
    InvalidTimeout { index: usize },
    #[error("Request {index}: '{key}' must be a status code or a sequence of status codes.")]
    InvalidStatusCodes { index: usize, key: String },
}
