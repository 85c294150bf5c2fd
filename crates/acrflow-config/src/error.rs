use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error(
        "Missing setting '{0}'. Set it in acrflow.yaml, ~/.config/acrflow/config.yaml, \
         or the ACRFLOW_{upper} environment variable",
        upper = .0.to_uppercase()
    )]
    Missing(&'static str),

    #[error("Invalid setting '{name}': {reason}")]
    Invalid { name: &'static str, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
