use std::io;

use thiserror::Error;

/// Errors raised while reading, writing or validating profiles.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("profile '{0}' not found")]
    NotFound(String),
    #[error("malformed profile: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("'{0}' cannot be used as a profile name")]
    InvalidName(String),
    #[error("invalid profile: {0}")]
    Invalid(String),
    #[error("unable to locate a config directory")]
    NoConfigDir,
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}
