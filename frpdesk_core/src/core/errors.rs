use std::{io, path::PathBuf};

use thiserror::Error;

use crate::storage::ConfigError;

/// Failures of the process supervisor. An already running process is not an
/// error: `start` simply returns `Ok(false)`.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("tunnel executable not found: {}", .0.display())]
    ExecutableNotFound(PathBuf),
    #[error("tool config not found: {}", .0.display())]
    ConfigNotFound(PathBuf),
    #[error("failed to launch {}: {source}", path.display())]
    Spawn {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Process(#[from] ProcessError),
}
