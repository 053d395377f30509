use std::{io, path::PathBuf};

use thiserror::Error;

/// Failures of autostart / service transitions. None of them is fatal; the
/// controller leaves the previous mode in place when it returns one.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("service tool '{tool}' not found. {hint}")]
    ServiceToolMissing {
        tool: String,
        searched: Vec<PathBuf>,
        hint: String,
    },
    #[error("administrator permission was not granted for `{command}` (exit status {status:?})")]
    PermissionDenied { command: String, status: Option<i32> },
    #[error("`{command}` failed with exit status {status:?}: {output}")]
    InstallerFailed {
        command: String,
        status: Option<i32>,
        output: String,
    },
    #[error("tunnel executable not found: {}", .0.display())]
    ExecutableNotFound(PathBuf),
    #[error("tool config not found: {}", .0.display())]
    ConfigNotFound(PathBuf),
    #[error("autostart entry could not be updated: {0}")]
    AutoLaunch(String),
    #[error("could not determine this application's path: {0}")]
    SelfPathUnavailable(#[source] io::Error),
    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}
