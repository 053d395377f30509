use std::{fs, io, path::Path, path::PathBuf};

use directories::ProjectDirs;

use super::errors::ConfigError;

pub const APP_NAME: &str = "frpdesk";

/// Every directory the application writes to, derived from one root.
#[derive(Debug, Clone)]
pub struct AppPaths {
    root: PathBuf,
}

impl AppPaths {
    /// `~/.config/frpdesk` on Linux, `%APPDATA%\frpdesk\config` on Windows, etc.
    pub fn new() -> Result<Self, ConfigError> {
        let proj = ProjectDirs::from("", "", APP_NAME).ok_or(ConfigError::NoConfigDir)?;
        Ok(Self::from_root(proj.config_dir()))
    }

    pub fn from_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Persisted `<name>.json` profiles.
    pub fn profiles_dir(&self) -> PathBuf {
        self.root.join("profiles")
    }

    /// Throw-away tool configs written before each interactive start.
    pub fn scratch_dir(&self) -> PathBuf {
        self.root.join("tmp")
    }

    /// Tool configs referenced by the registered background service.
    pub fn service_configs_dir(&self) -> PathBuf {
        self.root.join("service-configs")
    }

    /// Managed copy of the tunnel tool.
    pub fn binaries_dir(&self) -> PathBuf {
        self.root.join("bin")
    }

    pub fn tools_dir(&self) -> PathBuf {
        self.root.join("tools")
    }

    pub fn ensure_dirs(&self) -> io::Result<()> {
        for dir in [
            self.profiles_dir(),
            self.scratch_dir(),
            self.service_configs_dir(),
            self.binaries_dir(),
        ] {
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}
