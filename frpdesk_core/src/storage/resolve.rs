use std::env::consts::EXE_SUFFIX;
use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};

use super::paths::AppPaths;

/// Base name of the tunnel client executable.
pub const TOOL_NAME: &str = "frpc";

pub fn tool_file_name() -> String {
    format!("{TOOL_NAME}{EXE_SUFFIX}")
}

/// Supplies a path to the tunnel tool when a profile has none, or a stale one.
pub trait ToolResolver: Send + Sync {
    fn resolve(&self) -> PathBuf;
}

/// Resolver that prefers the managed copy under the data directory.
///
/// Lookup order:
/// 1. `<data>/bin/frpc`
/// 2. a copy shipped next to the running executable, copied into `<data>/bin`
/// 3. `frpc` on `PATH`
///
/// When nothing is found the managed path is returned anyway, so the caller
/// gets a concrete `ExecutableNotFound` at start time.
#[derive(Debug, Clone)]
pub struct BundledToolResolver {
    managed: PathBuf,
    bundled_dirs: Vec<PathBuf>,
    search_path: bool,
}

impl BundledToolResolver {
    pub fn new(paths: &AppPaths) -> Self {
        let bundled_dirs = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
            .into_iter()
            .collect();
        Self {
            managed: paths.binaries_dir().join(tool_file_name()),
            bundled_dirs,
            search_path: true,
        }
    }

    /// Replace the directories searched for a shipped copy.
    pub fn with_bundled_dirs(mut self, dirs: Vec<PathBuf>) -> Self {
        self.bundled_dirs = dirs;
        self
    }

    pub fn without_path_search(mut self) -> Self {
        self.search_path = false;
        self
    }

    pub fn managed_path(&self) -> &Path {
        &self.managed
    }

    fn install_bundled(&self, bundled: &Path) -> PathBuf {
        let copied = self
            .managed
            .parent()
            .map_or(Ok(()), fs::create_dir_all)
            .and_then(|_| fs::copy(bundled, &self.managed));
        match copied {
            Ok(_) => {
                info!("Copied bundled {} to {:?}", TOOL_NAME, self.managed);
                self.managed.clone()
            }
            Err(e) => {
                warn!("Could not copy {:?} to {:?}: {e}", bundled, self.managed);
                bundled.to_path_buf()
            }
        }
    }
}

impl ToolResolver for BundledToolResolver {
    fn resolve(&self) -> PathBuf {
        if self.managed.is_file() {
            return self.managed.clone();
        }

        let file_name = tool_file_name();
        if let Some(bundled) = self
            .bundled_dirs
            .iter()
            .map(|dir| dir.join(&file_name))
            .find(|candidate| candidate.is_file())
        {
            return self.install_bundled(&bundled);
        }

        if self.search_path {
            if let Ok(found) = which::which(TOOL_NAME) {
                info!("Using {} from PATH: {:?}", TOOL_NAME, found);
                return found;
            }
        }

        warn!(
            "No {} executable found; expected it at {:?}",
            TOOL_NAME, self.managed
        );
        self.managed.clone()
    }
}
