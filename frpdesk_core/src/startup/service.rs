use std::env::consts::EXE_SUFFIX;
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, info, warn};

use super::errors::StartupError;
use super::runner::{CommandOutput, CommandRequest, CommandRunner};
use super::SERVICE_NAME;
use crate::storage::AppPaths;

const NSSM_DOWNLOAD: &str = "https://nssm.cc/download";
/// `sc query` exit status for ERROR_SERVICE_DOES_NOT_EXIST.
const SERVICE_DOES_NOT_EXIST: i32 = 1060;

/// What the background service runs: `tool_path -c "config_path"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceTarget {
    pub tool_path: PathBuf,
    pub config_path: PathBuf,
}

impl ServiceTarget {
    pub fn new(tool_path: impl Into<PathBuf>, config_path: impl Into<PathBuf>) -> Self {
        Self {
            tool_path: tool_path.into(),
            config_path: config_path.into(),
        }
    }
}

/// The OS-level background service that keeps the tunnel running.
#[async_trait]
pub trait ServiceRegistrar: Send + Sync {
    /// Everything `register` needs, checked without changing anything.
    async fn preflight(&self, target: &ServiceTarget) -> Result<(), StartupError>;
    async fn is_registered(&self) -> Result<bool, StartupError>;
    async fn register(&self, target: &ServiceTarget) -> Result<(), StartupError>;
    async fn unregister(&self) -> Result<(), StartupError>;
}

/// Finds the service installer (`nssm`) in the usual places.
///
/// Search order: the application directory, its `tools/` sub-directory,
/// `<data>/tools`, `<data>/bin`, then every `PATH` entry.
#[derive(Debug, Clone)]
pub struct ServiceToolLocator {
    file_name: String,
    candidates: Vec<PathBuf>,
    path_var: Option<OsString>,
}

impl ServiceToolLocator {
    pub fn new(paths: &AppPaths) -> Self {
        let mut candidates = Vec::new();
        if let Some(app_dir) = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
        {
            candidates.push(app_dir.join("tools"));
            candidates.insert(0, app_dir);
        }
        candidates.push(paths.tools_dir());
        candidates.push(paths.binaries_dir());
        Self {
            file_name: format!("nssm{EXE_SUFFIX}"),
            candidates,
            path_var: std::env::var_os("PATH"),
        }
    }

    pub fn with_candidates(mut self, dirs: Vec<PathBuf>) -> Self {
        self.candidates = dirs;
        self
    }

    /// Search this list instead of the process `PATH`.
    pub fn with_path_var(mut self, path_var: Option<OsString>) -> Self {
        self.path_var = path_var;
        self
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Every location `locate` looks at, in order.
    pub fn searched(&self) -> Vec<PathBuf> {
        let fixed = self.candidates.iter().map(|dir| dir.join(&self.file_name));
        let on_path = self
            .path_var
            .iter()
            .flat_map(std::env::split_paths)
            .map(|dir| dir.join(&self.file_name));
        fixed.chain(on_path).collect()
    }

    pub fn locate(&self) -> Result<PathBuf, StartupError> {
        if let Some(found) = self
            .candidates
            .iter()
            .map(|dir| dir.join(&self.file_name))
            .find(|candidate| candidate.is_file())
        {
            debug!("Service tool found at {:?}", found);
            return Ok(found);
        }
        if let Some(path_var) = &self.path_var {
            if let Ok(found) = which::which_in(&self.file_name, Some(path_var), ".") {
                debug!("Service tool found on PATH at {:?}", found);
                return Ok(found);
            }
        }
        Err(StartupError::ServiceToolMissing {
            tool: self.file_name.clone(),
            searched: self.searched(),
            hint: self.hint(),
        })
    }

    fn hint(&self) -> String {
        match self.candidates.first() {
            Some(dir) => format!(
                "Download NSSM from {NSSM_DOWNLOAD} and copy {} into {}, or add its directory to PATH.",
                self.file_name,
                dir.display()
            ),
            None => format!(
                "Download NSSM from {NSSM_DOWNLOAD} and add the directory containing {} to PATH.",
                self.file_name
            ),
        }
    }
}

/// Registers the tunnel tool as a Windows service through NSSM.
///
/// Every mutating command runs elevated. Registration state is read with
/// `sc query`, so a service removed by hand is noticed on the next query.
pub struct NssmService {
    runner: Arc<dyn CommandRunner>,
    locator: ServiceToolLocator,
    service_name: String,
    description: String,
}

impl NssmService {
    pub fn new(runner: Arc<dyn CommandRunner>, locator: ServiceToolLocator) -> Self {
        Self {
            runner,
            locator,
            service_name: SERVICE_NAME.to_string(),
            description: "frpc tunnel managed by frpdesk".to_string(),
        }
    }

    pub fn with_service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = name.into();
        self
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    async fn elevated(&self, program: &Path, args: &[&str]) -> Result<CommandOutput, StartupError> {
        let request = CommandRequest::new(program, args.iter().copied()).elevated();
        self.runner.run(&request).await?.check(&request)
    }

    async fn configure(&self, nssm: &Path, target: &ServiceTarget) -> Result<(), StartupError> {
        let svc = self.service_name.as_str();
        let parameters = format!("-c \"{}\"", target.config_path.display());
        self.elevated(nssm, &["set", svc, "AppParameters", &parameters])
            .await?;
        if let Some(dir) = target.tool_path.parent() {
            let dir = dir.to_string_lossy();
            self.elevated(nssm, &["set", svc, "AppDirectory", &dir])
                .await?;
        }
        self.elevated(nssm, &["set", svc, "Description", &self.description])
            .await?;
        self.elevated(nssm, &["set", svc, "Start", "SERVICE_AUTO_START"])
            .await?;
        self.elevated(nssm, &["start", svc]).await?;
        Ok(())
    }
}

#[async_trait]
impl ServiceRegistrar for NssmService {
    async fn preflight(&self, target: &ServiceTarget) -> Result<(), StartupError> {
        if !target.tool_path.is_file() {
            return Err(StartupError::ExecutableNotFound(target.tool_path.clone()));
        }
        if !target.config_path.is_file() {
            return Err(StartupError::ConfigNotFound(target.config_path.clone()));
        }
        self.locator.locate().map(|_| ())
    }

    async fn is_registered(&self) -> Result<bool, StartupError> {
        let request = CommandRequest::new("sc", ["query", self.service_name.as_str()]);
        let output = match self.runner.run(&request).await {
            Ok(output) => output,
            // No service manager on this system, so nothing can be registered.
            Err(StartupError::Spawn { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
                debug!("sc is not available: {source}");
                return Ok(false);
            }
            Err(e) => return Err(e),
        };
        if output.success() {
            return Ok(true);
        }
        if output.status == Some(SERVICE_DOES_NOT_EXIST)
            || output.combined().contains("does not exist")
        {
            return Ok(false);
        }
        output.check(&request).map(|_| false)
    }

    async fn register(&self, target: &ServiceTarget) -> Result<(), StartupError> {
        self.preflight(target).await?;
        let nssm = self.locator.locate()?;
        let svc = self.service_name.as_str();
        let tool = target.tool_path.to_string_lossy();

        let existed = self.is_registered().await.unwrap_or_else(|e| {
            warn!("Could not query service '{}', installing it fresh: {e}", svc);
            false
        });
        if existed {
            // Re-point the existing service instead of installing a second one.
            if let Err(e) = self.elevated(&nssm, &["stop", svc]).await {
                debug!("Stopping '{}' before reconfiguring failed: {e}", svc);
            }
            self.elevated(&nssm, &["set", svc, "Application", &tool])
                .await?;
        } else {
            self.elevated(&nssm, &["install", svc, &tool]).await?;
        }

        if let Err(e) = self.configure(&nssm, target).await {
            if !existed {
                warn!("Configuring '{}' failed, removing it again", svc);
                if let Err(undo) = self.elevated(&nssm, &["remove", svc, "confirm"]).await {
                    warn!("Could not remove half-installed service '{}': {undo}", svc);
                }
            }
            return Err(e);
        }
        info!(
            "Service '{}' registered for {:?} -c {:?}",
            svc, target.tool_path, target.config_path
        );
        Ok(())
    }

    async fn unregister(&self) -> Result<(), StartupError> {
        let svc = self.service_name.as_str();
        match self.locator.locate() {
            Ok(nssm) => {
                self.elevated(&nssm, &["remove", svc, "confirm"]).await?;
            }
            Err(e) => {
                warn!("{e}; falling back to sc.exe");
                let sc = Path::new("sc");
                if let Err(e) = self.elevated(sc, &["stop", svc]).await {
                    debug!("sc stop {} failed: {e}", svc);
                }
                self.elevated(sc, &["delete", svc]).await?;
            }
        }
        info!("Service '{}' removed", svc);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn fixed_candidates_win_over_path() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        let locator = ServiceToolLocator::new(&AppPaths::from_root(first.path()))
            .with_candidates(vec![first.path().to_path_buf(), second.path().to_path_buf()])
            .with_path_var(None);
        let name = locator.file_name().to_string();
        fs::write(second.path().join(&name), b"").unwrap();

        assert_eq!(locator.locate().unwrap(), second.path().join(&name));

        fs::write(first.path().join(&name), b"").unwrap();
        assert_eq!(locator.locate().unwrap(), first.path().join(&name));
    }

    #[test]
    fn missing_tool_lists_every_location() {
        let app = tempfile::tempdir().unwrap();
        let on_path = tempfile::tempdir().unwrap();
        let locator = ServiceToolLocator::new(&AppPaths::from_root(app.path()))
            .with_candidates(vec![app.path().to_path_buf()])
            .with_path_var(Some(on_path.path().as_os_str().to_os_string()));

        match locator.locate() {
            Err(StartupError::ServiceToolMissing {
                tool,
                searched,
                hint,
            }) => {
                assert_eq!(tool, locator.file_name());
                assert_eq!(
                    searched,
                    vec![app.path().join(&tool), on_path.path().join(&tool)]
                );
                assert!(hint.contains(NSSM_DOWNLOAD));
                assert!(hint.contains(&app.path().display().to_string()));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
