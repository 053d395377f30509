use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use directories::BaseDirs;
use log::{debug, info};

use super::errors::StartupError;
use super::runner::{CommandRequest, CommandRunner};
use super::AUTO_LAUNCH_NAME;
use crate::utils::launch_flags::{AUTOCONNECT_FLAG, SILENT_FLAG};

const RUN_KEY: &str = r"HKCU\Software\Microsoft\Windows\CurrentVersion\Run";

/// The per-user "launch at login" entry for this application.
#[async_trait]
pub trait AutoLaunchRegistrar: Send + Sync {
    async fn is_enabled(&self) -> Result<bool, StartupError>;
    /// Create or overwrite the entry so it runs `command_line`.
    async fn enable(&self, command_line: &str) -> Result<(), StartupError>;
    /// Remove the entry; succeeds when it is already gone.
    async fn disable(&self) -> Result<(), StartupError>;
}

/// `"<exe>" --silent --autoconnect`
pub fn launch_command(executable: &Path) -> String {
    format!(
        "\"{}\" {SILENT_FLAG} {AUTOCONNECT_FLAG}",
        executable.display()
    )
}

/// The platform's native registrar.
pub fn default_auto_launch(runner: Arc<dyn CommandRunner>) -> Box<dyn AutoLaunchRegistrar> {
    if cfg!(windows) {
        Box::new(WindowsRunKey::new(runner))
    } else {
        Box::new(XdgAutostart::new())
    }
}

/// A value under the current user's `...\CurrentVersion\Run` key, managed
/// through `reg.exe`.
pub struct WindowsRunKey {
    runner: Arc<dyn CommandRunner>,
    value_name: String,
}

impl WindowsRunKey {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            value_name: AUTO_LAUNCH_NAME.to_string(),
        }
    }

    fn reg(&self, args: &[&str]) -> CommandRequest {
        CommandRequest::new("reg", args.iter().copied())
    }
}

#[async_trait]
impl AutoLaunchRegistrar for WindowsRunKey {
    async fn is_enabled(&self) -> Result<bool, StartupError> {
        let request = self.reg(&["query", RUN_KEY, "/v", &self.value_name]);
        let output = self.runner.run(&request).await?;
        Ok(output.success())
    }

    async fn enable(&self, command_line: &str) -> Result<(), StartupError> {
        let request = self.reg(&[
            "add",
            RUN_KEY,
            "/v",
            &self.value_name,
            "/t",
            "REG_SZ",
            "/d",
            command_line,
            "/f",
        ]);
        let output = self.runner.run(&request).await?;
        if !output.success() {
            return Err(StartupError::AutoLaunch(output.combined()));
        }
        info!("Autostart entry '{}' set to {}", self.value_name, command_line);
        Ok(())
    }

    async fn disable(&self) -> Result<(), StartupError> {
        if !self.is_enabled().await? {
            return Ok(());
        }
        let request = self.reg(&["delete", RUN_KEY, "/v", &self.value_name, "/f"]);
        let output = self.runner.run(&request).await?;
        if !output.success() {
            return Err(StartupError::AutoLaunch(output.combined()));
        }
        info!("Autostart entry '{}' removed", self.value_name);
        Ok(())
    }
}

/// A `.desktop` file in the XDG autostart directory.
#[derive(Debug, Clone)]
pub struct XdgAutostart {
    entry: PathBuf,
}

impl Default for XdgAutostart {
    fn default() -> Self {
        Self::new()
    }
}

impl XdgAutostart {
    /// `~/.config/autostart/frpdesk.desktop`
    pub fn new() -> Self {
        let config = BaseDirs::new()
            .map(|dirs| dirs.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from(".config"));
        Self::at(config.join("autostart").join(format!("{AUTO_LAUNCH_NAME}.desktop")))
    }

    pub fn at(entry: impl Into<PathBuf>) -> Self {
        Self {
            entry: entry.into(),
        }
    }

    pub fn entry_path(&self) -> &Path {
        &self.entry
    }
}

#[async_trait]
impl AutoLaunchRegistrar for XdgAutostart {
    async fn is_enabled(&self) -> Result<bool, StartupError> {
        match fs::read_to_string(&self.entry) {
            Ok(contents) => Ok(!contents
                .lines()
                .any(|l| l.trim().eq_ignore_ascii_case("Hidden=true"))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn enable(&self, command_line: &str) -> Result<(), StartupError> {
        if let Some(dir) = self.entry.parent() {
            fs::create_dir_all(dir)?;
        }
        let contents = format!(
            "[Desktop Entry]\n\
             Type=Application\n\
             Name=frpdesk\n\
             Comment=Keep the frpc tunnel connected\n\
             Exec={command_line}\n\
             Terminal=false\n\
             X-GNOME-Autostart-enabled=true\n"
        );
        fs::write(&self.entry, contents)?;
        info!("Autostart entry written to {:?}", self.entry);
        Ok(())
    }

    async fn disable(&self) -> Result<(), StartupError> {
        match fs::remove_file(&self.entry) {
            Ok(()) => {
                info!("Autostart entry {:?} removed", self.entry);
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("Autostart entry {:?} already absent", self.entry);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn launch_command_quotes_the_executable() {
        assert_eq!(
            launch_command(Path::new("/opt/frp desk/frpdesk")),
            "\"/opt/frp desk/frpdesk\" --silent --autoconnect"
        );
    }

    #[tokio::test]
    async fn xdg_entry_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let registrar = XdgAutostart::at(dir.path().join("autostart").join("frpdesk.desktop"));

        assert!(!registrar.is_enabled().await.unwrap());
        registrar.disable().await.unwrap();

        registrar.enable("\"/usr/bin/frpdesk\" --silent --autoconnect").await.unwrap();
        assert!(registrar.is_enabled().await.unwrap());
        let contents = fs::read_to_string(registrar.entry_path()).unwrap();
        assert!(contents.contains("Exec=\"/usr/bin/frpdesk\" --silent --autoconnect\n"));

        registrar.disable().await.unwrap();
        assert!(!registrar.is_enabled().await.unwrap());
    }

    #[tokio::test]
    async fn hidden_entries_count_as_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frpdesk.desktop");
        fs::write(&path, "[Desktop Entry]\nExec=frpdesk\nHidden=true\n").unwrap();
        assert!(!XdgAutostart::at(path).is_enabled().await.unwrap());
    }
}
