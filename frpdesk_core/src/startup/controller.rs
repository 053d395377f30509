use std::path::PathBuf;

use log::{debug, error, info, warn};

use super::auto_launch::{launch_command, AutoLaunchRegistrar};
use super::confirm::Confirm;
use super::errors::StartupError;
use super::service::{ServiceRegistrar, ServiceTarget};

const REPLACE_SERVICE_PROMPT: &str =
    "The background service is registered. Remove the service and enable autostart instead?";
const REPLACE_AUTO_START_PROMPT: &str =
    "Autostart is enabled. Disable autostart and register the background service instead?";

/// Which of the two "survive a reboot" mechanisms is currently in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupMode {
    None,
    AutoStart,
    ServiceRegistered,
    /// Both are present. Only ever caused by changes made outside frpdesk.
    Conflicting,
}

/// Outcome of a mode switch that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeChange {
    Enabled,
    /// The user said no; nothing was changed.
    Declined,
}

/// Switches between per-user autostart and the background service, never
/// leaving both in place and never leaving a half-finished switch behind.
///
/// State is re-read from the registrars on every call.
pub struct StartupModeController {
    auto_launch: Box<dyn AutoLaunchRegistrar>,
    service: Box<dyn ServiceRegistrar>,
    confirm: Box<dyn Confirm>,
    executable: Option<PathBuf>,
}

impl StartupModeController {
    pub fn new(
        auto_launch: Box<dyn AutoLaunchRegistrar>,
        service: Box<dyn ServiceRegistrar>,
        confirm: Box<dyn Confirm>,
    ) -> Self {
        Self {
            auto_launch,
            service,
            confirm,
            executable: None,
        }
    }

    /// Point the autostart entry at `path` instead of the running executable.
    pub fn with_executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.executable = Some(path.into());
        self
    }

    fn launch_command(&self) -> Result<String, StartupError> {
        let exe = match &self.executable {
            Some(path) => path.clone(),
            None => std::env::current_exe().map_err(StartupError::SelfPathUnavailable)?,
        };
        Ok(launch_command(&exe))
    }

    pub async fn is_auto_start_enabled(&self) -> bool {
        self.auto_launch.is_enabled().await.unwrap_or_else(|e| {
            warn!("Could not read the autostart entry: {e}");
            false
        })
    }

    pub async fn is_service_registered(&self) -> bool {
        self.service.is_registered().await.unwrap_or_else(|e| {
            warn!("Could not query the background service: {e}");
            false
        })
    }

    pub async fn current_mode(&self) -> StartupMode {
        match (
            self.is_auto_start_enabled().await,
            self.is_service_registered().await,
        ) {
            (false, false) => StartupMode::None,
            (true, false) => StartupMode::AutoStart,
            (false, true) => StartupMode::ServiceRegistered,
            (true, true) => {
                warn!("Both autostart and the background service are active");
                StartupMode::Conflicting
            }
        }
    }

    /// Launch frpdesk with `--silent --autoconnect` at login.
    ///
    /// A registered service has to go first; that needs confirmation. The
    /// entry is written before the service is removed, and removed again if
    /// the service cannot be. If either state cannot be read, nothing is
    /// changed and the query error is returned.
    pub async fn enable_auto_start(&self) -> Result<ModeChange, StartupError> {
        let command_line = self.launch_command()?;
        let service_registered = self.service.is_registered().await?;
        let was_enabled = self.auto_launch.is_enabled().await?;

        if !service_registered {
            self.auto_launch.enable(&command_line).await?;
            info!("Autostart enabled");
            return Ok(ModeChange::Enabled);
        }

        if !self.confirm.confirm(REPLACE_SERVICE_PROMPT) {
            info!("Switch to autostart declined");
            return Ok(ModeChange::Declined);
        }

        self.auto_launch.enable(&command_line).await?;
        if let Err(e) = self.service.unregister().await {
            if !was_enabled {
                if let Err(undo) = self.auto_launch.disable().await {
                    error!("Could not remove the autostart entry again: {undo}");
                }
            }
            return Err(e);
        }
        info!("Background service removed, autostart enabled");
        Ok(ModeChange::Enabled)
    }

    /// Register the background service for `target`.
    ///
    /// The tool, the config and the installer are checked before anything
    /// changes. If autostart is on it is switched off after confirmation,
    /// and switched back on when the registration fails. An autostart entry
    /// that cannot be read stops the switch before anything changes.
    pub async fn enable_service(&self, target: &ServiceTarget) -> Result<ModeChange, StartupError> {
        self.service.preflight(target).await?;

        if !self.auto_launch.is_enabled().await? {
            self.service.register(target).await?;
            info!("Background service registered");
            return Ok(ModeChange::Enabled);
        }

        let restore = self.launch_command()?;
        if !self.confirm.confirm(REPLACE_AUTO_START_PROMPT) {
            info!("Switch to the background service declined");
            return Ok(ModeChange::Declined);
        }

        self.auto_launch.disable().await?;
        if let Err(e) = self.service.register(target).await {
            if let Err(undo) = self.auto_launch.enable(&restore).await {
                error!("Could not restore the autostart entry: {undo}");
            }
            return Err(e);
        }
        info!("Autostart disabled, background service registered");
        Ok(ModeChange::Enabled)
    }

    pub async fn disable_auto_start(&self) -> Result<(), StartupError> {
        match self.auto_launch.is_enabled().await {
            Ok(false) => {
                debug!("Autostart already disabled");
                return Ok(());
            }
            Ok(true) => {}
            Err(e) => warn!("Could not read the autostart entry, removing anyway: {e}"),
        }
        self.auto_launch.disable().await?;
        info!("Autostart disabled");
        Ok(())
    }

    pub async fn unregister_service(&self) -> Result<(), StartupError> {
        match self.service.is_registered().await {
            Ok(false) => {
                debug!("Background service not registered");
                return Ok(());
            }
            Ok(true) => {}
            Err(e) => warn!("Could not query the background service, removing anyway: {e}"),
        }
        self.service.unregister().await?;
        info!("Background service unregistered");
        Ok(())
    }
}
