pub mod auto_launch;
pub mod confirm;
pub mod controller;
pub mod errors;
pub mod runner;
pub mod service;

pub use auto_launch::{default_auto_launch, AutoLaunchRegistrar, WindowsRunKey, XdgAutostart};
pub use confirm::{Confirm, FixedAnswer};
pub use controller::{ModeChange, StartupMode, StartupModeController};
pub use errors::StartupError;
pub use runner::{CommandOutput, CommandRequest, CommandRunner, SystemCommandRunner};
pub use service::{NssmService, ServiceRegistrar, ServiceTarget, ServiceToolLocator};

/// Name of the per-user autostart entry.
pub const AUTO_LAUNCH_NAME: &str = "frpdesk";
/// Name of the background service.
pub const SERVICE_NAME: &str = "FrpDeskService";
