use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{CommandFactory, Parser, Subcommand};
use frpdesk_core::core::session::AUTOCONNECT_DELAY;
use frpdesk_core::startup::{
    default_auto_launch, CommandRunner, Confirm, FixedAnswer, NssmService, ServiceTarget,
    ServiceToolLocator, StartupError, SystemCommandRunner,
};
use frpdesk_core::storage::{encode, render, BundledToolResolver, ConfigError};
use frpdesk_core::utils::launch_flags::LaunchFlags;
use frpdesk_core::{
    AppPaths, ModeChange, ProcessEvent, Profile, ProfileStore, ProxyKind, SessionError,
    StartupMode, StartupModeController, TunnelSession,
};
use log::{info, warn};
use thiserror::Error;
use tokio::sync::broadcast::{error::RecvError, Receiver};

use super::confirm::StdinConfirm;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Startup(#[from] StartupError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("profile '{profile}' has no proxy named '{proxy}'")]
    NoSuchProxy { profile: String, proxy: String },
    #[error("frpc exited with status {0:?}")]
    ToolExited(Option<i32>),
}

/// Command-line arguments.
///
/// `--silent` and `--autoconnect` (also `-silent`, `/autoconnect`, any case)
/// are taken out before parsing, see `LaunchFlags`.
#[derive(Parser, Debug)]
#[command(name = "frpdesk", version, about = "Keep an frpc tunnel running")]
pub struct Args {
    /// Directory for profiles, generated configs and the managed frpc
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,
    /// Answer every confirmation with yes
    #[arg(long, short = 'y', global = true)]
    pub yes: bool,
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List stored profiles
    List,
    /// Print a stored profile
    Show { name: String },
    /// Print the frpc configuration generated for a profile
    Render { name: String },
    /// Create a profile, or update the given fields of an existing one
    Create {
        name: String,
        /// frps address
        #[arg(long)]
        server: Option<String>,
        /// frps port
        #[arg(long)]
        port: Option<u16>,
        #[arg(long)]
        token: Option<String>,
        /// `--tls true` or `--tls false`
        #[arg(long)]
        tls: Option<bool>,
        /// Path of the frpc executable
        #[arg(long)]
        tool_path: Option<String>,
    },
    /// Append a proxy rule to a profile
    AddProxy {
        profile: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long, default_value_t = ProxyKind::Tcp)]
        kind: ProxyKind,
        #[arg(long)]
        local_ip: Option<String>,
        #[arg(long)]
        local_port: Option<u16>,
        #[arg(long)]
        remote_port: Option<u16>,
        /// Comma separated, for http / https rules
        #[arg(long)]
        domains: Option<String>,
    },
    /// Remove a proxy rule from a profile
    RemoveProxy { profile: String, proxy: String },
    /// Delete a profile
    Delete { name: String },
    /// Run frpc for a profile (default: the first one) until Ctrl-C
    Run { name: Option<String> },
    /// Launch frpdesk at login
    Autostart {
        #[command(subcommand)]
        action: AutostartAction,
    },
    /// Run frpc as a background service
    Service {
        #[command(subcommand)]
        action: ServiceAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum AutostartAction {
    Status,
    Enable,
    Disable,
}

#[derive(Subcommand, Debug)]
pub enum ServiceAction {
    Status,
    /// Register the service for the given profile
    Enable { name: String },
    Disable,
}

pub async fn run_cli(args: Args, flags: LaunchFlags) -> Result<(), CliError> {
    let store = open_store(args.data_dir.as_deref())?;
    let confirm: Box<dyn Confirm> = if args.yes {
        Box::new(FixedAnswer(true))
    } else {
        Box::new(StdinConfirm)
    };

    let Some(command) = args.command else {
        if flags.autoconnect {
            return autoconnect(store, flags.silent).await;
        }
        Args::command().print_help()?;
        return Ok(());
    };

    match command {
        Command::List => {
            for name in store.list_sorted()? {
                println!("{name}");
            }
        }
        Command::Show { name } => {
            let profile = store.load(&name)?;
            println!("{}", String::from_utf8_lossy(&encode(&profile)?));
        }
        Command::Render { name } => {
            print!("{}", render(&store.load(&name)?));
        }
        Command::Create {
            name,
            server,
            port,
            token,
            tls,
            tool_path,
        } => {
            let mut profile = match store.load(&name) {
                Ok(profile) => profile,
                Err(ConfigError::NotFound(_)) => Profile::new(name),
                Err(e) => return Err(e.into()),
            };
            if let Some(server) = server {
                profile.server_address = server;
            }
            if let Some(port) = port {
                profile.server_port = port;
            }
            if let Some(token) = token {
                profile.token = Some(token).filter(|t| !t.is_empty());
            }
            if let Some(tls) = tls {
                profile.tls_enabled = tls;
            }
            if let Some(tool_path) = tool_path {
                profile.tool_path = tool_path;
            }
            store.save(&mut profile)?;
            println!("Saved profile '{}'", profile.name);
        }
        Command::AddProxy {
            profile: profile_name,
            name,
            kind,
            local_ip,
            local_port,
            remote_port,
            domains,
        } => {
            let mut profile = store.load(&profile_name)?;
            let rule = profile.add_proxy();
            rule.kind = kind;
            if let Some(name) = name {
                rule.name = name;
            }
            if let Some(local_ip) = local_ip {
                rule.local_address = local_ip;
            }
            if let Some(port) = local_port {
                rule.local_port = port;
            }
            if let Some(port) = remote_port {
                rule.remote_port = port;
            }
            if let Some(domains) = domains {
                rule.custom_domains = domains;
            }
            let added = rule.name.clone();
            store.save(&mut profile)?;
            println!("Added proxy '{added}' to '{profile_name}'");
        }
        Command::RemoveProxy { profile, proxy } => {
            let mut stored = store.load(&profile)?;
            if !stored.remove_proxy(&proxy) {
                return Err(CliError::NoSuchProxy { profile, proxy });
            }
            store.save(&mut stored)?;
            println!("Removed proxy '{proxy}' from '{profile}'");
        }
        Command::Delete { name } => {
            if !confirm.confirm(&format!("Delete profile '{name}'?")) {
                println!("Kept profile '{name}'");
                return Ok(());
            }
            if store.delete(&name)? {
                println!("Deleted profile '{name}'");
            } else {
                println!("No profile named '{name}'");
            }
            println!("Selected profile: {}", store.first_or_default()?.name);
        }
        Command::Run { name } => {
            let mut profile = match name {
                Some(name) => store.load(&name)?,
                None => store.first_or_default()?,
            };
            let session = TunnelSession::new(store);
            let events = session.subscribe();
            if !session.start_profile(&mut profile).await? {
                warn!("frpc is already running");
                return Ok(());
            }
            if !flags.silent {
                banner(&profile);
            }
            stream_until_interrupted(&session, events).await?;
        }
        Command::Autostart { action } => {
            let controller = startup_controller(&store, confirm);
            match action {
                AutostartAction::Status => print_mode(controller.current_mode().await),
                AutostartAction::Enable => report(controller.enable_auto_start().await?),
                AutostartAction::Disable => {
                    controller.disable_auto_start().await?;
                    println!("Autostart disabled");
                }
            }
        }
        Command::Service { action } => {
            let controller = startup_controller(&store, confirm);
            match action {
                ServiceAction::Status => print_mode(controller.current_mode().await),
                ServiceAction::Enable { name } => {
                    let profile = store.load(&name)?;
                    let config = store.write_service_config(&profile)?;
                    let target = ServiceTarget::new(&profile.tool_path, config);
                    report(controller.enable_service(&target).await?);
                }
                ServiceAction::Disable => {
                    controller.unregister_service().await?;
                    println!("Background service removed");
                }
            }
        }
    }
    Ok(())
}

fn open_store(data_dir: Option<&std::path::Path>) -> Result<ProfileStore, ConfigError> {
    match data_dir {
        Some(dir) => {
            let paths = AppPaths::from_root(dir);
            let resolver = BundledToolResolver::new(&paths);
            ProfileStore::open(paths, Arc::new(resolver))
        }
        None => ProfileStore::new(),
    }
}

fn startup_controller(store: &ProfileStore, confirm: Box<dyn Confirm>) -> StartupModeController {
    let runner: Arc<dyn CommandRunner> = Arc::new(SystemCommandRunner);
    let locator = ServiceToolLocator::new(store.paths());
    StartupModeController::new(
        default_auto_launch(Arc::clone(&runner)),
        Box::new(NssmService::new(runner, locator)),
        confirm,
    )
}

fn print_mode(mode: StartupMode) {
    let text = match mode {
        StartupMode::None => "neither autostart nor the background service is active",
        StartupMode::AutoStart => "autostart is enabled",
        StartupMode::ServiceRegistered => "the background service is registered",
        StartupMode::Conflicting => {
            "autostart and the background service are both active; enable one of them to fix this"
        }
    };
    println!("{text}");
}

fn report(change: ModeChange) {
    match change {
        ModeChange::Enabled => println!("Done"),
        ModeChange::Declined => println!("Nothing changed"),
    }
}

fn banner(profile: &Profile) {
    eprintln!(
        "frpdesk {}: '{}' -> {}:{} ({} proxies). Press Ctrl-C to stop.",
        env!("CARGO_PKG_VERSION"),
        profile.name,
        profile.server_address,
        profile.server_port,
        profile.proxies.len()
    );
}

async fn autoconnect(store: ProfileStore, silent: bool) -> Result<(), CliError> {
    let session = TunnelSession::new(store);
    let events = session.subscribe();
    info!("Autoconnect in {:?}", AUTOCONNECT_DELAY);
    let Some(profile) = session.autoconnect(AUTOCONNECT_DELAY).await? else {
        return Ok(());
    };
    if !silent {
        banner(&profile);
    }
    stream_until_interrupted(&session, events).await
}

/// Echo frpc output until it exits or the user presses Ctrl-C.
async fn stream_until_interrupted(
    session: &TunnelSession,
    mut events: Receiver<ProcessEvent>,
) -> Result<(), CliError> {
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(ProcessEvent::Stdout(line)) => println!("{line}"),
                Ok(ProcessEvent::Stderr(line)) => eprintln!("{line}"),
                Ok(ProcessEvent::Exited(Some(0))) => return Ok(()),
                Ok(ProcessEvent::Exited(code)) => return Err(CliError::ToolExited(code)),
                Err(RecvError::Lagged(skipped)) => warn!("{skipped} output lines dropped"),
                Err(RecvError::Closed) => return Ok(()),
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, stopping frpc");
                session.stop().await;
                return Ok(());
            }
        }
    }
}
