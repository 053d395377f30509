use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, Mutex};

use super::errors::SessionError;
use super::supervisor::{ProcessEvent, ProcessSupervisor};
use crate::storage::{Profile, ProfileStore};

/// Delay before `--autoconnect` starts the first profile.
pub const AUTOCONNECT_DELAY: Duration = Duration::from_secs(1);

/// Glue between the profile store and the supervisor: renders a fresh
/// tool config for every start and remembers which profile is live.
#[derive(Clone)]
pub struct TunnelSession {
    store: ProfileStore,
    supervisor: ProcessSupervisor,
    current: Arc<Mutex<Option<Profile>>>,
}

impl TunnelSession {
    pub fn new(store: ProfileStore) -> Self {
        Self {
            store,
            supervisor: ProcessSupervisor::new(),
            current: Arc::new(Mutex::new(None)),
        }
    }

    pub fn store(&self) -> &ProfileStore {
        &self.store
    }

    pub fn supervisor(&self) -> &ProcessSupervisor {
        &self.supervisor
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProcessEvent> {
        self.supervisor.subscribe()
    }

    /// Start frpc for `profile`. A stale tool path is re-resolved on the
    /// passed profile (not persisted). Returns `Ok(false)` when a process is
    /// already running.
    pub async fn start_profile(&self, profile: &mut Profile) -> Result<bool, SessionError> {
        if self.supervisor.is_running().await {
            warn!("frpc is already running; stop it first");
            return Ok(false);
        }

        if profile.tool_path.is_empty() || !Path::new(&profile.tool_path).exists() {
            self.store.resolve_tool_path(profile);
            info!("Using tunnel tool {}", profile.tool_path);
        }

        let config_path = self.store.write_scratch_config(profile)?;
        // Subscribed before the start so a quick exit is not missed.
        let events = self.supervisor.subscribe();
        let started = match self.supervisor.start(&profile.tool_path, &config_path).await {
            Ok(started) => started,
            Err(e) => {
                remove_scratch(&config_path);
                return Err(e.into());
            }
        };
        if started {
            info!("frpc started for profile '{}'", profile.name);
            *self.current.lock().await = Some(profile.clone());
            tokio::spawn(remove_after_exit(
                self.supervisor.clone(),
                events,
                config_path,
            ));
        } else {
            warn!("frpc could not be started for profile '{}'", profile.name);
            remove_scratch(&config_path);
        }
        Ok(started)
    }

    pub async fn stop(&self) {
        if !self.supervisor.is_running().await {
            info!("No frpc process is running");
            return;
        }
        self.supervisor.stop().await;
        info!("Stop request sent to frpc");
    }

    pub async fn is_running(&self) -> bool {
        self.supervisor.is_running().await
    }

    /// The profile most recently started through this session.
    pub async fn current_profile(&self) -> Option<Profile> {
        self.current.lock().await.clone()
    }

    /// Wait `delay`, then start the first stored profile.
    ///
    /// `Ok(None)` when there is no profile to start.
    pub async fn autoconnect(&self, delay: Duration) -> Result<Option<Profile>, SessionError> {
        tokio::time::sleep(delay).await;
        let Some(name) = self.store.list_sorted()?.into_iter().next() else {
            warn!("No profile available; autoconnect skipped");
            return Ok(None);
        };
        info!("Autoconnect: loading profile '{}'", name);
        let mut profile = self.store.load(&name)?;
        if self.start_profile(&mut profile).await? {
            Ok(Some(profile))
        } else {
            Ok(None)
        }
    }
}

/// Delete the scratch config once the process reading it has exited. The
/// file holds the token in plain text.
async fn remove_after_exit(
    supervisor: ProcessSupervisor,
    mut events: broadcast::Receiver<ProcessEvent>,
    config_path: PathBuf,
) {
    let watched = std::path::absolute(&config_path).unwrap_or_else(|_| config_path.clone());
    loop {
        match events.recv().await {
            Ok(ProcessEvent::Exited(_)) | Err(RecvError::Lagged(_)) => {
                // An exit from an earlier run can still be in flight.
                let ours = supervisor
                    .current_paths()
                    .await
                    .is_some_and(|(_, config)| config == watched);
                if !ours {
                    break;
                }
            }
            Ok(_) => {}
            Err(RecvError::Closed) => break,
        }
    }
    remove_scratch(&config_path);
}

fn remove_scratch(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => debug!("Removed scratch config {:?}", path),
        Err(e) => debug!("Could not remove scratch config {:?}: {e}", path),
    }
}
