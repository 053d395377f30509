//! In-memory stand-ins for the autostart entry and the background service.
//!
//! Both fakes share one [`Registrations`] value, so a test can look at the
//! combined "what would the OS see now" state after every controller call,
//! flip individual operations into failures, and read back the order in
//! which the controller touched things.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use frpdesk_core::startup::{
    AutoLaunchRegistrar, Confirm, ServiceRegistrar, ServiceTarget, StartupError,
};

#[derive(Debug, Default)]
pub struct Registrations {
    /// Command line of the autostart entry, if present.
    pub auto_start: Option<String>,
    pub service: Option<ServiceTarget>,

    pub fail_auto_enable: bool,
    pub fail_auto_disable: bool,
    pub fail_auto_query: bool,
    pub fail_register: bool,
    pub fail_unregister: bool,
    pub fail_service_query: bool,
    /// Installer missing: preflight reports `ServiceToolMissing`.
    pub installer_missing: bool,

    /// Every mutating call, in order.
    pub calls: Vec<&'static str>,
}

#[derive(Clone, Default)]
pub struct SharedRegistrations(Arc<Mutex<Registrations>>);

impl SharedRegistrations {
    pub fn lock(&self) -> MutexGuard<'_, Registrations> {
        self.0.lock().unwrap()
    }

    pub fn auto_launch(&self) -> Box<FakeAutoLaunch> {
        Box::new(FakeAutoLaunch(self.clone()))
    }

    pub fn service(&self) -> Box<FakeService> {
        Box::new(FakeService(self.clone()))
    }

    pub fn both(&self) -> (bool, bool) {
        let state = self.lock();
        (state.auto_start.is_some(), state.service.is_some())
    }
}

pub struct FakeAutoLaunch(SharedRegistrations);

#[async_trait]
impl AutoLaunchRegistrar for FakeAutoLaunch {
    async fn is_enabled(&self) -> Result<bool, StartupError> {
        let state = self.0.lock();
        if state.fail_auto_query {
            return Err(std::io::Error::other("registry unavailable").into());
        }
        Ok(state.auto_start.is_some())
    }

    async fn enable(&self, command_line: &str) -> Result<(), StartupError> {
        let mut state = self.0.lock();
        state.calls.push("auto_start.enable");
        if state.fail_auto_enable {
            return Err(StartupError::AutoLaunch("injected enable failure".into()));
        }
        state.auto_start = Some(command_line.to_string());
        Ok(())
    }

    async fn disable(&self) -> Result<(), StartupError> {
        let mut state = self.0.lock();
        state.calls.push("auto_start.disable");
        if state.fail_auto_disable {
            return Err(StartupError::AutoLaunch("injected disable failure".into()));
        }
        state.auto_start = None;
        Ok(())
    }
}

pub struct FakeService(SharedRegistrations);

#[async_trait]
impl ServiceRegistrar for FakeService {
    async fn preflight(&self, target: &ServiceTarget) -> Result<(), StartupError> {
        let state = self.0.lock();
        if state.installer_missing {
            return Err(StartupError::ServiceToolMissing {
                tool: "nssm".into(),
                searched: vec![PathBuf::from("/nowhere/nssm")],
                hint: "download it".into(),
            });
        }
        if !target.tool_path.is_file() {
            return Err(StartupError::ExecutableNotFound(target.tool_path.clone()));
        }
        Ok(())
    }

    async fn is_registered(&self) -> Result<bool, StartupError> {
        let state = self.0.lock();
        if state.fail_service_query {
            return Err(std::io::Error::other("service manager unavailable").into());
        }
        Ok(state.service.is_some())
    }

    async fn register(&self, target: &ServiceTarget) -> Result<(), StartupError> {
        let mut state = self.0.lock();
        state.calls.push("service.register");
        if state.fail_register {
            return Err(StartupError::InstallerFailed {
                command: "nssm install".into(),
                status: Some(3),
                output: "injected".into(),
            });
        }
        state.service = Some(target.clone());
        Ok(())
    }

    async fn unregister(&self) -> Result<(), StartupError> {
        let mut state = self.0.lock();
        state.calls.push("service.unregister");
        if state.fail_unregister {
            return Err(StartupError::PermissionDenied {
                command: "nssm remove".into(),
                status: Some(1223),
            });
        }
        state.service = None;
        Ok(())
    }
}

/// Answers every prompt with `answer` and remembers the prompts.
#[derive(Clone)]
pub struct ScriptedConfirm {
    answer: bool,
    pub asked: Arc<Mutex<Vec<String>>>,
}

impl ScriptedConfirm {
    pub fn new(answer: bool) -> Self {
        Self {
            answer,
            asked: Arc::default(),
        }
    }

    pub fn times_asked(&self) -> usize {
        self.asked.lock().unwrap().len()
    }
}

impl Confirm for ScriptedConfirm {
    fn confirm(&self, prompt: &str) -> bool {
        self.asked.lock().unwrap().push(prompt.to_string());
        self.answer
    }
}
