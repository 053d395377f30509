use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use log::{debug, info};
use tokio::process::Command;

use super::errors::StartupError;

/// Exit statuses that mean "elevation was refused", not "the command failed":
/// pkexec uses 126 (dialog dismissed) and 127 (not authorized); the Windows
/// wrapper below reports ERROR_CANCELLED (1223); installers that run without
/// rights report ERROR_ACCESS_DENIED (5).
const ELEVATION_REFUSED: &[i32] = &[5, 126, 127, 1223];

/// One external command, optionally run with administrative rights.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRequest {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub elevated: bool,
}

impl CommandRequest {
    pub fn new<I, S>(program: impl Into<PathBuf>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            elevated: false,
        }
    }

    pub fn elevated(mut self) -> Self {
        self.elevated = true;
        self
    }
}

impl fmt::Display for CommandRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the process was terminated by a signal.
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    /// Stdout, then stderr, one per line.
    pub fn combined(&self) -> String {
        [self.stdout.trim_end(), self.stderr.trim_end()]
            .into_iter()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Turn a finished installer step into `Ok` or the matching error.
    pub fn check(self, request: &CommandRequest) -> Result<CommandOutput, StartupError> {
        if self.success() {
            return Ok(self);
        }
        let refused = request.elevated
            && self
                .status
                .is_some_and(|status| ELEVATION_REFUSED.contains(&status));
        if refused {
            Err(StartupError::PermissionDenied {
                command: request.to_string(),
                status: self.status,
            })
        } else {
            Err(StartupError::InstallerFailed {
                command: request.to_string(),
                status: self.status,
                output: self.combined(),
            })
        }
    }
}

/// Executes registry / service-manager commands on behalf of the startup
/// adapters. Swapped for a recording fake in tests.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run to completion. Only failing to launch at all is an `Err`; a
    /// non-zero exit is reported through [`CommandOutput::status`].
    async fn run(&self, request: &CommandRequest) -> Result<CommandOutput, StartupError>;
}

/// Runs commands on the host, elevating through `pkexec` on Unix and a UAC
/// prompt on Windows.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommandRunner;

#[async_trait]
impl CommandRunner for SystemCommandRunner {
    async fn run(&self, request: &CommandRequest) -> Result<CommandOutput, StartupError> {
        let mut command = if request.elevated {
            info!("Running with elevation: {request}");
            elevated_command(request)
        } else {
            debug!("Running: {request}");
            let mut command = Command::new(&request.program);
            command.args(&request.args);
            command
        };
        let output = command
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| StartupError::Spawn {
                command: request.to_string(),
                source,
            })?;
        let result = CommandOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        debug!("`{request}` exited with {:?}", result.status);
        Ok(result)
    }
}

#[cfg(unix)]
fn elevated_command(request: &CommandRequest) -> Command {
    let mut command = Command::new("pkexec");
    command.arg("--disable-internal-agent");
    for key in [
        "DISPLAY",
        "XAUTHORITY",
        "XDG_RUNTIME_DIR",
        "DBUS_SESSION_BUS_ADDRESS",
        "WAYLAND_DISPLAY",
        "LANG",
        "LC_ALL",
    ] {
        if let Ok(value) = std::env::var(key) {
            command.env(key, value);
        }
    }
    command.arg(&request.program).args(&request.args);
    command
}

#[cfg(windows)]
fn elevated_command(request: &CommandRequest) -> Command {
    let mut command = Command::new("powershell.exe");
    command
        .args(["-NoProfile", "-NonInteractive", "-Command"])
        .arg(runas_script(request));
    command
}

/// PowerShell that runs `request` through a UAC prompt, waits for it and
/// exits with its status, or 1223 when the prompt was declined.
#[cfg_attr(not(windows), allow(dead_code))]
fn runas_script(request: &CommandRequest) -> String {
    let program = ps_quote(&request.program.to_string_lossy());
    let arg_list = if request.args.is_empty() {
        String::new()
    } else {
        let line = request
            .args
            .iter()
            .map(|a| windows_quote(a))
            .collect::<Vec<_>>()
            .join(" ");
        format!(" -ArgumentList {}", ps_quote(&line))
    };
    format!(
        "try {{ $p = Start-Process -FilePath {program}{arg_list} -Verb RunAs \
         -WindowStyle Hidden -Wait -PassThru; exit $p.ExitCode }} catch {{ exit 1223 }}"
    )
}

fn ps_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Quote one argument for a Windows command line (MSVC argv rules).
fn windows_quote(arg: &str) -> String {
    if !arg.is_empty() && !arg.contains([' ', '\t', '"']) {
        return arg.to_string();
    }
    let mut out = String::from("\"");
    let mut backslashes = 0;
    for c in arg.chars() {
        match c {
            '\\' => backslashes += 1,
            '"' => {
                out.push_str(&"\\".repeat(backslashes * 2 + 1));
                out.push('"');
                backslashes = 0;
            }
            _ => {
                out.push_str(&"\\".repeat(backslashes));
                out.push(c);
                backslashes = 0;
            }
        }
    }
    out.push_str(&"\\".repeat(backslashes * 2));
    out.push('"');
    out
}
