use std::collections::VecDeque;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use super::errors::ProcessError;

/// How long `stop` waits for the process to exit after asking it to.
pub const STOP_TIMEOUT: Duration = Duration::from_secs(1);
/// How long the readers get to flush the last lines once the process is gone.
const DRAIN_TIMEOUT: Duration = Duration::from_millis(500);
const EVENT_CAPACITY: usize = 1024;
const OUTPUT_LOG_LINES: usize = 2000;

/// What subscribers receive from a supervised process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    Stdout(String),
    Stderr(String),
    /// Published once per start, after both streams have drained. `None`
    /// when the process was killed by a signal or its exit was not observed
    /// within the stop window.
    Exited(Option<i32>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Idle,
    Starting,
    Running,
    /// Last cycle ended on its own.
    Exited,
    /// Last cycle ended through `stop`.
    Stopped,
}

enum Control {
    Stop,
}

#[derive(Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

/// Handle of the one live process.
struct RunningProcess {
    generation: u64,
    pid: Option<u32>,
    tool_path: PathBuf,
    config_path: PathBuf,
    control_tx: mpsc::Sender<Control>,
    monitor: JoinHandle<()>,
}

struct SupervisorInner {
    state: ProcessState,
    generation: u64,
    current: Option<RunningProcess>,
}

#[derive(Default)]
struct OutputLog {
    stdout: VecDeque<String>,
    stderr: VecDeque<String>,
}

impl OutputLog {
    fn push(&mut self, stream: Stream, line: String) {
        let lines = match stream {
            Stream::Stdout => &mut self.stdout,
            Stream::Stderr => &mut self.stderr,
        };
        if lines.len() == OUTPUT_LOG_LINES {
            lines.pop_front();
        }
        lines.push_back(line);
    }
}

/// Runs at most one frpc instance at a time.
///
/// The supervisor is a cheap, clonable handle: the live process, its two
/// reader tasks and the monitor task that owns the `Child` are shared
/// through an `Arc`. Output lines and the exit notification are published on
/// a broadcast channel; subscribe before `start` to see every line.
#[derive(Clone)]
pub struct ProcessSupervisor {
    inner: Arc<Mutex<SupervisorInner>>,
    /// Serializes `start` and `stop`.
    lifecycle: Arc<Mutex<()>>,
    output: Arc<Mutex<OutputLog>>,
    events_tx: broadcast::Sender<ProcessEvent>,
}

impl Default for ProcessSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessSupervisor {
    pub fn new() -> Self {
        let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Mutex::new(SupervisorInner {
                state: ProcessState::Idle,
                generation: 0,
                current: None,
            })),
            lifecycle: Arc::new(Mutex::new(())),
            output: Arc::new(Mutex::new(OutputLog::default())),
            events_tx,
        }
    }

    /// Receive output lines and exit notifications from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ProcessEvent> {
        self.events_tx.subscribe()
    }

    /// Launch `tool -c <config>` with the tool's directory as working
    /// directory.
    ///
    /// Returns `Ok(false)` without touching anything if a process is already
    /// running.
    pub async fn start(
        &self,
        tool_path: impl AsRef<Path>,
        config_path: impl AsRef<Path>,
    ) -> Result<bool, ProcessError> {
        let _lifecycle = self.lifecycle.lock().await;
        let mut inner = self.inner.lock().await;
        if inner.current.is_some() {
            info!("frpc is already running; start request ignored");
            return Ok(false);
        }

        let tool_path = absolute(tool_path.as_ref());
        let config_path = absolute(config_path.as_ref());
        if !tool_path.is_file() {
            return Err(ProcessError::ExecutableNotFound(tool_path));
        }
        if !config_path.is_file() {
            return Err(ProcessError::ConfigNotFound(config_path));
        }

        let previous = inner.state;
        inner.state = ProcessState::Starting;

        let mut command = Command::new(&tool_path);
        command
            .arg("-c")
            .arg(&config_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = tool_path.parent().filter(|d| !d.as_os_str().is_empty()) {
            command.current_dir(dir);
        }
        #[cfg(windows)]
        {
            const CREATE_NO_WINDOW: u32 = 0x0800_0000;
            command.creation_flags(CREATE_NO_WINDOW);
        }

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(source) => {
                inner.state = previous;
                return Err(ProcessError::Spawn {
                    path: tool_path,
                    source,
                });
            }
        };

        let pid = child.id();
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(self.spawn_reader(stdout, Stream::Stdout));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(self.spawn_reader(stderr, Stream::Stderr));
        }

        inner.generation += 1;
        let generation = inner.generation;
        let (control_tx, control_rx) = mpsc::channel(1);
        let monitor = tokio::spawn(monitor_process(
            child,
            readers,
            control_rx,
            generation,
            Arc::clone(&self.inner),
            self.events_tx.clone(),
        ));

        info!(
            "Started {:?} -c {:?} (pid {:?})",
            tool_path, config_path, pid
        );
        inner.current = Some(RunningProcess {
            generation,
            pid,
            tool_path,
            config_path,
            control_tx,
            monitor,
        });
        inner.state = ProcessState::Running;
        Ok(true)
    }

    /// Ask the running process to terminate and wait up to [`STOP_TIMEOUT`].
    ///
    /// The supervisor reports `Stopped` afterwards whether or not the process
    /// honoured the request in time; there is no further escalation.
    pub async fn stop(&self) {
        let _lifecycle = self.lifecycle.lock().await;
        let Some(current) = self.inner.lock().await.current.take() else {
            debug!("stop requested but nothing is running");
            return;
        };

        info!("Stopping frpc (pid {:?})", current.pid);
        let _ = current.control_tx.send(Control::Stop).await;
        if timeout(STOP_TIMEOUT + DRAIN_TIMEOUT, current.monitor)
            .await
            .is_err()
        {
            warn!("frpc (pid {:?}) did not finish within the stop window", current.pid);
        }

        let mut inner = self.inner.lock().await;
        if inner.generation == current.generation {
            inner.state = ProcessState::Stopped;
        }
    }

    pub async fn is_running(&self) -> bool {
        self.inner.lock().await.current.is_some()
    }

    pub async fn state(&self) -> ProcessState {
        self.inner.lock().await.state
    }

    pub async fn pid(&self) -> Option<u32> {
        self.inner.lock().await.current.as_ref().and_then(|c| c.pid)
    }

    /// Tool and config path of the running process.
    pub async fn current_paths(&self) -> Option<(PathBuf, PathBuf)> {
        self.inner
            .lock()
            .await
            .current
            .as_ref()
            .map(|c| (c.tool_path.clone(), c.config_path.clone()))
    }

    /// Captured stdout, most recent lines last.
    pub async fn output(&self) -> Vec<String> {
        self.output.lock().await.stdout.iter().cloned().collect()
    }

    /// Captured stderr, most recent lines last.
    pub async fn errors(&self) -> Vec<String> {
        self.output.lock().await.stderr.iter().cloned().collect()
    }

    pub async fn clear_output(&self) {
        let mut output = self.output.lock().await;
        output.stdout.clear();
        output.stderr.clear();
    }

    fn spawn_reader<R>(&self, stream: R, kind: Stream) -> JoinHandle<()>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let events_tx = self.events_tx.clone();
        let output = Arc::clone(&self.output);
        tokio::spawn(async move {
            let mut reader = BufReader::new(stream);
            let mut buf = Vec::new();
            loop {
                buf.clear();
                match reader.read_until(b'\n', &mut buf).await {
                    Ok(0) => break,
                    Ok(_) => {
                        let line = String::from_utf8_lossy(&buf)
                            .trim_end_matches(['\r', '\n'])
                            .to_string();
                        let event = match kind {
                            Stream::Stdout => {
                                debug!("frpc: {line}");
                                ProcessEvent::Stdout(line.clone())
                            }
                            Stream::Stderr => {
                                warn!("frpc: {line}");
                                ProcessEvent::Stderr(line.clone())
                            }
                        };
                        output.lock().await.push(kind, line);
                        // No subscribers is fine.
                        let _ = events_tx.send(event);
                    }
                    Err(e) => {
                        debug!("Output reader stopped: {e}");
                        break;
                    }
                }
            }
        })
    }
}

/// Owns the child for one start cycle: waits for it to exit (or for a stop
/// request), lets the readers drain and publishes the single exit event.
async fn monitor_process(
    mut child: Child,
    readers: Vec<JoinHandle<()>>,
    mut control_rx: mpsc::Receiver<Control>,
    generation: u64,
    inner: Arc<Mutex<SupervisorInner>>,
    events_tx: broadcast::Sender<ProcessEvent>,
) {
    let (code, stop_requested) = tokio::select! {
        status = child.wait() => (exit_code(status), false),
        Some(Control::Stop) = control_rx.recv() => {
            if let Err(e) = child.start_kill() {
                debug!("Termination request failed: {e}");
            }
            match timeout(STOP_TIMEOUT, child.wait()).await {
                Ok(status) => (exit_code(status), true),
                Err(_) => {
                    warn!("frpc did not exit within {:?}", STOP_TIMEOUT);
                    (None, true)
                }
            }
        }
    };

    for reader in readers {
        let abort = reader.abort_handle();
        if timeout(DRAIN_TIMEOUT, reader).await.is_err() {
            // Something else still holds the pipe open.
            abort.abort();
        }
    }

    {
        let mut inner = inner.lock().await;
        if inner.generation == generation {
            inner.current = None;
            if !stop_requested {
                inner.state = ProcessState::Exited;
            }
        }
    }

    info!("frpc exited with code {:?}", code);
    let _ = events_tx.send(ProcessEvent::Exited(code));
}

fn exit_code(status: io::Result<ExitStatus>) -> Option<i32> {
    match status {
        Ok(status) => status.code(),
        Err(e) => {
            warn!("Could not read frpc exit status: {e}");
            None
        }
    }
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}
