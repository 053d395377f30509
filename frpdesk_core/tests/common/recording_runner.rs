//! A [`CommandRunner`] that never starts a process: it records every request
//! and answers from a caller-supplied function.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use frpdesk_core::startup::{CommandOutput, CommandRequest, CommandRunner, StartupError};

type Responder = dyn Fn(&CommandRequest) -> CommandOutput + Send + Sync;

#[derive(Clone)]
pub struct RecordingRunner {
    pub requests: Arc<Mutex<Vec<CommandRequest>>>,
    respond: Arc<Responder>,
}

impl RecordingRunner {
    /// Every command succeeds with empty output.
    pub fn succeeding() -> Self {
        Self::with(|_| exit(0, ""))
    }

    pub fn with<F>(respond: F) -> Self
    where
        F: Fn(&CommandRequest) -> CommandOutput + Send + Sync + 'static,
    {
        Self {
            requests: Arc::default(),
            respond: Arc::new(respond),
        }
    }

    /// Recorded requests rendered as `program arg arg…`, with `[elevated]`
    /// appended where requested.
    pub fn lines(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| {
                let program = r
                    .program
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let mut line = std::iter::once(program)
                    .chain(r.args.iter().cloned())
                    .collect::<Vec<_>>()
                    .join(" ");
                if r.elevated {
                    line.push_str(" [elevated]");
                }
                line
            })
            .collect()
    }
}

pub fn exit(status: i32, stdout: &str) -> CommandOutput {
    CommandOutput {
        status: Some(status),
        stdout: stdout.to_string(),
        stderr: String::new(),
    }
}

#[async_trait]
impl CommandRunner for RecordingRunner {
    async fn run(&self, request: &CommandRequest) -> Result<CommandOutput, StartupError> {
        self.requests.lock().unwrap().push(request.clone());
        Ok((self.respond)(request))
    }
}
