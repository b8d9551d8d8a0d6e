use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use tokio::process::Command;
use tokio::runtime::Handle;
use tokio::sync::{Semaphore, mpsc};
use tracing::{debug, warn};
use vigil::{CommandExecutor, CommandId, CommandRequest, ExecError, ExecResult};

/// Runs plugin, notification and event handler commands through `/bin/sh`
/// on the tokio runtime.
///
/// At most `workers` commands run at once; further submissions wait for a
/// free slot. Completed submissions are sent to the receiver returned by
/// [`ProcessExecutor::new`].
pub struct ProcessExecutor {
    handle: Handle,
    slots: Arc<Semaphore>,
    completions: mpsc::UnboundedSender<ExecResult>,
    closed: AtomicBool,
}

impl ProcessExecutor {
    /// Create an executor bound to the current runtime
    pub fn new(workers: usize) -> (Self, mpsc::UnboundedReceiver<ExecResult>) {
        let (completions, rx) = mpsc::unbounded_channel();
        let executor = Self {
            handle: Handle::current(),
            slots: Arc::new(Semaphore::new(workers.max(1))),
            completions,
            closed: AtomicBool::new(false),
        };
        (executor, rx)
    }

    /// Refuse new submissions; commands already running still report back
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

impl CommandExecutor for ProcessExecutor {
    fn submit(&self, request: CommandRequest) -> Result<CommandId, ExecError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ExecError::ShuttingDown);
        }
        let id = request.id;
        let slots = self.slots.clone();
        let completions = self.completions.clone();

        self.handle.spawn(async move {
            let Ok(_permit) = slots.acquire_owned().await else {
                return;
            };
            let result = execute(request).await;
            if completions.send(result).is_err() {
                debug!("Completion of command {} dropped, the event loop is gone", id);
            }
        });
        Ok(id)
    }

    /// Runs a command to completion. Must be called from a multi-threaded
    /// runtime worker or from outside the runtime.
    fn run(&self, request: CommandRequest) -> Result<ExecResult, ExecError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ExecError::ShuttingDown);
        }
        let handle = self.handle.clone();
        let result = match Handle::try_current() {
            Ok(_) => tokio::task::block_in_place(|| handle.block_on(execute(request))),
            Err(_) => handle.block_on(execute(request)),
        };
        Ok(result)
    }
}

/// Spawns `sh -c <command line>`, captures its output and kills it once the
/// request's timeout has passed
async fn execute(request: CommandRequest) -> ExecResult {
    let start = Utc::now();
    let mut command = Command::new("/bin/sh");
    command
        .arg("-c")
        .arg(&request.command_line)
        .envs(request.environment.iter().map(|(key, value)| (key.as_str(), value.as_str())))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = match command.spawn() {
        Ok(child) => child,
        Err(error) => {
            warn!("Failed to start '{}': {}", request.command_line, error);
            return ExecResult::crashed(request.id, start, error.to_string());
        }
    };

    // dropping the child on timeout kills it; tokio reaps it in the background
    match tokio::time::timeout(request.timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => {
            let end = Utc::now();
            let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            match output.status.code() {
                Some(code) => ExecResult { stderr, ..ExecResult::normal(request.id, start, end, code, stdout) },
                None => {
                    debug!("'{}' was terminated by a signal", request.command_line);
                    ExecResult { end_time: end, stdout, ..ExecResult::crashed(request.id, start, stderr) }
                }
            }
        }
        Ok(Err(error)) => ExecResult::crashed(request.id, start, error.to_string()),
        Err(_) => {
            warn!("'{}' timed out after {:?}", request.command_line, request.timeout);
            ExecResult::timed_out(request.id, start, Utc::now())
        }
    }
}
