//! Boundary with the process execution collaborator.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Handle of a submitted command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommandId(pub Uuid);

impl CommandId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CommandId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A fully expanded command line ready to run
#[derive(Debug, Clone, PartialEq)]
pub struct CommandRequest {
    pub id: CommandId,
    pub command_line: String,
    pub environment: Vec<(String, String)>,
    pub timeout: Duration,
}

impl CommandRequest {
    pub fn new(command_line: impl Into<String>, timeout: Duration) -> Self {
        Self {
            id: CommandId::new(),
            command_line: command_line.into(),
            environment: Vec::new(),
            timeout,
        }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.push((key.into(), value.into()));
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExitStatus {
    /// The process exited on its own; `exit_code` is meaningful
    Normal,
    /// The process was killed after exceeding its timeout
    Timeout,
    /// The process died abnormally or could not be started
    Crashed,
}

/// Outcome of one command run
#[derive(Debug, Clone, PartialEq)]
pub struct ExecResult {
    pub id: CommandId,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub exit_code: i32,
    pub exit_status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl ExecResult {
    pub fn normal(id: CommandId, start_time: DateTime<Utc>, end_time: DateTime<Utc>, exit_code: i32, stdout: impl Into<String>) -> Self {
        Self {
            id,
            start_time,
            end_time,
            exit_code,
            exit_status: ExitStatus::Normal,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn timed_out(id: CommandId, start_time: DateTime<Utc>, end_time: DateTime<Utc>) -> Self {
        Self {
            id,
            start_time,
            end_time,
            exit_code: -1,
            exit_status: ExitStatus::Timeout,
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    pub fn crashed(id: CommandId, start_time: DateTime<Utc>, message: impl Into<String>) -> Self {
        Self {
            id,
            start_time,
            end_time: start_time,
            exit_code: -1,
            exit_status: ExitStatus::Crashed,
            stdout: String::new(),
            stderr: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("executor is shutting down")]
    ShuttingDown,
    #[error("failed to spawn '{command}': {reason}")]
    Spawn { command: String, reason: String },
}

/// Runs plugin, notification and event handler commands.
///
/// `submit` returns immediately; the result is handed back later through
/// [`Engine::command_finished`](crate::Engine::command_finished) on the event
/// loop. `run` blocks until the command ends and is meant for administrative,
/// one-off commands.
pub trait CommandExecutor: Send + Sync {
    fn submit(&self, request: CommandRequest) -> Result<CommandId, ExecError>;

    fn run(&self, request: CommandRequest) -> Result<ExecResult, ExecError>;
}
