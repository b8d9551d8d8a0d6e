//! In-memory executor and broker for driving the engine without processes.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;

use crate::broker::{Broker, BrokerEvent};
use crate::commands::{CommandExecutor, CommandId, CommandRequest, ExecError, ExecResult};

/// Executor that records every request and never runs anything.
///
/// Completions are fed back by the caller through
/// [`Engine::command_finished`](crate::Engine::command_finished).
#[derive(Debug, Default)]
pub struct RecordingExecutor {
    submitted: Mutex<Vec<(CommandId, CommandRequest)>>,
    refuse: AtomicBool,
    sync_result: Mutex<Option<(i32, String)>>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following submission fail as if the process could not spawn
    pub fn refuse_submissions(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Exit code and output returned by [`CommandExecutor::run`]
    pub fn set_sync_result(&self, code: i32, output: impl Into<String>) {
        *self.sync_result.lock().unwrap_or_else(|e| e.into_inner()) = Some((code, output.into()));
    }

    pub fn submitted(&self) -> Vec<(CommandId, CommandRequest)> {
        self.submitted.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Drains the recorded submissions
    pub fn take(&self) -> Vec<(CommandId, CommandRequest)> {
        std::mem::take(&mut *self.submitted.lock().unwrap_or_else(|e| e.into_inner()))
    }

    /// Submissions whose command line contains `needle`
    pub fn matching(&self, needle: &str) -> Vec<(CommandId, CommandRequest)> {
        self.submitted()
            .into_iter()
            .filter(|(_, request)| request.command_line.contains(needle))
            .collect()
    }
}

impl CommandExecutor for RecordingExecutor {
    fn submit(&self, request: CommandRequest) -> Result<CommandId, ExecError> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(ExecError::Spawn { command: request.command_line, reason: "refused".into() });
        }
        let id = request.id;
        self.submitted.lock().unwrap_or_else(|e| e.into_inner()).push((id, request));
        Ok(id)
    }

    fn run(&self, request: CommandRequest) -> Result<ExecResult, ExecError> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(ExecError::Spawn { command: request.command_line, reason: "refused".into() });
        }
        let (code, output) = self
            .sync_result
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .unwrap_or((0, String::new()));
        let now = Utc::now();
        Ok(ExecResult::normal(request.id, now, now, code, output))
    }
}

/// Broker that keeps every published event
#[derive(Debug, Default)]
pub struct RecordingBroker {
    events: Mutex<Vec<BrokerEvent>>,
}

impl RecordingBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<BrokerEvent> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn count(&self, predicate: impl Fn(&BrokerEvent) -> bool) -> usize {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).iter().filter(|event| predicate(event)).count()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

impl Broker for RecordingBroker {
    fn publish(&self, event: &BrokerEvent) -> anyhow::Result<()> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).push(event.clone());
        Ok(())
    }
}
