/// Orchestrator module - drives the engine on the tokio runtime
///
/// The orchestrator owns the [`Engine`] and:
/// - Restores retained state before the first checks are scheduled
/// - Runs due events and sleeps until the next one is due
/// - Feeds finished commands from the process executor back into the engine
/// - Saves retention periodically and on shutdown
pub mod retention;


pub use retention::RetentionStore;

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use vigil::{Engine, ExecResult, ObjectDefinitions, Timestamp, TracingBroker};

use crate::config::Config;
use crate::monitoring::ProcessExecutor;
use crate::objects::build_registry;

/// Shortest pause between two passes of the loop
const MIN_SLEEP: Duration = Duration::from_millis(250);

fn now() -> Timestamp {
    chrono::Utc::now().timestamp()
}

/// Main orchestrator for the vigil service
pub struct Orchestrator {
    config: Arc<Config>,
    engine: Engine,
    executor: Arc<ProcessExecutor>,
    completions: Option<mpsc::UnboundedReceiver<ExecResult>>,
    retention: Option<RetentionStore>,
}

impl Orchestrator {
    /// Create and start a new orchestrator
    /// This is a convenience method that creates and immediately runs the orchestrator
    pub async fn start(config: Config, definitions: ObjectDefinitions) -> Result<()> {
        let mut orchestrator = Self::new(config, definitions)?;
        orchestrator.run().await
    }

    /// Create a new orchestrator instance. Must be called inside the runtime.
    pub fn new(config: Config, definitions: ObjectDefinitions) -> Result<Self> {
        let config = Arc::new(config);

        info!("Activating object definitions...");
        let (registry, errors) = build_registry(definitions, &config.engine);
        if !errors.is_empty() {
            warn!("{} objects were skipped because of configuration errors", errors.len());
        }

        let (executor, completions) = ProcessExecutor::new(config.executor.workers);
        let executor = Arc::new(executor);
        let mut engine = Engine::new(config.engine.clone(), registry, executor.clone(), Arc::new(TracingBroker));

        let retention = config.retention.enabled.then(|| RetentionStore::new(&config.paths.retention));
        if let Some(store) = &retention {
            match store.load()? {
                Some(snapshot) => {
                    let restored = engine.restore(snapshot, now());
                    info!("Restored {} entities from {}", restored, store.path().display());
                }
                None => info!("No retention data found, starting from configured initial states"),
            }
        }

        Ok(Self { config, engine, executor, completions: Some(completions), retention })
    }

    #[allow(dead_code)] // Inspected by tests
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    #[allow(dead_code)] // Used by tests to queue a shutdown
    pub fn engine_mut(&mut self) -> &mut Engine {
        &mut self.engine
    }

    /// Run the event loop until a shutdown event is reached or Ctrl-C is
    /// received, then save retention
    pub async fn run(&mut self) -> Result<()> {
        let Some(mut completions) = self.completions.take() else {
            anyhow::bail!("the orchestrator event loop can only run once");
        };

        info!("Starting vigil orchestrator...");
        self.engine.start(now());

        let save_every = self.config.retention.save_interval_seconds;
        let mut save_timer = tokio::time::interval(Duration::from_secs(save_every.max(1)));
        save_timer.tick().await;

        info!("Orchestrator started successfully - {} entities monitored", self.engine.registry().len());

        loop {
            let tick = now();
            self.engine.run_once(tick);
            if self.engine.is_shutdown_requested() {
                info!("Shutdown requested by the event queue");
                break;
            }

            let sleep_for = self
                .engine
                .next_wakeup()
                .map(|at| Duration::from_secs((at - tick).max(0) as u64))
                .unwrap_or(Duration::from_secs(1))
                .max(MIN_SLEEP);

            tokio::select! {
                Some(result) = completions.recv() => {
                    self.finish(result);
                    while let Ok(result) = completions.try_recv() {
                        self.finish(result);
                    }
                }

                _ = tokio::time::sleep(sleep_for) => {}

                _ = save_timer.tick(), if save_every > 0 => {
                    self.save_retention();
                }

                _ = tokio::signal::ctrl_c() => {
                    info!("Received Ctrl-C, shutting down");
                    break;
                }
            }
        }

        self.executor.close();
        self.save_retention();
        info!("Orchestrator stopped");
        Ok(())
    }

    fn finish(&mut self, result: ExecResult) {
        let id = result.id;
        if let Err(e) = self.engine.command_finished(result, now()) {
            warn!("Failed to process completion of command {}: {}", id, e);
        } else {
            debug!("Command {} completed", id);
        }
    }

    /// Write the current snapshot, logging instead of failing
    pub fn save_retention(&self) {
        let Some(store) = &self.retention else {
            return;
        };
        if let Err(e) = store.save(&self.engine.snapshot(now())) {
            error!("Failed to save retention data: {:#}", e);
        }
    }
}
