//! The engine: sole owner of entity state and of the timed event loop.
//!
//! Every operation takes the current time as a parameter so the whole state
//! machine can be driven deterministically. Nothing in here blocks; process
//! execution is handed to the [`CommandExecutor`] and its completions come
//! back through [`Engine::command_finished`].

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tracing::{debug, info, trace, warn};

use crate::broker::{self, Broker, BrokerEvent};
use crate::checks::{CheckOptions, CheckResult};
use crate::comments::CommentStore;
use crate::commands::{CommandExecutor, CommandId, CommandRequest, ExecError, ExecResult, ExitStatus};
use crate::config::EngineConfig;
use crate::counters::SequenceCounters;
use crate::downtime::DowntimeStore;
use crate::error::EngineError;
use crate::events::{EventKind, TimedEvent, TimedEventQueue};
use crate::notifications::{NotificationOptions, NotificationType};
use crate::objects::{Checkable, EntityKey, EntityKind, ObjectRegistry, StateType};
use crate::Timestamp;

/// What a submitted command was for, looked up again on completion
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum InFlight {
    Check { target: EntityKey, options: CheckOptions, reschedule: bool, latency: f64, started: Timestamp },
    EventHandler { target: EntityKey },
    Notification { target: EntityKey, contact: String },
}

pub struct Engine {
    pub(crate) config: EngineConfig,
    pub(crate) registry: ObjectRegistry,
    pub(crate) queue: TimedEventQueue,
    pub(crate) counters: Arc<SequenceCounters>,
    pub(crate) comments: CommentStore,
    pub(crate) downtimes: DowntimeStore,
    pub(crate) executor: Arc<dyn CommandExecutor>,
    pub(crate) broker: Arc<dyn Broker>,
    pub(crate) in_flight: HashMap<CommandId, InFlight>,
    pub(crate) result_buffer: VecDeque<CheckResult>,
    pub(crate) running_service_checks: usize,
    pub(crate) program_start: Timestamp,
    last_tick: Option<Timestamp>,
    shutdown_requested: bool,
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        registry: ObjectRegistry,
        executor: Arc<dyn CommandExecutor>,
        broker: Arc<dyn Broker>,
    ) -> Self {
        Self {
            config,
            registry,
            queue: TimedEventQueue::new(),
            counters: Arc::new(SequenceCounters::new()),
            comments: CommentStore::new(),
            downtimes: DowntimeStore::default(),
            executor,
            broker,
            in_flight: HashMap::new(),
            result_buffer: VecDeque::new(),
            running_service_checks: 0,
            program_start: 0,
            last_tick: None,
            shutdown_requested: false,
        }
    }

    /// Shares an existing id sequence source instead of a private one
    pub fn with_counters(mut self, counters: Arc<SequenceCounters>) -> Self {
        self.counters = counters;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &ObjectRegistry {
        &self.registry
    }

    pub fn entity(&self, key: EntityKey) -> Option<&Checkable> {
        self.registry.get(key)
    }

    pub fn queue(&self) -> &TimedEventQueue {
        &self.queue
    }

    pub fn comments(&self) -> &CommentStore {
        &self.comments
    }

    pub fn downtimes(&self) -> &DowntimeStore {
        &self.downtimes
    }

    pub fn counters(&self) -> &Arc<SequenceCounters> {
        &self.counters
    }

    /// Number of commands submitted and not yet reported back
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Check results waiting for the next reaper sweep
    pub fn pending_results(&self) -> usize {
        self.result_buffer.len()
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_requested
    }

    pub(crate) fn entity_mut(&mut self, key: EntityKey) -> Result<&mut Checkable, EngineError> {
        self.registry.get_mut(key).ok_or(EngineError::UnknownEntity(key))
    }

    pub(crate) fn publish(&self, event: BrokerEvent) {
        broker::emit(self.broker.as_ref(), event);
    }

    /// Schedules the recurring housekeeping events and the first check of
    /// every schedulable entity.
    pub fn start(&mut self, now: Timestamp) {
        self.program_start = now;
        self.last_tick = Some(now);

        let reaper = self.config.check_reaper_interval.max(1);
        self.queue.schedule(TimedEvent::new(EventKind::ReaperSweep, None, now + reaper).recurring(reaper));

        if self.config.check_service_freshness || self.config.check_host_freshness {
            let interval = match (self.config.check_service_freshness, self.config.check_host_freshness) {
                (true, true) => self
                    .config
                    .service_freshness_check_interval
                    .min(self.config.host_freshness_check_interval),
                (true, false) => self.config.service_freshness_check_interval,
                _ => self.config.host_freshness_check_interval,
            }
            .max(1);
            self.queue.schedule(TimedEvent::new(EventKind::FreshnessSweep, None, now + interval).recurring(interval));
        }

        if self.config.check_orphaned_services || self.config.check_orphaned_hosts {
            let interval = self.config.orphan_check_interval.max(1);
            self.queue.schedule(TimedEvent::new(EventKind::OrphanSweep, None, now + interval).recurring(interval));
        }

        let scheduled = self.schedule_initial_checks(now);
        info!("Engine started with {} entities, {} initial checks scheduled", self.registry.len(), scheduled);
    }

    /// Asks the loop to stop once every event due before `at` has run
    pub fn request_shutdown(&mut self, at: Timestamp) {
        self.queue.schedule(TimedEvent::new(EventKind::Shutdown, None, at).without_compensation());
    }

    /// Earliest time the loop has something to do
    pub fn next_wakeup(&self) -> Option<Timestamp> {
        self.queue.next_run_time()
    }

    /// Runs every event due at `now`, in time order. Returns how many ran.
    pub fn run_once(&mut self, now: Timestamp) -> usize {
        self.compensate_for_clock_jump(now);
        self.last_tick = Some(now);

        let mut handled = 0;
        while let Some(event) = self.queue.pop_next_due(now) {
            handled += 1;
            let recurring = event.recurring.then(|| event.clone());
            self.handle_event(event, now);
            if let Some(event) = recurring {
                self.queue.reschedule_recurring(event, now);
            }
            if self.shutdown_requested {
                break;
            }
        }
        handled
    }

    fn compensate_for_clock_jump(&mut self, now: Timestamp) {
        let Some(last) = self.last_tick else {
            return;
        };
        let delta = now - last;
        if delta >= 0 && delta <= self.config.time_change_threshold {
            return;
        }

        let shifted = self.queue.compensate_for_time_change(delta);
        let pending: Vec<(EntityKey, Timestamp)> = self
            .queue
            .iter()
            .filter(|event| event.kind == EventKind::Check)
            .filter_map(|event| event.target.map(|target| (target, event.run_time)))
            .collect();
        for (key, run_time) in pending {
            if let Some(entity) = self.registry.get_mut(key) {
                entity.state.next_check = run_time;
            }
        }
        if delta < 0 {
            for entity in self.registry.entities_mut() {
                entity.state.last_check = entity.state.last_check.min(now);
            }
        }
        warn!("System clock moved by {}s, {} scheduled events shifted", delta, shifted);
    }

    pub(crate) fn handle_event(&mut self, event: TimedEvent, now: Timestamp) {
        trace!("Running {} event #{} due at {}", event.kind, event.id, event.run_time);
        match event.kind {
            EventKind::Check => self.run_scheduled_check(event, now),
            EventKind::NotificationRetry => {
                if let Some(key) = event.target {
                    self.retry_notification(key, now);
                }
            }
            EventKind::DowntimeStart(id) => self.start_downtime(id, now),
            EventKind::DowntimeEnd(id) => self.end_downtime(id, now),
            EventKind::AckExpiry => {
                if let Some(key) = event.target {
                    self.expire_acknowledgement(key, now);
                }
            }
            EventKind::ReaperSweep => {
                let reaped = self.reap(now);
                if reaped > 0 {
                    debug!("Reaped {} check results", reaped);
                }
            }
            EventKind::FreshnessSweep => {
                self.check_freshness(now);
            }
            EventKind::OrphanSweep => {
                self.check_for_orphaned_checks(now);
            }
            EventKind::Shutdown => {
                info!("Shutdown event reached, stopping the event loop");
                self.shutdown_requested = true;
            }
        }
    }

    fn retry_notification(&mut self, key: EntityKey, now: Timestamp) {
        let Some(entity) = self.registry.get(key) else {
            return;
        };
        if entity.state.current_state.is_problem() && entity.state.state_type == StateType::Hard {
            self.notify(key, NotificationType::Normal, None, None, NotificationOptions::default(), now);
        }
    }

    /// Buffers a passive result until the next reaper sweep
    pub fn submit_passive_result(&mut self, result: CheckResult) {
        self.result_buffer.push_back(result);
    }

    /// Processes every buffered result. Returns how many were consumed.
    pub fn reap(&mut self, now: Timestamp) -> usize {
        let mut reaped = 0;
        while let Some(result) = self.result_buffer.pop_front() {
            reaped += 1;
            if let Err(err) = self.process_check_result(result, now) {
                warn!("Dropped buffered check result: {}", err);
            }
        }
        reaped
    }

    /// Completion of a command submitted through the executor
    pub fn command_finished(&mut self, result: ExecResult, now: Timestamp) -> Result<(), EngineError> {
        let Some(purpose) = self.in_flight.remove(&result.id) else {
            warn!("Completion for unknown command {}, ignoring", result.id);
            return Ok(());
        };
        match purpose {
            InFlight::Check { target, options, reschedule, latency, .. } => {
                let check = CheckResult::from_exec(target, options, reschedule, latency, &result);
                self.process_check_result(check, now)?;
            }
            InFlight::EventHandler { target } => {
                if result.exit_status != ExitStatus::Normal {
                    warn!("Event handler for {} did not complete: {:?}", target, result.exit_status);
                }
            }
            InFlight::Notification { target, contact } => {
                if result.exit_status != ExitStatus::Normal || result.exit_code != 0 {
                    warn!(
                        "Notification command for {} to {} failed ({:?}, code {})",
                        target, contact, result.exit_status, result.exit_code
                    );
                }
            }
        }
        Ok(())
    }

    /// Hands a command to the executor and remembers what it was for
    pub(crate) fn submit_command(&mut self, request: CommandRequest, purpose: InFlight) -> Result<CommandId, ExecError> {
        let id = self.executor.submit(request)?;
        self.in_flight.insert(id, purpose);
        Ok(id)
    }

    fn set_attribute(&mut self, key: EntityKey, attribute: &'static str, value: String) {
        self.publish(BrokerEvent::AdaptiveAttribute { target: key, attribute, value });
    }

    /// Enables or disables active checks of one entity
    pub fn set_checks_enabled(&mut self, key: EntityKey, enabled: bool, now: Timestamp) -> Result<(), EngineError> {
        let interval_length = self.config.interval_length;
        let entity = self.entity_mut(key)?;
        entity.state.checks_enabled = enabled;
        let next = entity.state.next_check;
        let interval = entity.check_interval_secs(interval_length);
        self.set_attribute(key, "checks_enabled", enabled.to_string());

        if enabled {
            if interval > 0 {
                self.reschedule_after(key, next.max(now), now);
            }
        } else {
            self.queue.cancel_for(EventKind::Check, key);
        }
        Ok(())
    }

    pub fn set_passive_checks_enabled(&mut self, key: EntityKey, enabled: bool) -> Result<(), EngineError> {
        self.entity_mut(key)?.state.accept_passive_checks = enabled;
        self.set_attribute(key, "accept_passive_checks", enabled.to_string());
        Ok(())
    }

    pub fn set_notifications_enabled(&mut self, key: EntityKey, enabled: bool) -> Result<(), EngineError> {
        self.entity_mut(key)?.state.notifications_enabled = enabled;
        self.set_attribute(key, "notifications_enabled", enabled.to_string());
        Ok(())
    }

    pub fn set_event_handler_enabled(&mut self, key: EntityKey, enabled: bool) -> Result<(), EngineError> {
        self.entity_mut(key)?.state.event_handler_enabled = enabled;
        self.set_attribute(key, "event_handler_enabled", enabled.to_string());
        Ok(())
    }

    /// Changes the regular check interval and moves a pending check to match
    pub fn set_check_interval(&mut self, key: EntityKey, units: f64, now: Timestamp) -> Result<(), EngineError> {
        let interval_length = self.config.interval_length;
        let entity = self.entity_mut(key)?;
        entity.config.check_interval = units.max(0.0);
        let interval = entity.check_interval_secs(interval_length);
        let enabled = entity.state.checks_enabled;
        let base = if entity.state.has_been_checked { entity.state.last_check } else { now };
        self.set_attribute(key, "check_interval", units.to_string());

        let pending_forced = self.queue.find(EventKind::Check, key).is_some_and(|event| event.options.forced);
        if pending_forced || !enabled {
            return Ok(());
        }
        self.queue.cancel_for(EventKind::Check, key);
        if interval > 0 {
            self.reschedule_after(key, base + interval, now);
        }
        Ok(())
    }

    pub fn set_retry_interval(&mut self, key: EntityKey, units: f64) -> Result<(), EngineError> {
        self.entity_mut(key)?.config.retry_interval = units.max(0.0);
        self.set_attribute(key, "retry_interval", units.to_string());
        Ok(())
    }

    pub fn set_max_attempts(&mut self, key: EntityKey, max_attempts: u32) -> Result<(), EngineError> {
        let max_attempts = max_attempts.max(1);
        let entity = self.entity_mut(key)?;
        entity.config.max_attempts = max_attempts;
        entity.state.current_attempt = entity.state.current_attempt.min(max_attempts);
        self.set_attribute(key, "max_attempts", max_attempts.to_string());
        Ok(())
    }

    pub fn set_global_notifications(&mut self, enabled: bool) {
        info!("Notifications globally {}", if enabled { "enabled" } else { "disabled" });
        self.config.enable_notifications = enabled;
    }

    pub fn set_global_event_handlers(&mut self, enabled: bool) {
        info!("Event handlers globally {}", if enabled { "enabled" } else { "disabled" });
        self.config.enable_event_handlers = enabled;
    }

    /// Global switch for active checks of one entity kind
    pub fn set_global_checks(&mut self, kind: EntityKind, enabled: bool) {
        match kind {
            EntityKind::Host => self.config.execute_host_checks = enabled,
            EntityKind::Service => self.config.execute_service_checks = enabled,
        }
    }
}
