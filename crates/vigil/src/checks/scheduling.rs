use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::processor::ResultDisposition;
use super::{CheckOptions, CheckResult, CheckViability};
use crate::commands::{CommandId, CommandRequest, ExecResult};
use crate::engine::{Engine, InFlight};
use crate::error::EngineError;
use crate::events::{ScheduleOutcome, TimedEvent};
use crate::notifications::macros::MacroContext;
use crate::objects::{EntityKey, EntityKind, StateType};
use crate::{ONE_WEEK, Timestamp};

/// Seconds a check result may be late before its check counts as orphaned
const ORPHAN_SLACK: i64 = 600;

pub(crate) fn to_datetime(at: Timestamp) -> DateTime<Utc> {
    DateTime::from_timestamp(at, 0).unwrap_or_default()
}

impl Engine {
    /// Queues a check of `key` at `at`.
    ///
    /// Regular checks are not queued for entities with active checks
    /// disabled. When a check is already pending the earlier one wins, unless
    /// only one of the two is forced.
    pub fn schedule_check(&mut self, key: EntityKey, at: Timestamp, options: CheckOptions) -> Option<ScheduleOutcome> {
        let entity = self.registry.get(key)?;
        if !options.forced && !entity.state.checks_enabled {
            debug!("Not scheduling a check of {}: active checks are disabled", entity.display_name());
            return None;
        }

        let outcome = self.queue.schedule_check(TimedEvent::check(key, at, options))?;
        let effective = outcome.effective_run_time(at);
        if let Some(entity) = self.registry.get_mut(key) {
            entity.state.next_check = effective;
        }
        debug!("Check of {} scheduled for {} ({:?})", key, effective, outcome);
        Some(outcome)
    }

    /// Moves the regular check of `key` to `preferred`, clamped to `now` and
    /// pushed into the entity's check period.
    pub(crate) fn reschedule_after(&mut self, key: EntityKey, preferred: Timestamp, now: Timestamp) {
        let Some(entity) = self.registry.get(key) else {
            return;
        };
        if !entity.state.should_be_scheduled {
            return;
        }
        let at = preferred.max(now);
        let at = self
            .registry
            .next_in_period(entity.config.check_period.as_deref(), at, entity.config.timezone)
            .unwrap_or(at + ONE_WEEK);

        if let Some(entity) = self.registry.get_mut(key) {
            entity.state.next_check = at;
        }
        self.schedule_check(key, at, CheckOptions::default());
    }

    pub(crate) fn run_scheduled_check(&mut self, event: TimedEvent, now: Timestamp) {
        let Some(key) = event.target else {
            return;
        };
        match self.check_viability(key, event.options, now) {
            CheckViability::Proceed => {
                if event.options.orphan {
                    info!("Running the check of {} again after its previous result was lost", key);
                }
                let latency = (now - event.run_time).max(0) as f64;
                if !self.run_async_check(key, event.options, true, latency, now) {
                    let retry = self
                        .registry
                        .get(key)
                        .map(|entity| entity.current_interval_secs(self.config.interval_length))
                        .unwrap_or(0);
                    if retry > 0 {
                        self.reschedule_after(key, now + retry, now);
                    }
                }
            }
            CheckViability::Rescheduled(at) => {
                if let Some(entity) = self.registry.get_mut(key) {
                    entity.state.next_check = at;
                }
                self.schedule_check(key, at, event.options);
            }
            CheckViability::Rejected(reason) => {
                debug!("Check of {} not run: {:?}", key, reason);
            }
        }
    }

    /// Expanded command line of the entity's check command
    pub(crate) fn build_check_request(&self, key: EntityKey) -> Option<CommandRequest> {
        let entity = self.registry.get(key)?;
        let reference = entity.config.check_command.as_deref()?;
        let template = self.registry.command(reference)?;
        let mut macros = MacroContext::for_entity(&self.registry, entity);
        macros.set_arguments(reference);

        let timeout = match key.kind() {
            EntityKind::Host => self.config.host_check_timeout,
            EntityKind::Service => self.config.service_check_timeout,
        };
        let mut request = CommandRequest::new(macros.expand(template), Duration::from_secs(timeout))
            .with_env("VIGIL_HOSTNAME", entity.config.host_name.clone());
        if key.kind() == EntityKind::Service {
            request = request.with_env("VIGIL_SERVICEDESC", entity.config.name.clone());
        }
        Some(request)
    }

    /// Starts a check of `key` right away without any viability gate.
    ///
    /// Returns false when nothing was started because the entity is
    /// unknown, already executing or has no usable check command. A check
    /// the executor refuses to start still counts as started: a failed
    /// result is buffered for the reaper in its place.
    pub fn run_async_check(
        &mut self,
        key: EntityKey,
        options: CheckOptions,
        reschedule: bool,
        latency: f64,
        now: Timestamp,
    ) -> bool {
        let Some(entity) = self.registry.get(key) else {
            return false;
        };
        if entity.state.is_executing {
            debug!("A check of {} is already running", entity.display_name());
            return false;
        }
        let Some(request) = self.build_check_request(key) else {
            warn!("{} has no usable check command", key);
            return false;
        };

        if let Some(entity) = self.registry.get_mut(key) {
            entity.state.is_executing = true;
        }
        if key.kind() == EntityKind::Service {
            self.running_service_checks += 1;
        }

        let command_line = request.command_line.clone();
        let purpose = InFlight::Check { target: key, options, reschedule, latency, started: now };
        match self.submit_command(request, purpose) {
            Ok(id) => {
                debug!("Started check of {} as command {}", key, id);
            }
            Err(err) => {
                warn!("Unable to run check of {} ({}): {}", key, command_line, err);
                let exec = ExecResult::crashed(CommandId::new(), to_datetime(now), err.to_string());
                self.result_buffer
                    .push_back(CheckResult::from_exec(key, options, reschedule, latency, &exec));
            }
        }
        true
    }

    /// Runs the check of `key` through the executor's blocking path and
    /// processes the result before returning.
    pub fn run_check_sync(&mut self, key: EntityKey, now: Timestamp) -> Result<ResultDisposition, EngineError> {
        let request = self.build_check_request(key).ok_or(EngineError::UnknownEntity(key))?;
        let exec = match self.executor.run(request) {
            Ok(exec) => exec,
            Err(err) => {
                warn!("Unable to run check of {}: {}", key, err);
                ExecResult::crashed(CommandId::new(), to_datetime(now), err.to_string())
            }
        };
        if key.kind() == EntityKind::Service {
            self.running_service_checks += 1;
        }
        let result = CheckResult::from_exec(key, CheckOptions::forced(), false, 0.0, &exec);
        self.process_check_result(result, now)
    }

    /// Seconds a result of `key` stays fresh
    pub fn freshness_threshold(&self, key: EntityKey) -> Option<i64> {
        let entity = self.registry.get(key)?;
        if entity.config.freshness_threshold > 0 {
            return Some(entity.config.freshness_threshold);
        }
        let state = &entity.state;
        let interval = if state.state_type == StateType::Hard || state.current_state.is_baseline() {
            entity.check_interval_secs(self.config.interval_length)
        } else {
            entity.retry_interval_secs(self.config.interval_length)
        };
        Some(interval + state.latency.ceil() as i64 + self.config.additional_freshness_latency)
    }

    /// Is the last result of `key` still within its freshness threshold?
    pub fn is_result_fresh(&self, key: EntityKey, now: Timestamp) -> bool {
        let (Some(entity), Some(threshold)) = (self.registry.get(key), self.freshness_threshold(key)) else {
            return true;
        };
        let reference = if entity.state.has_been_checked { entity.state.last_check } else { self.program_start };
        now <= reference + threshold
    }

    /// Forces a check of every entity whose result went stale. Returns how
    /// many checks were queued.
    pub(crate) fn check_freshness(&mut self, now: Timestamp) -> usize {
        let stale: Vec<EntityKey> = self
            .registry
            .entities()
            .filter(|entity| match entity.kind() {
                EntityKind::Host => self.config.check_host_freshness,
                EntityKind::Service => self.config.check_service_freshness,
            })
            .filter(|entity| entity.config.check_freshness)
            .filter(|entity| !entity.state.is_executing && !entity.state.is_being_freshened)
            .filter(|entity| entity.state.checks_enabled || entity.state.accept_passive_checks)
            .filter(|entity| {
                self.registry
                    .in_period(entity.config.check_period.as_deref(), now, entity.config.timezone)
            })
            .map(|entity| entity.key)
            .filter(|key| !self.is_result_fresh(*key, now))
            .collect();

        for key in &stale {
            let threshold = self.freshness_threshold(*key).unwrap_or(0);
            if let Some(entity) = self.registry.get_mut(*key) {
                let age = now - entity.state.last_check.max(self.program_start);
                warn!(
                    "The results of {} are stale by {}s (threshold={}s), forcing an immediate check",
                    entity.display_name(),
                    (age - threshold).max(0),
                    threshold
                );
                entity.state.is_being_freshened = true;
            }
            self.schedule_check(*key, now, CheckOptions::freshness());
        }
        stale.len()
    }

    /// Releases entities whose check result never came back and checks them
    /// again right away. Returns how many entities were released.
    pub(crate) fn check_for_orphaned_checks(&mut self, now: Timestamp) -> usize {
        let slack = self.config.check_reaper_interval.max(0) + ORPHAN_SLACK;
        let lost: Vec<(CommandId, EntityKey)> = self
            .in_flight
            .iter()
            .filter_map(|(id, purpose)| match purpose {
                InFlight::Check { target, latency, started, .. } => {
                    let expected = started + latency.ceil() as i64 + self.check_timeout(target.kind()) + slack;
                    (expected < now).then_some((*id, *target))
                }
                _ => None,
            })
            .filter(|(_, target)| self.detects_orphans(target.kind()))
            .collect();
        for (id, _) in &lost {
            self.in_flight.remove(id);
        }

        let tracked: HashSet<EntityKey> = self
            .in_flight
            .values()
            .filter_map(|purpose| match purpose {
                InFlight::Check { target, .. } => Some(*target),
                _ => None,
            })
            .collect();
        let mut orphaned: Vec<EntityKey> = lost.into_iter().map(|(_, target)| target).collect();
        orphaned.extend(
            self.registry
                .entities()
                .filter(|entity| entity.state.is_executing && !tracked.contains(&entity.key))
                .filter(|entity| self.detects_orphans(entity.kind()))
                .filter(|entity| {
                    let state = &entity.state;
                    state.next_check + state.latency.ceil() as i64 + self.check_timeout(entity.kind()) + slack < now
                })
                .map(|entity| entity.key),
        );
        orphaned.sort();
        orphaned.dedup();

        for key in &orphaned {
            let Some(entity) = self.registry.get_mut(*key) else {
                continue;
            };
            if !entity.state.is_executing {
                continue;
            }
            warn!(
                "The check of {} looks like it was orphaned (results never came back), scheduling an immediate check",
                entity.display_name()
            );
            entity.state.is_executing = false;
            if key.kind() == EntityKind::Service {
                self.running_service_checks = self.running_service_checks.saturating_sub(1);
            }
            self.schedule_check(*key, now, CheckOptions::orphan());
        }
        orphaned.len()
    }

    fn check_timeout(&self, kind: EntityKind) -> i64 {
        let timeout = match kind {
            EntityKind::Host => self.config.host_check_timeout,
            EntityKind::Service => self.config.service_check_timeout,
        };
        timeout as i64
    }

    fn detects_orphans(&self, kind: EntityKind) -> bool {
        match kind {
            EntityKind::Host => self.config.check_orphaned_hosts,
            EntityKind::Service => self.config.check_orphaned_services,
        }
    }

    /// First check of every schedulable entity. Retained `next_check`
    /// values in the future are kept, everything else is spread from `now`
    /// by the configured inter-check delay.
    pub(crate) fn schedule_initial_checks(&mut self, now: Timestamp) -> usize {
        let interval_length = self.config.interval_length;
        let candidates: Vec<(EntityKey, Timestamp)> = self
            .registry
            .entities()
            .filter(|entity| entity.check_interval_secs(interval_length) > 0)
            .filter(|entity| entity.state.checks_enabled && entity.config.check_command.is_some())
            .map(|entity| (entity.key, entity.state.next_check))
            .collect();

        let mut scheduled = 0;
        for (index, (key, retained)) in candidates.into_iter().enumerate() {
            let spread = now + (index as f64 * self.config.inter_check_delay) as i64;
            let preferred = if retained > now { retained } else { spread };
            if let Some(entity) = self.registry.get_mut(key) {
                entity.state.should_be_scheduled = true;
            }
            self.reschedule_after(key, preferred, now);
            scheduled += 1;
        }
        scheduled
    }

    /// On-demand checks of correlated entities, skipping those with a
    /// result inside the cache horizon or a check already running
    pub(crate) fn run_correlated_checks(&mut self, keys: Vec<EntityKey>, now: Timestamp) {
        let mut seen = Vec::with_capacity(keys.len());
        for key in keys {
            if seen.contains(&key) {
                continue;
            }
            seen.push(key);
            let Some(entity) = self.registry.get(key) else {
                continue;
            };
            let horizon = match key.kind() {
                EntityKind::Host => self.config.cached_host_check_horizon,
                EntityKind::Service => self.config.cached_service_check_horizon,
            };
            if entity.state.is_executing {
                continue;
            }
            if entity.state.has_been_checked && now - entity.state.last_check <= horizon {
                debug!("Using cached result of {} for correlation", entity.display_name());
                continue;
            }
            self.run_async_check(key, CheckOptions::default(), false, 0.0, now);
        }
    }
}
