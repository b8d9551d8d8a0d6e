//! The check result state machine.
//!
//! A result moves an entity between SOFT and HARD states, counts attempts,
//! correlates with the parent host, triggers flap detection, notifications
//! and event handlers, and finally reschedules the entity's next check.

use std::time::Duration;

use tracing::{debug, info, trace, warn};

use super::CheckResult;
use super::output::interpret;
use crate::broker::BrokerEvent;
use crate::commands::CommandRequest;
use crate::engine::{Engine, InFlight};
use crate::error::EngineError;
use crate::notifications::macros::MacroContext;
use crate::notifications::{NotificationOptions, NotificationType};
use crate::objects::{AckType, CheckType, EntityKey, EntityKind, State, StateType};
use crate::Timestamp;

/// What happened to a check result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultDisposition {
    Processed,
    /// Passive results are not accepted globally or by the entity
    PassiveRejected,
    /// A freshness check completed after a newer result already arrived
    AlreadyFresh,
}

impl Engine {
    /// Applies one check result to its entity.
    pub fn process_check_result(&mut self, result: CheckResult, now: Timestamp) -> Result<ResultDisposition, EngineError> {
        let key = result.target;
        let kind = key.kind();
        let Some(entity) = self.registry.get(key) else {
            warn!("Discarding check result for unknown entity {}", key);
            return Err(EngineError::UnknownEntity(key));
        };

        if result.check_type == CheckType::Active && kind == EntityKind::Service {
            self.running_service_checks = self.running_service_checks.saturating_sub(1);
        }
        if result.check_type == CheckType::Passive {
            let globally = match kind {
                EntityKind::Host => self.config.accept_passive_host_checks,
                EntityKind::Service => self.config.accept_passive_service_checks,
            };
            if !globally || !entity.state.accept_passive_checks {
                debug!("Discarding passive result for {}: passive checks are not accepted", entity.display_name());
                return Ok(ResultDisposition::PassiveRejected);
            }
        }

        let already_fresh = result.options.freshness && self.is_result_fresh(key, now);
        {
            let entity = self.entity_mut(key)?;
            if result.options.freshness {
                entity.state.is_being_freshened = false;
            }
            if result.check_type == CheckType::Active {
                entity.state.is_executing = false;
            }
        }
        if already_fresh {
            debug!("Discarding freshness check result for {}: a newer result arrived", key);
            return Ok(ResultDisposition::AlreadyFresh);
        }

        let interpretation = interpret(kind, &result, self.config.service_check_timeout_state);
        let mut new_state = interpretation.state;
        if kind == EntityKind::Host && new_state.is_problem() {
            new_state = self.host_reachability(key);
        }
        let last_check = result.start_time.timestamp();
        let execution_time = result.execution_time();
        let log_passive = self.config.log_passive_checks;
        let interval_length = self.config.interval_length;

        let entity = self.entity_mut(key)?;
        let max_attempts = entity.config.max_attempts.max(1);
        let state = &mut entity.state;
        let last_state = state.current_state;
        let previous_attempt = state.current_attempt;
        state.last_state = last_state;
        state.check_type = result.check_type;
        state.latency = result.latency.max(0.0);
        state.execution_time = execution_time;
        state.last_check = last_check;
        state.plugin_output = interpretation.output.short;
        state.long_output = interpretation.output.long;
        state.perf_data = interpretation.output.perf_data;
        state.current_state = new_state;
        if new_state.is_baseline() {
            state.last_time_ok = last_check;
        } else {
            state.last_time_problem = last_check;
        }
        if new_state.is_problem() {
            if last_state.is_baseline() {
                state.current_attempt = 2.min(max_attempts);
            } else if state.state_type == StateType::Soft {
                state.current_attempt = (state.current_attempt + 1).min(max_attempts);
            }
        }
        if result.check_type == CheckType::Passive && log_passive {
            info!(
                "PASSIVE {} CHECK: {};{};{}",
                kind_label(kind),
                entity.display_name(),
                result.return_code,
                entity.state.plugin_output
            );
        }

        let route_up = new_state.is_baseline() || self.route_reachable(key, new_state, last_state, now);

        let entity = self.entity_mut(key)?;
        if !route_up {
            entity.state.current_attempt = previous_attempt;
        }
        let state = &entity.state;
        let state_change = new_state != last_state;
        let hard_state_change = if route_up {
            (state.host_problem_at_last_check && new_state.is_baseline())
                || (state.current_attempt >= max_attempts && new_state != state.last_hard_state)
        } else {
            new_state != state.last_hard_state
        };

        let mut reschedule = result.reschedule_check;
        if state_change || hard_state_change {
            reschedule = true;
            self.record_state_change(key, last_state, state_change, last_check)?;
        }

        let mut flapping_checked = false;
        let mut correlated = Vec::new();
        let preferred_interval;

        if new_state.is_baseline() {
            match kind {
                EntityKind::Service => self.check_route_on_recovery(key, now),
                EntityKind::Host if state_change || hard_state_change => {
                    correlated.extend(self.recovery_propagation(key));
                }
                EntityKind::Host => {}
            }

            let entity = self.entity_mut(key)?;
            let owed_recovery = !entity.state.notified_on.is_empty();
            entity.state.current_attempt = 1;
            entity.state.state_type = StateType::Hard;
            if hard_state_change {
                entity.state.last_hard_state_change = last_check;
            }

            if hard_state_change {
                self.log_alert(key, StateType::Hard);
                self.check_for_flapping(key, true, true, now);
                flapping_checked = true;
                self.notify(key, NotificationType::Normal, None, None, NotificationOptions::default(), now);
                self.handle_state_change_event(key, now);
            } else if state_change {
                self.log_alert(key, StateType::Soft);
                self.handle_state_change_event(key, now);
            } else if owed_recovery {
                self.notify(key, NotificationType::Normal, None, None, NotificationOptions::default(), now);
            }

            self.clear_acknowledgement(key);
            let entity = self.entity_mut(key)?;
            let state = &mut entity.state;
            state.host_problem_at_last_check = false;
            state.last_hard_state = new_state;
            state.last_notification = 0;
            state.next_notification = 0;
            state.no_more_notifications = false;
            if state.notified_on.is_empty() {
                state.current_notification_number = 0;
            }
            preferred_interval = entity.check_interval_secs(interval_length);
        } else if !route_up {
            let entity = self.entity_mut(key)?;
            let state = &mut entity.state;
            state.state_type = StateType::Hard;
            state.host_problem_at_last_check = true;
            if hard_state_change {
                state.last_hard_state_change = last_check;
                state.last_hard_state = new_state;
            }
            debug!("{} is {} while its parent is not reachable", entity.display_name(), new_state);

            if hard_state_change {
                self.log_alert(key, StateType::Hard);
                self.check_for_flapping(key, true, true, now);
                flapping_checked = true;
                self.handle_state_change_event(key, now);
            }
            preferred_interval = self.entity_mut(key)?.check_interval_secs(interval_length);
        } else {
            let entity = self.entity_mut(key)?;
            if entity.state.host_problem_at_last_check {
                entity.state.host_problem_at_last_check = false;
                if entity.state.state_type == StateType::Soft {
                    entity.state.current_attempt = 1;
                }
            }
            let attempt = entity.state.current_attempt;
            let volatile = entity.config.is_volatile;

            if attempt < max_attempts {
                entity.state.state_type = StateType::Soft;
                self.log_alert(key, StateType::Soft);
                self.handle_state_change_event(key, now);
                if attempt + 1 == max_attempts {
                    correlated.extend(self.predictive_dependency_checks(key));
                }
                preferred_interval = self.entity_mut(key)?.retry_interval_secs(interval_length);
            } else {
                entity.state.state_type = StateType::Hard;
                if hard_state_change || volatile {
                    self.log_alert(key, StateType::Hard);
                }
                self.check_for_flapping(key, true, true, now);
                flapping_checked = true;
                self.notify(key, NotificationType::Normal, None, None, NotificationOptions::default(), now);
                if hard_state_change || volatile {
                    self.handle_state_change_event(key, now);
                }
                let entity = self.entity_mut(key)?;
                if hard_state_change {
                    entity.state.last_hard_state_change = last_check;
                }
                entity.state.last_hard_state = new_state;
                preferred_interval = entity.check_interval_secs(interval_length);
            }
        }

        if kind == EntityKind::Host && new_state.is_problem() && state_change {
            correlated.extend(self.problem_propagation(key));
        }

        if reschedule && preferred_interval > 0 {
            self.reschedule_after(key, last_check + preferred_interval, now);
        }

        let entity = self.entity_mut(key)?;
        entity.state.has_been_checked = true;
        let event = BrokerEvent::CheckProcessed {
            target: key,
            check_type: result.check_type,
            state: entity.state.current_state,
            state_type: entity.state.state_type,
            attempt: entity.state.current_attempt,
            return_code: result.return_code,
            early_timeout: result.early_timeout,
            latency: entity.state.latency,
            execution_time,
            output: entity.state.plugin_output.clone(),
        };
        trace!(
            "{} is now {} {} (attempt {}/{})",
            entity.display_name(),
            entity.state.current_state,
            entity.state.state_type.as_str(),
            entity.state.current_attempt,
            max_attempts
        );
        self.publish(event);

        if !flapping_checked {
            self.check_for_flapping(key, true, true, now);
        }
        self.run_correlated_checks(correlated, now);
        Ok(ResultDisposition::Processed)
    }

    /// Bookkeeping shared by every soft or hard state change
    fn record_state_change(
        &mut self,
        key: EntityKey,
        last_state: State,
        state_change: bool,
        last_check: Timestamp,
    ) -> Result<(), EngineError> {
        let counters = self.counters.clone();
        let entity = self.entity_mut(key)?;
        let state = &mut entity.state;
        let current = state.current_state;

        state.last_notification = 0;
        state.next_notification = 0;
        state.no_more_notifications = false;
        if state.last_state_change == 0 {
            state.last_state_change = last_check;
        }
        if state.last_hard_state_change == 0 {
            state.last_hard_state_change = last_check;
        }

        if state_change {
            state.last_state_change = last_check;
            state.last_event_id = state.current_event_id;
            state.current_event_id = counters.next_event_id();
            if last_state.is_baseline() && current.is_problem() {
                state.current_problem_id = counters.next_problem_id();
                state.first_problem_time = last_check;
                state.notified_on.clear();
                state.current_notification_number = 0;
            } else if current.is_baseline() && last_state.is_problem() {
                state.last_problem_id = state.current_problem_id;
                state.current_problem_id = 0;
            }
        }

        let normal_ack = state.problem_acknowledged && state.ack_type == AckType::Normal;
        let event = BrokerEvent::StateChangeStart {
            target: key,
            state: current,
            state_type: state.state_type,
            attempt: state.current_attempt,
            max_attempts: entity.config.max_attempts,
        };
        if normal_ack {
            self.clear_acknowledgement(key);
        }
        self.publish(event);
        Ok(())
    }

    /// DOWN when the host has no parents or at least one parent is UP,
    /// UNREACHABLE otherwise
    pub fn host_reachability(&self, host: EntityKey) -> State {
        let Some(entity) = self.registry.get(host) else {
            return State::Down;
        };
        let parents = &entity.config.parents;
        if parents.is_empty() {
            return State::Down;
        }
        let any_up = parents
            .iter()
            .filter_map(|parent| self.registry.get(*parent))
            .any(|parent| parent.state.current_state == State::Up);
        if any_up { State::Down } else { State::Unreachable }
    }

    /// Can the result of a problem check be blamed on the entity itself?
    ///
    /// Services look at their host: a host that is not UP makes the service
    /// unreachable. An UP host whose result is outside the cache horizon is
    /// re-checked on a state change. Hosts are unreachable when all their
    /// parents are down.
    fn route_reachable(&mut self, key: EntityKey, new_state: State, last_state: State, now: Timestamp) -> bool {
        match key.kind() {
            EntityKind::Host => new_state != State::Unreachable,
            EntityKind::Service => {
                let host = key.host();
                let Some(entity) = self.registry.get(host) else {
                    return true;
                };
                if entity.state.current_state != State::Up {
                    debug!("Host of {} is {}, not blaming the service", key, entity.state.current_state);
                    return false;
                }
                let cached = entity.state.has_been_checked
                    && now - entity.state.last_check <= self.config.cached_host_check_horizon;
                if !cached && new_state != last_state {
                    self.run_async_check(host, Default::default(), false, 0.0, now);
                }
                true
            }
        }
    }

    /// A service recovered: make sure its host gets looked at if it is not UP
    fn check_route_on_recovery(&mut self, key: EntityKey, now: Timestamp) {
        let host = key.host();
        let Some(entity) = self.registry.get(host) else {
            return;
        };
        if entity.state.current_state == State::Up {
            return;
        }
        let cached = entity.state.has_been_checked
            && now - entity.state.last_check <= self.config.cached_host_check_horizon;
        if !cached {
            self.run_async_check(host, Default::default(), false, 0.0, now);
        }
    }

    /// Parents and children worth re-checking after a host recovery
    fn recovery_propagation(&self, host: EntityKey) -> Vec<EntityKey> {
        let Some(entity) = self.registry.get(host) else {
            return Vec::new();
        };
        entity
            .config
            .parents
            .iter()
            .chain(self.registry.child_hosts(host))
            .copied()
            .filter(|key| self.registry.get(*key).is_some_and(|other| other.state.current_state != State::Up))
            .collect()
    }

    /// Parents and children worth re-checking after a host went down
    fn problem_propagation(&self, host: EntityKey) -> Vec<EntityKey> {
        let Some(entity) = self.registry.get(host) else {
            return Vec::new();
        };
        let parents = entity
            .config
            .parents
            .iter()
            .copied()
            .filter(|key| self.registry.get(*key).is_some_and(|parent| parent.state.current_state == State::Up));
        let children = self
            .registry
            .child_hosts(host)
            .iter()
            .copied()
            .filter(|key| {
                self.registry
                    .get(*key)
                    .is_some_and(|child| child.state.current_state != State::Unreachable)
            });
        parents.chain(children).collect()
    }

    /// Masters of the entity's dependencies, checked ahead of the hard state
    fn predictive_dependency_checks(&self, key: EntityKey) -> Vec<EntityKey> {
        let enabled = match key.kind() {
            EntityKind::Host => self.config.enable_predictive_host_dependency_checks,
            EntityKind::Service => self.config.enable_predictive_service_dependency_checks,
        };
        if !enabled {
            return Vec::new();
        }
        self.registry.dependencies_for(key).iter().map(|dependency| dependency.master).collect()
    }

    /// Writes the alert line for the entity's current state
    pub(crate) fn log_alert(&self, key: EntityKey, state_type: StateType) {
        let Some(entity) = self.registry.get(key) else {
            return;
        };
        let log_retries = match key.kind() {
            EntityKind::Host => self.config.log_host_retries,
            EntityKind::Service => self.config.log_service_retries,
        };
        if state_type == StateType::Soft && !log_retries && entity.state.current_state.is_problem() {
            return;
        }
        let state = &entity.state;
        match key {
            EntityKey::Host(_) => info!(
                "HOST ALERT: {};{};{};{};{}",
                entity.config.name,
                state.current_state,
                state_type.as_str(),
                state.current_attempt,
                state.plugin_output
            ),
            EntityKey::Service(..) => info!(
                "SERVICE ALERT: {};{};{};{};{};{}",
                entity.config.host_name,
                entity.config.name,
                state.current_state,
                state_type.as_str(),
                state.current_attempt,
                state.plugin_output
            ),
        }
    }

    /// Runs the global and the entity's own event handler
    pub(crate) fn handle_state_change_event(&mut self, key: EntityKey, now: Timestamp) {
        let Some(entity) = self.registry.get(key) else {
            return;
        };
        self.publish(BrokerEvent::StateChangeEnd {
            target: key,
            state: entity.state.current_state,
            state_type: entity.state.state_type,
            attempt: entity.state.current_attempt,
            max_attempts: entity.config.max_attempts,
        });
        if !self.config.enable_event_handlers || !entity.state.event_handler_enabled {
            return;
        }

        let global = match key.kind() {
            EntityKind::Host => self.config.global_host_event_handler.clone(),
            EntityKind::Service => self.config.global_service_event_handler.clone(),
        };
        let handlers: Vec<String> = global.into_iter().chain(entity.config.event_handler.clone()).collect();
        for reference in handlers {
            self.run_event_handler(key, &reference, now);
        }
    }

    fn run_event_handler(&mut self, key: EntityKey, reference: &str, now: Timestamp) {
        let Some(entity) = self.registry.get(key) else {
            return;
        };
        let Some(template) = self.registry.command(reference) else {
            warn!("Event handler '{}' of {} is not defined", reference, entity.display_name());
            return;
        };
        let mut macros = MacroContext::for_entity(&self.registry, entity);
        macros.set_arguments(reference);
        let command_line = macros.expand(template);
        info!(
            "{} EVENT HANDLER: {};{};{};{};{}",
            kind_label(key.kind()),
            entity.display_name(),
            entity.state.current_state,
            entity.state.state_type.as_str(),
            entity.state.current_attempt,
            reference
        );

        let request = CommandRequest::new(command_line, Duration::from_secs(self.config.event_handler_timeout));
        if let Err(err) = self.submit_command(request, InFlight::EventHandler { target: key }) {
            warn!("Unable to run event handler for {} at {}: {}", key, now, err);
        }
    }
}

fn kind_label(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Host => "HOST",
        EntityKind::Service => "SERVICE",
    }
}
