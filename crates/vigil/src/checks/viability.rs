use rand::Rng;
use tracing::debug;

use super::CheckOptions;
use super::dependencies::check_dependencies;
use crate::engine::Engine;
use crate::objects::{DependencyKind, EntityKey, EntityKind};
use crate::{ONE_WEEK, Timestamp};

/// Decision taken when a scheduled check comes due
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckViability {
    /// Run the check now
    Proceed,
    /// Do not run now, try again at the given time
    Rescheduled(Timestamp),
    /// Do not run and do not reschedule
    Rejected(RejectReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    UnknownEntity,
    NoCheckCommand,
    /// Checks are disabled and the entity has no interval to come back at
    NotSchedulable,
}

impl Engine {
    /// Decides whether a due check of `key` may run at `now`.
    ///
    /// Forced checks skip the enablement, period, dependency and parallelism
    /// gates. A check that is already in flight always moves to the next
    /// interval so the entity keeps a pending check.
    pub fn check_viability(&self, key: EntityKey, options: CheckOptions, now: Timestamp) -> CheckViability {
        let Some(entity) = self.registry.get(key) else {
            return CheckViability::Rejected(RejectReason::UnknownEntity);
        };
        if entity.config.check_command.is_none() {
            return CheckViability::Rejected(RejectReason::NoCheckCommand);
        }

        let interval = entity.current_interval_secs(self.config.interval_length);
        if entity.state.is_executing {
            debug!("A check of {} is already being executed, rescheduling", entity.display_name());
            return CheckViability::Rescheduled(now + interval.max(1));
        }
        if options.forced {
            return CheckViability::Proceed;
        }

        let globally_enabled = match key.kind() {
            EntityKind::Host => self.config.execute_host_checks,
            EntityKind::Service => self.config.execute_service_checks,
        };
        if !globally_enabled || !entity.state.checks_enabled {
            if interval <= 0 {
                return CheckViability::Rejected(RejectReason::NotSchedulable);
            }
            return CheckViability::Rescheduled(now + interval);
        }

        let tz = entity.config.timezone;
        let period = entity.config.check_period.as_deref();
        if !self.registry.in_period(period, now, tz) {
            let next = self
                .registry
                .next_in_period(period, now, tz)
                .filter(|next| *next > now)
                .unwrap_or(now + ONE_WEEK);
            debug!("{} is outside its check period, next valid time {}", entity.display_name(), next);
            return CheckViability::Rescheduled(next);
        }

        let use_soft_states = self.config.soft_state_dependencies;
        if !check_dependencies(&self.registry, key, DependencyKind::Execution, use_soft_states, now).passed() {
            return CheckViability::Rescheduled(now + interval.max(1));
        }

        if key.kind() == EntityKind::Service
            && self.config.max_parallel_service_checks > 0
            && self.running_service_checks >= self.config.max_parallel_service_checks
        {
            let nudge = 5 + rand::thread_rng().gen_range(0..10);
            debug!(
                "Max concurrent service checks ({}) reached, nudging {} by {}s",
                self.config.max_parallel_service_checks,
                entity.display_name(),
                nudge
            );
            return CheckViability::Rescheduled(now + nudge);
        }

        CheckViability::Proceed
    }
}
