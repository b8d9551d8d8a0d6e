//! Escalation tiers: which apply right now and how they pace notifications.

use crate::Timestamp;
use crate::config::EngineConfig;
use crate::objects::{Checkable, Escalation, ObjectRegistry};

/// Notification number an escalation is compared against. A recovery
/// belongs to the tier of the last problem notification.
fn escalation_number(entity: &Checkable) -> u32 {
    let number = entity.state.current_notification_number;
    if entity.state.current_state.is_baseline() {
        number.saturating_sub(1)
    } else {
        number
    }
}

/// Does `escalation` apply to the entity's current notification?
pub fn is_valid_escalation(
    registry: &ObjectRegistry,
    escalation: &Escalation,
    entity: &Checkable,
    broadcast: bool,
    now: Timestamp,
) -> bool {
    if broadcast {
        return true;
    }
    let number = escalation_number(entity);
    if number < escalation.first_notification {
        return false;
    }
    if escalation.last_notification != 0 && number > escalation.last_notification {
        return false;
    }
    if !escalation.escalate_on.contains(entity.state.current_state) {
        return false;
    }
    registry.in_period(escalation.escalation_period.as_deref(), now, entity.config.timezone)
}

/// Is at least one escalation tier in effect for the entity?
pub fn should_escalate(registry: &ObjectRegistry, entity: &Checkable, now: Timestamp) -> bool {
    registry
        .escalations_for(entity.key)
        .iter()
        .any(|escalation| is_valid_escalation(registry, escalation, entity, false, now))
}

/// Time of the next NORMAL notification after one was sent at `now`, and
/// whether no further notification should be sent for this problem.
///
/// The smallest interval among the tiers in effect wins; tiers with a
/// negative interval defer to the entity's own interval.
pub fn next_notification_time(
    registry: &ObjectRegistry,
    config: &EngineConfig,
    entity: &Checkable,
    now: Timestamp,
) -> (Timestamp, bool) {
    let escalated = registry
        .escalations_for(entity.key)
        .iter()
        .filter(|escalation| escalation.notification_interval >= 0.0)
        .filter(|escalation| is_valid_escalation(registry, escalation, entity, false, now))
        .map(|escalation| escalation.notification_interval)
        .reduce(f64::min);
    let interval = escalated.unwrap_or(entity.config.notification_interval);

    let no_more = interval == 0.0 && !entity.config.is_volatile;
    let seconds = (interval * config.interval_length as f64) as i64;
    (now + seconds, no_more)
}
