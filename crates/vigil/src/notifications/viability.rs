//! Should a notification for an entity go out at all?

use std::fmt;

use super::{NotificationOptions, NotificationType};
use crate::checks::dependencies::check_dependencies;
use crate::config::EngineConfig;
use crate::objects::{Checkable, DependencyKind, EntityKey, ObjectRegistry, State, StateType};
use crate::{ONE_YEAR, Timestamp};

/// Why a notification was not sent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denied {
    UnknownEntity,
    GloballyDisabled,
    MissingParent,
    /// Outside the notification period; NORMAL notifications may resume at
    /// the given time
    OutsidePeriod { resume_at: Option<Timestamp> },
    EntityDisabled,
    InDowntime,
    NotAProblem,
    FlappingNotWanted,
    DowntimeNotWanted,
    SoftState,
    Acknowledged,
    DependenciesFailed,
    StateNotWanted(State),
    /// Recovery of a problem nobody was told about
    NothingToRecover,
    /// The first notification delay has not elapsed yet
    FirstDelay { resume_at: Timestamp },
    Flapping,
    NoMoreNotifications,
    TooSoon { resume_at: Timestamp },
    ParentNotUp,
}

impl Denied {
    /// When a delayed NORMAL notification is worth another try
    pub fn resume_at(&self) -> Option<Timestamp> {
        match self {
            Denied::OutsidePeriod { resume_at } => *resume_at,
            Denied::FirstDelay { resume_at } => Some(*resume_at),
            _ => None,
        }
    }
}

impl fmt::Display for Denied {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Denied::UnknownEntity => f.write_str("unknown entity"),
            Denied::GloballyDisabled => f.write_str("notifications are disabled globally"),
            Denied::MissingParent => f.write_str("the parent host does not exist"),
            Denied::OutsidePeriod { .. } => f.write_str("outside the notification period"),
            Denied::EntityDisabled => f.write_str("notifications are disabled for this entity"),
            Denied::InDowntime => f.write_str("in scheduled downtime"),
            Denied::NotAProblem => f.write_str("not in a problem state"),
            Denied::FlappingNotWanted => f.write_str("flapping notifications are not wanted"),
            Denied::DowntimeNotWanted => f.write_str("downtime notifications are not wanted"),
            Denied::SoftState => f.write_str("in a soft state"),
            Denied::Acknowledged => f.write_str("the problem is acknowledged"),
            Denied::DependenciesFailed => f.write_str("notification dependencies failed"),
            Denied::StateNotWanted(state) => write!(f, "{state} notifications are not wanted"),
            Denied::NothingToRecover => f.write_str("no problem notification was sent"),
            Denied::FirstDelay { resume_at } => write!(f, "first notification delayed until {resume_at}"),
            Denied::Flapping => f.write_str("the entity is flapping"),
            Denied::NoMoreNotifications => f.write_str("no more notifications for this problem"),
            Denied::TooSoon { resume_at } => write!(f, "next notification not before {resume_at}"),
            Denied::ParentNotUp => f.write_str("the host is not up"),
        }
    }
}

/// Evaluates whether a notification of `kind` for `key` may be sent at `now`.
///
/// Gates are applied in a fixed order and the first failing one is
/// returned. Forced notifications only honour the global switch and the
/// existence of the parent host.
pub fn notification_viability(
    registry: &ObjectRegistry,
    config: &EngineConfig,
    key: EntityKey,
    kind: NotificationType,
    options: NotificationOptions,
    now: Timestamp,
) -> Result<(), Denied> {
    let entity = registry.get(key).ok_or(Denied::UnknownEntity)?;
    if !config.enable_notifications {
        return Err(Denied::GloballyDisabled);
    }
    let host = match key {
        EntityKey::Service(..) => Some(registry.get(key.host()).ok_or(Denied::MissingParent)?),
        EntityKey::Host(_) => None,
    };
    if options.forced {
        return Ok(());
    }

    let tz = entity.config.timezone;
    let period = entity
        .config
        .notification_period
        .as_deref()
        .or_else(|| host.and_then(|host| host.config.notification_period.as_deref()));
    if !registry.in_period(period, now, tz) {
        let resume_at = (kind == NotificationType::Normal).then(|| {
            registry
                .next_in_period(period, now, tz)
                .filter(|next| *next > now)
                .unwrap_or(now + ONE_YEAR)
        });
        return Err(Denied::OutsidePeriod { resume_at });
    }

    if !entity.state.notifications_enabled {
        return Err(Denied::EntityDisabled);
    }

    let in_downtime = entity.in_downtime() || host.is_some_and(Checkable::in_downtime);
    let state = &entity.state;
    match kind {
        NotificationType::Custom => {
            if in_downtime {
                return Err(Denied::InDowntime);
            }
            return Ok(());
        }
        NotificationType::Acknowledgement => {
            if state.current_state.is_baseline() {
                return Err(Denied::NotAProblem);
            }
            return Ok(());
        }
        kind if kind.is_flapping() => {
            if !entity.config.notify_on_flapping {
                return Err(Denied::FlappingNotWanted);
            }
            if in_downtime {
                return Err(Denied::InDowntime);
            }
            return Ok(());
        }
        kind if kind.is_downtime() => {
            if !entity.config.notify_on_downtime {
                return Err(Denied::DowntimeNotWanted);
            }
            if entity.in_downtime() {
                return Err(Denied::InDowntime);
            }
            return Ok(());
        }
        _ => {}
    }

    if state.state_type == StateType::Soft {
        return Err(Denied::SoftState);
    }
    if state.problem_acknowledged {
        return Err(Denied::Acknowledged);
    }

    let soft_deps = config.soft_state_dependencies;
    let dependencies_ok = check_dependencies(registry, key, DependencyKind::Notification, soft_deps, now).passed()
        && (key.is_host()
            || check_dependencies(registry, key.host(), DependencyKind::Notification, soft_deps, now).passed());
    if !dependencies_ok {
        return Err(Denied::DependenciesFailed);
    }

    let current = state.current_state;
    let recovery = current.is_baseline();
    if !entity.config.notify_on.contains(current) {
        return Err(Denied::StateNotWanted(current));
    }
    if recovery && state.notified_on.is_empty() {
        return Err(Denied::NothingToRecover);
    }

    if !recovery && state.current_notification_number == 0 {
        let delay = (entity.config.first_notification_delay * config.interval_length as f64) as i64;
        let since = if state.first_problem_time > 0 { state.first_problem_time } else { state.last_hard_state_change };
        if delay > 0 && now < since + delay {
            return Err(Denied::FirstDelay { resume_at: since + delay });
        }
    }

    if state.is_flapping {
        return Err(Denied::Flapping);
    }
    if in_downtime {
        return Err(Denied::InDowntime);
    }
    if recovery {
        return Ok(());
    }

    if state.no_more_notifications {
        return Err(Denied::NoMoreNotifications);
    }
    if let Some(host) = host {
        if host.state.current_state != State::Up {
            return Err(Denied::ParentNotUp);
        }
    }
    if now < state.next_notification && !entity.config.is_volatile {
        return Err(Denied::TooSoon { resume_at: state.next_notification });
    }
    Ok(())
}
