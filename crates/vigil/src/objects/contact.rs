use chrono_tz::Tz;

use super::{EntityKind, StateSet};

/// Someone who can receive notifications
#[derive(Debug, Clone)]
pub struct Contact {
    pub name: String,
    pub alias: String,
    pub email: String,
    pub pager: String,
    pub host_notifications_enabled: bool,
    pub service_notifications_enabled: bool,
    pub host_notification_period: Option<String>,
    pub service_notification_period: Option<String>,
    /// Host states this contact wants to hear about (UP enables recoveries)
    pub host_notify_on: StateSet,
    /// Service states this contact wants to hear about (OK enables recoveries)
    pub service_notify_on: StateSet,
    pub notify_on_flapping: bool,
    pub notify_on_downtime: bool,
    /// Command references (`name!arg1!arg2`) run for host notifications
    pub host_notification_commands: Vec<String>,
    pub service_notification_commands: Vec<String>,
    pub timezone: Tz,
}

impl Contact {
    pub fn notifications_enabled(&self, kind: EntityKind) -> bool {
        match kind {
            EntityKind::Host => self.host_notifications_enabled,
            EntityKind::Service => self.service_notifications_enabled,
        }
    }

    pub fn notification_period(&self, kind: EntityKind) -> Option<&str> {
        match kind {
            EntityKind::Host => self.host_notification_period.as_deref(),
            EntityKind::Service => self.service_notification_period.as_deref(),
        }
    }

    pub fn notify_on(&self, kind: EntityKind) -> StateSet {
        match kind {
            EntityKind::Host => self.host_notify_on,
            EntityKind::Service => self.service_notify_on,
        }
    }

    pub fn notification_commands(&self, kind: EntityKind) -> &[String] {
        match kind {
            EntityKind::Host => &self.host_notification_commands,
            EntityKind::Service => &self.service_notification_commands,
        }
    }
}

/// Named set of contacts
#[derive(Debug, Clone, Default)]
pub struct ContactGroup {
    pub name: String,
    pub members: Vec<String>,
}
