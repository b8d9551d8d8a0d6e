//! Notification viability, escalations, recipient resolution and dispatch.

pub mod dispatch;
pub mod escalation;
pub mod macros;
pub mod recipients;
pub mod viability;

pub use dispatch::NotifyOutcome;
pub use viability::Denied;

use std::fmt;

use serde::{Deserialize, Serialize};

/// Reason a notification is sent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NotificationType {
    /// A problem or, at the baseline state, a recovery
    Normal,
    Acknowledgement,
    FlappingStart,
    FlappingStop,
    FlappingDisabled,
    DowntimeStart,
    DowntimeEnd,
    DowntimeCancelled,
    Custom,
}

impl NotificationType {
    pub fn is_flapping(self) -> bool {
        matches!(
            self,
            NotificationType::FlappingStart | NotificationType::FlappingStop | NotificationType::FlappingDisabled
        )
    }

    pub fn is_downtime(self) -> bool {
        matches!(
            self,
            NotificationType::DowntimeStart | NotificationType::DowntimeEnd | NotificationType::DowntimeCancelled
        )
    }

    /// Value of `$NOTIFICATIONTYPE$`; NORMAL resolves to PROBLEM or RECOVERY
    pub fn macro_value(self, recovery: bool) -> &'static str {
        match self {
            NotificationType::Normal if recovery => "RECOVERY",
            NotificationType::Normal => "PROBLEM",
            NotificationType::Acknowledgement => "ACKNOWLEDGEMENT",
            NotificationType::FlappingStart => "FLAPPINGSTART",
            NotificationType::FlappingStop => "FLAPPINGSTOP",
            NotificationType::FlappingDisabled => "FLAPPINGDISABLED",
            NotificationType::DowntimeStart => "DOWNTIMESTART",
            NotificationType::DowntimeEnd => "DOWNTIMEEND",
            NotificationType::DowntimeCancelled => "DOWNTIMECANCELLED",
            NotificationType::Custom => "CUSTOM",
        }
    }
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.macro_value(false))
    }
}

/// Modifiers of a single notification request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NotificationOptions {
    /// Skip every viability gate except the global switch
    pub forced: bool,
    /// Send to every escalation tier and the regular contacts
    pub broadcast: bool,
    /// Count this notification even when it is not NORMAL
    pub increment: bool,
}

impl NotificationOptions {
    pub fn forced() -> Self {
        Self { forced: true, ..Self::default() }
    }
}
