//! Timed events and the ordered queue that holds them.

mod queue;

pub use queue::{ScheduleOutcome, TimedEventQueue};

use std::fmt;

use crate::Timestamp;
use crate::checks::CheckOptions;
use crate::objects::EntityKey;

/// Queue-assigned identity of a scheduled event
pub type EventId = u64;

/// What a timed event does when it comes due
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Run an active check of the target entity
    Check,
    /// A delayed NORMAL notification may now go out
    NotificationRetry,
    /// A scheduled downtime window opens
    DowntimeStart(u64),
    /// A scheduled downtime window closes
    DowntimeEnd(u64),
    /// An acknowledgement with a timeout expires
    AckExpiry,
    /// Process buffered check results
    ReaperSweep,
    /// Look for entities whose last result is too old
    FreshnessSweep,
    /// Look for checks whose result never came back
    OrphanSweep,
    /// Stop the event loop
    Shutdown,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Check => f.write_str("check"),
            EventKind::NotificationRetry => f.write_str("notification retry"),
            EventKind::DowntimeStart(id) => write!(f, "downtime #{id} start"),
            EventKind::DowntimeEnd(id) => write!(f, "downtime #{id} end"),
            EventKind::AckExpiry => f.write_str("acknowledgement expiry"),
            EventKind::ReaperSweep => f.write_str("check result reaper"),
            EventKind::FreshnessSweep => f.write_str("freshness sweep"),
            EventKind::OrphanSweep => f.write_str("orphaned check sweep"),
            EventKind::Shutdown => f.write_str("shutdown"),
        }
    }
}

/// One entry of the [`TimedEventQueue`].
///
/// Entities never hold on to their events; they are found again by
/// `(kind, target)` through [`TimedEventQueue::find`].
#[derive(Debug, Clone, PartialEq)]
pub struct TimedEvent {
    /// Zero until the queue accepts the event
    pub id: EventId,
    pub kind: EventKind,
    pub target: Option<EntityKey>,
    pub run_time: Timestamp,
    pub recurring: bool,
    /// Seconds between runs of a recurring event
    pub interval: i64,
    /// Shift this event when the system clock jumps
    pub compensate: bool,
    pub options: CheckOptions,
}

impl TimedEvent {
    pub fn new(kind: EventKind, target: Option<EntityKey>, run_time: Timestamp) -> Self {
        Self {
            id: 0,
            kind,
            target,
            run_time,
            recurring: false,
            interval: 0,
            compensate: true,
            options: CheckOptions::default(),
        }
    }

    pub fn check(target: EntityKey, run_time: Timestamp, options: CheckOptions) -> Self {
        Self::new(EventKind::Check, Some(target), run_time).with_options(options)
    }

    pub fn recurring(mut self, interval: i64) -> Self {
        self.recurring = true;
        self.interval = interval;
        self
    }

    pub fn with_options(mut self, options: CheckOptions) -> Self {
        self.options = options;
        self
    }

    pub fn without_compensation(mut self) -> Self {
        self.compensate = false;
        self
    }
}
