use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Process-wide id sequences shared by every entity.
///
/// One instance is created at startup (or restored from retention) and handed
/// to the engine; ids never repeat within its lifetime.
#[derive(Debug)]
pub struct SequenceCounters {
    next_event_id: AtomicU64,
    next_problem_id: AtomicU64,
    next_notification_id: AtomicU64,
    next_comment_id: AtomicU64,
    next_downtime_id: AtomicU64,
}

/// Serializable view of [`SequenceCounters`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterValues {
    pub next_event_id: u64,
    pub next_problem_id: u64,
    pub next_notification_id: u64,
    pub next_comment_id: u64,
    pub next_downtime_id: u64,
}

impl Default for CounterValues {
    fn default() -> Self {
        Self {
            next_event_id: 1,
            next_problem_id: 1,
            next_notification_id: 1,
            next_comment_id: 1,
            next_downtime_id: 1,
        }
    }
}

impl Default for SequenceCounters {
    fn default() -> Self {
        Self::from_values(CounterValues::default())
    }
}

impl SequenceCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_values(values: CounterValues) -> Self {
        Self {
            next_event_id: AtomicU64::new(values.next_event_id),
            next_problem_id: AtomicU64::new(values.next_problem_id),
            next_notification_id: AtomicU64::new(values.next_notification_id),
            next_comment_id: AtomicU64::new(values.next_comment_id),
            next_downtime_id: AtomicU64::new(values.next_downtime_id),
        }
    }

    pub fn values(&self) -> CounterValues {
        CounterValues {
            next_event_id: self.next_event_id.load(Ordering::SeqCst),
            next_problem_id: self.next_problem_id.load(Ordering::SeqCst),
            next_notification_id: self.next_notification_id.load(Ordering::SeqCst),
            next_comment_id: self.next_comment_id.load(Ordering::SeqCst),
            next_downtime_id: self.next_downtime_id.load(Ordering::SeqCst),
        }
    }

    /// Moves every sequence forward so that it is at least the given value.
    /// Never moves a sequence backwards.
    pub fn advance_to(&self, values: CounterValues) {
        self.next_event_id.fetch_max(values.next_event_id, Ordering::SeqCst);
        self.next_problem_id.fetch_max(values.next_problem_id, Ordering::SeqCst);
        self.next_notification_id.fetch_max(values.next_notification_id, Ordering::SeqCst);
        self.next_comment_id.fetch_max(values.next_comment_id, Ordering::SeqCst);
        self.next_downtime_id.fetch_max(values.next_downtime_id, Ordering::SeqCst);
    }

    pub fn next_event_id(&self) -> u64 {
        self.next_event_id.fetch_add(1, Ordering::SeqCst)
    }

    pub fn next_problem_id(&self) -> u64 {
        self.next_problem_id.fetch_add(1, Ordering::SeqCst)
    }

    pub fn next_notification_id(&self) -> u64 {
        self.next_notification_id.fetch_add(1, Ordering::SeqCst)
    }

    pub fn next_comment_id(&self) -> u64 {
        self.next_comment_id.fetch_add(1, Ordering::SeqCst)
    }

    pub fn next_downtime_id(&self) -> u64 {
        self.next_downtime_id.fetch_add(1, Ordering::SeqCst)
    }
}
