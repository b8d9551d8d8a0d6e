use std::collections::{BTreeMap, HashMap};

use tracing::{debug, error, trace};

use super::{EventId, EventKind, TimedEvent};
use crate::Timestamp;
use crate::objects::EntityKey;

/// Result of [`TimedEventQueue::schedule_check`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleOutcome {
    /// No check was pending for the entity
    Scheduled(EventId),
    /// The pending check was dropped in favour of the new one
    Replaced(EventId),
    /// The pending check wins; it runs at the given time
    Kept(EventId, Timestamp),
}

impl ScheduleOutcome {
    /// When the entity's next check will actually run
    pub fn effective_run_time(&self, requested: Timestamp) -> Timestamp {
        match self {
            ScheduleOutcome::Kept(_, run_time) => *run_time,
            _ => requested,
        }
    }
}

/// Events ordered by `(run_time, insertion sequence)`.
///
/// Targeted events are unique per `(kind, entity)`: scheduling a second one
/// replaces the first. Ids grow monotonically, so equal run times come out
/// in insertion order.
#[derive(Debug, Default)]
pub struct TimedEventQueue {
    order: BTreeMap<(Timestamp, EventId), ()>,
    events: HashMap<EventId, TimedEvent>,
    by_target: HashMap<(EventKind, EntityKey), EventId>,
    next_id: EventId,
}

impl TimedEventQueue {
    pub fn new() -> Self {
        Self { next_id: 1, ..Self::default() }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Inserts an event, replacing any pending event of the same kind for
    /// the same target. Returns the id of the queued event.
    pub fn schedule(&mut self, mut event: TimedEvent) -> EventId {
        if let Some(target) = event.target {
            if let Some(existing) = self.by_target.get(&(event.kind, target)).copied() {
                trace!("Replacing pending {} event for {}", event.kind, target);
                self.cancel(existing);
            }
        }

        if self.next_id == 0 {
            self.next_id = 1;
        }
        let id = self.next_id;
        self.next_id += 1;
        event.id = id;

        if let Some(target) = event.target {
            self.by_target.insert((event.kind, target), id);
        }
        self.order.insert((event.run_time, id), ());
        self.events.insert(id, event);
        id
    }

    /// Inserts a check event, honouring the at-most-one-check-per-entity rule.
    ///
    /// A pending forced check is only replaced by an earlier forced check. A
    /// pending regular check is replaced by any forced check or by an
    /// earlier regular one. Otherwise the pending check is kept and the new
    /// request is dropped. Check events without a target are refused.
    pub fn schedule_check(&mut self, event: TimedEvent) -> Option<ScheduleOutcome> {
        let Some(target) = event.target else {
            error!("Refusing to queue a check event without a target");
            return None;
        };

        let Some((existing_id, existing_run_time, existing_forced)) = self
            .find(EventKind::Check, target)
            .map(|existing| (existing.id, existing.run_time, existing.options.forced))
        else {
            return Some(ScheduleOutcome::Scheduled(self.schedule(event)));
        };

        let replace = if existing_forced {
            event.options.forced && event.run_time < existing_run_time
        } else {
            event.options.forced || event.run_time < existing_run_time
        };

        if replace {
            debug!(
                "Replacing check of {} at {} with {}check at {}",
                target,
                existing_run_time,
                if event.options.forced { "forced " } else { "" },
                event.run_time
            );
            Some(ScheduleOutcome::Replaced(self.schedule(event)))
        } else {
            trace!(
                "Keeping pending check of {} at {}, discarding request for {}",
                target, existing_run_time, event.run_time
            );
            Some(ScheduleOutcome::Kept(existing_id, existing_run_time))
        }
    }

    /// Removes an event. Unknown ids (already dispatched or cancelled) are
    /// ignored.
    pub fn cancel(&mut self, id: EventId) -> Option<TimedEvent> {
        let event = self.events.remove(&id)?;
        self.order.remove(&(event.run_time, id));
        if let Some(target) = event.target {
            if self.by_target.get(&(event.kind, target)) == Some(&id) {
                self.by_target.remove(&(event.kind, target));
            }
        }
        Some(event)
    }

    /// Removes the pending event of `kind` for `target`, if any
    pub fn cancel_for(&mut self, kind: EventKind, target: EntityKey) -> Option<TimedEvent> {
        let id = self.by_target.get(&(kind, target)).copied()?;
        self.cancel(id)
    }

    pub fn find(&self, kind: EventKind, target: EntityKey) -> Option<&TimedEvent> {
        let id = self.by_target.get(&(kind, target))?;
        self.events.get(id)
    }

    pub fn get(&self, id: EventId) -> Option<&TimedEvent> {
        self.events.get(&id)
    }

    /// Run time of the earliest event
    pub fn next_run_time(&self) -> Option<Timestamp> {
        self.order.keys().next().map(|(run_time, _)| *run_time)
    }

    /// Removes and returns the earliest event if it is due at `now`
    pub fn pop_next_due(&mut self, now: Timestamp) -> Option<TimedEvent> {
        let (run_time, id) = *self.order.keys().next()?;
        if run_time > now {
            return None;
        }
        let event = self.cancel(id);
        if event.is_none() {
            error!("Event queue index points at missing event {}", id);
            self.order.remove(&(run_time, id));
        }
        event
    }

    /// Removes and returns every event due at `now`, earliest first
    pub fn pop_due(&mut self, now: Timestamp) -> Vec<TimedEvent> {
        let mut due = Vec::new();
        while let Some(event) = self.pop_next_due(now) {
            due.push(event);
        }
        due
    }

    /// Re-queues a dispatched recurring event one interval later, never in
    /// the past
    pub fn reschedule_recurring(&mut self, mut event: TimedEvent, now: Timestamp) -> Option<EventId> {
        if !event.recurring || event.interval <= 0 {
            return None;
        }
        event.run_time += event.interval;
        if event.run_time < now {
            event.run_time = now;
        }
        Some(self.schedule(event))
    }

    /// Shifts every compensating event by `delta` seconds after a system
    /// clock jump. Returns the number of events moved.
    pub fn compensate_for_time_change(&mut self, delta: i64) -> usize {
        let mut moved = 0;
        let ids: Vec<EventId> = self.order.keys().map(|(_, id)| *id).collect();
        for id in ids {
            let Some(event) = self.events.get_mut(&id) else { continue };
            if !event.compensate {
                continue;
            }
            self.order.remove(&(event.run_time, id));
            event.run_time = (event.run_time + delta).max(0);
            self.order.insert((event.run_time, id), ());
            moved += 1;
        }
        moved
    }

    /// Events in dispatch order
    pub fn iter(&self) -> impl Iterator<Item = &TimedEvent> {
        self.order.keys().filter_map(|(_, id)| self.events.get(id))
    }
}
