//! Fixed scheduled downtime windows.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::Timestamp;
use crate::broker::BrokerEvent;
use crate::comments::CommentKind;
use crate::engine::Engine;
use crate::error::EngineError;
use crate::events::{EventKind, TimedEvent};
use crate::notifications::{NotificationOptions, NotificationType};
use crate::objects::EntityKey;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Downtime {
    pub id: u64,
    pub target: EntityKey,
    pub start_time: Timestamp,
    pub end_time: Timestamp,
    pub author: String,
    pub comment: String,
    pub entry_time: Timestamp,
    /// Comment added while the window is open
    pub comment_id: Option<u64>,
    pub in_effect: bool,
}

#[derive(Debug, Default)]
pub struct DowntimeStore {
    downtimes: BTreeMap<u64, Downtime>,
}

impl DowntimeStore {
    pub fn get(&self, id: u64) -> Option<&Downtime> {
        self.downtimes.get(&id)
    }

    pub fn for_target(&self, target: EntityKey) -> impl Iterator<Item = &Downtime> {
        self.downtimes.values().filter(move |downtime| downtime.target == target)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Downtime> {
        self.downtimes.values()
    }

    pub fn len(&self) -> usize {
        self.downtimes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.downtimes.is_empty()
    }

    pub(crate) fn insert(&mut self, downtime: Downtime) {
        self.downtimes.insert(downtime.id, downtime);
    }

    pub(crate) fn get_mut(&mut self, id: u64) -> Option<&mut Downtime> {
        self.downtimes.get_mut(&id)
    }

    pub(crate) fn remove(&mut self, id: u64) -> Option<Downtime> {
        self.downtimes.remove(&id)
    }
}

impl Engine {
    /// Schedules a fixed downtime window on `key` and returns its id
    pub fn schedule_downtime(
        &mut self,
        key: EntityKey,
        start_time: Timestamp,
        end_time: Timestamp,
        author: &str,
        comment: &str,
        now: Timestamp,
    ) -> Result<u64, EngineError> {
        if !self.registry.contains(key) {
            return Err(EngineError::UnknownEntity(key));
        }
        if end_time <= start_time || end_time <= now {
            return Err(EngineError::InvalidDowntimeWindow { start: start_time, end: end_time });
        }

        let id = self.counters.next_downtime_id();
        self.downtimes.insert(Downtime {
            id,
            target: key,
            start_time,
            end_time,
            author: author.to_string(),
            comment: comment.to_string(),
            entry_time: now,
            comment_id: None,
            in_effect: false,
        });
        self.queue_downtime_events(id, key, start_time.max(now), end_time);
        info!("Scheduled downtime #{} on {} from {} to {}", id, key, start_time, end_time);
        Ok(id)
    }

    pub(crate) fn queue_downtime_events(&mut self, id: u64, key: EntityKey, start: Timestamp, end: Timestamp) {
        self.queue.schedule(TimedEvent::new(EventKind::DowntimeStart(id), Some(key), start));
        self.queue.schedule(TimedEvent::new(EventKind::DowntimeEnd(id), Some(key), end));
    }

    /// Cancels a downtime, ending it early when it is already in effect
    pub fn cancel_downtime(&mut self, id: u64, now: Timestamp) -> Result<(), EngineError> {
        let downtime = self.downtimes.get(id).ok_or(EngineError::UnknownDowntime(id))?;
        let (target, in_effect) = (downtime.target, downtime.in_effect);
        self.queue.cancel_for(EventKind::DowntimeStart(id), target);
        self.queue.cancel_for(EventKind::DowntimeEnd(id), target);
        if in_effect {
            self.stop_downtime(id, true, now);
        }
        self.downtimes.remove(id);
        info!("Cancelled downtime #{} on {}", id, target);
        Ok(())
    }

    pub(crate) fn start_downtime(&mut self, id: u64, now: Timestamp) {
        let Some(downtime) = self.downtimes.get(id) else {
            return;
        };
        if downtime.in_effect {
            return;
        }
        let target = downtime.target;
        let text = format!(
            "This {} has been scheduled for fixed downtime from {} to {}. Notifications for the {} will not be sent out during that time period.",
            noun(target),
            downtime.start_time,
            downtime.end_time,
            noun(target)
        );
        let author = downtime.author.clone();

        let options = NotificationOptions::default();
        self.notify(target, NotificationType::DowntimeStart, Some(author.as_str()), None, options, now);
        let Some(entity) = self.registry.get_mut(target) else {
            return;
        };
        entity.state.scheduled_downtime_depth += 1;
        info!("{} has entered a period of scheduled downtime", entity.display_name());

        let comment_id = self.add_comment(target, CommentKind::Downtime, &author, &text, false, now).ok();
        if let Some(downtime) = self.downtimes.get_mut(id) {
            downtime.in_effect = true;
            downtime.comment_id = comment_id;
        }
        self.publish(BrokerEvent::DowntimeStarted { target, downtime_id: id });
    }

    /// Puts a retained in-effect downtime back in place without notifying
    pub(crate) fn resume_downtime(&mut self, id: u64, now: Timestamp) {
        let Some(downtime) = self.downtimes.get(id) else {
            return;
        };
        let (target, author, text) = (downtime.target, downtime.author.clone(), downtime.comment.clone());
        let Some(entity) = self.registry.get_mut(target) else {
            return;
        };
        entity.state.scheduled_downtime_depth += 1;
        let comment_id = self.add_comment(target, CommentKind::Downtime, &author, &text, false, now).ok();
        if let Some(downtime) = self.downtimes.get_mut(id) {
            downtime.in_effect = true;
            downtime.comment_id = comment_id;
        }
    }

    pub(crate) fn end_downtime(&mut self, id: u64, now: Timestamp) {
        if self.downtimes.get(id).is_some_and(|downtime| downtime.in_effect) {
            self.stop_downtime(id, false, now);
        }
        if let Some(downtime) = self.downtimes.remove(id) {
            self.queue.cancel_for(EventKind::DowntimeStart(id), downtime.target);
        }
    }

    fn stop_downtime(&mut self, id: u64, cancelled: bool, now: Timestamp) {
        let Some(downtime) = self.downtimes.get_mut(id) else {
            return;
        };
        downtime.in_effect = false;
        let target = downtime.target;
        let comment_id = downtime.comment_id.take();

        if let Some(entity) = self.registry.get_mut(target) {
            entity.state.scheduled_downtime_depth = entity.state.scheduled_downtime_depth.saturating_sub(1);
            if entity.state.scheduled_downtime_depth == 0 {
                info!("{} has exited from a period of scheduled downtime", entity.display_name());
            }
        }
        if let Some(comment_id) = comment_id {
            self.comments.remove(comment_id);
        }

        let kind = if cancelled { NotificationType::DowntimeCancelled } else { NotificationType::DowntimeEnd };
        self.notify(target, kind, None, None, NotificationOptions::default(), now);
        self.publish(BrokerEvent::DowntimeStopped { target, downtime_id: id, cancelled });
    }
}

fn noun(key: EntityKey) -> &'static str {
    if key.is_host() { "host" } else { "service" }
}
