//! Durable snapshot of everything that must survive a restart.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::Timestamp;
use crate::comments::Comment;
use crate::counters::CounterValues;
use crate::downtime::Downtime;
use crate::engine::Engine;
use crate::error::EngineError;
use crate::events::{EventKind, TimedEvent};
use crate::objects::{EntityKey, RuntimeState};

pub const RETENTION_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityRetention {
    pub key: EntityKey,
    pub state: RuntimeState,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionSnapshot {
    pub version: u32,
    pub saved_at: Timestamp,
    pub counters: CounterValues,
    pub entities: Vec<EntityRetention>,
    /// Persistent comments only
    pub comments: Vec<Comment>,
    pub downtimes: Vec<Downtime>,
}

impl RetentionSnapshot {
    pub fn to_json(&self) -> Result<String, EngineError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self, EngineError> {
        Ok(serde_json::from_str(text)?)
    }
}

impl Engine {
    pub fn snapshot(&self, now: Timestamp) -> RetentionSnapshot {
        RetentionSnapshot {
            version: RETENTION_VERSION,
            saved_at: now,
            counters: self.counters.values(),
            entities: self
                .registry
                .entities()
                .map(|entity| EntityRetention { key: entity.key, state: entity.state.clone() })
                .collect(),
            comments: self.comments.persistent().cloned().collect(),
            downtimes: self.downtimes.iter().cloned().collect(),
        }
    }

    /// Loads retained state into the already configured entities.
    ///
    /// Entities no longer defined are skipped. Must run before
    /// [`Engine::start`] so retained check times drive the first schedule.
    /// Returns how many entities were restored.
    pub fn restore(&mut self, snapshot: RetentionSnapshot, now: Timestamp) -> usize {
        if snapshot.version != RETENTION_VERSION {
            warn!("Retention data has version {}, expected {}", snapshot.version, RETENTION_VERSION);
        }
        self.counters.advance_to(snapshot.counters);

        let mut restored = 0;
        for retained in snapshot.entities {
            let Some(entity) = self.registry.get_mut(retained.key) else {
                warn!("Retained state for {} has no matching object, skipping", retained.key);
                continue;
            };
            let mut state = retained.state;
            state.current_attempt = state.current_attempt.clamp(1, entity.config.max_attempts.max(1));
            state.scheduled_downtime_depth = 0;
            state.flapping_comment_id = None;
            state.is_flapping = state.is_flapping && state.flap_detection_enabled;
            state.flap_history.seed(state.current_state);
            entity.state = state;
            restored += 1;
        }

        for comment in snapshot.comments {
            if self.registry.contains(comment.target) {
                self.comments.add(comment);
            }
        }

        let expiring: Vec<(EntityKey, Timestamp)> = self
            .registry
            .entities()
            .filter(|entity| entity.state.problem_acknowledged && entity.state.acknowledgement_timeout > 0)
            .map(|entity| (entity.key, entity.state.last_acknowledgement + entity.state.acknowledgement_timeout))
            .collect();
        for (key, expires_at) in expiring {
            if expires_at <= now {
                self.expire_acknowledgement(key, now);
            } else {
                self.queue.schedule(TimedEvent::new(EventKind::AckExpiry, Some(key), expires_at));
            }
        }

        for downtime in snapshot.downtimes {
            if !self.registry.contains(downtime.target) || downtime.end_time <= now {
                continue;
            }
            let (id, target, start, end) = (downtime.id, downtime.target, downtime.start_time, downtime.end_time);
            let in_effect = downtime.in_effect;
            self.downtimes.insert(Downtime { in_effect: false, comment_id: None, ..downtime });
            if in_effect {
                self.resume_downtime(id, now);
            }
            self.queue_downtime_events(id, target, start.max(now), end);
        }

        info!("Restored state of {} entities saved at {}", restored, snapshot.saved_at);
        restored
    }
}
