//! Problem acknowledgements.

use tracing::info;

use crate::Timestamp;
use crate::broker::BrokerEvent;
use crate::comments::CommentKind;
use crate::engine::Engine;
use crate::error::EngineError;
use crate::events::{EventKind, TimedEvent};
use crate::notifications::{NotificationOptions, NotificationType};
use crate::objects::{AckType, EntityKey};

/// Parameters of an acknowledgement request
#[derive(Debug, Clone)]
pub struct Acknowledgement {
    pub ack_type: AckType,
    pub author: String,
    pub comment: String,
    /// Send an ACKNOWLEDGEMENT notification
    pub notify: bool,
    /// Keep the acknowledgement comment across restarts
    pub persistent: bool,
    /// Seconds until the acknowledgement expires, zero for never
    pub timeout: i64,
}

impl Acknowledgement {
    pub fn new(author: impl Into<String>, comment: impl Into<String>) -> Self {
        Self {
            ack_type: AckType::Normal,
            author: author.into(),
            comment: comment.into(),
            notify: true,
            persistent: false,
            timeout: 0,
        }
    }

    pub fn sticky(mut self) -> Self {
        self.ack_type = AckType::Sticky;
        self
    }

    pub fn with_timeout(mut self, seconds: i64) -> Self {
        self.timeout = seconds;
        self
    }
}

impl Engine {
    /// Marks the current problem of `key` as known.
    ///
    /// NORMAL notifications stop until the acknowledgement goes away: on the
    /// next state change for a regular acknowledgement, on recovery for a
    /// sticky one, or when its timeout expires.
    pub fn acknowledge_problem(&mut self, key: EntityKey, ack: Acknowledgement, now: Timestamp) -> Result<(), EngineError> {
        let entity = self.registry.get(key).ok_or(EngineError::UnknownEntity(key))?;
        if entity.state.current_state.is_baseline() {
            return Err(EngineError::NotAProblem(key));
        }
        info!("{} acknowledged by {}: {}", entity.display_name(), ack.author, ack.comment);

        if ack.notify {
            self.notify(
                key,
                NotificationType::Acknowledgement,
                Some(ack.author.as_str()),
                Some(ack.comment.as_str()),
                NotificationOptions::default(),
                now,
            );
        }

        let sticky = ack.ack_type == AckType::Sticky;
        let entity = self.entity_mut(key)?;
        entity.state.problem_acknowledged = true;
        entity.state.ack_type = if sticky { AckType::Sticky } else { AckType::Normal };
        entity.state.last_acknowledgement = now;
        entity.state.acknowledgement_timeout = ack.timeout.max(0);

        self.comments.remove_kind(key, CommentKind::Acknowledgement);
        self.add_comment(key, CommentKind::Acknowledgement, &ack.author, &ack.comment, ack.persistent, now)?;
        self.publish(BrokerEvent::AcknowledgementAdded { target: key, author: ack.author.clone(), sticky });

        self.queue.cancel_for(EventKind::AckExpiry, key);
        if ack.timeout > 0 {
            self.queue.schedule(TimedEvent::new(EventKind::AckExpiry, Some(key), now + ack.timeout));
        }
        Ok(())
    }

    /// Removes an acknowledgement, its comment and its pending expiry
    pub fn remove_acknowledgement(&mut self, key: EntityKey) -> Result<(), EngineError> {
        if !self.registry.contains(key) {
            return Err(EngineError::UnknownEntity(key));
        }
        self.clear_acknowledgement(key);
        Ok(())
    }

    pub(crate) fn clear_acknowledgement(&mut self, key: EntityKey) {
        let Some(entity) = self.registry.get_mut(key) else {
            return;
        };
        if !entity.state.problem_acknowledged {
            return;
        }
        entity.state.clear_acknowledgement();
        self.comments.remove_kind(key, CommentKind::Acknowledgement);
        self.queue.cancel_for(EventKind::AckExpiry, key);
    }

    pub(crate) fn expire_acknowledgement(&mut self, key: EntityKey, now: Timestamp) {
        let Some(entity) = self.registry.get(key) else {
            return;
        };
        let state = &entity.state;
        if state.problem_acknowledged
            && state.acknowledgement_timeout > 0
            && now >= state.last_acknowledgement + state.acknowledgement_timeout
        {
            info!("Acknowledgement of {} expired", entity.display_name());
            self.clear_acknowledgement(key);
        }
    }
}
