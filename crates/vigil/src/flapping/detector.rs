use tracing::{debug, info};

use super::{FlapTransition, Thresholds, evaluate};
use crate::Timestamp;
use crate::broker::BrokerEvent;
use crate::comments::CommentKind;
use crate::engine::Engine;
use crate::error::EngineError;
use crate::notifications::{NotificationOptions, NotificationType};
use crate::objects::{EntityKey, EntityKind, StateType};

const FLAPPING_AUTHOR: &str = "(vigil)";

impl Engine {
    /// Flap thresholds in effect for `key`
    pub fn flap_thresholds(&self, key: EntityKey) -> Option<Thresholds> {
        let entity = self.registry.get(key)?;
        let (global_low, global_high) = match key.kind() {
            EntityKind::Host => (self.config.low_host_flap_threshold, self.config.high_host_flap_threshold),
            EntityKind::Service => (self.config.low_service_flap_threshold, self.config.high_service_flap_threshold),
        };
        Some(Thresholds::resolve(
            entity.config.low_flap_threshold,
            entity.config.high_flap_threshold,
            global_low,
            global_high,
        ))
    }

    /// Records the current state in the flap history and starts or stops
    /// flapping when the weighted change percentage crosses a threshold.
    ///
    /// Soft problem states are never recorded. States excluded by the
    /// entity's flap detection options leave the history untouched but are
    /// still evaluated against the existing percentage.
    pub fn check_for_flapping(&mut self, key: EntityKey, update_history: bool, allow_start_notification: bool, now: Timestamp) {
        let Some(thresholds) = self.flap_thresholds(key) else {
            return;
        };
        let global_enabled = self.config.enable_flap_detection;
        let Some(entity) = self.registry.get_mut(key) else {
            return;
        };
        let state = &mut entity.state;
        if update_history && state.state_type == StateType::Soft && state.current_state.is_problem() {
            return;
        }

        if update_history && entity.config.flap_detection_on.contains(state.current_state) {
            state.flap_history.record(state.current_state);
            state.percent_state_change = state.flap_history.percent_state_change();
        }
        let percent = state.percent_state_change;
        debug!(
            "{}: {:.2}% state change (low={:.1}%, high={:.1}%)",
            entity.display_name(),
            percent,
            thresholds.low,
            thresholds.high
        );

        if !global_enabled || !entity.state.flap_detection_enabled {
            return;
        }
        match evaluate(percent, thresholds, entity.state.is_flapping) {
            FlapTransition::Start => self.set_flap(key, percent, thresholds, allow_start_notification, now),
            FlapTransition::Stop => self.clear_flap(key, percent, thresholds, now),
            FlapTransition::Unchanged => {}
        }
    }

    fn set_flap(&mut self, key: EntityKey, percent: f64, thresholds: Thresholds, allow_notification: bool, now: Timestamp) {
        let Some(entity) = self.registry.get(key) else {
            return;
        };
        let noun = kind_noun(key.kind());
        info!(
            "{} FLAPPING ALERT: {};STARTED; {} appears to have started flapping ({:.1}% change >= {:.1}% threshold)",
            noun.to_uppercase(),
            entity.display_name(),
            capitalize(noun),
            percent,
            thresholds.high
        );
        let text = format!(
            "Notifications for this {} are being suppressed because it was detected as having been flapping \
             between different states ({:.1}% change >= {:.1}% threshold). When the {} state stabilizes and \
             the flapping stops, notifications will be re-enabled.",
            noun, percent, thresholds.high, noun
        );
        let comment_id = match self.add_comment(key, CommentKind::Flapping, FLAPPING_AUTHOR, &text, false, now) {
            Ok(id) => id,
            Err(_) => return,
        };

        let Some(entity) = self.registry.get_mut(key) else {
            return;
        };
        let state = &mut entity.state;
        state.is_flapping = true;
        state.flapping_comment_id = Some(comment_id);
        state.check_flapping_recovery_notification =
            state.current_state.is_problem() && state.current_notification_number > 0;

        self.publish(BrokerEvent::FlappingStart {
            target: key,
            percent_state_change: percent,
            high_threshold: thresholds.high,
            low_threshold: thresholds.low,
            comment_id,
        });
        if allow_notification {
            self.notify(key, NotificationType::FlappingStart, None, None, NotificationOptions::default(), now);
        }
    }

    fn clear_flap(&mut self, key: EntityKey, percent: f64, thresholds: Thresholds, now: Timestamp) {
        let Some(entity) = self.registry.get(key) else {
            return;
        };
        let noun = kind_noun(key.kind());
        info!(
            "{} FLAPPING ALERT: {};STOPPED; {} appears to have stopped flapping ({:.1}% change < {:.1}% threshold)",
            noun.to_uppercase(),
            entity.display_name(),
            capitalize(noun),
            percent,
            thresholds.low
        );

        self.stop_flapping(key);
        self.publish(BrokerEvent::FlappingStop {
            target: key,
            percent_state_change: percent,
            high_threshold: thresholds.high,
            low_threshold: thresholds.low,
            disabled: false,
        });
        self.notify(key, NotificationType::FlappingStop, None, None, NotificationOptions::default(), now);
        self.send_owed_flapping_recovery(key, now);
    }

    /// Turns flap detection of one entity on or off. Turning it off while
    /// the entity flaps ends the flapping episode with a FLAPPINGDISABLED
    /// notification.
    pub fn set_flap_detection_enabled(&mut self, key: EntityKey, enabled: bool, now: Timestamp) -> Result<(), EngineError> {
        let entity = self.entity_mut(key)?;
        entity.state.flap_detection_enabled = enabled;
        self.publish(BrokerEvent::AdaptiveAttribute {
            target: key,
            attribute: "flap_detection_enabled",
            value: enabled.to_string(),
        });
        if enabled {
            self.check_for_flapping(key, false, true, now);
        } else {
            self.handle_flap_detection_disabled(key, now);
        }
        Ok(())
    }

    /// Global flap detection switch, applied to every flapping entity
    pub fn set_global_flap_detection(&mut self, enabled: bool, now: Timestamp) {
        info!("Flap detection globally {}", if enabled { "enabled" } else { "disabled" });
        self.config.enable_flap_detection = enabled;
        let keys: Vec<EntityKey> = self.registry.keys().collect();
        for key in keys {
            if enabled {
                self.check_for_flapping(key, false, true, now);
            } else {
                self.handle_flap_detection_disabled(key, now);
            }
        }
    }

    fn handle_flap_detection_disabled(&mut self, key: EntityKey, now: Timestamp) {
        let Some(entity) = self.registry.get(key) else {
            return;
        };
        if !entity.state.is_flapping {
            return;
        }
        let percent = entity.state.percent_state_change;
        let thresholds = self.flap_thresholds(key).unwrap_or(Thresholds { low: 0.0, high: 0.0 });
        info!(
            "{} FLAPPING ALERT: {};DISABLED; Flap detection has been disabled",
            kind_noun(key.kind()).to_uppercase(),
            entity.display_name()
        );

        self.stop_flapping(key);
        self.publish(BrokerEvent::FlappingStop {
            target: key,
            percent_state_change: percent,
            high_threshold: thresholds.high,
            low_threshold: thresholds.low,
            disabled: true,
        });
        self.notify(key, NotificationType::FlappingDisabled, None, None, NotificationOptions::default(), now);
        self.send_owed_flapping_recovery(key, now);
    }

    fn stop_flapping(&mut self, key: EntityKey) {
        let Some(entity) = self.registry.get_mut(key) else {
            return;
        };
        entity.state.is_flapping = false;
        if let Some(comment_id) = entity.state.flapping_comment_id.take() {
            self.comments.remove(comment_id);
        }
    }

    /// A recovery that happened while flapping was not notified; send it now
    fn send_owed_flapping_recovery(&mut self, key: EntityKey, now: Timestamp) {
        let Some(entity) = self.registry.get_mut(key) else {
            return;
        };
        let owed = entity.state.check_flapping_recovery_notification && entity.state.current_state.is_baseline();
        entity.state.check_flapping_recovery_notification = false;
        if owed {
            self.notify(key, NotificationType::Normal, None, None, NotificationOptions::default(), now);
        }
    }
}

fn kind_noun(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Host => "host",
        EntityKind::Service => "service",
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
