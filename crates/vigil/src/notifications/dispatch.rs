use std::time::Duration;

use tracing::{debug, info, warn};

use super::escalation::next_notification_time;
use super::macros::MacroContext;
use super::recipients::{contact_viability, resolve_recipients};
use super::viability::{Denied, notification_viability};
use super::{NotificationOptions, NotificationType};
use crate::Timestamp;
use crate::broker::BrokerEvent;
use crate::commands::CommandRequest;
use crate::engine::{Engine, InFlight};
use crate::events::{EventKind, TimedEvent};
use crate::objects::{Checkable, EntityKey, EntityKind};

/// Result of a notification request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyOutcome {
    Denied(Denied),
    Sent {
        notification_id: u64,
        escalated: bool,
        /// Names of the contacts that passed their own filters
        contacts: Vec<String>,
    },
}

impl NotifyOutcome {
    pub fn contacts_notified(&self) -> usize {
        match self {
            NotifyOutcome::Denied(_) => 0,
            NotifyOutcome::Sent { contacts, .. } => contacts.len(),
        }
    }
}

impl Engine {
    /// Sends a notification of `kind` about `key` to every eligible contact.
    ///
    /// A NORMAL notification that reached at least one contact advances the
    /// re-notification schedule; when nobody was reached the notification
    /// number is rolled back. A NORMAL notification held back by the first
    /// notification delay or the notification period is retried once that
    /// obstacle is gone.
    pub fn notify(
        &mut self,
        key: EntityKey,
        kind: NotificationType,
        author: Option<&str>,
        comment: Option<&str>,
        options: NotificationOptions,
        now: Timestamp,
    ) -> NotifyOutcome {
        if let Err(denied) = notification_viability(&self.registry, &self.config, key, kind, options, now) {
            debug!("{} notification for {} not sent: {}", kind, key, denied);
            if kind == NotificationType::Normal {
                self.park_notification(key, denied);
            }
            return NotifyOutcome::Denied(denied);
        }

        let increment = kind == NotificationType::Normal || options.increment;
        let notification_id = self.counters.next_notification_id();
        let Ok(entity) = self.entity_mut(key) else {
            return NotifyOutcome::Denied(Denied::UnknownEntity);
        };
        if increment {
            entity.state.current_notification_number += 1;
        }
        entity.state.current_notification_id = notification_id;

        let Some(snapshot) = self.registry.get(key).cloned() else {
            return NotifyOutcome::Denied(Denied::UnknownEntity);
        };
        let entity = &snapshot;
        let (recipients, escalated) = resolve_recipients(&self.registry, entity, options, now);
        self.publish(BrokerEvent::NotificationStart {
            target: key,
            notification_type: kind,
            notification_id,
            escalated,
            at: now,
        });

        let recovery = entity.state.current_state.is_baseline();
        let mut macros = MacroContext::for_entity(&self.registry, entity);
        macros.set("NOTIFICATIONTYPE", kind.macro_value(recovery));
        macros.set("NOTIFICATIONNUMBER", entity.state.current_notification_number.to_string());
        macros.set("NOTIFICATIONID", notification_id.to_string());
        macros.set("NOTIFICATIONRECIPIENTS", recipients.join(","));
        macros.set("NOTIFICATIONISESCALATED", u8::from(escalated).to_string());
        macros.set("NOTIFICATIONAUTHOR", author.unwrap_or_default());
        macros.set("NOTIFICATIONCOMMENT", comment.unwrap_or_default());

        let mut notified = Vec::new();
        for name in &recipients {
            let Some(contact) = self.registry.contact(name) else {
                continue;
            };
            if let Err(reason) = contact_viability(&self.registry, contact, entity, kind, options, now) {
                debug!("Not notifying {} about {}: {:?}", name, entity.display_name(), reason);
                continue;
            }

            let mut contact_macros = macros.clone();
            contact_macros.set_contact(contact);
            let mut requests = Vec::new();
            for reference in contact.notification_commands(entity.kind()) {
                let Some(template) = self.registry.command(reference) else {
                    warn!("Notification command '{}' of contact {} is not defined", reference, name);
                    continue;
                };
                contact_macros.set_arguments(reference);
                let command_line = contact_macros.expand(template);
                log_notification(entity.kind(), name, entity, kind.macro_value(recovery), reference);
                requests.push(
                    CommandRequest::new(command_line, Duration::from_secs(self.config.notification_timeout))
                        .with_env("VIGIL_NOTIFICATIONTYPE", kind.macro_value(recovery))
                        .with_env("VIGIL_CONTACTNAME", name.clone()),
                );
            }
            for request in requests {
                let purpose = InFlight::Notification { target: key, contact: name.clone() };
                if let Err(err) = self.submit_command(request, purpose) {
                    warn!("Unable to run notification command for {}: {}", name, err);
                }
            }
            notified.push(name.clone());
        }

        let (next, no_more) = next_notification_time(&self.registry, &self.config, entity, now);
        if let Some(stored) = self.registry.get_mut(key) {
            let state = &mut stored.state;
            if kind == NotificationType::Normal && !notified.is_empty() {
                state.next_notification = next;
                state.no_more_notifications = no_more;
                state.last_notification = now;
                if recovery {
                    state.notified_on.clear();
                    state.current_notification_number = 0;
                } else {
                    state.notified_on.insert(state.current_state);
                }
            } else if increment && notified.is_empty() {
                state.current_notification_number = state.current_notification_number.saturating_sub(1);
            }
        }

        self.publish(BrokerEvent::NotificationEnd {
            target: key,
            notification_type: kind,
            notification_id,
            escalated,
            contacts_notified: notified.len(),
            at: now,
        });
        info!("{} notification #{} for {} reached {} contacts", kind, notification_id, key, notified.len());
        NotifyOutcome::Sent { notification_id, escalated, contacts: notified }
    }

    /// Remembers when a held-back NORMAL notification may go out and queues
    /// a retry for that time
    fn park_notification(&mut self, key: EntityKey, denied: Denied) {
        let Some(resume_at) = denied.resume_at() else {
            return;
        };
        if let Denied::OutsidePeriod { .. } = denied {
            if let Some(entity) = self.registry.get_mut(key) {
                entity.state.next_notification = resume_at;
            }
        }
        self.queue.schedule(TimedEvent::new(EventKind::NotificationRetry, Some(key), resume_at));
    }
}

fn log_notification(kind: EntityKind, contact: &str, entity: &Checkable, label: &str, command: &str) {
    match kind {
        EntityKind::Host => info!(
            "HOST NOTIFICATION: {};{};{};{};{}",
            contact, entity.config.name, label, command, entity.state.plugin_output
        ),
        EntityKind::Service => info!(
            "SERVICE NOTIFICATION: {};{};{};{};{};{}",
            contact, entity.config.host_name, entity.config.name, label, command, entity.state.plugin_output
        ),
    }
}
