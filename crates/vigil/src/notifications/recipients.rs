use std::collections::HashSet;

use super::escalation::{is_valid_escalation, should_escalate};
use super::{NotificationOptions, NotificationType};
use crate::Timestamp;
use crate::objects::{Checkable, Contact, ObjectRegistry};

/// Why a single contact is skipped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactDenied {
    Disabled,
    OutsidePeriod,
    TypeNotWanted,
    StateNotWanted,
}

/// Contacts to notify for the entity, in order and without duplicates, and
/// whether they come from an escalation tier.
///
/// Escalated notifications go to the tiers in effect only. A broadcast goes
/// to every tier and the entity's own contacts.
pub fn resolve_recipients(
    registry: &ObjectRegistry,
    entity: &Checkable,
    options: NotificationOptions,
    now: Timestamp,
) -> (Vec<String>, bool) {
    let escalated = should_escalate(registry, entity, now);
    let mut seen = HashSet::new();
    let mut recipients = Vec::new();

    if escalated || options.broadcast {
        for escalation in registry.escalations_for(entity.key) {
            if is_valid_escalation(registry, escalation, entity, options.broadcast, now) {
                registry.expand_contacts(&escalation.contacts, &escalation.contact_groups, &mut seen, &mut recipients);
            }
        }
    }
    if !escalated || options.broadcast {
        registry.expand_contacts(&entity.config.contacts, &entity.config.contact_groups, &mut seen, &mut recipients);
    }
    (recipients, escalated)
}

/// Should `contact` hear about this notification?
pub fn contact_viability(
    registry: &ObjectRegistry,
    contact: &Contact,
    entity: &Checkable,
    kind: NotificationType,
    options: NotificationOptions,
    now: Timestamp,
) -> Result<(), ContactDenied> {
    if options.forced {
        return Ok(());
    }
    let entity_kind = entity.kind();
    if !contact.notifications_enabled(entity_kind) {
        return Err(ContactDenied::Disabled);
    }
    if !registry.in_period(contact.notification_period(entity_kind), now, contact.timezone) {
        return Err(ContactDenied::OutsidePeriod);
    }

    match kind {
        NotificationType::Custom | NotificationType::Acknowledgement => Ok(()),
        kind if kind.is_flapping() => {
            if contact.notify_on_flapping { Ok(()) } else { Err(ContactDenied::TypeNotWanted) }
        }
        kind if kind.is_downtime() => {
            if contact.notify_on_downtime { Ok(()) } else { Err(ContactDenied::TypeNotWanted) }
        }
        _ => {
            let wanted = contact.notify_on(entity_kind);
            let current = entity.state.current_state;
            let ok = if current.is_baseline() {
                wanted.contains(current) && wanted.intersects(entity.state.notified_on)
            } else {
                wanted.contains(current)
            };
            if ok { Ok(()) } else { Err(ContactDenied::StateNotWanted) }
        }
    }
}
