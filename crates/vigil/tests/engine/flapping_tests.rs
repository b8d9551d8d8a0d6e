//! Flap detection driven by real check results.

use vigil::broker::BrokerEvent;
use vigil::comments::CommentKind;
use vigil::{NotificationType, State};

use crate::common::{DNS, HTTP, Harness, NOW};

/// Feeds alternating CRITICAL/OK results to the DNS service, which goes
/// hard on the first attempt
fn alternate(h: &mut Harness, count: usize, start: i64) -> i64 {
    let mut at = start;
    for i in 0..count {
        let (code, output) = if i % 2 == 0 { (2, "DNS CRITICAL") } else { (0, "DNS OK") };
        h.active(DNS, code, output, at);
        at += 10;
    }
    at
}

fn flapping_starts(h: &Harness) -> usize {
    h.broker.count(|event| matches!(event, BrokerEvent::FlappingStart { target, .. } if *target == DNS))
}

#[test]
fn test_alternating_hard_states_start_flapping_once() {
    let mut h = Harness::new();
    h.host_up(NOW - 5);
    alternate(&mut h, 21, NOW);

    let state = &h.entity(DNS).state;
    assert!(state.is_flapping);
    assert!(state.percent_state_change >= 50.0);
    assert_eq!(flapping_starts(&h), 1);
    assert_eq!(h.sent(DNS, NotificationType::FlappingStart), 1);
    assert_eq!(h.commands("FLAPPINGSTART web01/dns").len(), 1);

    let comment_id = state.flapping_comment_id.expect("flapping comment");
    let comment = h.engine.comments().get(comment_id).expect("comment is stored");
    assert_eq!(comment.kind, CommentKind::Flapping);
    assert!(!comment.persistent);
}

#[test]
fn test_problem_notifications_are_suppressed_while_flapping() {
    let mut h = Harness::new();
    h.host_up(NOW - 5);
    alternate(&mut h, 21, NOW);

    let events = h.broker.events();
    let started = events
        .iter()
        .position(|event| matches!(event, BrokerEvent::FlappingStart { .. }))
        .expect("flapping started");
    let normal_after_start = events[started..]
        .iter()
        .filter(|event| {
            matches!(
                event,
                BrokerEvent::NotificationEnd { notification_type: NotificationType::Normal, contacts_notified, .. }
                    if *contacts_notified > 0
            )
        })
        .count();
    assert_eq!(normal_after_start, 0);
    assert!(h.sent(DNS, NotificationType::Normal) > 0);
}

#[test]
fn test_stable_results_stop_flapping() {
    let mut h = Harness::new();
    h.host_up(NOW - 5);
    let mut at = alternate(&mut h, 21, NOW);
    assert!(h.entity(DNS).state.is_flapping);

    for _ in 0..21 {
        h.active(DNS, 0, "DNS OK", at);
        at += 10;
    }

    let state = &h.entity(DNS).state;
    assert!(!state.is_flapping);
    assert_eq!(state.percent_state_change, 0.0);
    assert!(state.flapping_comment_id.is_none());
    assert_eq!(h.engine.comments().for_target(DNS).count(), 0);
    assert_eq!(h.sent(DNS, NotificationType::FlappingStop), 1);
    assert_eq!(
        h.broker.count(|event| matches!(event, BrokerEvent::FlappingStop { disabled: false, .. })),
        1
    );
}

#[test]
fn test_soft_problems_are_not_recorded() {
    let mut h = Harness::new();
    h.host_up(NOW - 5);
    let mut at = NOW;
    for i in 0..20 {
        let code = if i % 2 == 0 { 2 } else { 0 };
        h.active(HTTP, code, "flip", at);
        at += 30;
    }

    let state = &h.entity(HTTP).state;
    assert_eq!(state.percent_state_change, 0.0);
    assert!(!state.is_flapping);
}

#[test]
fn test_disabling_flap_detection_ends_flapping() {
    let mut h = Harness::new();
    h.host_up(NOW - 5);
    let at = alternate(&mut h, 21, NOW);
    assert!(h.entity(DNS).state.is_flapping);

    h.engine.set_flap_detection_enabled(DNS, false, at).unwrap();

    let state = &h.entity(DNS).state;
    assert!(!state.is_flapping);
    assert!(state.flapping_comment_id.is_none());
    assert_eq!(h.sent(DNS, NotificationType::FlappingDisabled), 1);
    assert_eq!(
        h.broker.count(|event| matches!(event, BrokerEvent::FlappingStop { disabled: true, .. })),
        1
    );

    // the history keeps being evaluated but nothing starts again
    alternate(&mut h, 4, at + 10);
    assert!(!h.entity(DNS).state.is_flapping);
    assert_eq!(flapping_starts(&h), 1);
}

#[test]
fn test_global_switch_disables_detection() {
    let mut h = Harness::new();
    h.host_up(NOW - 5);
    h.engine.set_global_flap_detection(false, NOW);
    alternate(&mut h, 21, NOW);

    let state = &h.entity(DNS).state;
    assert!(!state.is_flapping);
    assert!(state.percent_state_change >= 50.0);
    assert_eq!(flapping_starts(&h), 0);

    h.engine.set_global_flap_detection(true, NOW + 300);
    assert!(h.entity(DNS).state.is_flapping);
}

#[test]
fn test_states_outside_flap_detection_options_are_not_recorded() {
    let mut definitions = crate::common::definitions();
    definitions["services"][1]["flap_detection_on"] = serde_json::json!(["ok"]);
    let mut h = Harness::with(definitions, crate::common::test_config());
    h.host_up(NOW - 5);
    alternate(&mut h, 21, NOW);

    let state = &h.entity(DNS).state;
    assert_eq!(state.current_state, State::Critical);
    assert_eq!(state.percent_state_change, 0.0);
    assert!(!state.is_flapping);
}

#[test]
fn test_recovery_while_flapping_is_sent_when_flapping_stops() {
    let mut h = Harness::new();
    h.host_up(NOW - 5);
    let mut at = NOW;
    for i in 0..21 {
        let (code, output) = if i % 2 == 0 { (2, "DNS CRITICAL") } else { (1, "DNS WARNING") };
        h.active(DNS, code, output, at);
        at += 10;
    }
    let state = &h.entity(DNS).state;
    assert!(state.is_flapping);
    assert!(state.check_flapping_recovery_notification);

    h.active(DNS, 0, "DNS OK", at);
    at += 10;
    assert!(h.entity(DNS).state.is_flapping);
    assert!(h.commands("RECOVERY web01/dns").is_empty());

    for _ in 0..21 {
        h.active(DNS, 0, "DNS OK", at);
        at += 10;
    }
    let state = &h.entity(DNS).state;
    assert!(!state.is_flapping);
    assert!(!state.check_flapping_recovery_notification);
    assert_eq!(h.sent(DNS, NotificationType::FlappingStop), 1);
    assert_eq!(h.commands("RECOVERY web01/dns").len(), 1);
}
