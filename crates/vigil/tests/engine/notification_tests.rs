//! Notification pacing, escalations, delays, periods and acknowledgements.

use vigil::acknowledgement::Acknowledgement;
use vigil::broker::BrokerEvent;
use vigil::comments::CommentKind;
use vigil::notifications::{Denied, NotifyOutcome};
use vigil::{EngineError, EventKind, NotificationOptions, NotificationType, State};

use crate::common::{DNS, HTTP, Harness, NEXT_WORKDAY_MORNING, NOW, definitions, test_config};

/// Drives HTTP into a hard CRITICAL state at `NOW + 60`
fn hard_critical(h: &mut Harness) {
    h.host_up(NOW - 5);
    h.active(HTTP, 2, "CRITICAL", NOW);
    h.active(HTTP, 2, "CRITICAL", NOW + 60);
}

#[test]
fn test_renotification_waits_for_notification_interval() {
    let mut h = Harness::new();
    hard_critical(&mut h);
    assert_eq!(h.sent(HTTP, NotificationType::Normal), 1);

    h.active(HTTP, 2, "CRITICAL", NOW + 360);
    h.active(HTTP, 2, "CRITICAL", NOW + 660);
    assert_eq!(h.sent(HTTP, NotificationType::Normal), 1);

    h.active(HTTP, 2, "CRITICAL", NOW + 60 + 1800);
    assert_eq!(h.sent(HTTP, NotificationType::Normal), 2);
    let state = &h.entity(HTTP).state;
    assert_eq!(state.current_notification_number, 2);
    assert_eq!(state.last_notification, NOW + 1860);
    assert_eq!(state.next_notification, NOW + 1860 + 1800);
}

#[test]
fn test_zero_notification_interval_sends_only_once() {
    let mut definitions = definitions();
    definitions["services"][0]["notification_interval"] = serde_json::json!(0);
    let mut h = Harness::with(definitions, test_config());
    hard_critical(&mut h);
    assert!(h.entity(HTTP).state.no_more_notifications);

    h.active(HTTP, 2, "CRITICAL", NOW + 7200);
    assert_eq!(h.sent(HTTP, NotificationType::Normal), 1);
}

#[test]
fn test_escalation_takes_over_from_second_notification() {
    let mut definitions = definitions();
    definitions["escalations"] = serde_json::json!([{
        "host": "web01",
        "service": "http",
        "first_notification": 2,
        "contacts": ["oncall-lead"]
    }]);
    let mut h = Harness::with(definitions, test_config());
    hard_critical(&mut h);
    assert_eq!(h.commands("lead@example.com").len(), 0);
    assert_eq!(h.commands("alice@example.com").len(), 1);

    h.active(HTTP, 2, "CRITICAL", NOW + 1860);
    assert_eq!(h.commands("lead@example.com").len(), 1);
    assert_eq!(h.commands("alice@example.com").len(), 1);
    assert_eq!(
        h.broker.count(|event| matches!(event, BrokerEvent::NotificationStart { escalated: true, .. })),
        1
    );
}

#[test]
fn test_escalation_interval_paces_escalated_notifications() {
    let mut definitions = definitions();
    definitions["escalations"] = serde_json::json!([{
        "host": "web01",
        "service": "http",
        "first_notification": 2,
        "notification_interval": 5,
        "contacts": ["oncall-lead"]
    }]);
    let mut h = Harness::with(definitions, test_config());
    hard_critical(&mut h);
    assert_eq!(h.entity(HTTP).state.next_notification, NOW + 60 + 1800);

    h.active(HTTP, 2, "CRITICAL", NOW + 1860);
    assert_eq!(h.entity(HTTP).state.next_notification, NOW + 1860 + 300);
}

#[test]
fn test_broadcast_reaches_every_tier() {
    let mut definitions = definitions();
    definitions["escalations"] = serde_json::json!([{
        "host": "web01",
        "service": "http",
        "first_notification": 5,
        "contacts": ["oncall-lead"]
    }]);
    let mut h = Harness::with(definitions, test_config());
    hard_critical(&mut h);

    let options = NotificationOptions { forced: true, broadcast: true, increment: false };
    let outcome = h.engine.notify(HTTP, NotificationType::Custom, Some("ops"), Some("heads up"), options, NOW + 100);
    match outcome {
        NotifyOutcome::Sent { contacts, .. } => assert_eq!(contacts, vec!["oncall-lead", "alice"]),
        other => panic!("custom notification not sent: {other:?}"),
    }
    assert_eq!(h.entity(HTTP).state.current_notification_number, 1);
}

#[test]
fn test_first_notification_delay_is_retried() {
    let mut definitions = definitions();
    definitions["services"][1]["first_notification_delay"] = serde_json::json!(5);
    let mut h = Harness::with(definitions, test_config());
    h.host_up(NOW - 5);
    h.active(DNS, 2, "DNS CRITICAL", NOW);

    assert_eq!(h.sent(DNS, NotificationType::Normal), 0);
    let retry = h.engine.queue().find(EventKind::NotificationRetry, DNS).expect("retry queued");
    assert_eq!(retry.run_time, NOW + 300);

    h.engine.run_once(NOW + 300);
    assert_eq!(h.sent(DNS, NotificationType::Normal), 1);
    assert_eq!(h.entity(DNS).state.current_notification_number, 1);
}

#[test]
fn test_recovery_before_delay_sends_nothing() {
    let mut definitions = definitions();
    definitions["services"][1]["first_notification_delay"] = serde_json::json!(5);
    let mut h = Harness::with(definitions, test_config());
    h.host_up(NOW - 5);
    h.active(DNS, 2, "DNS CRITICAL", NOW);
    h.active(DNS, 0, "DNS OK", NOW + 100);

    h.engine.run_once(NOW + 300);
    assert_eq!(h.attempted(DNS), 0);
}

#[test]
fn test_notification_outside_period_waits_for_period_start() {
    let mut definitions = definitions();
    definitions["services"][0]["notification_period"] = serde_json::json!("workhours");
    let mut h = Harness::with(definitions, test_config());
    hard_critical(&mut h);

    assert_eq!(h.sent(HTTP, NotificationType::Normal), 0);
    assert_eq!(h.entity(HTTP).state.next_notification, NEXT_WORKDAY_MORNING);
    let retry = h.engine.queue().find(EventKind::NotificationRetry, HTTP).expect("retry queued");
    assert_eq!(retry.run_time, NEXT_WORKDAY_MORNING);

    h.engine.run_once(NEXT_WORKDAY_MORNING);
    assert_eq!(h.sent(HTTP, NotificationType::Normal), 1);
}

#[test]
fn test_service_without_period_uses_host_period() {
    let mut definitions = definitions();
    definitions["hosts"][0]["notification_period"] = serde_json::json!("workhours");
    let mut h = Harness::with(definitions, test_config());
    hard_critical(&mut h);
    assert_eq!(h.sent(HTTP, NotificationType::Normal), 0);
}

#[test]
fn test_global_and_entity_switches() {
    let mut h = Harness::new();
    h.engine.set_global_notifications(false);
    hard_critical(&mut h);
    assert_eq!(h.attempted(HTTP), 0);

    let mut h = Harness::new();
    h.engine.set_notifications_enabled(HTTP, false).unwrap();
    hard_critical(&mut h);
    assert_eq!(h.attempted(HTTP), 0);
    // the number only moves when somebody was told
    assert_eq!(h.entity(HTTP).state.current_notification_number, 0);
}

#[test]
fn test_contact_state_filter() {
    let mut definitions = definitions();
    definitions["contacts"][0]["service_notify_on"] = serde_json::json!(["critical"]);
    let mut h = Harness::with(definitions, test_config());
    h.host_up(NOW - 5);
    h.active(DNS, 1, "DNS WARNING", NOW);

    assert_eq!(h.attempted(DNS), 1);
    assert_eq!(h.sent(DNS, NotificationType::Normal), 0);
    assert_eq!(h.entity(DNS).state.current_notification_number, 0);
}

#[test]
fn test_notification_dependency_suppresses_dependent() {
    let mut definitions = definitions();
    definitions["dependencies"] = serde_json::json!([{
        "dependent_host": "web01",
        "dependent_service": "http",
        "master_host": "web01",
        "master_service": "dns",
        "kind": "notification",
        "fail_on": ["critical", "unknown"]
    }]);
    let mut h = Harness::with(definitions, test_config());
    h.host_up(NOW - 5);
    h.active(DNS, 2, "DNS CRITICAL", NOW - 2);
    h.active(HTTP, 2, "CRITICAL", NOW);
    h.active(HTTP, 2, "CRITICAL", NOW + 60);

    assert_eq!(h.entity(HTTP).state.last_hard_state, State::Critical);
    assert_eq!(h.attempted(HTTP), 0);
}

#[test]
fn test_acknowledgement_notifies_and_silences_the_problem() {
    let mut h = Harness::new();
    hard_critical(&mut h);

    h.engine
        .acknowledge_problem(HTTP, Acknowledgement::new("bob", "looking into it"), NOW + 100)
        .unwrap();
    assert!(h.entity(HTTP).state.problem_acknowledged);
    assert_eq!(h.sent(HTTP, NotificationType::Acknowledgement), 1);
    assert_eq!(h.commands("ACKNOWLEDGEMENT web01/http").len(), 1);
    let comments: Vec<_> = h.engine.comments().for_target(HTTP).collect();
    assert_eq!(comments.len(), 1);
    assert_eq!(comments[0].kind, CommentKind::Acknowledgement);
    assert_eq!(comments[0].author, "bob");

    h.active(HTTP, 2, "CRITICAL", NOW + 1900);
    assert_eq!(h.sent(HTTP, NotificationType::Normal), 1);
}

#[test]
fn test_normal_acknowledgement_ends_on_state_change() {
    let mut h = Harness::new();
    hard_critical(&mut h);
    h.engine.acknowledge_problem(HTTP, Acknowledgement::new("bob", "on it"), NOW + 100).unwrap();

    h.active(HTTP, 1, "WARNING - degraded", NOW + 360);

    let state = &h.entity(HTTP).state;
    assert!(!state.problem_acknowledged);
    assert_eq!(state.current_state, State::Warning);
    assert_eq!(h.engine.comments().for_target(HTTP).count(), 0);
    assert_eq!(h.sent(HTTP, NotificationType::Normal), 2);
}

#[test]
fn test_sticky_acknowledgement_lasts_until_recovery() {
    let mut h = Harness::new();
    hard_critical(&mut h);
    let ack = Acknowledgement::new("bob", "known issue").sticky();
    h.engine.acknowledge_problem(HTTP, ack, NOW + 100).unwrap();

    h.active(HTTP, 1, "WARNING - degraded", NOW + 360);
    assert!(h.entity(HTTP).state.problem_acknowledged);
    assert_eq!(h.sent(HTTP, NotificationType::Normal), 1);

    h.active(HTTP, 0, "HTTP OK", NOW + 660);
    assert!(!h.entity(HTTP).state.problem_acknowledged);
}

#[test]
fn test_acknowledgement_expires() {
    let mut h = Harness::new();
    hard_critical(&mut h);
    let ack = Acknowledgement::new("bob", "for ten minutes").with_timeout(600);
    h.engine.acknowledge_problem(HTTP, ack, NOW + 100).unwrap();
    assert!(h.engine.queue().find(EventKind::AckExpiry, HTTP).is_some());

    h.engine.run_once(NOW + 700);
    assert!(!h.entity(HTTP).state.problem_acknowledged);
    assert_eq!(h.engine.comments().for_target(HTTP).count(), 0);
}

#[test]
fn test_acknowledging_a_healthy_entity_fails() {
    let mut h = Harness::new();
    let result = h.engine.acknowledge_problem(HTTP, Acknowledgement::new("bob", "?"), NOW);
    assert!(matches!(result, Err(EngineError::NotAProblem(key)) if key == HTTP));
}

#[test]
fn test_denials_report_the_failing_gate() {
    let mut h = Harness::new();
    h.host_up(NOW - 5);
    h.active(HTTP, 2, "CRITICAL", NOW);

    let outcome = h.engine.notify(HTTP, NotificationType::Normal, None, None, NotificationOptions::default(), NOW);
    assert_eq!(outcome, NotifyOutcome::Denied(Denied::SoftState));

    let forced = h.engine.notify(HTTP, NotificationType::Custom, None, None, NotificationOptions::forced(), NOW);
    assert_eq!(forced.contacts_notified(), 1);
}
