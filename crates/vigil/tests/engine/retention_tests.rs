//! Saving and restoring engine state across restarts.

use vigil::acknowledgement::Acknowledgement;
use vigil::comments::CommentKind;
use vigil::retention::EntityRetention;
use vigil::{EntityKey, EventKind, NotificationType, RetentionSnapshot, State, StateType};

use crate::common::{DNS, HTTP, Harness, NOW};

/// HTTP hard CRITICAL and notified, a persistent and a transient comment on
/// it, and DNS inside a downtime that runs until `NOW + 7200`
fn populated() -> Harness {
    let mut h = Harness::new();
    h.host_up(NOW - 5);
    h.active(HTTP, 2, "CRITICAL - connection refused", NOW);
    h.active(HTTP, 2, "CRITICAL - connection refused", NOW + 60);
    h.engine.add_comment(HTTP, CommentKind::User, "bob", "ticket 42", true, NOW + 70).unwrap();
    h.engine.add_comment(HTTP, CommentKind::User, "bob", "scratch note", false, NOW + 70).unwrap();
    h.engine.schedule_downtime(DNS, NOW + 100, NOW + 7200, "carol", "resolver upgrade", NOW + 80).unwrap();
    h.engine.run_once(NOW + 100);
    h
}

fn round_trip(h: &Harness, at: i64) -> RetentionSnapshot {
    let json = h.engine.snapshot(at).to_json().unwrap();
    RetentionSnapshot::from_json(&json).unwrap()
}

#[test]
fn test_state_survives_a_restart() {
    let old = populated();
    let snapshot = round_trip(&old, NOW + 120);
    assert_eq!(snapshot.saved_at, NOW + 120);
    assert_eq!(snapshot.comments.len(), 1);

    let mut h = Harness::new();
    assert_eq!(h.engine.restore(snapshot, NOW + 200), 3);

    let before = &old.entity(HTTP).state;
    let after = &h.entity(HTTP).state;
    assert_eq!(after.current_state, State::Critical);
    assert_eq!(after.state_type, StateType::Hard);
    assert_eq!(after.current_problem_id, before.current_problem_id);
    assert_eq!(after.current_notification_number, 1);
    assert!(after.notified_on.contains(State::Critical));
    assert_eq!(after.plugin_output, "CRITICAL - connection refused");

    let comments: Vec<_> = h.engine.comments().for_target(HTTP).collect();
    assert_eq!(comments.len(), 1);
    assert_eq!(comments[0].text, "ticket 42");

    // sequences continue where the old process stopped
    assert!(h.engine.counters().next_problem_id() > before.current_problem_id);
    let next_comment = h.engine.add_comment(HTTP, CommentKind::User, "bob", "after restart", true, NOW + 200).unwrap();
    assert!(comments_ids(&old).iter().all(|id| *id < next_comment));
}

fn comments_ids(h: &Harness) -> Vec<u64> {
    h.engine.comments().for_target(HTTP).map(|comment| comment.id).collect()
}

#[test]
fn test_open_downtime_resumes_without_announcement() {
    let old = populated();
    let snapshot = round_trip(&old, NOW + 120);

    let mut h = Harness::new();
    h.engine.restore(snapshot, NOW + 200);
    assert_eq!(h.entity(DNS).state.scheduled_downtime_depth, 1);
    assert_eq!(h.engine.downtimes().len(), 1);
    let comments: Vec<_> = h.engine.comments().for_target(DNS).collect();
    assert_eq!(comments.len(), 1);
    assert_eq!(comments[0].kind, CommentKind::Downtime);

    h.engine.run_once(NOW + 200);
    assert_eq!(h.sent(DNS, NotificationType::DowntimeStart), 0);
    assert_eq!(h.entity(DNS).state.scheduled_downtime_depth, 1);

    h.engine.run_once(NOW + 7200);
    assert_eq!(h.entity(DNS).state.scheduled_downtime_depth, 0);
    assert_eq!(h.sent(DNS, NotificationType::DowntimeEnd), 1);
    assert!(h.engine.downtimes().is_empty());
}

#[test]
fn test_expired_downtimes_are_dropped() {
    let old = populated();
    let snapshot = round_trip(&old, NOW + 120);

    let mut h = Harness::new();
    h.engine.restore(snapshot, NOW + 8000);
    assert!(h.engine.downtimes().is_empty());
    assert_eq!(h.entity(DNS).state.scheduled_downtime_depth, 0);
    assert_eq!(h.engine.comments().for_target(DNS).count(), 0);
}

#[test]
fn test_retained_next_check_is_kept() {
    let old = populated();
    let retained_next_check = old.entity(HTTP).state.next_check;
    assert_eq!(retained_next_check, NOW + 360);
    let snapshot = round_trip(&old, NOW + 120);

    let mut h = Harness::new();
    h.engine.restore(snapshot, NOW + 200);
    h.engine.start(NOW + 200);
    let check = h.engine.queue().find(EventKind::Check, HTTP).expect("check queued");
    assert_eq!(check.run_time, retained_next_check);
}

#[test]
fn test_unknown_entities_are_skipped() {
    let old = populated();
    let mut snapshot = round_trip(&old, NOW + 120);
    let state = snapshot.entities[0].state.clone();
    snapshot.entities.push(EntityRetention { key: EntityKey::Service(1, 99), state });

    let mut h = Harness::new();
    assert_eq!(h.engine.restore(snapshot, NOW + 200), 3);
    assert!(h.engine.entity(EntityKey::Service(1, 99)).is_none());
}

#[test]
fn test_restored_attempt_is_clamped_to_max_attempts() {
    let old = populated();
    let mut snapshot = round_trip(&old, NOW + 120);
    let http = snapshot.entities.iter_mut().find(|retained| retained.key == HTTP).unwrap();
    http.state.current_state = State::Critical;
    http.state.last_hard_state = State::Ok;
    http.state.state_type = StateType::Soft;
    http.state.current_attempt = 7;
    http.state.notified_on.clear();
    http.state.current_notification_number = 0;

    let mut h = Harness::new();
    h.engine.restore(snapshot, NOW + 200);
    assert_eq!(h.entity(HTTP).state.current_attempt, 3);

    // the next failure completes the soft sequence
    h.active(HTTP, 2, "CRITICAL", NOW + 300);
    let state = &h.entity(HTTP).state;
    assert_eq!(state.state_type, StateType::Hard);
    assert_eq!(state.last_hard_state, State::Critical);
    assert_eq!(h.sent(HTTP, NotificationType::Normal), 1);
}

#[test]
fn test_zero_attempt_is_raised_to_one() {
    let old = populated();
    let mut snapshot = round_trip(&old, NOW + 120);
    for retained in &mut snapshot.entities {
        retained.state.current_attempt = 0;
    }

    let mut h = Harness::new();
    h.engine.restore(snapshot, NOW + 200);
    assert_eq!(h.entity(HTTP).state.current_attempt, 1);
    assert_eq!(h.entity(DNS).state.current_attempt, 1);
}

fn acknowledged_for_ten_minutes() -> Harness {
    let mut h = populated();
    let ack = Acknowledgement::new("bob", "for ten minutes").with_timeout(600);
    h.engine.acknowledge_problem(HTTP, ack, NOW + 110).unwrap();
    h
}

#[test]
fn test_acknowledgement_timeout_survives_a_restart() {
    let old = acknowledged_for_ten_minutes();
    let snapshot = round_trip(&old, NOW + 120);

    let mut h = Harness::new();
    h.engine.restore(snapshot, NOW + 200);
    h.engine.start(NOW + 200);
    assert!(h.entity(HTTP).state.problem_acknowledged);
    let expiry = h.engine.queue().find(EventKind::AckExpiry, HTTP).expect("expiry queued");
    assert_eq!(expiry.run_time, NOW + 710);

    h.engine.run_once(NOW + 709);
    assert!(h.entity(HTTP).state.problem_acknowledged);
    h.engine.run_once(NOW + 710);
    assert!(!h.entity(HTTP).state.problem_acknowledged);
}

#[test]
fn test_acknowledgement_expired_while_down_is_cleared_on_restore() {
    let old = acknowledged_for_ten_minutes();
    let snapshot = round_trip(&old, NOW + 120);

    let mut h = Harness::new();
    h.engine.restore(snapshot, NOW + 900);
    assert!(!h.entity(HTTP).state.problem_acknowledged);
    assert!(h.engine.queue().find(EventKind::AckExpiry, HTTP).is_none());
}
