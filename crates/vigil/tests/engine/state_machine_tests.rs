//! Check result processing: soft/hard transitions, attempts, host
//! correlation and the synthetic results of failed checks.

use chrono::DateTime;
use vigil::checks::ResultDisposition;
use vigil::{CheckResult, EventKind, ExecResult, NotificationType, State, StateType};

use crate::common::{DNS, HOST, HTTP, Harness, NOW, definitions, test_config};

#[test]
fn test_first_problem_is_soft_and_retried() {
    let mut h = Harness::new();
    h.host_up(NOW - 5);

    let disposition = h.active(HTTP, 2, "CRITICAL - connection refused", NOW);
    assert_eq!(disposition, ResultDisposition::Processed);

    let state = &h.entity(HTTP).state;
    assert_eq!(state.current_state, State::Critical);
    assert_eq!(state.state_type, StateType::Soft);
    assert_eq!(state.current_attempt, 2);
    assert_eq!(state.last_hard_state, State::Ok);
    assert_eq!(state.plugin_output, "CRITICAL - connection refused");
    assert_ne!(state.current_problem_id, 0);
    assert_eq!(state.first_problem_time, NOW);

    // retry_interval of one minute
    assert_eq!(state.next_check, NOW + 60);
    let pending = h.engine.queue().find(EventKind::Check, HTTP).expect("retry is queued");
    assert_eq!(pending.run_time, NOW + 60);

    assert_eq!(h.commands("restart-http"), vec!["/usr/lib/vigil/handlers/restart-http CRITICAL SOFT 2"]);
    assert_eq!(h.attempted(HTTP), 0);
}

#[test]
fn test_soft_problem_at_max_attempts_goes_hard_and_notifies() {
    let mut h = Harness::new();
    h.host_up(NOW - 5);
    h.active(HTTP, 2, "CRITICAL - connection refused", NOW);
    h.active(HTTP, 2, "CRITICAL - connection refused", NOW + 60);

    let state = &h.entity(HTTP).state;
    assert_eq!(state.state_type, StateType::Hard);
    assert_eq!(state.current_attempt, 3);
    assert_eq!(state.last_hard_state, State::Critical);
    assert_eq!(state.last_hard_state_change, NOW + 60);
    assert_eq!(state.current_notification_number, 1);
    assert!(state.notified_on.contains(State::Critical));
    assert_eq!(state.next_notification, NOW + 60 + 30 * 60);
    assert_eq!(state.next_check, NOW + 60 + 300);

    assert_eq!(h.sent(HTTP, NotificationType::Normal), 1);
    assert_eq!(
        h.commands("PROBLEM"),
        vec!["/usr/bin/mail -s 'PROBLEM web01/http is CRITICAL' alice@example.com"]
    );
    assert_eq!(h.commands("restart-http").len(), 2);
}

#[test]
fn test_problem_that_does_not_change_keeps_hard_state_quiet() {
    let mut h = Harness::new();
    h.host_up(NOW - 5);
    h.active(HTTP, 2, "CRITICAL", NOW);
    h.active(HTTP, 2, "CRITICAL", NOW + 60);
    h.active(HTTP, 2, "CRITICAL", NOW + 360);

    let state = &h.entity(HTTP).state;
    assert_eq!(state.current_attempt, 3);
    assert_eq!(state.state_type, StateType::Hard);
    assert_eq!(state.last_hard_state_change, NOW + 60);
    assert_eq!(state.next_check, NOW + 660);
    // no state change, so no further event handler run
    assert_eq!(h.commands("restart-http").len(), 2);
    assert_eq!(h.sent(HTTP, NotificationType::Normal), 1);
}

#[test]
fn test_hard_recovery_notifies_and_closes_the_problem() {
    let mut h = Harness::new();
    h.host_up(NOW - 5);
    h.active(HTTP, 2, "CRITICAL", NOW);
    h.active(HTTP, 2, "CRITICAL", NOW + 60);
    let problem_id = h.entity(HTTP).state.current_problem_id;

    h.active(HTTP, 0, "HTTP OK - 200", NOW + 360);

    let state = &h.entity(HTTP).state;
    assert_eq!(state.current_state, State::Ok);
    assert_eq!(state.state_type, StateType::Hard);
    assert_eq!(state.current_attempt, 1);
    assert_eq!(state.last_hard_state, State::Ok);
    assert_eq!(state.current_problem_id, 0);
    assert_eq!(state.last_problem_id, problem_id);
    assert!(state.notified_on.is_empty());
    assert_eq!(state.current_notification_number, 0);
    assert_eq!(state.next_check, NOW + 360 + 300);

    assert_eq!(
        h.commands("RECOVERY"),
        vec!["/usr/bin/mail -s 'RECOVERY web01/http is OK' alice@example.com"]
    );
    assert_eq!(h.commands("restart-http").len(), 3);
}

#[test]
fn test_soft_recovery_runs_handler_without_notification() {
    let mut h = Harness::new();
    h.host_up(NOW - 5);
    h.active(HTTP, 2, "CRITICAL", NOW);
    h.active(HTTP, 0, "HTTP OK", NOW + 60);

    let state = &h.entity(HTTP).state;
    assert_eq!(state.current_state, State::Ok);
    assert_eq!(state.state_type, StateType::Hard);
    assert_eq!(state.current_attempt, 1);
    assert_eq!(state.last_hard_state, State::Ok);
    assert_eq!(h.attempted(HTTP), 0);
    assert_eq!(
        h.commands("restart-http"),
        vec![
            "/usr/lib/vigil/handlers/restart-http CRITICAL SOFT 2",
            "/usr/lib/vigil/handlers/restart-http OK HARD 1",
        ]
    );
}

#[test]
fn test_problem_state_change_while_soft_keeps_counting() {
    let mut h = Harness::new();
    h.host_up(NOW - 5);
    h.active(HTTP, 1, "WARNING - slow", NOW);
    h.active(HTTP, 2, "CRITICAL - down", NOW + 60);

    let state = &h.entity(HTTP).state;
    assert_eq!(state.current_state, State::Critical);
    assert_eq!(state.last_state, State::Warning);
    assert_eq!(state.current_attempt, 3);
    assert_eq!(state.state_type, StateType::Hard);
}

#[test]
fn test_service_problem_behind_down_host_is_hard_without_notification() {
    let mut h = Harness::new();
    h.active(HOST, 1, "PING CRITICAL - Packet loss = 100%", NOW);
    assert_eq!(h.entity(HOST).state.current_state, State::Down);
    assert_eq!(h.entity(HOST).state.state_type, StateType::Hard);
    assert_eq!(h.commands("PROBLEM web01 is DOWN").len(), 1);

    h.active(HTTP, 2, "CRITICAL - no route to host", NOW + 30);

    let state = &h.entity(HTTP).state;
    assert_eq!(state.current_state, State::Critical);
    assert_eq!(state.state_type, StateType::Hard);
    assert_eq!(state.current_attempt, 1);
    assert_eq!(state.last_hard_state, State::Critical);
    assert!(state.host_problem_at_last_check);
    assert_eq!(state.next_check, NOW + 30 + 300);
    assert_eq!(h.attempted(HTTP), 0);

    h.active(HOST, 0, "PING OK", NOW + 60);
    assert_eq!(h.commands("RECOVERY web01 is UP").len(), 1);

    h.active(HTTP, 0, "HTTP OK", NOW + 90);
    let state = &h.entity(HTTP).state;
    assert_eq!(state.current_state, State::Ok);
    assert_eq!(state.state_type, StateType::Hard);
    assert_eq!(state.last_hard_state, State::Ok);
    assert!(!state.host_problem_at_last_check);
    // nothing was sent for the problem, so nothing is owed for the recovery
    assert_eq!(h.attempted(HTTP), 0);
}

#[test]
fn test_host_with_all_parents_down_is_unreachable() {
    let mut definitions = definitions();
    definitions["hosts"] = serde_json::json!([
        { "id": 1, "name": "web01", "check_command": "check-host-alive", "max_attempts": 1, "parents": ["gw01"] },
        { "id": 2, "name": "gw01", "check_command": "check-host-alive", "max_attempts": 1 }
    ]);
    let mut h = Harness::with(definitions, test_config());
    let gateway = h.engine.registry().host_by_name("gw01").expect("gateway is registered");

    h.active(HOST, 1, "PING CRITICAL", NOW);
    assert_eq!(h.entity(HOST).state.current_state, State::Down);

    h.active(gateway, 1, "PING CRITICAL", NOW + 10);
    h.active(HOST, 1, "PING CRITICAL", NOW + 20);
    assert_eq!(h.entity(HOST).state.current_state, State::Unreachable);
}

#[test]
fn test_host_down_triggers_check_of_child_hosts() {
    let mut definitions = definitions();
    definitions["hosts"] = serde_json::json!([
        { "id": 1, "name": "web01", "check_command": "check-host-alive", "max_attempts": 1, "parents": ["gw01"] },
        { "id": 2, "name": "gw01", "address": "10.0.0.254", "check_command": "check-host-alive", "max_attempts": 1 }
    ]);
    let mut h = Harness::with(definitions, test_config());
    let gateway = h.engine.registry().host_by_name("gw01").expect("gateway is registered");

    h.active(gateway, 1, "PING CRITICAL", NOW);

    let checks = h.commands("check_ping");
    assert_eq!(checks, vec!["/usr/lib/vigil/plugins/check_ping -H "]);
    assert!(h.entity(HOST).state.is_executing);
}

#[test]
fn test_timeouts_map_to_configured_states() {
    let mut h = Harness::new();
    h.engine.start(NOW);
    h.engine.run_once(NOW);

    let http = h.last_command_id("check_http");
    let start = DateTime::from_timestamp(NOW, 0).unwrap();
    let end = DateTime::from_timestamp(NOW + 60, 0).unwrap();
    h.engine.command_finished(ExecResult::timed_out(http, start, end), NOW + 60).unwrap();

    let state = &h.entity(HTTP).state;
    assert_eq!(state.current_state, State::Unknown);
    assert_eq!(state.state_type, StateType::Soft);
    assert_eq!(state.current_attempt, 2);
    assert_eq!(state.plugin_output, "(Process Timeout)");
    assert_eq!(state.execution_time, 60.0);

    let host = h.last_command_id("check_ping");
    h.engine.command_finished(ExecResult::timed_out(host, start, end), NOW + 60).unwrap();
    let state = &h.entity(HOST).state;
    assert_eq!(state.current_state, State::Down);
    assert_eq!(state.plugin_output, "(Process Timeout)");
}

#[test]
fn test_service_timeout_state_is_configurable() {
    let config = vigil::EngineConfig { service_check_timeout_state: State::Critical, ..test_config() };
    let mut h = Harness::with(definitions(), config);
    h.engine.start(NOW);
    h.engine.run_once(NOW);

    let dns = h.last_command_id("check_dns");
    let at = DateTime::from_timestamp(NOW, 0).unwrap();
    h.engine.command_finished(ExecResult::timed_out(dns, at, at), NOW + 30).unwrap();
    assert_eq!(h.entity(DNS).state.current_state, State::Critical);
}

#[test]
fn test_spawn_failures_become_unclean_exit_results() {
    let mut h = Harness::new();
    h.executor.refuse_submissions(true);
    h.engine.start(NOW);
    h.engine.run_once(NOW);

    assert_eq!(h.engine.pending_results(), 3);
    assert_eq!(h.engine.in_flight_count(), 0);
    // the check reaper sweeps ten seconds later
    h.engine.run_once(NOW + 10);
    assert_eq!(h.engine.pending_results(), 0);

    assert_eq!(h.entity(HOST).state.current_state, State::Down);
    assert_eq!(h.entity(HOST).state.plugin_output, "(Host check did not exit properly)");
    assert_eq!(h.entity(HTTP).state.current_state, State::Unknown);
    assert_eq!(h.entity(HTTP).state.plugin_output, "(Service check did not exit properly)");
    assert!(!h.entity(HTTP).state.is_executing);
}

#[test]
fn test_out_of_bounds_return_code() {
    let mut h = Harness::new();
    h.host_up(NOW - 5);
    h.active(DNS, 127, "sh: check_dns: not found", NOW);

    let state = &h.entity(DNS).state;
    assert_eq!(state.current_state, State::Unknown);
    assert_eq!(state.plugin_output, "(Return code of 127 is out of bounds - plugin may be missing)");
}

#[test]
fn test_output_is_split_into_short_long_and_perfdata() {
    let mut h = Harness::new();
    h.host_up(NOW - 5);
    h.active(DNS, 0, "DNS OK; 0.02s | time=0.02s\nresolved to 10.0.0.10", NOW);

    let state = &h.entity(DNS).state;
    assert_eq!(state.plugin_output, "DNS OK: 0.02s");
    assert_eq!(state.perf_data, "time=0.02s");
    assert_eq!(state.long_output, "resolved to 10.0.0.10");
}

#[test]
fn test_passive_results_are_buffered_until_the_reaper_runs() {
    let mut h = Harness::new();
    h.host_up(NOW - 5);
    h.engine.start(NOW);
    let at = DateTime::from_timestamp(NOW + 2, 0).unwrap();
    h.engine.submit_passive_result(CheckResult::passive(DNS, 2, "DNS CRITICAL - SERVFAIL", at));

    assert_eq!(h.engine.pending_results(), 1);
    assert_eq!(h.entity(DNS).state.current_state, State::Ok);

    h.run_until(NOW + 10);
    assert_eq!(h.engine.pending_results(), 0);
    let state = &h.entity(DNS).state;
    assert_eq!(state.current_state, State::Critical);
    assert_eq!(state.check_type, vigil::CheckType::Passive);
    assert_eq!(state.last_check, NOW + 2);
}

#[test]
fn test_passive_results_can_be_refused() {
    let mut h = Harness::new();
    h.engine.set_passive_checks_enabled(HTTP, false).unwrap();
    assert_eq!(h.passive(HTTP, 2, "CRITICAL", NOW), ResultDisposition::PassiveRejected);
    assert_eq!(h.entity(HTTP).state.current_state, State::Ok);

    let config = vigil::EngineConfig { accept_passive_service_checks: false, ..test_config() };
    let mut h = Harness::with(definitions(), config);
    assert_eq!(h.passive(DNS, 2, "CRITICAL", NOW), ResultDisposition::PassiveRejected);
    assert_eq!(h.passive(HOST, 0, "UP", NOW), ResultDisposition::Processed);
}

#[test]
fn test_results_for_unknown_entities_are_errors() {
    let mut h = Harness::new();
    let at = DateTime::from_timestamp(NOW, 0).unwrap();
    let result = CheckResult::passive(vigil::EntityKey::Service(1, 99), 0, "OK", at);
    assert!(h.engine.process_check_result(result, NOW).is_err());
}

#[test]
fn test_disabled_event_handlers_do_not_run() {
    let mut h = Harness::new();
    h.host_up(NOW - 5);
    h.engine.set_event_handler_enabled(HTTP, false).unwrap();
    h.active(HTTP, 2, "CRITICAL", NOW);
    assert!(h.commands("restart-http").is_empty());

    h.engine.set_event_handler_enabled(HTTP, true).unwrap();
    h.engine.set_global_event_handlers(false);
    h.active(HTTP, 0, "OK", NOW + 60);
    assert!(h.commands("restart-http").is_empty());
}

#[test]
fn test_global_event_handler_runs_before_the_entity_handler() {
    let config = vigil::EngineConfig {
        global_service_event_handler: Some("restart-http".to_string()),
        ..test_config()
    };
    let mut h = Harness::with(definitions(), config);
    h.host_up(NOW - 5);
    h.active(HTTP, 2, "CRITICAL", NOW);

    assert_eq!(h.commands("restart-http").len(), 2);
    // DNS has no handler of its own
    h.active(DNS, 2, "CRITICAL", NOW + 1);
    assert_eq!(h.commands("restart-http").len(), 3);
}

#[test]
fn test_volatile_service_alerts_on_every_hard_problem() {
    let mut definitions = definitions();
    definitions["services"][1]["is_volatile"] = serde_json::json!(true);
    let mut h = Harness::with(definitions, test_config());
    h.host_up(NOW - 5);

    h.active(DNS, 2, "CRITICAL", NOW);
    h.active(DNS, 2, "CRITICAL", NOW + 60);
    h.active(DNS, 2, "CRITICAL", NOW + 120);

    assert_eq!(h.sent(DNS, NotificationType::Normal), 3);
}
