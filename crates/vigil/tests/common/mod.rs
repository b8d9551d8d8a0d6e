//! Shared fixture: an engine wired to recording collaborators and a small
//! object set (one host with an HTTP and a DNS service).

#![allow(dead_code)]

use std::sync::Arc;

use chrono::DateTime;
use serde_json::{Value, json};
use vigil::broker::BrokerEvent;
use vigil::checks::ResultDisposition;
use vigil::testing::{RecordingBroker, RecordingExecutor};
use vigil::{
    CheckOptions, CheckResult, Checkable, CommandId, Engine, EngineConfig, EntityKey, ExecResult,
    NotificationType, ObjectDefinitions, ObjectRegistry, Timestamp,
};

/// Tuesday 2023-11-14 22:13:20 UTC
pub const NOW: Timestamp = 1_700_000_000;

/// Wednesday 2023-11-15 09:00:00 UTC, start of the next "workhours" range
pub const NEXT_WORKDAY_MORNING: Timestamp = 1_700_038_800;

pub const HOST: EntityKey = EntityKey::Host(1);
pub const HTTP: EntityKey = EntityKey::Service(1, 1);
pub const DNS: EntityKey = EntityKey::Service(1, 2);

pub fn definitions() -> Value {
    json!({
        "commands": [
            { "name": "check-host-alive", "command_line": "/usr/lib/vigil/plugins/check_ping -H $HOSTADDRESS$" },
            { "name": "check-http", "command_line": "/usr/lib/vigil/plugins/check_http -H $HOSTADDRESS$ -u $ARG1$" },
            { "name": "check-dns", "command_line": "/usr/lib/vigil/plugins/check_dns -H $HOSTADDRESS$" },
            {
                "name": "notify-host-by-email",
                "command_line": "/usr/bin/mail -s '$NOTIFICATIONTYPE$ $HOSTNAME$ is $HOSTSTATE$' $CONTACTEMAIL$"
            },
            {
                "name": "notify-service-by-email",
                "command_line": "/usr/bin/mail -s '$NOTIFICATIONTYPE$ $HOSTNAME$/$SERVICEDESC$ is $SERVICESTATE$' $CONTACTEMAIL$"
            },
            {
                "name": "restart-http",
                "command_line": "/usr/lib/vigil/handlers/restart-http $SERVICESTATE$ $SERVICESTATETYPE$ $SERVICEATTEMPT$"
            }
        ],
        "timeperiods": [{
            "name": "workhours",
            "monday": "09:00-17:00",
            "tuesday": "09:00-17:00",
            "wednesday": "09:00-17:00",
            "thursday": "09:00-17:00",
            "friday": "09:00-17:00"
        }],
        "contacts": [
            {
                "name": "alice",
                "email": "alice@example.com",
                "host_notification_commands": ["notify-host-by-email"],
                "service_notification_commands": ["notify-service-by-email"]
            },
            {
                "name": "oncall-lead",
                "email": "lead@example.com",
                "host_notification_commands": ["notify-host-by-email"],
                "service_notification_commands": ["notify-service-by-email"]
            }
        ],
        "hosts": [{
            "id": 1,
            "name": "web01",
            "address": "10.0.0.1",
            "check_command": "check-host-alive",
            "max_attempts": 1,
            "contacts": ["alice"]
        }],
        "services": [
            {
                "id": 1,
                "host": "web01",
                "description": "http",
                "check_command": "check-http!/health",
                "event_handler": "restart-http",
                "contacts": ["alice"]
            },
            {
                "id": 2,
                "host": "web01",
                "description": "dns",
                "check_command": "check-dns",
                "max_attempts": 1,
                "low_flap_threshold": 25.0,
                "high_flap_threshold": 50.0,
                "contacts": ["alice"]
            }
        ]
    })
}

/// Defaults with clock jump compensation out of the way of tests that skip
/// ahead in time
pub fn test_config() -> EngineConfig {
    EngineConfig { time_change_threshold: 86_400, ..EngineConfig::default() }
}

pub struct Harness {
    pub engine: Engine,
    pub executor: Arc<RecordingExecutor>,
    pub broker: Arc<RecordingBroker>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(definitions(), test_config())
    }

    pub fn with(definitions: Value, config: EngineConfig) -> Self {
        let _ = tracing_subscriber::fmt::try_init();

        let definitions: ObjectDefinitions = serde_json::from_value(definitions).expect("valid definitions");
        let mut registry = ObjectRegistry::new();
        let errors = registry.apply(definitions, &config);
        assert!(errors.is_empty(), "definition errors: {errors:?}");

        let executor = Arc::new(RecordingExecutor::new());
        let broker = Arc::new(RecordingBroker::new());
        let engine = Engine::new(config, registry, executor.clone(), broker.clone());
        Self { engine, executor, broker }
    }

    pub fn entity(&self, key: EntityKey) -> &Checkable {
        self.engine.entity(key).expect("entity is registered")
    }

    /// Runs whatever is due at `at`, then applies an active result finished
    /// at that time
    pub fn active(&mut self, key: EntityKey, code: i32, output: &str, at: Timestamp) -> ResultDisposition {
        self.engine.run_once(at);
        let when = DateTime::from_timestamp(at, 0).expect("valid timestamp");
        let exec = ExecResult::normal(CommandId::new(), when, when, code, output);
        let result = CheckResult::from_exec(key, CheckOptions::default(), true, 0.0, &exec);
        self.engine.process_check_result(result, at).expect("result is processed")
    }

    pub fn passive(&mut self, key: EntityKey, code: i32, output: &str, at: Timestamp) -> ResultDisposition {
        let when = DateTime::from_timestamp(at, 0).expect("valid timestamp");
        let result = CheckResult::passive(key, code, output, when);
        self.engine.process_check_result(result, at).expect("result is processed")
    }

    /// A fresh UP result for the host, inside the cache horizon of checks
    /// that follow within a few seconds
    pub fn host_up(&mut self, at: Timestamp) {
        self.active(HOST, 0, "PING OK - Packet loss = 0%", at);
    }

    /// Drives the event loop through every wakeup up to `until`
    pub fn run_until(&mut self, until: Timestamp) {
        while let Some(next) = self.engine.next_wakeup() {
            if next > until {
                break;
            }
            self.engine.run_once(next);
        }
        self.engine.run_once(until);
    }

    /// Notifications of `kind` for `target` that reached at least one contact
    pub fn sent(&self, target: EntityKey, kind: NotificationType) -> usize {
        self.broker.count(|event| {
            matches!(
                event,
                BrokerEvent::NotificationEnd { target: t, notification_type, contacts_notified, .. }
                    if *t == target && *notification_type == kind && *contacts_notified > 0
            )
        })
    }

    /// Notification attempts of any type for `target` that passed viability
    pub fn attempted(&self, target: EntityKey) -> usize {
        self.broker
            .count(|event| matches!(event, BrokerEvent::NotificationStart { target: t, .. } if *t == target))
    }

    /// Command lines submitted so far that contain `needle`
    pub fn commands(&self, needle: &str) -> Vec<String> {
        self.executor
            .matching(needle)
            .into_iter()
            .map(|(_, request)| request.command_line)
            .collect()
    }

    /// Id of the most recent submission whose command line contains `needle`
    pub fn last_command_id(&self, needle: &str) -> CommandId {
        self.executor.matching(needle).last().map(|(id, _)| *id).expect("command was submitted")
    }
}
