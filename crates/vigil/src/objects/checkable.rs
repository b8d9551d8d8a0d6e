use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use super::{AckType, CheckType, EntityKey, EntityKind, State, StateSet, StateType};
use crate::Timestamp;
use crate::flapping::FlapHistory;

/// A host or a service: static configuration plus the dynamic state the
/// engine mutates on every check.
#[derive(Debug, Clone)]
pub struct Checkable {
    pub key: EntityKey,
    pub config: CheckableConfig,
    pub state: RuntimeState,
}

/// Static attributes injected by the configuration loader
#[derive(Debug, Clone)]
pub struct CheckableConfig {
    /// Host name for hosts, service description for services
    pub name: String,
    /// Name of the host the entity lives on
    pub host_name: String,
    pub alias: String,
    pub address: String,
    /// Parent hosts (hosts only)
    pub parents: Vec<EntityKey>,
    pub check_command: Option<String>,
    pub event_handler: Option<String>,
    /// Interval units between checks in a steady state
    pub check_interval: f64,
    /// Interval units between checks while in a soft problem state
    pub retry_interval: f64,
    pub max_attempts: u32,
    pub check_period: Option<String>,
    pub notification_period: Option<String>,
    pub notification_interval: f64,
    pub first_notification_delay: f64,
    /// Problem states worth a notification; the baseline state enables
    /// recovery notifications
    pub notify_on: StateSet,
    pub notify_on_flapping: bool,
    pub notify_on_downtime: bool,
    pub contacts: Vec<String>,
    pub contact_groups: Vec<String>,
    pub low_flap_threshold: f64,
    pub high_flap_threshold: f64,
    pub flap_detection_on: StateSet,
    pub is_volatile: bool,
    pub check_freshness: bool,
    /// Zero means "derive from the check interval"
    pub freshness_threshold: i64,
    pub timezone: Tz,
    pub initial_state: State,
}

/// Dynamic state. Everything except in-flight bookkeeping and the raw flap
/// history survives a restart through retention.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeState {
    pub current_state: State,
    pub last_state: State,
    pub last_hard_state: State,
    pub state_type: StateType,
    pub current_attempt: u32,
    pub has_been_checked: bool,
    pub check_type: CheckType,
    pub plugin_output: String,
    pub long_output: String,
    pub perf_data: String,
    pub last_check: Timestamp,
    pub next_check: Timestamp,
    pub last_state_change: Timestamp,
    pub last_hard_state_change: Timestamp,
    pub last_time_ok: Timestamp,
    pub last_time_problem: Timestamp,
    pub latency: f64,
    pub execution_time: f64,
    pub checks_enabled: bool,
    pub accept_passive_checks: bool,
    pub notifications_enabled: bool,
    pub event_handler_enabled: bool,
    pub flap_detection_enabled: bool,
    pub should_be_scheduled: bool,
    pub problem_acknowledged: bool,
    pub ack_type: AckType,
    pub last_acknowledgement: Timestamp,
    /// Seconds after which the acknowledgement expires, zero for never
    pub acknowledgement_timeout: i64,
    pub current_notification_number: u32,
    pub current_notification_id: u64,
    pub last_notification: Timestamp,
    pub next_notification: Timestamp,
    pub no_more_notifications: bool,
    /// Problem states a notification went out for during the current episode
    pub notified_on: StateSet,
    /// When the current problem was first seen, start of the first
    /// notification delay
    pub first_problem_time: Timestamp,
    /// A recovery notification is owed once flapping stops
    pub check_flapping_recovery_notification: bool,
    pub percent_state_change: f64,
    pub is_flapping: bool,
    pub flapping_comment_id: Option<u64>,
    pub scheduled_downtime_depth: u32,
    /// The correlated parent was not reachable when this entity was last checked
    pub host_problem_at_last_check: bool,
    pub current_event_id: u64,
    pub last_event_id: u64,
    pub current_problem_id: u64,
    pub last_problem_id: u64,
    #[serde(skip)]
    pub is_executing: bool,
    #[serde(skip)]
    pub is_being_freshened: bool,
    #[serde(skip)]
    pub flap_history: FlapHistory,
}

impl RuntimeState {
    pub fn new(initial_state: State) -> Self {
        Self {
            current_state: initial_state,
            last_state: initial_state,
            last_hard_state: initial_state,
            state_type: StateType::Hard,
            current_attempt: 1,
            has_been_checked: false,
            check_type: CheckType::Active,
            plugin_output: String::new(),
            long_output: String::new(),
            perf_data: String::new(),
            last_check: 0,
            next_check: 0,
            last_state_change: 0,
            last_hard_state_change: 0,
            last_time_ok: 0,
            last_time_problem: 0,
            latency: 0.0,
            execution_time: 0.0,
            checks_enabled: true,
            accept_passive_checks: true,
            notifications_enabled: true,
            event_handler_enabled: true,
            flap_detection_enabled: true,
            should_be_scheduled: true,
            problem_acknowledged: false,
            ack_type: AckType::None,
            last_acknowledgement: 0,
            acknowledgement_timeout: 0,
            current_notification_number: 0,
            current_notification_id: 0,
            last_notification: 0,
            next_notification: 0,
            no_more_notifications: false,
            notified_on: StateSet::EMPTY,
            first_problem_time: 0,
            check_flapping_recovery_notification: false,
            percent_state_change: 0.0,
            is_flapping: false,
            flapping_comment_id: None,
            scheduled_downtime_depth: 0,
            host_problem_at_last_check: false,
            current_event_id: 0,
            last_event_id: 0,
            current_problem_id: 0,
            last_problem_id: 0,
            is_executing: false,
            is_being_freshened: false,
            flap_history: FlapHistory::default(),
        }
    }

    pub fn clear_acknowledgement(&mut self) {
        self.problem_acknowledged = false;
        self.ack_type = AckType::None;
        self.acknowledgement_timeout = 0;
    }
}

impl Checkable {
    pub fn new(key: EntityKey, config: CheckableConfig) -> Self {
        let state = RuntimeState::new(config.initial_state);
        Self { key, config, state }
    }

    pub fn kind(&self) -> EntityKind {
        self.key.kind()
    }

    pub fn baseline(&self) -> State {
        State::baseline(self.kind())
    }

    /// `host_name` for hosts, `host_name/description` for services
    pub fn display_name(&self) -> String {
        match self.key {
            EntityKey::Host(_) => self.config.name.clone(),
            EntityKey::Service(..) => format!("{}/{}", self.config.host_name, self.config.name),
        }
    }

    pub fn in_downtime(&self) -> bool {
        self.state.scheduled_downtime_depth > 0
    }

    /// Seconds until the next regular check
    pub fn check_interval_secs(&self, interval_length: i64) -> i64 {
        (self.config.check_interval * interval_length as f64) as i64
    }

    /// Seconds until the next check while retrying a soft problem
    pub fn retry_interval_secs(&self, interval_length: i64) -> i64 {
        (self.config.retry_interval * interval_length as f64) as i64
    }

    /// Interval to use for the next check given the current state
    pub fn current_interval_secs(&self, interval_length: i64) -> i64 {
        if self.state.state_type == StateType::Soft && self.state.current_state.is_problem() {
            self.retry_interval_secs(interval_length)
        } else {
            self.check_interval_secs(interval_length)
        }
    }
}

impl CheckableConfig {
    /// Minimal configuration, mostly useful for tests and tooling
    pub fn new(name: impl Into<String>, host_name: impl Into<String>, kind: EntityKind) -> Self {
        let baseline = State::baseline(kind);
        let all = match kind {
            EntityKind::Host => StateSet::of(&[State::Up, State::Down, State::Unreachable]),
            EntityKind::Service => {
                StateSet::of(&[State::Ok, State::Warning, State::Critical, State::Unknown])
            }
        };
        Self {
            name: name.into(),
            host_name: host_name.into(),
            alias: String::new(),
            address: String::new(),
            parents: Vec::new(),
            check_command: None,
            event_handler: None,
            check_interval: 5.0,
            retry_interval: 1.0,
            max_attempts: 3,
            check_period: None,
            notification_period: None,
            notification_interval: 30.0,
            first_notification_delay: 0.0,
            notify_on: all,
            notify_on_flapping: true,
            notify_on_downtime: true,
            contacts: Vec::new(),
            contact_groups: Vec::new(),
            low_flap_threshold: 0.0,
            high_flap_threshold: 0.0,
            flap_detection_on: all,
            is_volatile: false,
            check_freshness: false,
            freshness_threshold: 0,
            timezone: Tz::UTC,
            initial_state: baseline,
        }
    }
}
