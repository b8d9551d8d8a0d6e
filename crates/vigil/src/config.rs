//! Engine-wide settings.
//!
//! Every field has a default so a partial `[engine]` table in the service
//! configuration file is enough.

use serde::{Deserialize, Serialize};

use crate::objects::State;

/// Global switches and tunables consulted by the scheduler, the check result
/// state machine, the flap detector and the notification engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Length in seconds of one "interval unit" used by check, retry and
    /// notification intervals
    pub interval_length: i64,
    pub execute_service_checks: bool,
    pub execute_host_checks: bool,
    pub accept_passive_service_checks: bool,
    pub accept_passive_host_checks: bool,
    pub enable_notifications: bool,
    pub enable_event_handlers: bool,
    pub enable_flap_detection: bool,
    pub low_service_flap_threshold: f64,
    pub high_service_flap_threshold: f64,
    pub low_host_flap_threshold: f64,
    pub high_host_flap_threshold: f64,
    /// Seconds a host result stays usable for correlated checks
    pub cached_host_check_horizon: i64,
    /// Seconds a service result stays usable for predictive checks
    pub cached_service_check_horizon: i64,
    pub enable_predictive_host_dependency_checks: bool,
    pub enable_predictive_service_dependency_checks: bool,
    /// Use the current (possibly soft) state of master entities when
    /// evaluating dependencies instead of their last hard state
    pub soft_state_dependencies: bool,
    pub service_check_timeout: u64,
    pub host_check_timeout: u64,
    pub event_handler_timeout: u64,
    pub notification_timeout: u64,
    /// State assigned to a service whose check timed out
    pub service_check_timeout_state: State,
    /// Zero means unlimited
    pub max_parallel_service_checks: usize,
    /// Forward clock jumps smaller than this many seconds are not compensated
    pub time_change_threshold: i64,
    pub check_reaper_interval: i64,
    /// Recover services whose check result never came back
    pub check_orphaned_services: bool,
    pub check_orphaned_hosts: bool,
    /// Seconds between two orphaned check sweeps
    pub orphan_check_interval: i64,
    pub check_service_freshness: bool,
    pub check_host_freshness: bool,
    pub service_freshness_check_interval: i64,
    pub host_freshness_check_interval: i64,
    pub additional_freshness_latency: i64,
    /// Seconds between consecutive initial checks when starting up
    pub inter_check_delay: f64,
    /// IANA zone used by entities and contacts that do not name their own
    pub default_timezone: String,
    pub log_service_retries: bool,
    pub log_host_retries: bool,
    pub log_passive_checks: bool,
    pub global_host_event_handler: Option<String>,
    pub global_service_event_handler: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            interval_length: 60,
            execute_service_checks: true,
            execute_host_checks: true,
            accept_passive_service_checks: true,
            accept_passive_host_checks: true,
            enable_notifications: true,
            enable_event_handlers: true,
            enable_flap_detection: true,
            low_service_flap_threshold: 20.0,
            high_service_flap_threshold: 30.0,
            low_host_flap_threshold: 20.0,
            high_host_flap_threshold: 30.0,
            cached_host_check_horizon: 15,
            cached_service_check_horizon: 15,
            enable_predictive_host_dependency_checks: true,
            enable_predictive_service_dependency_checks: true,
            soft_state_dependencies: false,
            service_check_timeout: 60,
            host_check_timeout: 30,
            event_handler_timeout: 30,
            notification_timeout: 30,
            service_check_timeout_state: State::Unknown,
            max_parallel_service_checks: 0,
            time_change_threshold: 900,
            check_reaper_interval: 10,
            check_orphaned_services: true,
            check_orphaned_hosts: true,
            orphan_check_interval: 60,
            check_service_freshness: true,
            check_host_freshness: false,
            service_freshness_check_interval: 60,
            host_freshness_check_interval: 60,
            additional_freshness_latency: 15,
            inter_check_delay: 0.0,
            default_timezone: "UTC".to_string(),
            log_service_retries: false,
            log_host_retries: false,
            log_passive_checks: true,
            global_host_event_handler: None,
            global_service_event_handler: None,
        }
    }
}

impl EngineConfig {
    /// Converts a number of interval units into seconds
    pub fn interval_seconds(&self, units: f64) -> i64 {
        (units * self.interval_length as f64) as i64
    }
}
