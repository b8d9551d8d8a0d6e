use thiserror::Error;

use crate::objects::EntityKey;

/// Problems found while applying object definitions.
///
/// Each error disables only the object it names; everything else in the same
/// definition set is still activated.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    #[error("{object}: unknown time period '{period}'")]
    MissingTimePeriod { object: String, period: String },
    #[error("{object}: unknown parent host '{parent}'")]
    MissingParent { object: String, parent: String },
    #[error("{object}: unknown command '{command}'")]
    MissingCommand { object: String, command: String },
    #[error("{object}: unknown contact or contact group '{name}'")]
    MissingContact { object: String, name: String },
    #[error("{object}: unknown entity '{target}'")]
    MissingTarget { object: String, target: String },
    #[error("{object}: invalid time zone '{zone}'")]
    InvalidTimeZone { object: String, zone: String },
    #[error("{object}: max_attempts must be at least 1")]
    InvalidAttempts { object: String },
    #[error("{object}: {field} must not be negative")]
    InvalidInterval { object: String, field: &'static str },
    #[error("{object}: invalid time range '{range}'")]
    InvalidTimeRange { object: String, range: String },
    #[error("{object}: defined more than once")]
    Duplicate { object: String },
}

/// Runtime failures of engine operations.
///
/// None of these stop the engine; the failing operation is abandoned and the
/// caller decides what to report.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unknown entity {0}")]
    UnknownEntity(EntityKey),
    #[error("unknown downtime {0}")]
    UnknownDowntime(u64),
    #[error("downtime window {start}..{end} is empty or already over")]
    InvalidDowntimeWindow { start: i64, end: i64 },
    #[error("{0} is not in a problem state")]
    NotAProblem(EntityKey),
    #[error("invariant violated: {0}")]
    Invariant(String),
    #[error("{0:#}")]
    Config(#[from] ConfigError),
    #[error("{0:#}")]
    Retention(#[from] serde_json::Error),
}
