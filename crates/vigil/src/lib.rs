//! Vigil - check scheduling and alerting core for a host/service monitoring engine
//!
//! The crate owns the long-lived state of every monitored entity and decides
//! when each one is checked, how a finished check changes its state, whether
//! it is flapping and who should hear about it. Process execution, event
//! publication and persistence are reached through the [`CommandExecutor`],
//! [`Broker`] and [`RetentionSnapshot`] boundaries.

pub mod acknowledgement;
pub mod broker;
pub mod checks;
pub mod comments;
pub mod commands;
pub mod config;
pub mod counters;
pub mod downtime;
pub mod engine;
pub mod error;
pub mod events;
pub mod flapping;
pub mod notifications;
pub mod objects;
pub mod retention;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod timeperiod;

// Re-export main types
pub use broker::{Broker, BrokerEvent, TracingBroker};
pub use checks::{CheckOptions, CheckResult, CheckViability};
pub use commands::{CommandExecutor, CommandId, CommandRequest, ExecError, ExecResult, ExitStatus};
pub use config::EngineConfig;
pub use counters::SequenceCounters;
pub use engine::Engine;
pub use error::{ConfigError, EngineError};
pub use events::{EventKind, ScheduleOutcome, TimedEvent, TimedEventQueue};
pub use flapping::FlapHistory;
pub use notifications::{NotificationOptions, NotificationType};
pub use objects::{
    AckType, CheckType, Checkable, EntityKey, EntityKind, ObjectDefinitions, ObjectRegistry, State,
    StateSet, StateType,
};
pub use retention::RetentionSnapshot;

/// Seconds since the Unix epoch. All scheduling arithmetic happens in this unit.
pub type Timestamp = i64;

/// Seconds in one week, used when a check period never opens again
pub const ONE_WEEK: i64 = 7 * 24 * 3600;

/// Seconds in one year, used when a notification period never opens again
pub const ONE_YEAR: i64 = 365 * 24 * 3600;
