//! Check results and everything that turns them into entity state.
//!
//! - [`output`]: plugin output parsing and return code interpretation
//! - [`viability`]: may a scheduled check run right now?
//! - [`dependencies`]: execution and notification dependency evaluation
//! - [`scheduling`]: queueing, dispatching and freshness of checks
//! - [`processor`]: the check result state machine

pub mod dependencies;
pub mod output;
pub mod processor;
pub mod scheduling;
pub mod viability;

pub use processor::ResultDisposition;
pub use viability::{CheckViability, RejectReason};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::commands::{ExecResult, ExitStatus};
use crate::objects::{CheckType, EntityKey};

/// Why a check was requested
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckOptions {
    /// Run even when checks are disabled or outside the check period
    pub forced: bool,
    /// Requested because the last result went stale
    pub freshness: bool,
    /// Result of a check whose originating request was lost
    pub orphan: bool,
}

impl CheckOptions {
    pub fn forced() -> Self {
        Self { forced: true, ..Self::default() }
    }

    pub fn freshness() -> Self {
        Self { forced: true, freshness: true, orphan: false }
    }

    pub fn orphan() -> Self {
        Self { orphan: true, ..Self::default() }
    }
}

/// One completed check, consumed once by the state machine
#[derive(Debug, Clone, PartialEq)]
pub struct CheckResult {
    pub target: EntityKey,
    pub check_type: CheckType,
    pub options: CheckOptions,
    /// Reschedule the entity's regular check after processing
    pub reschedule_check: bool,
    pub start_time: DateTime<Utc>,
    pub finish_time: DateTime<Utc>,
    /// Seconds between the scheduled and the actual start
    pub latency: f64,
    pub exited_ok: bool,
    pub early_timeout: bool,
    pub return_code: i32,
    pub output: String,
}

impl CheckResult {
    /// Result submitted by an external source
    pub fn passive(target: EntityKey, return_code: i32, output: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            target,
            check_type: CheckType::Passive,
            options: CheckOptions::default(),
            reschedule_check: false,
            start_time: at,
            finish_time: at,
            latency: 0.0,
            exited_ok: true,
            early_timeout: false,
            return_code,
            output: output.into(),
        }
    }

    /// Result of an active check run through the command executor
    pub fn from_exec(target: EntityKey, options: CheckOptions, reschedule_check: bool, latency: f64, exec: &ExecResult) -> Self {
        let output = if exec.stdout.is_empty() && exec.exit_status == ExitStatus::Crashed {
            exec.stderr.clone()
        } else {
            exec.stdout.clone()
        };
        Self {
            target,
            check_type: CheckType::Active,
            options,
            reschedule_check,
            start_time: exec.start_time,
            finish_time: exec.end_time,
            latency,
            exited_ok: exec.exit_status != ExitStatus::Crashed,
            early_timeout: exec.exit_status == ExitStatus::Timeout,
            return_code: exec.exit_code,
            output,
        }
    }

    /// Wall-clock duration of the check in seconds, never negative
    pub fn execution_time(&self) -> f64 {
        let millis = (self.finish_time - self.start_time).num_milliseconds();
        (millis as f64 / 1000.0).max(0.0)
    }
}
