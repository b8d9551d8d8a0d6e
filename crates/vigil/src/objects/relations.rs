use serde::{Deserialize, Serialize};

use super::{EntityKey, StateSet};

/// Alternate recipients once a problem has been notified a given number of times
#[derive(Debug, Clone)]
pub struct Escalation {
    pub target: EntityKey,
    pub first_notification: u32,
    /// Zero means "no upper bound"
    pub last_notification: u32,
    /// Interval units between notifications while this tier applies.
    /// Negative values leave the entity's own interval in charge.
    pub notification_interval: f64,
    pub escalation_period: Option<String>,
    /// States this tier applies to; the baseline state covers recoveries
    pub escalate_on: StateSet,
    pub contacts: Vec<String>,
    pub contact_groups: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyKind {
    /// Gates whether the dependent entity is checked
    Execution,
    /// Gates whether the dependent entity notifies
    Notification,
}

/// `dependent` relies on `master`; when the master is in one of the
/// `fail_on` states the dependency fails.
#[derive(Debug, Clone)]
pub struct Dependency {
    pub dependent: EntityKey,
    pub master: EntityKey,
    pub kind: DependencyKind,
    pub fail_on: StateSet,
    /// Fail when the master has never been checked
    pub fail_on_pending: bool,
    /// Also fail when the master's own dependencies fail
    pub inherits_parent: bool,
    pub period: Option<String>,
}
