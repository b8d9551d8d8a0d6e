//! Fire-and-forget event publication for observers of the engine.

use tracing::{debug, trace};

use crate::Timestamp;
use crate::notifications::NotificationType;
use crate::objects::{CheckType, EntityKey, State, StateType};

/// Notable points of the check, flap and notification pipelines
#[derive(Debug, Clone, PartialEq)]
pub enum BrokerEvent {
    CheckProcessed {
        target: EntityKey,
        check_type: CheckType,
        state: State,
        state_type: StateType,
        attempt: u32,
        return_code: i32,
        early_timeout: bool,
        latency: f64,
        execution_time: f64,
        output: String,
    },
    StateChangeStart {
        target: EntityKey,
        state: State,
        state_type: StateType,
        attempt: u32,
        max_attempts: u32,
    },
    StateChangeEnd {
        target: EntityKey,
        state: State,
        state_type: StateType,
        attempt: u32,
        max_attempts: u32,
    },
    FlappingStart {
        target: EntityKey,
        percent_state_change: f64,
        high_threshold: f64,
        low_threshold: f64,
        comment_id: u64,
    },
    FlappingStop {
        target: EntityKey,
        percent_state_change: f64,
        high_threshold: f64,
        low_threshold: f64,
        /// True when the stop was caused by disabling flap detection
        disabled: bool,
    },
    NotificationStart {
        target: EntityKey,
        notification_type: NotificationType,
        notification_id: u64,
        escalated: bool,
        at: Timestamp,
    },
    NotificationEnd {
        target: EntityKey,
        notification_type: NotificationType,
        notification_id: u64,
        escalated: bool,
        contacts_notified: usize,
        at: Timestamp,
    },
    AdaptiveAttribute {
        target: EntityKey,
        attribute: &'static str,
        value: String,
    },
    AcknowledgementAdded {
        target: EntityKey,
        author: String,
        sticky: bool,
    },
    DowntimeStarted {
        target: EntityKey,
        downtime_id: u64,
    },
    DowntimeStopped {
        target: EntityKey,
        downtime_id: u64,
        cancelled: bool,
    },
}

/// Receives [`BrokerEvent`]s.
///
/// The engine never waits on a broker and ignores its errors beyond a debug
/// log line.
pub trait Broker: Send + Sync {
    fn publish(&self, event: &BrokerEvent) -> anyhow::Result<()>;
}

/// Broker that writes every event to the `vigil::broker` tracing target
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingBroker;

impl Broker for TracingBroker {
    fn publish(&self, event: &BrokerEvent) -> anyhow::Result<()> {
        trace!(target: "vigil::broker", "{:?}", event);
        Ok(())
    }
}

/// Publishes and swallows failures
pub(crate) fn emit(broker: &dyn Broker, event: BrokerEvent) {
    if let Err(error) = broker.publish(&event) {
        debug!("Broker rejected event: {error:#}");
    }
}
