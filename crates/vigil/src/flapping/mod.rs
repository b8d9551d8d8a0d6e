//! Flap detection: a bounded history of recent states and the weighted
//! percentage of state changes it contains.
//!
//! [`FlapHistory`] and [`evaluate`] are pure; applying a transition (comment,
//! broker event, notification) is done by the engine in [`detector`].

pub mod detector;

use crate::objects::State;

/// Number of states kept per entity
pub const MAX_STATE_HISTORY_ENTRIES: usize = 21;

/// Weight of the oldest transition in the history
pub const LOW_CURVE_VALUE: f64 = 0.75;

/// Weight of the most recent transition in the history
pub const HIGH_CURVE_VALUE: f64 = 1.25;

/// Ring buffer of the last [`MAX_STATE_HISTORY_ENTRIES`] recorded states.
///
/// Only the percentage derived from it is durable; the buffer itself is
/// reseeded from the current state after a restart.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlapHistory {
    states: Vec<State>,
    index: usize,
}

impl FlapHistory {
    /// History filled with a single state, i.e. no change recorded yet
    pub fn seeded(state: State) -> Self {
        let mut history = Self::default();
        history.seed(state);
        history
    }

    /// Fills the buffer with `state` and rewinds the write cursor
    pub fn seed(&mut self, state: State) {
        self.states = vec![state; MAX_STATE_HISTORY_ENTRIES];
        self.index = 0;
    }

    pub fn is_seeded(&self) -> bool {
        self.states.len() == MAX_STATE_HISTORY_ENTRIES
    }

    /// Overwrites the slot at the cursor and advances it, wrapping around
    pub fn record(&mut self, state: State) {
        if !self.is_seeded() {
            self.seed(state);
        }
        self.states[self.index] = state;
        self.index = (self.index + 1) % MAX_STATE_HISTORY_ENTRIES;
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Weighted share of state changes in the history, in `[0, 100]`.
    ///
    /// Walking from the oldest slot (the cursor) to the newest, each change
    /// between adjacent slots weighs from [`LOW_CURVE_VALUE`] for the oldest
    /// to [`HIGH_CURVE_VALUE`] for the newest.
    pub fn percent_state_change(&self) -> f64 {
        if !self.is_seeded() {
            return 0.0;
        }
        let n = MAX_STATE_HISTORY_ENTRIES;
        let step = (HIGH_CURVE_VALUE - LOW_CURVE_VALUE) / (n - 2) as f64;

        let mut changes = 0.0;
        let mut previous = self.states[self.index];
        for x in 1..n {
            let current = self.states[(self.index + x) % n];
            if current != previous {
                changes += (x - 1) as f64 * step + LOW_CURVE_VALUE;
            }
            previous = current;
        }

        (changes * 100.0 / (n - 1) as f64).clamp(0.0, 100.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlapTransition {
    Start,
    Stop,
    Unchanged,
}

/// Low/high thresholds in percent
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub low: f64,
    pub high: f64,
}

impl Thresholds {
    /// Entity thresholds win when positive, otherwise the global ones apply
    pub fn resolve(entity_low: f64, entity_high: f64, global_low: f64, global_high: f64) -> Self {
        Self {
            low: if entity_low > 0.0 { entity_low } else { global_low },
            high: if entity_high > 0.0 { entity_high } else { global_high },
        }
    }
}

/// Hysteresis: strictly between the thresholds the current flag is kept,
/// at or above `high` the entity flaps, at or below `low` it does not.
pub fn evaluate(percent: f64, thresholds: Thresholds, currently_flapping: bool) -> FlapTransition {
    let flapping = if percent >= thresholds.high {
        true
    } else if percent <= thresholds.low {
        false
    } else {
        return FlapTransition::Unchanged;
    };

    match (flapping, currently_flapping) {
        (true, false) => FlapTransition::Start,
        (false, true) => FlapTransition::Stop,
        _ => FlapTransition::Unchanged,
    }
}
