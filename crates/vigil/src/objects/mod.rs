//! Monitored objects and the registry that owns them.
//!
//! Hosts and services share one [`Checkable`] shape and are addressed by a
//! stable [`EntityKey`]. Relations between objects (parents, contacts,
//! escalations, dependencies) are stored as keys or names and resolved
//! through the [`ObjectRegistry`].

pub mod checkable;
pub mod contact;
pub mod registry;
pub mod relations;

pub use checkable::{Checkable, CheckableConfig, RuntimeState};
pub use contact::{Contact, ContactGroup};
pub use registry::{ObjectDefinitions, ObjectRegistry};
pub use relations::{Dependency, DependencyKind, Escalation};

use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable identity of a host or a service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityKey {
    Host(u64),
    /// (host id, service id)
    Service(u64, u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Host,
    Service,
}

impl EntityKey {
    pub fn kind(&self) -> EntityKind {
        match self {
            EntityKey::Host(_) => EntityKind::Host,
            EntityKey::Service(..) => EntityKind::Service,
        }
    }

    pub fn is_host(&self) -> bool {
        matches!(self, EntityKey::Host(_))
    }

    /// Key of the host this entity lives on (itself for hosts)
    pub fn host(&self) -> EntityKey {
        match *self {
            EntityKey::Host(id) | EntityKey::Service(id, _) => EntityKey::Host(id),
        }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKey::Host(id) => write!(f, "host#{id}"),
            EntityKey::Service(host, id) => write!(f, "service#{host}/{id}"),
        }
    }
}

/// Observed state of an entity. Services use the first four variants,
/// hosts the last three.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum State {
    Ok,
    Warning,
    Critical,
    Unknown,
    Up,
    Down,
    Unreachable,
}

impl State {
    /// The "everything is fine" state for an entity kind
    pub fn baseline(kind: EntityKind) -> State {
        match kind {
            EntityKind::Host => State::Up,
            EntityKind::Service => State::Ok,
        }
    }

    pub fn is_baseline(self) -> bool {
        matches!(self, State::Ok | State::Up)
    }

    pub fn is_problem(self) -> bool {
        !self.is_baseline()
    }

    /// Plugin return code for a service. `None` when out of bounds.
    pub fn from_service_code(code: i32) -> Option<State> {
        match code {
            0 => Some(State::Ok),
            1 => Some(State::Warning),
            2 => Some(State::Critical),
            3 => Some(State::Unknown),
            _ => None,
        }
    }

    /// Plugin return code for a host. `None` when out of bounds.
    pub fn from_host_code(code: i32) -> Option<State> {
        match code {
            0 => Some(State::Up),
            1 | 3 => Some(State::Down),
            2 => Some(State::Unreachable),
            _ => None,
        }
    }

    pub fn from_code(kind: EntityKind, code: i32) -> Option<State> {
        match kind {
            EntityKind::Host => State::from_host_code(code),
            EntityKind::Service => State::from_service_code(code),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            State::Ok => "OK",
            State::Warning => "WARNING",
            State::Critical => "CRITICAL",
            State::Unknown => "UNKNOWN",
            State::Up => "UP",
            State::Down => "DOWN",
            State::Unreachable => "UNREACHABLE",
        }
    }

    fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateType {
    Soft,
    Hard,
}

impl StateType {
    pub fn as_str(self) -> &'static str {
        match self {
            StateType::Soft => "SOFT",
            StateType::Hard => "HARD",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckType {
    Active,
    Passive,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AckType {
    #[default]
    None,
    /// Cleared on the next state change
    Normal,
    /// Kept across problem state changes, cleared on recovery
    Sticky,
}

/// Compact set of states, used for "notify on", "flap detection on",
/// "escalate on" and "fail on" style options.
///
/// Serialized as a list of state names.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Vec<State>", into = "Vec<State>")]
pub struct StateSet(u8);

impl StateSet {
    pub const EMPTY: StateSet = StateSet(0);

    pub fn all() -> Self {
        Self(0x7f)
    }

    pub fn of(states: &[State]) -> Self {
        let mut set = Self::EMPTY;
        for state in states {
            set.insert(*state);
        }
        set
    }

    pub fn insert(&mut self, state: State) {
        self.0 |= state.bit();
    }

    pub fn remove(&mut self, state: State) {
        self.0 &= !state.bit();
    }

    pub fn contains(&self, state: State) -> bool {
        self.0 & state.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn clear(&mut self) {
        self.0 = 0;
    }

    pub fn intersects(&self, other: StateSet) -> bool {
        self.0 & other.0 != 0
    }

    pub fn iter(&self) -> impl Iterator<Item = State> + '_ {
        ALL_STATES.into_iter().filter(|state| self.contains(*state))
    }
}

const ALL_STATES: [State; 7] = [
    State::Ok,
    State::Warning,
    State::Critical,
    State::Unknown,
    State::Up,
    State::Down,
    State::Unreachable,
];

impl From<Vec<State>> for StateSet {
    fn from(states: Vec<State>) -> Self {
        Self::of(&states)
    }
}

impl From<StateSet> for Vec<State> {
    fn from(set: StateSet) -> Self {
        set.iter().collect()
    }
}

impl fmt::Debug for StateSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}
