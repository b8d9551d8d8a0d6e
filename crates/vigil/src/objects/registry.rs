//! Object definitions as handed over by the configuration loader, and the
//! registry that owns the activated objects.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{
    Checkable, CheckableConfig, Contact, ContactGroup, Dependency, DependencyKind, EntityKey,
    EntityKind, Escalation, State, StateSet,
};
use crate::config::EngineConfig;
use crate::error::ConfigError;
use crate::timeperiod::{TimePeriod, TimePeriodDefinition, parse_timezone};

/// Every object known to the engine, keyed for lookup by the state machine
#[derive(Debug, Default)]
pub struct ObjectRegistry {
    entities: BTreeMap<EntityKey, Checkable>,
    host_ids: HashMap<String, u64>,
    service_ids: HashMap<(u64, String), u64>,
    child_hosts: HashMap<EntityKey, Vec<EntityKey>>,
    host_services: HashMap<EntityKey, Vec<EntityKey>>,
    contacts: HashMap<String, Contact>,
    contact_groups: HashMap<String, ContactGroup>,
    commands: HashMap<String, String>,
    timeperiods: HashMap<String, TimePeriod>,
    escalations: HashMap<EntityKey, Vec<Escalation>>,
    dependencies: HashMap<EntityKey, Vec<Dependency>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectDefinitions {
    pub commands: Vec<CommandDefinition>,
    pub timeperiods: Vec<TimePeriodDefinition>,
    pub contacts: Vec<ContactDefinition>,
    pub contact_groups: Vec<ContactGroupDefinition>,
    pub hosts: Vec<HostDefinition>,
    pub services: Vec<ServiceDefinition>,
    pub escalations: Vec<EscalationDefinition>,
    pub dependencies: Vec<DependencyDefinition>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommandDefinition {
    pub name: String,
    pub command_line: String,
}

/// Attributes shared by host and service definitions
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckableDefinition {
    pub check_command: Option<String>,
    pub event_handler: Option<String>,
    pub check_interval: f64,
    pub retry_interval: f64,
    pub max_attempts: u32,
    pub check_period: Option<String>,
    pub notification_period: Option<String>,
    pub notification_interval: f64,
    pub first_notification_delay: f64,
    pub notify_on: Option<StateSet>,
    pub notify_on_flapping: bool,
    pub notify_on_downtime: bool,
    pub contacts: Vec<String>,
    pub contact_groups: Vec<String>,
    pub low_flap_threshold: f64,
    pub high_flap_threshold: f64,
    pub flap_detection_on: Option<StateSet>,
    pub is_volatile: bool,
    pub check_freshness: bool,
    pub freshness_threshold: i64,
    pub timezone: Option<String>,
    pub initial_state: Option<State>,
    pub active_checks_enabled: bool,
    pub passive_checks_enabled: bool,
    pub notifications_enabled: bool,
    pub event_handler_enabled: bool,
    pub flap_detection_enabled: bool,
}

impl Default for CheckableDefinition {
    fn default() -> Self {
        Self {
            check_command: None,
            event_handler: None,
            check_interval: 5.0,
            retry_interval: 1.0,
            max_attempts: 3,
            check_period: None,
            notification_period: None,
            notification_interval: 30.0,
            first_notification_delay: 0.0,
            notify_on: None,
            notify_on_flapping: true,
            notify_on_downtime: true,
            contacts: Vec::new(),
            contact_groups: Vec::new(),
            low_flap_threshold: 0.0,
            high_flap_threshold: 0.0,
            flap_detection_on: None,
            is_volatile: false,
            check_freshness: false,
            freshness_threshold: 0,
            timezone: None,
            initial_state: None,
            active_checks_enabled: true,
            passive_checks_enabled: true,
            notifications_enabled: true,
            event_handler_enabled: true,
            flap_detection_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostDefinition {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub alias: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub parents: Vec<String>,
    #[serde(flatten)]
    pub common: CheckableDefinition,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceDefinition {
    pub id: u64,
    pub host: String,
    pub description: String,
    #[serde(flatten)]
    pub common: CheckableDefinition,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContactDefinition {
    pub name: String,
    pub alias: String,
    pub email: String,
    pub pager: String,
    pub host_notifications_enabled: bool,
    pub service_notifications_enabled: bool,
    pub host_notification_period: Option<String>,
    pub service_notification_period: Option<String>,
    pub host_notify_on: Option<StateSet>,
    pub service_notify_on: Option<StateSet>,
    pub notify_on_flapping: bool,
    pub notify_on_downtime: bool,
    pub host_notification_commands: Vec<String>,
    pub service_notification_commands: Vec<String>,
    pub timezone: Option<String>,
}

impl Default for ContactDefinition {
    fn default() -> Self {
        Self {
            name: String::new(),
            alias: String::new(),
            email: String::new(),
            pager: String::new(),
            host_notifications_enabled: true,
            service_notifications_enabled: true,
            host_notification_period: None,
            service_notification_period: None,
            host_notify_on: None,
            service_notify_on: None,
            notify_on_flapping: true,
            notify_on_downtime: true,
            host_notification_commands: Vec::new(),
            service_notification_commands: Vec::new(),
            timezone: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContactGroupDefinition {
    pub name: String,
    #[serde(default)]
    pub members: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EscalationDefinition {
    pub host: String,
    pub service: Option<String>,
    pub first_notification: u32,
    pub last_notification: u32,
    pub notification_interval: f64,
    pub escalation_period: Option<String>,
    pub escalate_on: Option<StateSet>,
    pub contacts: Vec<String>,
    pub contact_groups: Vec<String>,
}

impl Default for EscalationDefinition {
    fn default() -> Self {
        Self {
            host: String::new(),
            service: None,
            first_notification: 1,
            last_notification: 0,
            notification_interval: -1.0,
            escalation_period: None,
            escalate_on: None,
            contacts: Vec::new(),
            contact_groups: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyDefinition {
    pub dependent_host: String,
    #[serde(default)]
    pub dependent_service: Option<String>,
    pub master_host: String,
    #[serde(default)]
    pub master_service: Option<String>,
    pub kind: DependencyKind,
    #[serde(default)]
    pub fail_on: StateSet,
    #[serde(default)]
    pub fail_on_pending: bool,
    #[serde(default)]
    pub inherits_parent: bool,
    #[serde(default)]
    pub period: Option<String>,
}

fn all_states(kind: EntityKind) -> StateSet {
    match kind {
        EntityKind::Host => StateSet::of(&[State::Up, State::Down, State::Unreachable]),
        EntityKind::Service => {
            StateSet::of(&[State::Ok, State::Warning, State::Critical, State::Unknown])
        }
    }
}

/// Name of the command in a `name!arg1!arg2` reference
pub fn command_name(reference: &str) -> &str {
    reference.split('!').next().unwrap_or(reference)
}

impl ObjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Activates a set of definitions.
    ///
    /// Objects are applied leaves first (commands, periods, contacts, hosts,
    /// services, relations). An invalid object is reported and skipped;
    /// everything else stays active.
    pub fn apply(&mut self, definitions: ObjectDefinitions, config: &EngineConfig) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        let default_tz = parse_timezone(&config.default_timezone).unwrap_or(Tz::UTC);

        for command in definitions.commands {
            if self.commands.contains_key(&command.name) {
                errors.push(ConfigError::Duplicate { object: format!("command '{}'", command.name) });
                continue;
            }
            self.commands.insert(command.name, command.command_line);
        }

        for definition in &definitions.timeperiods {
            match TimePeriod::from_definition(definition) {
                Ok(period) => {
                    self.timeperiods.insert(period.name.clone(), period);
                }
                Err(error) => errors.push(error),
            }
        }

        for definition in definitions.contacts {
            match self.build_contact(definition, default_tz) {
                Ok(contact) => {
                    self.contacts.insert(contact.name.clone(), contact);
                }
                Err(error) => errors.push(error),
            }
        }

        for definition in definitions.contact_groups {
            let object = format!("contactgroup '{}'", definition.name);
            match definition.members.iter().find(|member| !self.contacts.contains_key(*member)) {
                Some(missing) => {
                    errors.push(ConfigError::MissingContact { object, name: missing.clone() })
                }
                None => {
                    self.contact_groups.insert(
                        definition.name.clone(),
                        ContactGroup { name: definition.name, members: definition.members },
                    );
                }
            }
        }

        // Hosts are registered before parents are resolved so that a parent
        // may be defined after its children.
        let mut pending_parents = Vec::new();
        for definition in definitions.hosts {
            let object = format!("host '{}'", definition.name);
            let key = EntityKey::Host(definition.id);
            if self.host_ids.contains_key(&definition.name) || self.entities.contains_key(&key) {
                errors.push(ConfigError::Duplicate { object });
                continue;
            }
            match self.build_config(&object, &definition.name, &definition.name, &definition.common, EntityKind::Host, default_tz) {
                Ok(mut config) => {
                    config.alias = definition.alias;
                    config.address = definition.address;
                    self.host_ids.insert(definition.name.clone(), definition.id);
                    self.insert(Checkable::new(key, config), &definition.common);
                    pending_parents.push((key, object, definition.parents));
                }
                Err(error) => errors.push(error),
            }
        }
        for (key, object, parents) in pending_parents {
            let mut resolved = Vec::with_capacity(parents.len());
            let mut failed = None;
            for parent in parents {
                match self.host_ids.get(&parent) {
                    Some(id) => resolved.push(EntityKey::Host(*id)),
                    None => {
                        failed = Some(ConfigError::MissingParent { object: object.clone(), parent });
                        break;
                    }
                }
            }
            if let Some(error) = failed {
                warn!("Deactivating {}: {}", object, error);
                self.remove(key);
                errors.push(error);
                continue;
            }
            for parent in &resolved {
                self.child_hosts.entry(*parent).or_default().push(key);
            }
            if let Some(host) = self.entities.get_mut(&key) {
                host.config.parents = resolved;
            }
        }

        for definition in definitions.services {
            let object = format!("service '{}/{}'", definition.host, definition.description);
            let Some(host_id) = self.host_ids.get(&definition.host).copied() else {
                errors.push(ConfigError::MissingParent { object, parent: definition.host });
                continue;
            };
            let key = EntityKey::Service(host_id, definition.id);
            if self.entities.contains_key(&key)
                || self.service_ids.contains_key(&(host_id, definition.description.clone()))
            {
                errors.push(ConfigError::Duplicate { object });
                continue;
            }
            match self.build_config(&object, &definition.description, &definition.host, &definition.common, EntityKind::Service, default_tz) {
                Ok(config) => {
                    self.service_ids.insert((host_id, definition.description), definition.id);
                    self.host_services.entry(key.host()).or_default().push(key);
                    self.insert(Checkable::new(key, config), &definition.common);
                }
                Err(error) => errors.push(error),
            }
        }

        for definition in definitions.escalations {
            match self.build_escalation(definition) {
                Ok(escalation) => self.add_escalation(escalation),
                Err(error) => errors.push(error),
            }
        }

        for definition in definitions.dependencies {
            match self.build_dependency(definition) {
                Ok(dependency) => self.add_dependency(dependency),
                Err(error) => errors.push(error),
            }
        }

        debug!(
            "Applied objects: {} entities, {} contacts, {} commands, {} timeperiods, {} errors",
            self.entities.len(),
            self.contacts.len(),
            self.commands.len(),
            self.timeperiods.len(),
            errors.len()
        );
        errors
    }

    fn insert(&mut self, mut checkable: Checkable, definition: &CheckableDefinition) {
        let state = &mut checkable.state;
        state.checks_enabled = definition.active_checks_enabled;
        state.accept_passive_checks = definition.passive_checks_enabled;
        state.notifications_enabled = definition.notifications_enabled;
        state.event_handler_enabled = definition.event_handler_enabled;
        state.flap_detection_enabled = definition.flap_detection_enabled;
        state.flap_history.seed(state.current_state);
        self.entities.insert(checkable.key, checkable);
    }

    fn remove(&mut self, key: EntityKey) {
        if let Some(entity) = self.entities.remove(&key) {
            self.host_ids.remove(&entity.config.name);
        }
    }

    fn build_config(
        &self,
        object: &str,
        name: &str,
        host_name: &str,
        definition: &CheckableDefinition,
        kind: EntityKind,
        default_tz: Tz,
    ) -> Result<CheckableConfig, ConfigError> {
        if definition.max_attempts == 0 {
            return Err(ConfigError::InvalidAttempts { object: object.to_string() });
        }
        for (field, value) in [
            ("check_interval", definition.check_interval),
            ("retry_interval", definition.retry_interval),
            ("notification_interval", definition.notification_interval),
            ("first_notification_delay", definition.first_notification_delay),
        ] {
            if value < 0.0 {
                return Err(ConfigError::InvalidInterval { object: object.to_string(), field });
            }
        }
        for period in [&definition.check_period, &definition.notification_period].into_iter().flatten() {
            self.require_period(object, period)?;
        }
        for command in [&definition.check_command, &definition.event_handler].into_iter().flatten() {
            self.require_command(object, command)?;
        }
        self.require_recipients(object, &definition.contacts, &definition.contact_groups)?;
        let timezone = self.resolve_timezone(object, definition.timezone.as_deref(), default_tz)?;

        let mut config = CheckableConfig::new(name, host_name, kind);
        config.check_command = definition.check_command.clone();
        config.event_handler = definition.event_handler.clone();
        config.check_interval = definition.check_interval;
        config.retry_interval = definition.retry_interval;
        config.max_attempts = definition.max_attempts;
        config.check_period = definition.check_period.clone();
        config.notification_period = definition.notification_period.clone();
        config.notification_interval = definition.notification_interval;
        config.first_notification_delay = definition.first_notification_delay;
        config.notify_on = definition.notify_on.unwrap_or_else(|| all_states(kind));
        config.notify_on_flapping = definition.notify_on_flapping;
        config.notify_on_downtime = definition.notify_on_downtime;
        config.contacts = definition.contacts.clone();
        config.contact_groups = definition.contact_groups.clone();
        config.low_flap_threshold = definition.low_flap_threshold;
        config.high_flap_threshold = definition.high_flap_threshold;
        config.flap_detection_on = definition.flap_detection_on.unwrap_or_else(|| all_states(kind));
        config.is_volatile = definition.is_volatile;
        config.check_freshness = definition.check_freshness;
        config.freshness_threshold = definition.freshness_threshold;
        config.timezone = timezone;
        config.initial_state = definition.initial_state.unwrap_or(State::baseline(kind));
        Ok(config)
    }

    fn build_contact(&self, definition: ContactDefinition, default_tz: Tz) -> Result<Contact, ConfigError> {
        let object = format!("contact '{}'", definition.name);
        for period in [&definition.host_notification_period, &definition.service_notification_period]
            .into_iter()
            .flatten()
        {
            self.require_period(&object, period)?;
        }
        for command in definition
            .host_notification_commands
            .iter()
            .chain(&definition.service_notification_commands)
        {
            self.require_command(&object, command)?;
        }
        let timezone = self.resolve_timezone(&object, definition.timezone.as_deref(), default_tz)?;

        Ok(Contact {
            alias: if definition.alias.is_empty() { definition.name.clone() } else { definition.alias },
            name: definition.name,
            email: definition.email,
            pager: definition.pager,
            host_notifications_enabled: definition.host_notifications_enabled,
            service_notifications_enabled: definition.service_notifications_enabled,
            host_notification_period: definition.host_notification_period,
            service_notification_period: definition.service_notification_period,
            host_notify_on: definition.host_notify_on.unwrap_or_else(|| all_states(EntityKind::Host)),
            service_notify_on: definition
                .service_notify_on
                .unwrap_or_else(|| all_states(EntityKind::Service)),
            notify_on_flapping: definition.notify_on_flapping,
            notify_on_downtime: definition.notify_on_downtime,
            host_notification_commands: definition.host_notification_commands,
            service_notification_commands: definition.service_notification_commands,
            timezone,
        })
    }

    fn build_escalation(&self, definition: EscalationDefinition) -> Result<Escalation, ConfigError> {
        let object = match &definition.service {
            Some(service) => format!("escalation for '{}/{}'", definition.host, service),
            None => format!("escalation for '{}'", definition.host),
        };
        let target = self.resolve_target(&object, &definition.host, definition.service.as_deref())?;
        if let Some(period) = &definition.escalation_period {
            self.require_period(&object, period)?;
        }
        self.require_recipients(&object, &definition.contacts, &definition.contact_groups)?;

        Ok(Escalation {
            target,
            first_notification: definition.first_notification,
            last_notification: definition.last_notification,
            notification_interval: definition.notification_interval,
            escalation_period: definition.escalation_period,
            escalate_on: definition.escalate_on.unwrap_or_else(|| all_states(target.kind())),
            contacts: definition.contacts,
            contact_groups: definition.contact_groups,
        })
    }

    fn build_dependency(&self, definition: DependencyDefinition) -> Result<Dependency, ConfigError> {
        let object = format!(
            "dependency of '{}' on '{}'",
            definition.dependent_host, definition.master_host
        );
        let dependent =
            self.resolve_target(&object, &definition.dependent_host, definition.dependent_service.as_deref())?;
        let master =
            self.resolve_target(&object, &definition.master_host, definition.master_service.as_deref())?;
        if let Some(period) = &definition.period {
            self.require_period(&object, period)?;
        }
        Ok(Dependency {
            dependent,
            master,
            kind: definition.kind,
            fail_on: definition.fail_on,
            fail_on_pending: definition.fail_on_pending,
            inherits_parent: definition.inherits_parent,
            period: definition.period,
        })
    }

    fn resolve_target(&self, object: &str, host: &str, service: Option<&str>) -> Result<EntityKey, ConfigError> {
        let missing = || ConfigError::MissingTarget {
            object: object.to_string(),
            target: match service {
                Some(service) => format!("{host}/{service}"),
                None => host.to_string(),
            },
        };
        let host_id = *self.host_ids.get(host).ok_or_else(missing)?;
        match service {
            None => Ok(EntityKey::Host(host_id)),
            Some(service) => self
                .service_ids
                .get(&(host_id, service.to_string()))
                .map(|id| EntityKey::Service(host_id, *id))
                .ok_or_else(missing),
        }
    }

    fn require_period(&self, object: &str, period: &str) -> Result<(), ConfigError> {
        if self.timeperiods.contains_key(period) {
            Ok(())
        } else {
            Err(ConfigError::MissingTimePeriod { object: object.to_string(), period: period.to_string() })
        }
    }

    fn require_command(&self, object: &str, reference: &str) -> Result<(), ConfigError> {
        let name = command_name(reference);
        if self.commands.contains_key(name) {
            Ok(())
        } else {
            Err(ConfigError::MissingCommand { object: object.to_string(), command: name.to_string() })
        }
    }

    fn require_recipients(&self, object: &str, contacts: &[String], groups: &[String]) -> Result<(), ConfigError> {
        let missing = contacts
            .iter()
            .find(|name| !self.contacts.contains_key(*name))
            .or_else(|| groups.iter().find(|name| !self.contact_groups.contains_key(*name)));
        match missing {
            Some(name) => Err(ConfigError::MissingContact { object: object.to_string(), name: name.clone() }),
            None => Ok(()),
        }
    }

    fn resolve_timezone(&self, object: &str, zone: Option<&str>, default_tz: Tz) -> Result<Tz, ConfigError> {
        match zone {
            None => Ok(default_tz),
            Some(zone) => parse_timezone(zone).ok_or_else(|| ConfigError::InvalidTimeZone {
                object: object.to_string(),
                zone: zone.to_string(),
            }),
        }
    }

    /// Registers a fully built entity, bypassing definition validation
    pub fn insert_checkable(&mut self, mut checkable: Checkable) {
        let key = checkable.key;
        match key {
            EntityKey::Host(id) => {
                self.host_ids.insert(checkable.config.name.clone(), id);
                for parent in &checkable.config.parents {
                    self.child_hosts.entry(*parent).or_default().push(key);
                }
            }
            EntityKey::Service(host, id) => {
                self.service_ids.insert((host, checkable.config.name.clone()), id);
                self.host_services.entry(key.host()).or_default().push(key);
            }
        }
        checkable.state.flap_history.seed(checkable.state.current_state);
        self.entities.insert(key, checkable);
    }

    pub fn insert_contact(&mut self, contact: Contact) {
        self.contacts.insert(contact.name.clone(), contact);
    }

    pub fn insert_contact_group(&mut self, group: ContactGroup) {
        self.contact_groups.insert(group.name.clone(), group);
    }

    pub fn insert_command(&mut self, name: impl Into<String>, command_line: impl Into<String>) {
        self.commands.insert(name.into(), command_line.into());
    }

    pub fn insert_timeperiod(&mut self, period: TimePeriod) {
        self.timeperiods.insert(period.name.clone(), period);
    }

    pub fn add_escalation(&mut self, escalation: Escalation) {
        self.escalations.entry(escalation.target).or_default().push(escalation);
    }

    pub fn add_dependency(&mut self, dependency: Dependency) {
        self.dependencies.entry(dependency.dependent).or_default().push(dependency);
    }

    pub fn get(&self, key: EntityKey) -> Option<&Checkable> {
        self.entities.get(&key)
    }

    pub fn get_mut(&mut self, key: EntityKey) -> Option<&mut Checkable> {
        self.entities.get_mut(&key)
    }

    pub fn contains(&self, key: EntityKey) -> bool {
        self.entities.contains_key(&key)
    }

    pub fn keys(&self) -> impl Iterator<Item = EntityKey> + '_ {
        self.entities.keys().copied()
    }

    pub fn entities(&self) -> impl Iterator<Item = &Checkable> {
        self.entities.values()
    }

    pub fn entities_mut(&mut self) -> impl Iterator<Item = &mut Checkable> {
        self.entities.values_mut()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn host_by_name(&self, name: &str) -> Option<EntityKey> {
        self.host_ids.get(name).map(|id| EntityKey::Host(*id))
    }

    pub fn service_by_name(&self, host: &str, description: &str) -> Option<EntityKey> {
        let host_id = *self.host_ids.get(host)?;
        self.service_ids
            .get(&(host_id, description.to_string()))
            .map(|id| EntityKey::Service(host_id, *id))
    }

    pub fn child_hosts(&self, host: EntityKey) -> &[EntityKey] {
        self.child_hosts.get(&host).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn services_of(&self, host: EntityKey) -> &[EntityKey] {
        self.host_services.get(&host).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn contact(&self, name: &str) -> Option<&Contact> {
        self.contacts.get(name)
    }

    pub fn contact_group(&self, name: &str) -> Option<&ContactGroup> {
        self.contact_groups.get(name)
    }

    /// Command line template of a command reference (`name!args` allowed)
    pub fn command(&self, reference: &str) -> Option<&str> {
        self.commands.get(command_name(reference)).map(String::as_str)
    }

    pub fn timeperiod(&self, name: &str) -> Option<&TimePeriod> {
        self.timeperiods.get(name)
    }

    pub fn escalations_for(&self, key: EntityKey) -> &[Escalation] {
        self.escalations.get(&key).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn dependencies_for(&self, key: EntityKey) -> &[Dependency] {
        self.dependencies.get(&key).map(Vec::as_slice).unwrap_or_default()
    }

    /// Is `at` inside the named period? A missing name means "always".
    /// An unknown name never matches.
    pub fn in_period(&self, period: Option<&str>, at: i64, tz: Tz) -> bool {
        match period {
            None => true,
            Some(name) => self.timeperiods.get(name).is_some_and(|period| period.is_valid_time(at, tz)),
        }
    }

    /// Next instant at or after `at` inside the named period
    pub fn next_in_period(&self, period: Option<&str>, at: i64, tz: Tz) -> Option<i64> {
        match period {
            None => Some(at),
            Some(name) => self.timeperiods.get(name)?.next_valid_time(at, tz),
        }
    }

    /// Contact names of the given direct contacts and contact groups, in
    /// definition order, each name once
    pub fn expand_contacts(&self, contacts: &[String], groups: &[String], seen: &mut HashSet<String>, out: &mut Vec<String>) {
        let members = groups
            .iter()
            .filter_map(|group| self.contact_groups.get(group))
            .flat_map(|group| group.members.iter());
        for name in contacts.iter().chain(members) {
            if self.contacts.contains_key(name) && seen.insert(name.clone()) {
                out.push(name.clone());
            }
        }
    }
}
