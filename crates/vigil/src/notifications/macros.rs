//! `$NAME$` macro expansion for command lines.

use std::collections::HashMap;

use crate::objects::{Checkable, Contact, EntityKey, ObjectRegistry};

/// Macro values available while building one command line
#[derive(Debug, Clone, Default)]
pub struct MacroContext {
    values: HashMap<&'static str, String>,
    arguments: Vec<String>,
}

impl MacroContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entity macros, plus the host macros of a service's host
    pub fn for_entity(registry: &ObjectRegistry, entity: &Checkable) -> Self {
        let mut context = Self::new();
        let state = &entity.state;
        match entity.key {
            EntityKey::Host(_) => context.set_host(entity),
            EntityKey::Service(..) => {
                if let Some(host) = registry.get(entity.key.host()) {
                    context.set_host(host);
                }
                context.set("SERVICEDESC", entity.config.name.clone());
                context.set("SERVICESTATE", state.current_state.as_str());
                context.set("SERVICESTATETYPE", state.state_type.as_str());
                context.set("SERVICEATTEMPT", state.current_attempt.to_string());
                context.set("MAXSERVICEATTEMPTS", entity.config.max_attempts.to_string());
                context.set("SERVICEOUTPUT", state.plugin_output.clone());
                context.set("LONGSERVICEOUTPUT", state.long_output.clone());
                context.set("SERVICEPERFDATA", state.perf_data.clone());
            }
        }
        context.set("STATETYPE", state.state_type.as_str());
        context.set("OUTPUT", state.plugin_output.clone());
        context.set("LONGOUTPUT", state.long_output.clone());
        context.set("PERFDATA", state.perf_data.clone());
        context.set("ATTEMPT", state.current_attempt.to_string());
        context
    }

    fn set_host(&mut self, host: &Checkable) {
        let state = &host.state;
        self.set("HOSTNAME", host.config.name.clone());
        self.set("HOSTALIAS", host.config.alias.clone());
        self.set("HOSTADDRESS", host.config.address.clone());
        self.set("HOSTSTATE", state.current_state.as_str());
        self.set("HOSTSTATETYPE", state.state_type.as_str());
        self.set("HOSTATTEMPT", state.current_attempt.to_string());
        self.set("MAXHOSTATTEMPTS", host.config.max_attempts.to_string());
        self.set("HOSTOUTPUT", state.plugin_output.clone());
        self.set("LONGHOSTOUTPUT", state.long_output.clone());
        self.set("HOSTPERFDATA", state.perf_data.clone());
    }

    pub fn set_contact(&mut self, contact: &Contact) {
        self.set("CONTACTNAME", contact.name.clone());
        self.set("CONTACTALIAS", contact.alias.clone());
        self.set("CONTACTEMAIL", contact.email.clone());
        self.set("CONTACTPAGER", contact.pager.clone());
    }

    pub fn set(&mut self, name: &'static str, value: impl Into<String>) {
        self.values.insert(name, value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Takes `$ARGn$` values from a `name!arg1!arg2` command reference.
    /// Arguments may use macros themselves.
    pub fn set_arguments(&mut self, reference: &str) {
        let arguments: Vec<String> = reference.split('!').skip(1).map(|arg| self.expand(arg)).collect();
        self.arguments = arguments;
    }

    /// Replaces every known `$NAME$` in `template`. `$$` is a literal
    /// dollar sign and unknown macros are left as written.
    pub fn expand(&self, template: &str) -> String {
        let mut output = String::with_capacity(template.len());
        let mut rest = template;
        while let Some(start) = rest.find('$') {
            output.push_str(&rest[..start]);
            let after = &rest[start + 1..];
            let Some(end) = after.find('$') else {
                output.push_str(&rest[start..]);
                return output;
            };
            let name = &after[..end];
            match self.resolve(name) {
                Some(value) => output.push_str(value),
                None if name.is_empty() => output.push('$'),
                None => {
                    output.push('$');
                    output.push_str(name);
                    output.push('$');
                }
            }
            rest = &after[end + 1..];
        }
        output.push_str(rest);
        output
    }

    fn resolve(&self, name: &str) -> Option<&str> {
        if let Some(index) = name.strip_prefix("ARG").and_then(|n| n.parse::<usize>().ok()) {
            return Some(index.checked_sub(1).and_then(|i| self.arguments.get(i)).map_or("", String::as_str));
        }
        self.get(name)
    }
}
