//! Loading object definitions from disk.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};
use vigil::{ConfigError, EngineConfig, ObjectDefinitions, ObjectRegistry};

pub fn load_definitions(path: &Path) -> Result<ObjectDefinitions> {
    let text = fs::read_to_string(path).with_context(|| format!("reading objects from {}", path.display()))?;
    parse_definitions(&text).with_context(|| format!("parsing objects in {}", path.display()))
}

pub fn parse_definitions(text: &str) -> Result<ObjectDefinitions> {
    Ok(toml::from_str(text)?)
}

/// Activates the definitions, logging every object that had to be skipped
pub fn build_registry(definitions: ObjectDefinitions, config: &EngineConfig) -> (ObjectRegistry, Vec<ConfigError>) {
    let mut registry = ObjectRegistry::new();
    let errors = registry.apply(definitions, config);
    for error in &errors {
        warn!("Object skipped: {}", error);
    }
    info!("Activated {} hosts and services", registry.len());
    (registry, errors)
}
