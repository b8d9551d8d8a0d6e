//! Execution and notification dependencies between entities.

use std::collections::HashSet;

use tracing::debug;

use crate::Timestamp;
use crate::objects::{DependencyKind, EntityKey, ObjectRegistry};

/// Outcome of evaluating the dependencies of an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyResult {
    Passed,
    /// The first master whose state made a dependency fail
    Failed(EntityKey),
}

impl DependencyResult {
    pub fn passed(self) -> bool {
        self == DependencyResult::Passed
    }
}

/// Evaluates every dependency of `kind` declared for `dependent`.
///
/// A master is judged by its last hard state unless `use_soft_states` is set.
/// Dependencies outside their period never fail. With `inherits_parent` the
/// master's own dependencies of the same kind are evaluated too; cycles are
/// cut at the first repeated entity.
pub fn check_dependencies(
    registry: &ObjectRegistry,
    dependent: EntityKey,
    kind: DependencyKind,
    use_soft_states: bool,
    now: Timestamp,
) -> DependencyResult {
    let mut visited = HashSet::new();
    evaluate(registry, dependent, kind, use_soft_states, now, &mut visited)
}

fn evaluate(
    registry: &ObjectRegistry,
    dependent: EntityKey,
    kind: DependencyKind,
    use_soft_states: bool,
    now: Timestamp,
    visited: &mut HashSet<EntityKey>,
) -> DependencyResult {
    if !visited.insert(dependent) {
        return DependencyResult::Passed;
    }
    let Some(entity) = registry.get(dependent) else {
        return DependencyResult::Passed;
    };
    let tz = entity.config.timezone;

    for dependency in registry.dependencies_for(dependent).iter().filter(|dep| dep.kind == kind) {
        let Some(master) = registry.get(dependency.master) else {
            continue;
        };
        if !registry.in_period(dependency.period.as_deref(), now, tz) {
            continue;
        }

        let master_state = if use_soft_states {
            master.state.current_state
        } else {
            master.state.last_hard_state
        };
        let pending = !master.state.has_been_checked;
        if (pending && dependency.fail_on_pending) || (!pending && dependency.fail_on.contains(master_state)) {
            debug!("{} dependency of {} failed: {} is {}", kind_name(kind), entity.display_name(), master.display_name(), master_state);
            return DependencyResult::Failed(dependency.master);
        }

        if dependency.inherits_parent {
            if let DependencyResult::Failed(root) =
                evaluate(registry, dependency.master, kind, use_soft_states, now, visited)
            {
                return DependencyResult::Failed(root);
            }
        }
    }
    DependencyResult::Passed
}

fn kind_name(kind: DependencyKind) -> &'static str {
    match kind {
        DependencyKind::Execution => "execution",
        DependencyKind::Notification => "notification",
    }
}
