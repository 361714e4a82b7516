//! Scope-set authorization.
//!
//! Each task name maps to a list of required scope-sets. A caller is allowed
//! to submit the task if any one of those sets is fully contained in the
//! caller's granted scopes. Task names without an entry are always denied.

use std::collections::HashMap;

/// Read-only table of required scope-sets, built once at startup.
#[derive(Debug, Clone, Default)]
pub struct ScopeAuthorizer {
    required: HashMap<String, Vec<Vec<String>>>,
}

impl ScopeAuthorizer {
    /// Build the table using one `project:<service>:<task>` scope per task.
    pub fn for_tasks<S: AsRef<str>>(service_name: &str, task_names: &[S]) -> Self {
        let required = task_names
            .iter()
            .map(|task| {
                let task = task.as_ref();
                (
                    task.to_string(),
                    vec![vec![required_scope(service_name, task)]],
                )
            })
            .collect();
        Self { required }
    }

    /// Build the table from explicit scope-sets.
    pub fn with_scope_sets(required: HashMap<String, Vec<Vec<String>>>) -> Self {
        Self { required }
    }

    /// True iff some required scope-set for `task_name` is a subset of `caller_scopes`.
    pub fn is_authorized(&self, task_name: &str, caller_scopes: &[String]) -> bool {
        let Some(scope_sets) = self.required.get(task_name) else {
            return false;
        };
        scope_sets.iter().any(|set| {
            set.iter()
                .all(|required| caller_scopes.iter().any(|granted| granted == required))
        })
    }
}

/// The scope a caller needs to submit `task_name`.
pub fn required_scope(service_name: &str, task_name: &str) -> String {
    format!("project:{}:{}", service_name, task_name)
}
