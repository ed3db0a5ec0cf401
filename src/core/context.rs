//! Render context for `{{ key }}` placeholders

use crate::core::matrix::MatrixCombination;
use crate::core::trigger::TriggerEvent;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Variables available when rendering a run's templated strings
/// (concurrency group keys, env values, display names, step scripts).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunContext {
    /// Flat key -> value map
    pub variables: HashMap<String, String>,
}

impl RunContext {
    /// Create an empty context
    pub fn new() -> Self {
        Self {
            variables: HashMap::new(),
        }
    }

    /// Seed the context with the event variables every run gets:
    /// `workflow`, `event`, `ref`, and `branch`.
    pub fn for_event(workflow_name: &str, event: &TriggerEvent) -> Self {
        let mut ctx = Self::new();
        ctx.set("workflow", workflow_name);
        ctx.set("event", event.kind.to_string());
        ctx.set("ref", event.ref_name.clone());
        ctx.set("branch", event.branch());
        ctx
    }

    /// Set a variable
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.variables.insert(key.into(), value.into());
    }

    /// Get a variable
    pub fn get(&self, key: &str) -> Option<&String> {
        self.variables.get(key)
    }

    /// Add one `matrix.<axis>` variable per axis of the combination
    pub fn with_combination(mut self, combination: &MatrixCombination) -> Self {
        for (axis, value) in &combination.values {
            self.set(format!("matrix.{}", axis), value.clone());
        }
        self
    }

    /// Render a template by substituting `{{ key }}` placeholders.
    ///
    /// Unknown placeholders are left untouched; there is no recursive
    /// interpolation.
    pub fn render(&self, template: &str) -> String {
        let mut rendered = template.to_string();
        for (key, value) in &self.variables {
            let placeholder = format!("{{{{ {} }}}}", key);
            rendered = rendered.replace(&placeholder, value);
        }
        rendered
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}
