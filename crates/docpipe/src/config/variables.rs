use std::collections::HashMap;
use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde_json::{Map, Value};
use tracing::debug;

/// Names with this prefix are filled in per invocation by the orchestrator
/// and are never resolved at load time.
pub const RUNTIME_PREFIX: &str = "SYS_";

pub const SYS_CONTROLLER_REQ_FILE_PATH: &str = "SYS_CONTROLLER_REQ_FILE_PATH";
pub const SYS_STORAGE_ROOT: &str = "SYS_STORAGE_ROOT";
pub const SYS_RUN_ID: &str = "SYS_RUN_ID";
pub const SYS_REQUEST_ID: &str = "SYS_REQUEST_ID";

fn variable_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\$\{(ENV:)?(\w+)\}").expect("valid variable pattern"))
}

/// Resolves `${NAME}` and `${ENV:NAME}` references.
///
/// `${NAME}` looks at the engine's variables first and falls back to the OS
/// environment; `${ENV:NAME}` reads the OS environment only. References that
/// cannot be resolved are left untouched.
#[derive(Debug, Clone, Default)]
pub struct VariableEngine {
    values: HashMap<String, String>,
}

impl VariableEngine {
    /// Builds an engine from a `variables` block. Each variable may refer to
    /// variables defined before it.
    pub fn new(variables: &Map<String, Value>) -> Self {
        let mut engine = Self::default();
        for (name, value) in variables {
            let raw = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            let resolved = engine.substitute(&raw);
            if resolved != raw {
                debug!(
                    "Variable '{}' interpolated ({} char(s))",
                    name,
                    resolved.len()
                );
            }
            engine.values.insert(name.clone(), resolved);
        }
        engine
    }

    pub fn with_value(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn substitute(&self, template: &str) -> String {
        variable_pattern()
            .replace_all(template, |caps: &Captures| {
                let forced_env = caps.get(1).is_some();
                let name = &caps[2];
                self.lookup(name, forced_env)
                    .unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned()
    }

    fn lookup(&self, name: &str, forced_env: bool) -> Option<String> {
        if forced_env {
            return std::env::var(name).ok();
        }
        if let Some(value) = self.values.get(name) {
            return Some(value.clone());
        }
        if name.starts_with(RUNTIME_PREFIX) {
            return None;
        }
        std::env::var(name).ok()
    }

    /// Substitutes every string inside `value`, except the top-level
    /// `variables` block which has already been resolved.
    pub fn interpolate_document(&self, value: &mut Value) {
        if let Value::Object(map) = value {
            for (key, child) in map.iter_mut() {
                if key == "variables" {
                    continue;
                }
                self.interpolate(child);
            }
        } else {
            self.interpolate(value);
        }
    }

    pub fn interpolate(&self, value: &mut Value) {
        match value {
            Value::String(s) => {
                if s.contains("${") {
                    *s = self.substitute(s);
                }
            }
            Value::Array(items) => items.iter_mut().for_each(|item| self.interpolate(item)),
            Value::Object(map) => map.values_mut().for_each(|item| self.interpolate(item)),
            _ => {}
        }
    }
}
