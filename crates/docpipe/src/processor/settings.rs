use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::StageError;

/// Read-only view over a private deep copy of a stage's `config` sub-tree.
///
/// Stages can never alter the pipeline configuration or another stage's
/// settings through it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageSettings {
    values: Map<String, Value>,
}

impl StageSettings {
    /// A `null` config yields empty settings; any other non-object value is
    /// stored under the `value` key.
    pub fn from_config(config: &Value) -> Self {
        let values = match config {
            Value::Null => Map::new(),
            Value::Object(map) => map.clone(),
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other.clone());
                map
            }
        };
        Self { values }
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.values
            .get(key)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }

    pub fn require_str(&self, key: &str) -> Result<&str, StageError> {
        match self.values.get(key) {
            None | Some(Value::Null) => Err(StageError::MissingSetting(key.to_string())),
            Some(Value::String(s)) => Ok(s),
            Some(other) => Err(StageError::InvalidSetting {
                key: key.to_string(),
                reason: format!("expected a string, got {}", other),
            }),
        }
    }

    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, StageError> {
        Ok(serde_json::from_value(Value::Object(self.values.clone()))?)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.values
    }
}
