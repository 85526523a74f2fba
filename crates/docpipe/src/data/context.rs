use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Per-document side channel of stage outputs, keyed by stage name.
///
/// Keys keep insertion order. A stage writes under its own name and treats a
/// missing key as "not yet computed".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextMap(Map<String, Value>);

impl ContextMap {
    pub fn new() -> Self {
        Self(Map::new())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Inserts or replaces `key`. A replaced key keeps its position.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(key.into(), value)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns a map with `seed`'s keys first, in seed order, followed by the
    /// keys of `self` that the seed does not have. Values from `self` win.
    pub fn merged_over(&self, seed: &ContextMap) -> ContextMap {
        let mut merged = seed.clone();
        for (key, value) in &self.0 {
            merged.0.insert(key.clone(), value.clone());
        }
        merged
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

impl From<Map<String, Value>> for ContextMap {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl FromIterator<(String, Value)> for ContextMap {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
