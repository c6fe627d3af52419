//! Ordered key/value documents exchanged with the guide and the remote service.
//!
//! Both sides speak JSON objects whose full schema we do not own. A
//! [`Document`] keeps insertion order (so round-tripped payloads look like what
//! the service sent) and offers the one merge the pipeline needs: a shallow,
//! key-level overlay.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Prefix of guide-only metadata keys that must never be sent remotely.
pub const GUIDE_PROPERTY_PREFIX: &str = "trash_";

/// A JSON object with stable key order.
///
/// Equality compares keys and values, not ordering.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document(Map<String, Value>);

impl Document {
    pub fn new() -> Self {
        Self(Map::new())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(key.into(), value)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The `name` key as a string, if present.
    pub fn name(&self) -> Option<&str> {
        self.0.get("name").and_then(Value::as_str)
    }

    /// The `id` key as an integer, if present.
    pub fn id(&self) -> Option<i64> {
        self.0.get("id").and_then(Value::as_i64)
    }

    /// Returns `base` with every key of `self` written over it.
    ///
    /// Keys only present in `base` survive untouched. Nested values under a
    /// key of `self` replace the base value wholesale.
    pub fn overlay_onto(&self, base: &Document) -> Document {
        let mut merged = base.clone();
        for (key, value) in &self.0 {
            merged.0.insert(key.clone(), value.clone());
        }
        merged
    }

    /// Drops top-level guide metadata (`trash_*`) keys.
    pub fn without_guide_properties(mut self) -> Document {
        self.0.retain(|key, _| !key.starts_with(GUIDE_PROPERTY_PREFIX));
        self
    }
}

impl From<Map<String, Value>> for Document {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl TryFrom<Value> for Document {
    type Error = Value;

    /// Succeeds only for JSON objects; hands the value back otherwise.
    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(other),
        }
    }
}
