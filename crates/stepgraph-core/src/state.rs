use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Run state threaded through every node of a graph.
///
/// Keys are strings; values are JSON. No schema is enforced: tools agree
/// informally on key names (`data`, `profile`, `anomaly_count`, ...).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct State {
    data: Map<String, Value>,
}

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a State from an existing JSON object.
    pub fn from_map(data: Map<String, Value>) -> Self {
        Self { data }
    }

    /// Create a State from a JSON value, if it is an object.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(data) => Some(Self { data }),
            _ => None,
        }
    }

    /// Get a value by key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Get a value as a string, if it's a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(|v| v.as_str())
    }

    /// Get a value as a float, if it's numeric.
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.data.get(key).and_then(|v| v.as_f64())
    }

    /// Get a value as an integer, if it's an integer.
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.data.get(key).and_then(|v| v.as_i64())
    }

    /// Set a value.
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.data.insert(key.into(), value);
    }

    /// Set a string value.
    pub fn set_str(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.data.insert(key.into(), Value::String(value.into()));
    }

    /// Remove a key, returning its value.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.data.remove(key)
    }

    /// Shallow-merge another state into this one (overwrites on conflict).
    pub fn merge(&mut self, other: &State) {
        for (k, v) in &other.data {
            self.data.insert(k.clone(), v.clone());
        }
    }

    /// Shallow-merge a JSON value into this state.
    ///
    /// Only objects are merged; any other value is ignored. Returns whether
    /// a merge happened.
    pub fn merge_value(&mut self, value: &Value) -> bool {
        match value {
            Value::Object(obj) => {
                for (k, v) in obj {
                    self.data.insert(k.clone(), v.clone());
                }
                true
            }
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Get the underlying data map.
    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    /// Convert into a JSON object value.
    pub fn into_value(self) -> Value {
        Value::Object(self.data)
    }
}

impl From<Map<String, Value>> for State {
    fn from(data: Map<String, Value>) -> Self {
        Self { data }
    }
}

/// What a tool hands back to the engine after one invocation.
///
/// `update` is shallow-merged into the run state when it is a JSON object and
/// discarded otherwise. `next`, when set to a non-empty node id, overrides
/// the node's static successor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    #[serde(default)]
    pub update: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
}

impl ToolOutput {
    /// An output that changes nothing and follows the static successor.
    pub fn none() -> Self {
        Self::default()
    }

    /// Wrap an arbitrary value returned by a tool.
    pub fn value(update: Value) -> Self {
        Self { update, next: None }
    }

    /// Add (or overwrite) a key in the update object.
    ///
    /// A non-object update is replaced by an empty object first.
    pub fn set(mut self, key: impl Into<String>, value: Value) -> Self {
        if !self.update.is_object() {
            self.update = Value::Object(Map::new());
        }
        if let Value::Object(ref mut obj) = self.update {
            obj.insert(key.into(), value);
        }
        self
    }

    /// Redirect execution to `node_id` after this step.
    pub fn goto(mut self, node_id: impl Into<String>) -> Self {
        self.next = Some(node_id.into());
        self
    }

    /// The override target, ignoring empty ids.
    pub fn next_node(&self) -> Option<&str> {
        self.next.as_deref().filter(|id| !id.is_empty())
    }
}
