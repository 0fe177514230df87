use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Key under which the upstream classification step stores its query profile.
pub const QUERY_PROFILE_KEY: &str = "query_profile";

/// Legacy nesting used by some callers: `{"execution_state": {"query_profile": ...}}`.
pub const NESTED_STATE_KEY: &str = "execution_state";

/// Shared state threaded through graph execution.
///
/// Nodes receive a snapshot and return a partial update that is merged back.
/// Keys are strings; values are JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionState {
    data: HashMap<String, Value>,
}

impl ExecutionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a state from initial data.
    pub fn from_map(data: HashMap<String, Value>) -> Self {
        Self { data }
    }

    /// Seed a state with the user's query.
    pub fn with_query(query: impl Into<String>) -> Self {
        let mut state = Self::new();
        state.set_str("query", query);
        state
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(|v| v.as_str())
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.data.insert(key.into(), value);
    }

    pub fn set_str(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.data.insert(key.into(), Value::String(value.into()));
    }

    /// Merge another state into this one (overwrites on conflict).
    pub fn merge(&mut self, other: &ExecutionState) {
        for (k, v) in &other.data {
            self.data.insert(k.clone(), v.clone());
        }
    }

    pub fn data(&self) -> &HashMap<String, Value> {
        &self.data
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The query profile written by the classification step, if any.
    ///
    /// Looks at the top level first, then under `execution_state`.
    /// A malformed profile reads as absent.
    pub fn query_profile(&self) -> Option<QueryProfile> {
        let raw = self.data.get(QUERY_PROFILE_KEY).or_else(|| {
            self.data
                .get(NESTED_STATE_KEY)
                .and_then(|nested| nested.get(QUERY_PROFILE_KEY))
        })?;
        serde_json::from_value(raw.clone()).ok()
    }
}

/// Classification of the user's query, read at routing time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryProfile {
    pub intent: Option<String>,
    pub action_type: Option<String>,
    pub is_query: bool,
    pub table: Option<Value>,
    pub tables: Option<Value>,
    pub topic: Option<Value>,
}

impl QueryProfile {
    /// Whether the profile names a table, tables or topic to look up.
    pub fn has_lookup_hint(&self) -> bool {
        [&self.table, &self.tables, &self.topic]
            .into_iter()
            .any(|hint| hint.as_ref().is_some_and(hint_present))
    }

    /// An "action" intent that asks for a data lookup.
    pub fn wants_data_query(&self) -> bool {
        let is_action = self
            .intent
            .as_deref()
            .is_some_and(|i| i.eq_ignore_ascii_case("action"));
        let is_query_action = self
            .action_type
            .as_deref()
            .is_some_and(|a| a.eq_ignore_ascii_case("query"));
        is_action && (is_query_action || self.is_query || self.has_lookup_hint())
    }
}

fn hint_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
        Value::Number(_) => true,
    }
}
