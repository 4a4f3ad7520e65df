//! Attribute access for a single resource instance.

use crate::provider::ProviderError;
use serde_json::{Map, Value};

/// A resource's ID and attributes during one CRUD call.
///
/// `prior` holds the attributes as they were before the operation (empty for
/// a create), which is what `has_change` compares against.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceData {
    id: String,
    attrs: Map<String, Value>,
    prior: Map<String, Value>,
    new_resource: bool,
}

impl ResourceData {
    /// Data for a resource about to be created from `config`.
    pub fn new(config: Map<String, Value>) -> Self {
        Self {
            id: String::new(),
            attrs: config,
            prior: Map::new(),
            new_resource: true,
        }
    }

    /// Data for an existing resource, as recorded in state.
    pub fn from_state(id: impl Into<String>, attrs: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            prior: attrs.clone(),
            attrs,
            new_resource: false,
        }
    }

    /// Data for an update: `prior` from state, `planned` as the new target.
    pub fn for_update(
        id: impl Into<String>,
        prior: Map<String, Value>,
        planned: Map<String, Value>,
    ) -> Self {
        Self {
            id: id.into(),
            attrs: planned,
            prior,
            new_resource: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Setting an empty ID marks the resource as gone.
    pub fn set_id(&mut self, id: impl Into<String>) {
        self.id = id.into();
    }

    pub fn is_new_resource(&self) -> bool {
        self.new_resource
    }

    pub fn attributes(&self) -> &Map<String, Value> {
        &self.attrs
    }

    pub fn into_parts(self) -> (String, Map<String, Value>) {
        (self.id, self.attrs)
    }

    /// The value at `key`; JSON `null` counts as unset.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.attrs.get(key).filter(|v| !v.is_null())
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// `get_str`, with empty strings treated as unset.
    pub fn get_non_empty(&self, key: &str) -> Option<&str> {
        self.get_str(key).filter(|s| !s.is_empty())
    }

    /// A non-empty string attribute the operation cannot proceed without.
    pub fn require_str(&self, key: &str) -> Result<&str, ProviderError> {
        self.get_non_empty(key)
            .ok_or_else(|| ProviderError::MissingField(key.to_string()))
    }

    pub fn get_string(&self, key: &str) -> String {
        self.get_str(key).unwrap_or_default().to_string()
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(Value::as_bool)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(Value::as_i64)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(Value::as_f64)
    }

    pub fn get_string_list(&self, key: &str) -> Vec<String> {
        string_list(self.get(key))
    }

    pub fn get_map(&self, key: &str) -> Map<String, Value> {
        self.get(key)
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default()
    }

    /// The prior value of `key`'s string list.
    pub fn prior_string_list(&self, key: &str) -> Vec<String> {
        string_list(self.prior.get(key))
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.attrs.insert(key.to_string(), value.into());
    }

    pub fn remove(&mut self, key: &str) {
        self.attrs.remove(key);
    }

    pub fn has_change(&self, key: &str) -> bool {
        let (old, new) = self.get_change(key);
        old != new
    }

    pub fn has_changes(&self, keys: &[&str]) -> bool {
        keys.iter().any(|k| self.has_change(k))
    }

    /// `(old, new)` for `key`, with `null` folded into `None`.
    pub fn get_change(&self, key: &str) -> (Option<&Value>, Option<&Value>) {
        (
            self.prior.get(key).filter(|v| !v.is_null()),
            self.get(key),
        )
    }
}

/// Reads a JSON array of strings. A comma separated string is accepted too,
/// since older Vault endpoints return some lists that way.
pub fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        Some(Value::String(s)) if !s.is_empty() => s
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}
