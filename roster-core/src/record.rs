//! [`LogicalRecord`]: the source-agnostic shape of one contact.
//!
//! Attribute names are the remote directory's JSON field names
//! (`displayName`, `companyName`, `emailAddresses`, ...) so a record doubles
//! as a request body. Empty values are never stored: presence or absence of
//! an attribute feeds the fingerprint, so `""`, `null`, `[]` and `{}` are all
//! dropped on insert.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::RecordKey;

/// A normalized contact record, keyed by attribute name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogicalRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    key: Option<RecordKey>,
    attributes: BTreeMap<String, Value>,
}

impl LogicalRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a stable local identity key.
    pub fn with_key(mut self, key: impl Into<RecordKey>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn key(&self) -> Option<&RecordKey> {
        self.key.as_ref()
    }

    /// Set `name` to `value` after normalization.
    ///
    /// An empty value removes the attribute instead.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        match normalize_value(value.into()) {
            Some(v) => {
                self.attributes.insert(name, v);
            }
            None => {
                self.attributes.remove(&name);
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    pub fn attributes(&self) -> &BTreeMap<String, Value> {
        &self.attributes
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    pub fn display_name(&self) -> Option<&str> {
        self.get("displayName").and_then(Value::as_str)
    }

    /// Human-readable identity for log lines.
    pub fn label(&self) -> String {
        if let Some(name) = self.display_name() {
            return name.to_string();
        }
        if let Some(company) = self.get("companyName").and_then(Value::as_str) {
            return company.to_string();
        }
        match &self.key {
            Some(key) => key.to_string(),
            None => "<unnamed>".to_string(),
        }
    }

    /// JSON object body sent to the remote directory.
    pub fn to_body(&self) -> Value {
        let map: Map<String, Value> = self
            .attributes
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Value::Object(map)
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for LogicalRecord {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        let mut record = LogicalRecord::new();
        for (name, value) in iter {
            record.set(name, value);
        }
        record
    }
}

/// Recursively drop empty values.
///
/// Returns `None` when the value itself is empty after pruning: `null`, a
/// blank string, or an array/object with no surviving members.
pub fn normalize_value(value: Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::String(s) => {
            if s.trim().is_empty() {
                None
            } else {
                Some(Value::String(s))
            }
        }
        Value::Array(items) => {
            let items: Vec<Value> = items.into_iter().filter_map(normalize_value).collect();
            if items.is_empty() {
                None
            } else {
                Some(Value::Array(items))
            }
        }
        Value::Object(map) => {
            let map: Map<String, Value> = map
                .into_iter()
                .filter_map(|(k, v)| normalize_value(v).map(|v| (k, v)))
                .collect();
            if map.is_empty() {
                None
            } else {
                Some(Value::Object(map))
            }
        }
        other => Some(other),
    }
}
