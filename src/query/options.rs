//! Named query parameters.

use indexmap::IndexMap;
use serde_json::Value;

use crate::err::ArgError;

/// Bag of named parameters steering a query.
///
/// Values are JSON values; list parameters accept either arrays or comma-separated
/// strings.  The translator writes cleaned lists back so callers can see which
/// fragments were used.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct QueryOptions(IndexMap<String, Value>);

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style `put`.
    pub fn with<V: Into<Value>>(mut self, key: &str, value: V) -> Self {
        self.put(key, value);
        self
    }

    pub fn put<V: Into<Value>>(&mut self, key: &str, value: V) {
        self.0.insert(key.to_string(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.shift_remove(key)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Whether `key` is present and not null.
    pub fn contains_key(&self, key: &str) -> bool {
        matches!(self.0.get(key), Some(value) if !value.is_null())
    }

    /// Scalar value rendered as string; arrays are joined with commas.
    pub fn get_str(&self, key: &str) -> Option<String> {
        match self.0.get(key)? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            Value::Array(_) => Some(self.get_list(key).join(",")),
            other => Some(other.to_string()),
        }
    }

    /// List value; strings are split at commas and empty items dropped.
    pub fn get_list(&self, key: &str) -> Vec<String> {
        let items = match self.0.get(key) {
            None | Some(Value::Null) => return Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| match item {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect::<Vec<_>>(),
            Some(Value::String(s)) => s.split(',').map(|s| s.to_string()).collect(),
            Some(other) => vec![other.to_string()],
        };
        items
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.0.get(key)? {
            Value::Bool(b) => Some(*b),
            Value::String(s) => s.parse::<bool>().ok(),
            _ => None,
        }
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        match self.0.get(key)? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        }
    }

    /// Parse `key=value` pairs, e.g., from the command line.
    pub fn from_pairs<S: AsRef<str>>(pairs: &[S]) -> Result<Self, ArgError> {
        let mut result = Self::new();
        for pair in pairs {
            let pair = pair.as_ref();
            match pair.split_once('=') {
                Some((key, value)) if !key.trim().is_empty() => {
                    result.put(key.trim(), value.trim())
                }
                _ => return Err(ArgError::OptionInvalidFormat(pair.to_string())),
            }
        }
        Ok(result)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}
