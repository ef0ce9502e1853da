use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Claims of a validated bearer token.
///
/// Wraps the decoded JWT payload. Accessors understand the common shapes
/// identity providers emit (`aud` as string or array, `scope` as a
/// space-separated string, `scp`/`roles` as arrays).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Claims(Map<String, Value>);

impl Claims {
    pub fn new(claims: Map<String, Value>) -> Self {
        Self(claims)
    }

    /// Returns `None` unless `value` is a JSON object.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn subject(&self) -> Option<&str> {
        self.get("sub").and_then(Value::as_str)
    }

    pub fn issuer(&self) -> Option<&str> {
        self.get("iss").and_then(Value::as_str)
    }

    pub fn audiences(&self) -> Vec<&str> {
        self.get("aud")
            .map(|v| string_or_list(v, false))
            .unwrap_or_default()
    }

    /// `exp` as seconds since the Unix epoch.
    pub fn expires_at(&self) -> Option<i64> {
        self.get("exp").and_then(Value::as_i64)
    }

    /// Values of `roles` and `role`.
    pub fn roles(&self) -> Vec<&str> {
        ["roles", "role"]
            .iter()
            .filter_map(|name| self.get(name))
            .flat_map(|v| string_or_list(v, false))
            .collect()
    }

    /// Values of `scope` (space separated) and `scp` (string or array).
    pub fn scopes(&self) -> Vec<&str> {
        ["scope", "scp"]
            .iter()
            .filter_map(|name| self.get(name))
            .flat_map(|v| string_or_list(v, true))
            .collect()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

fn string_or_list(value: &Value, split_whitespace: bool) -> Vec<&str> {
    match value {
        Value::String(s) if split_whitespace => s.split_whitespace().collect(),
        Value::String(s) if !s.is_empty() => vec![s.as_str()],
        Value::Array(items) => items.iter().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    }
}
