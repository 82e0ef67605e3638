//! Core value types that flow through the gateway

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// A primitive argument value inferred from a command token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgValue {
    /// `true` / `false`
    Bool(bool),
    /// All-digit token
    Int(i64),
    /// Digits, one dot, digits
    Float(f64),
    /// Anything else
    String(String),
}

impl ArgValue {
    /// Borrow the value as a string slice when it is a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ArgValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Read the value as a non-negative integer when it is one
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            ArgValue::Int(n) => u64::try_from(*n).ok(),
            _ => None,
        }
    }

    /// Read the value as a boolean when it is one
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ArgValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

/// Formats the value so that re-classifying the output yields the same value.
impl fmt::Display for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgValue::Bool(b) => write!(f, "{b}"),
            ArgValue::Int(n) => write!(f, "{n}"),
            ArgValue::Float(x) => {
                // Display never switches to exponent notation but drops ".0"
                let digits = x.to_string();
                if digits.contains('.') {
                    f.write_str(&digits)
                } else {
                    write!(f, "{digits}.0")
                }
            }
            ArgValue::String(s) => f.write_str(s),
        }
    }
}

impl From<bool> for ArgValue {
    fn from(value: bool) -> Self {
        ArgValue::Bool(value)
    }
}

impl From<i64> for ArgValue {
    fn from(value: i64) -> Self {
        ArgValue::Int(value)
    }
}

impl From<u32> for ArgValue {
    fn from(value: u32) -> Self {
        ArgValue::Int(i64::from(value))
    }
}

impl From<f64> for ArgValue {
    fn from(value: f64) -> Self {
        ArgValue::Float(value)
    }
}

impl From<&str> for ArgValue {
    fn from(value: &str) -> Self {
        ArgValue::String(value.to_string())
    }
}

impl From<String> for ArgValue {
    fn from(value: String) -> Self {
        ArgValue::String(value)
    }
}

/// A named tool operation with its typed arguments.
///
/// Arguments live in a `BTreeMap`, so keys are unique and serialize in a
/// stable order; that order is what makes cache keys canonical.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Tool name as the server knows it, e.g. `list_branches`
    pub name: String,
    /// Argument map
    pub arguments: BTreeMap<String, ArgValue>,
}

impl ToolCall {
    /// Create a call with no arguments
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arguments: BTreeMap::new(),
        }
    }

    /// Add an argument, replacing any previous value for the key
    pub fn with_arg(mut self, key: impl Into<String>, value: impl Into<ArgValue>) -> Self {
        self.arguments.insert(key.into(), value.into());
        self
    }

    /// Look up an argument
    pub fn arg(&self, key: &str) -> Option<&ArgValue> {
        self.arguments.get(key)
    }

    /// Look up a string argument
    pub fn arg_str(&self, key: &str) -> Option<&str> {
        self.arg(key).and_then(ArgValue::as_str)
    }

    /// Look up an integer argument
    pub fn arg_u64(&self, key: &str) -> Option<u64> {
        self.arg(key).and_then(ArgValue::as_u64)
    }

    /// The arguments as a JSON object, keys in sorted order
    pub fn arguments_json(&self) -> Value {
        serde_json::to_value(&self.arguments).unwrap_or_else(|_| Value::Object(Default::default()))
    }

    /// Canonical serialization of the arguments
    pub fn canonical_arguments(&self) -> String {
        self.arguments_json().to_string()
    }
}

impl fmt::Display for ToolCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.canonical_arguments())
    }
}

/// Opaque result of a tool call: a mapping, a sequence, a string, or nothing.
///
/// The gateway attaches no schema; callers interpret the shape per tool.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ToolResult(Value);

impl ToolResult {
    /// The absent result
    pub fn none() -> Self {
        Self(Value::Null)
    }

    /// A plain string result
    pub fn text(text: impl Into<String>) -> Self {
        Self(Value::String(text.into()))
    }

    /// Wrap an arbitrary JSON value
    pub fn from_value(value: Value) -> Self {
        Self(value)
    }

    /// Whether this is the "no data available" result
    pub fn is_absent(&self) -> bool {
        self.0.is_null()
    }

    /// Borrow the underlying value
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Take the underlying value
    pub fn into_value(self) -> Value {
        self.0
    }

    /// Borrow the result as a sequence
    pub fn as_sequence(&self) -> Option<&Vec<Value>> {
        self.0.as_array()
    }

    /// Borrow the result as a string
    pub fn as_text(&self) -> Option<&str> {
        self.0.as_str()
    }

    /// Coerce the result into a list of records.
    ///
    /// A sequence is returned as is, a string is parsed as a JSON sequence,
    /// and anything else (or a string that is not a JSON sequence) yields an
    /// empty list.
    pub fn into_records(self) -> Vec<Value> {
        match self.0 {
            Value::Array(items) => items,
            Value::String(text) => match serde_json::from_str::<Value>(&text) {
                Ok(Value::Array(items)) => items,
                _ => {
                    tracing::debug!("String result is not a JSON sequence, treating as empty");
                    Vec::new()
                }
            },
            _ => Vec::new(),
        }
    }
}

impl From<Value> for ToolResult {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// Identity under which a pooled connection is held.
///
/// Two callers running at the same time must never share a key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OwnerKey(String);

impl OwnerKey {
    /// Create a key from any name
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Key for worker slot `slot` of lane runner `runner`
    pub fn worker(runner: usize, slot: usize) -> Self {
        Self(format!("runner-{runner}-worker-{slot}"))
    }

    /// The key as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OwnerKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_arguments_serialize_in_sorted_order() {
        let call = ToolCall::new("list_branches")
            .with_arg("repo", "widgets")
            .with_arg("perPage", 5i64)
            .with_arg("owner", "acme")
            .with_arg("page", 1i64);

        assert_eq!(
            call.canonical_arguments(),
            r#"{"owner":"acme","page":1,"perPage":5,"repo":"widgets"}"#
        );
    }

    #[test]
    fn test_later_argument_replaces_earlier() {
        let call = ToolCall::new("t").with_arg("page", 1i64).with_arg("page", 2i64);
        assert_eq!(call.arguments.len(), 1);
        assert_eq!(call.arg_u64("page"), Some(2));
    }

    #[test]
    fn test_float_display_keeps_decimal_point() {
        assert_eq!(ArgValue::Float(1.0).to_string(), "1.0");
        assert_eq!(ArgValue::Float(2.5).to_string(), "2.5");
        assert_eq!(ArgValue::Int(7).to_string(), "7");
        assert_eq!(ArgValue::Bool(false).to_string(), "false");
    }

    #[test]
    fn test_into_records_shapes() {
        let seq = ToolResult::from_value(json!([{"name": "main"}]));
        assert_eq!(seq.into_records(), vec![json!({"name": "main"})]);

        let text = ToolResult::text(r#"[{"number": 1}]"#);
        assert_eq!(text.into_records(), vec![json!({"number": 1})]);

        assert!(ToolResult::text("not json").into_records().is_empty());
        assert!(ToolResult::from_value(json!({"a": 1})).into_records().is_empty());
        assert!(ToolResult::none().into_records().is_empty());
    }

    #[test]
    fn test_tool_result_serializes_transparently() {
        let result = ToolResult::from_value(json!({"k": [1, 2]}));
        assert_eq!(serde_json::to_string(&result).unwrap(), r#"{"k":[1,2]}"#);
        assert!(ToolResult::none().is_absent());
    }

    #[test]
    fn test_owner_key_for_worker() {
        assert_eq!(OwnerKey::worker(0, 3).as_str(), "runner-0-worker-3");
        assert_ne!(OwnerKey::worker(0, 1), OwnerKey::worker(0, 2));
        assert_ne!(OwnerKey::worker(1, 1), OwnerKey::worker(2, 1));
    }
}
