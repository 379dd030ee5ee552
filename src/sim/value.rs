//! Scalar values produced by generators.

use serde_json::Value as JsonValue;
use std::fmt;

/// A generated value.
///
/// Generators emit scalars; `Json` carries non-scalar config values passed
/// through `const`, `choice`, and `sequence` untouched.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Json(JsonValue),
}

impl Value {
    /// Convert a config-supplied JSON value into a generator value.
    ///
    /// Whole numbers come back as `Int` so integer generators and expression
    /// arithmetic stay integral.
    pub fn from_json(value: &JsonValue) -> Value {
        match value {
            JsonValue::Null => Value::Null,
            JsonValue::Bool(b) => Value::Bool(*b),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            JsonValue::String(s) => Value::Str(s.clone()),
            other => Value::Json(other.clone()),
        }
    }

    /// Render as JSON for payload serialization.
    pub fn to_json(&self) -> JsonValue {
        match self {
            Value::Null => JsonValue::Null,
            Value::Bool(b) => JsonValue::Bool(*b),
            Value::Int(i) => JsonValue::from(*i),
            Value::Float(f) => {
                // JSON has no NaN/Infinity; fall back to null like a lossy cast
                serde_json::Number::from_f64(*f)
                    .map(JsonValue::Number)
                    .unwrap_or(JsonValue::Null)
            }
            Value::Str(s) => JsonValue::String(s.clone()),
            Value::Json(v) => v.clone(),
        }
    }

    /// Python-style truthiness: null, false, zero, and "" are falsy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Json(JsonValue::Array(items)) => !items.is_empty(),
            Value::Json(JsonValue::Object(map)) => !map.is_empty(),
            Value::Json(_) => true,
        }
    }
}

impl fmt::Display for Value {
    /// Bare strings, JSON for everything else; used by `sequence` text encoding.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => f.write_str(s),
            other => f.write_str(&other.to_json().to_string()),
        }
    }
}
