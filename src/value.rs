// Attribute value kinds and string coercion for updates

use serde_json::Value;

/// Runtime kind of an attribute value, consulted when a textual update
/// has to be converted to the type an attribute already holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    String,
    Int,
    Float,
    Bool,
    Null,
    Array,
    Object,
}

impl ValueKind {
    /// Kind of an existing JSON value
    pub fn of(value: &Value) -> Self {
        match value {
            Value::String(_) => ValueKind::String,
            Value::Number(n) if n.is_i64() || n.is_u64() => ValueKind::Int,
            Value::Number(_) => ValueKind::Float,
            Value::Bool(_) => ValueKind::Bool,
            Value::Null => ValueKind::Null,
            Value::Array(_) => ValueKind::Array,
            Value::Object(_) => ValueKind::Object,
        }
    }

    /// Parse `raw` into a value of this kind
    ///
    /// Returns `None` when the text does not parse as this kind. `Null`
    /// carries no type to coerce to, so the raw text is kept as a string.
    pub fn coerce(self, raw: &str) -> Option<Value> {
        match self {
            ValueKind::String | ValueKind::Null => Some(Value::String(raw.to_string())),
            ValueKind::Int => raw.trim().parse::<i64>().ok().map(Value::from),
            ValueKind::Float => raw
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number),
            ValueKind::Bool => match raw.trim().to_ascii_lowercase().as_str() {
                "true" => Some(Value::Bool(true)),
                "false" => Some(Value::Bool(false)),
                _ => None,
            },
            ValueKind::Array => serde_json::from_str::<Value>(raw).ok().filter(Value::is_array),
            ValueKind::Object => serde_json::from_str::<Value>(raw).ok().filter(Value::is_object),
        }
    }
}

impl std::fmt::Display for ValueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ValueKind::String => "string",
            ValueKind::Int => "int",
            ValueKind::Float => "float",
            ValueKind::Bool => "bool",
            ValueKind::Null => "null",
            ValueKind::Array => "list",
            ValueKind::Object => "dict",
        };
        write!(f, "{}", name)
    }
}
