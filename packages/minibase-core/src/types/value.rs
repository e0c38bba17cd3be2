//! Tagged field value, decided once at the storage boundary.

use std::fmt;

use super::FieldType;

/// A single field value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    Text(String),
    Integer(i64),
    Boolean(bool),
}

impl Value {
    /// Parses a trimmed literal according to `field_type`.
    ///
    /// Returns `None` when the literal is not a valid integer or boolean.
    /// Strings always parse.
    pub fn parse(field_type: FieldType, raw: &str) -> Option<Value> {
        let raw = raw.trim();
        match field_type {
            FieldType::FixedString | FieldType::VarString => Some(Value::Text(raw.to_string())),
            FieldType::Integer => raw.parse::<i64>().ok().map(Value::Integer),
            FieldType::Boolean => parse_bool(raw).map(Value::Boolean),
        }
    }

    /// Textual form written into a record (booleans as `1`/`0`).
    pub fn encoded_text(&self) -> String {
        match self {
            Value::Text(s) => s.clone(),
            Value::Integer(n) => n.to_string(),
            Value::Boolean(b) => (if *b { "1" } else { "0" }).to_string(),
        }
    }

    /// Equality after normalisation: strings compare trimmed, values of
    /// different variants compare by their trimmed textual form.
    pub fn loosely_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Text(a), Value::Text(b)) => a.trim() == b.trim(),
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (a, b) => a.to_string().trim() == b.to_string().trim(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(s) => write!(f, "{}", s),
            Value::Integer(n) => write!(f, "{}", n),
            Value::Boolean(b) => write!(f, "{}", b),
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "t" | "yes" | "y" => Some(true),
        "0" | "false" | "f" | "no" | "n" => Some(false),
        _ => None,
    }
}
