//! Typed scalar values. `Unknown` carries its type and stands for SQL NULL; absence of a
//! value is `Option::None` at the call site.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Declared type of a column or field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Text,
    Integer,
    Decimal,
    Boolean,
    Date,
    Timestamp,
}

impl ValueType {
    /// Parse a configured data-type name (case-insensitive).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "text" | "string" => Some(ValueType::Text),
            "integer" | "int" | "long" => Some(ValueType::Integer),
            "decimal" | "number" | "double" => Some(ValueType::Decimal),
            "boolean" | "bool" => Some(ValueType::Boolean),
            "date" => Some(ValueType::Date),
            "timestamp" | "datetime" => Some(ValueType::Timestamp),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ValueType::Text => "text",
            ValueType::Integer => "integer",
            ValueType::Decimal => "decimal",
            ValueType::Boolean => "boolean",
            ValueType::Date => "date",
            ValueType::Timestamp => "timestamp",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Text(String),
    Integer(i64),
    Decimal(f64),
    Boolean(bool),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
    Unknown(ValueType),
}

const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

impl Value {
    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    pub fn unknown(value_type: ValueType) -> Self {
        Value::Unknown(value_type)
    }

    /// Parse trimmed text into a value of the given type. `None` means the text is not a
    /// valid value for that type.
    pub fn parse(text: &str, value_type: ValueType) -> Option<Value> {
        let text = text.trim();
        match value_type {
            ValueType::Text => Some(Value::Text(text.to_string())),
            ValueType::Integer => {
                if let Ok(n) = text.parse::<i64>() {
                    return Some(Value::Integer(n));
                }
                let d = text.parse::<f64>().ok()?;
                if !d.is_finite() {
                    return None;
                }
                Some(Value::Integer(d.round() as i64))
            }
            ValueType::Decimal => {
                let d = text.parse::<f64>().ok()?;
                d.is_finite().then_some(Value::Decimal(d))
            }
            ValueType::Boolean => match text.to_lowercase().as_str() {
                "1" | "true" => Some(Value::Boolean(true)),
                "0" | "false" => Some(Value::Boolean(false)),
                _ => None,
            },
            ValueType::Date => parse_date(text).map(Value::Date),
            ValueType::Timestamp => parse_timestamp(text).map(Value::Timestamp),
        }
    }

    /// Parse each text into the given type; `None` if any one of them is invalid.
    pub fn parse_all<'a, I>(texts: I, value_type: ValueType) -> Option<Vec<Value>>
    where
        I: IntoIterator<Item = &'a str>,
    {
        texts
            .into_iter()
            .map(|t| Value::parse(t, value_type))
            .collect()
    }

    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Text(_) => ValueType::Text,
            Value::Integer(_) => ValueType::Integer,
            Value::Decimal(_) => ValueType::Decimal,
            Value::Boolean(_) => ValueType::Boolean,
            Value::Date(_) => ValueType::Date,
            Value::Timestamp(_) => ValueType::Timestamp,
            Value::Unknown(t) => *t,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Value::Unknown(_))
    }

    /// Unknown, or text that is empty after trimming.
    pub fn is_empty(&self) -> bool {
        match self {
            Value::Unknown(_) => true,
            Value::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    pub fn to_text(&self) -> String {
        match self {
            Value::Text(s) => s.clone(),
            Value::Integer(n) => n.to_string(),
            Value::Decimal(d) => d.to_string(),
            Value::Boolean(b) => (if *b { "1" } else { "0" }).to_string(),
            Value::Date(d) => d.format("%Y-%m-%d").to_string(),
            Value::Timestamp(t) => t.format("%Y-%m-%d %H:%M:%S%.6f").to_string(),
            Value::Unknown(_) => String::new(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(n) => Some(*n as f64),
            Value::Decimal(d) => Some(*d),
            _ => None,
        }
    }

    /// Order two values of compatible type. Unknown on either side has no order.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Unknown(_), _) | (_, Value::Unknown(_)) => None,
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
            (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
            (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
            (Value::Timestamp(a), Value::Timestamp(b)) => Some(a.cmp(b)),
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x.partial_cmp(&y),
                _ => None,
            },
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::Integer(n) => serde_json::Value::Number((*n).into()),
            Value::Decimal(d) => serde_json::Number::from_f64(*d)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Boolean(b) => serde_json::Value::Bool(*b),
            Value::Date(_) | Value::Timestamp(_) => serde_json::Value::String(self.to_text()),
            Value::Unknown(_) => serde_json::Value::Null,
        }
    }

    /// Convert a JSON scalar into a value of the given type. Null becomes `Unknown`.
    pub fn from_json(json: &serde_json::Value, value_type: ValueType) -> Option<Value> {
        match json {
            serde_json::Value::Null => Some(Value::Unknown(value_type)),
            serde_json::Value::Bool(b) => match value_type {
                ValueType::Boolean => Some(Value::Boolean(*b)),
                ValueType::Text => Some(Value::Text(b.to_string())),
                _ => None,
            },
            serde_json::Value::Number(n) => Value::parse(&n.to_string(), value_type),
            serde_json::Value::String(s) => Value::parse(s, value_type),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

fn parse_date(text: &str) -> Option<NaiveDate> {
    if let Ok(d) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Some(d);
    }
    parse_timestamp(text).map(|t| t.date())
}

fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    if let Ok(t) = DateTime::parse_from_rfc3339(text) {
        return Some(t.naive_utc());
    }
    for fmt in TIMESTAMP_FORMATS {
        if let Ok(t) = NaiveDateTime::parse_from_str(text, fmt) {
            return Some(t);
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_integer_rounds_decimals() {
        assert_eq!(Value::parse(" 42 ", ValueType::Integer), Some(Value::Integer(42)));
        assert_eq!(Value::parse("2.6", ValueType::Integer), Some(Value::Integer(3)));
        assert_eq!(Value::parse("abc", ValueType::Integer), None);
    }

    #[test]
    fn test_parse_boolean_forms() {
        assert_eq!(Value::parse("1", ValueType::Boolean), Some(Value::Boolean(true)));
        assert_eq!(Value::parse("FALSE", ValueType::Boolean), Some(Value::Boolean(false)));
        assert_eq!(Value::parse("yes", ValueType::Boolean), None);
    }

    #[test]
    fn test_date_and_timestamp_text() {
        let d = Value::parse("2024-03-05", ValueType::Date).unwrap();
        assert_eq!(d.to_text(), "2024-03-05");
        let d = Value::parse("2024-03-05 10:11:12", ValueType::Date).unwrap();
        assert_eq!(d.to_text(), "2024-03-05");

        let t = Value::parse("2024-03-05T10:11:12.5", ValueType::Timestamp).unwrap();
        assert_eq!(t.to_text(), "2024-03-05 10:11:12.500000");
        let t = Value::parse("2024-03-05T10:11:12Z", ValueType::Timestamp).unwrap();
        assert_eq!(t.to_text(), "2024-03-05 10:11:12.000000");
        assert_eq!(Value::parse("05/03/2024", ValueType::Timestamp), None);
    }

    #[test]
    fn test_unknown_is_typed_and_unordered() {
        let u = Value::unknown(ValueType::Integer);
        assert!(u.is_unknown());
        assert_eq!(u.value_type(), ValueType::Integer);
        assert_eq!(u.to_text(), "");
        assert_eq!(u.compare(&Value::Integer(1)), None);
        assert_eq!(u.to_json(), serde_json::Value::Null);
    }

    #[test]
    fn test_compare_mixed_numbers() {
        assert_eq!(Value::Integer(2).compare(&Value::Decimal(2.5)), Some(Ordering::Less));
        assert_eq!(Value::text("b").compare(&Value::text("a")), Some(Ordering::Greater));
        assert_eq!(Value::text("1").compare(&Value::Integer(1)), None);
    }

    #[test]
    fn test_from_json_null_is_unknown() {
        let v = Value::from_json(&serde_json::Value::Null, ValueType::Date).unwrap();
        assert_eq!(v, Value::Unknown(ValueType::Date));
        let v = Value::from_json(&serde_json::json!(7), ValueType::Decimal).unwrap();
        assert_eq!(v, Value::Decimal(7.0));
    }

    #[test]
    fn test_value_type_names() {
        assert_eq!(ValueType::from_name("Integer"), Some(ValueType::Integer));
        assert_eq!(ValueType::from_name("datetime"), Some(ValueType::Timestamp));
        assert_eq!(ValueType::from_name("blob"), None);
    }
}
