use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::{Number, Value};

use crate::error::DataError;

/// A value as returned by, or bound into, the database driver.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// Fixed-point NUMERIC/DECIMAL.
    Decimal(Decimal),
    Text(String),
    Bytes(Vec<u8>),
    Timestamp(DateTime<Utc>),
    /// Timestamp without time zone.
    LocalTimestamp(NaiveDateTime),
    Date(NaiveDate),
    Json(Value),
}

impl SqlValue {
    /// Short type label for diagnostics. Never includes the value itself.
    pub fn kind(&self) -> &'static str {
        match self {
            SqlValue::Null => "null",
            SqlValue::Bool(_) => "bool",
            SqlValue::Int(_) => "integer",
            SqlValue::Float(_) => "float",
            SqlValue::Decimal(_) => "decimal",
            SqlValue::Text(_) => "text",
            SqlValue::Bytes(_) => "bytes",
            SqlValue::Timestamp(_) => "timestamptz",
            SqlValue::LocalTimestamp(_) => "timestamp",
            SqlValue::Date(_) => "date",
            SqlValue::Json(_) => "json",
        }
    }
}

/// Convert a driver value into a JSON-representable primitive.
///
/// Decimals become floats (precision loss is accepted), byte payloads must be
/// UTF-8 text, and non-finite floats have no JSON number form so they map to
/// null.
pub fn normalize(value: SqlValue) -> Result<Value, DataError> {
    let json = match value {
        SqlValue::Null => Value::Null,
        SqlValue::Bool(b) => Value::Bool(b),
        SqlValue::Int(n) => Value::from(n),
        SqlValue::Float(f) => float(f),
        SqlValue::Decimal(d) => d.to_f64().map(float).unwrap_or(Value::Null),
        SqlValue::Text(s) => Value::String(s),
        SqlValue::Bytes(bytes) => Value::String(String::from_utf8(bytes)?),
        SqlValue::Timestamp(ts) => Value::String(ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
        SqlValue::LocalTimestamp(ts) => {
            Value::String(ts.format("%Y-%m-%dT%H:%M:%S%.f").to_string())
        }
        SqlValue::Date(d) => Value::String(d.format("%Y-%m-%d").to_string()),
        SqlValue::Json(v) => v,
    };
    Ok(json)
}

fn float(f: f64) -> Value {
    Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
}

impl From<&Value> for SqlValue {
    /// JSON payload field to a bindable value. Arrays and objects bind as JSON.
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => SqlValue::Null,
            Value::Bool(b) => SqlValue::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => SqlValue::Int(i),
                None => n.as_f64().map(SqlValue::Float).unwrap_or(SqlValue::Null),
            },
            Value::String(s) => SqlValue::Text(s.clone()),
            Value::Array(_) | Value::Object(_) => SqlValue::Json(value.clone()),
        }
    }
}

impl From<i64> for SqlValue {
    fn from(n: i64) -> Self {
        SqlValue::Int(n)
    }
}

impl From<f64> for SqlValue {
    fn from(f: f64) -> Self {
        SqlValue::Float(f)
    }
}

impl From<&str> for SqlValue {
    fn from(s: &str) -> Self {
        SqlValue::Text(s.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(s: String) -> Self {
        SqlValue::Text(s)
    }
}

impl From<Decimal> for SqlValue {
    fn from(d: Decimal) -> Self {
        SqlValue::Decimal(d)
    }
}

impl From<DateTime<Utc>> for SqlValue {
    fn from(ts: DateTime<Utc>) -> Self {
        SqlValue::Timestamp(ts)
    }
}
