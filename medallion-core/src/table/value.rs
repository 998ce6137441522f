//! Cell values and their two notions of equality.
//!
//! `PartialEq`/`Eq`/`Hash` implement *key* equality, used for grouping, joins
//! and dedup: nulls are equal to each other, NaN equals NaN and `-0.0 == 0.0`.
//! [`Value::compare`] implements *predicate* comparison, used by filters:
//! numeric types compare across Int/Float and a null operand never orders.

use crate::error::{EngineError, Result};
use crate::table::DataType;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone};
use chrono_tz::Tz;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Rendering used for timestamps when a value is stringified.
pub const TIMESTAMP_DISPLAY_FORMAT: &str = "%Y-%m-%d %H:%M:%S%:z";

/// A single typed cell.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Timestamp(DateTime<Tz>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The column type this value belongs to, `None` for null.
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Value::Null => None,
            Value::Str(_) => Some(DataType::Utf8),
            Value::Int(_) => Some(DataType::Int64),
            Value::Float(_) => Some(DataType::Float64),
            Value::Bool(_) => Some(DataType::Boolean),
            Value::Timestamp(ts) => Some(DataType::Timestamp(ts.timezone())),
        }
    }

    /// Whether this value may be stored in a column of `data_type`.
    pub fn conforms_to(&self, data_type: DataType) -> bool {
        match (self, data_type) {
            (Value::Null, _) => true,
            (Value::Str(_), DataType::Utf8) => true,
            (Value::Int(_), DataType::Int64) => true,
            (Value::Float(_), DataType::Float64) => true,
            (Value::Bool(_), DataType::Boolean) => true,
            (Value::Timestamp(ts), DataType::Timestamp(tz)) => ts.timezone() == tz,
            _ => false,
        }
    }

    /// Numeric view of Int/Float values.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Predicate comparison. `None` when either side is null or the types
    /// cannot be ordered against each other.
    ///
    /// A string compared with a timestamp is parsed in the timestamp's zone,
    /// so config literals such as `"2024-01-01"` can bound a time column.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => None,
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Int(_), Value::Float(_))
            | (Value::Float(_), Value::Int(_))
            | (Value::Float(_), Value::Float(_)) => {
                self.as_f64()?.partial_cmp(&other.as_f64()?)
            }
            (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::Timestamp(a), Value::Timestamp(b)) => Some(a.cmp(b)),
            (Value::Timestamp(a), Value::Str(s)) => {
                let b = parse_timestamp_literal(s, a.timezone())?;
                Some(a.cmp(&b))
            }
            (Value::Str(s), Value::Timestamp(b)) => {
                let a = parse_timestamp_literal(s, b.timezone())?;
                Some(a.cmp(b))
            }
            _ => None,
        }
    }

    /// Deterministic ordering over all values: booleans, numbers, strings,
    /// timestamps, then nulls last.
    pub fn total_cmp(&self, other: &Value) -> Ordering {
        fn rank(v: &Value) -> u8 {
            match v {
                Value::Bool(_) => 0,
                Value::Int(_) | Value::Float(_) => 1,
                Value::Str(_) => 2,
                Value::Timestamp(_) => 3,
                Value::Null => 4,
            }
        }
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
                let a = self.as_f64().unwrap_or(f64::NAN);
                let b = other.as_f64().unwrap_or(f64::NAN);
                a.total_cmp(&b)
            }
            (Value::Str(a), Value::Str(b)) => a.cmp(b),
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Timestamp(a), Value::Timestamp(b)) => a.cmp(b),
            _ => rank(self).cmp(&rank(other)),
        }
    }

    /// Convert a scalar from a YAML job file into a cell value.
    pub fn from_yaml(value: &serde_yaml::Value) -> Result<Value> {
        match value {
            serde_yaml::Value::Null => Ok(Value::Null),
            serde_yaml::Value::Bool(b) => Ok(Value::Bool(*b)),
            serde_yaml::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(Value::Int(i))
                } else if let Some(f) = n.as_f64() {
                    Ok(Value::Float(f))
                } else {
                    Err(EngineError::config(format!("unsupported numeric literal: {n}")))
                }
            }
            serde_yaml::Value::String(s) => Ok(Value::Str(s.clone())),
            other => Err(EngineError::config(format!(
                "expected a scalar literal, got {other:?}"
            ))),
        }
    }
}

/// Parse a string literal as a point in time within `tz`.
///
/// Accepts RFC 3339 (any offset), `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DDTHH:MM:SS`
/// and plain dates (midnight). Ambiguous or skipped local times yield `None`.
pub fn parse_timestamp_literal(s: &str, tz: Tz) -> Option<DateTime<Tz>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&tz));
    }
    let naive = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S"))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })?;
    tz.from_local_datetime(&naive).single()
}

fn canonical_f64_bits(f: f64) -> u64 {
    if f.is_nan() {
        f64::NAN.to_bits()
    } else if f == 0.0 {
        0.0f64.to_bits()
    } else {
        f.to_bits()
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => canonical_f64_bits(*a) == canonical_f64_bits(*b),
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Timestamp(a), Value::Timestamp(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Str(s) => s.hash(state),
            Value::Int(i) => i.hash(state),
            Value::Float(f) => canonical_f64_bits(*f).hash(state),
            Value::Bool(b) => b.hash(state),
            Value::Timestamp(ts) => ts.timestamp_micros().hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Str(s) => write!(f, "{s}"),
            Value::Int(i) => write!(f, "{i}"),
            // Debug keeps the trailing ".0" on integral floats.
            Value::Float(v) => write!(f, "{v:?}"),
            // Same spelling the raw JSON reader produces.
            Value::Bool(true) => write!(f, "True"),
            Value::Bool(false) => write!(f, "False"),
            Value::Timestamp(ts) => write!(f, "{}", ts.format(TIMESTAMP_DISPLAY_FORMAT)),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<DateTime<Tz>> for Value {
    fn from(ts: DateTime<Tz>) -> Self {
        Value::Timestamp(ts)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_key_equality_treats_nulls_and_nan_as_equal() {
        assert_eq!(Value::Null, Value::Null);
        assert_eq!(Value::Float(f64::NAN), Value::Float(f64::NAN));
        assert_eq!(Value::Float(-0.0), Value::Float(0.0));
        assert_ne!(Value::Int(1), Value::Float(1.0));

        let set: HashSet<Value> = [Value::Null, Value::Null, Value::Float(f64::NAN)]
            .into_iter()
            .collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_compare_cross_numeric() {
        assert_eq!(
            Value::Int(2).compare(&Value::Float(1.5)),
            Some(Ordering::Greater)
        );
        assert_eq!(Value::Int(1).compare(&Value::Null), None);
        assert_eq!(Value::Str("a".into()).compare(&Value::Int(1)), None);
    }

    #[test]
    fn test_compare_timestamp_with_literal() {
        let ts = Tz::UTC.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let v = Value::Timestamp(ts);
        assert_eq!(
            v.compare(&Value::from("2024-03-01")),
            Some(Ordering::Greater)
        );
        assert_eq!(
            v.compare(&Value::from("2024-03-01T12:00:00+00:00")),
            Some(Ordering::Equal)
        );
        assert_eq!(v.compare(&Value::from("not a date")), None);
    }

    #[test]
    fn test_total_cmp_puts_nulls_last() {
        let mut values = vec![
            Value::Null,
            Value::Int(3),
            Value::Float(1.5),
            Value::Str("b".into()),
        ];
        values.sort_by(Value::total_cmp);
        assert_eq!(values[0], Value::Float(1.5));
        assert_eq!(values[1], Value::Int(3));
        assert_eq!(values[2], Value::Str("b".into()));
        assert!(values[3].is_null());
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::Float(10.0).to_string(), "10.0");
        assert_eq!(Value::Int(7).to_string(), "7");
        assert_eq!(Value::Null.to_string(), "");
        let ts = Tz::UTC.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(
            Value::Timestamp(ts).to_string(),
            "2024-01-02 03:04:05+00:00"
        );
    }

    #[test]
    fn test_from_yaml() {
        let v: serde_yaml::Value = serde_yaml::from_str("42").unwrap();
        assert_eq!(Value::from_yaml(&v).unwrap(), Value::Int(42));
        let v: serde_yaml::Value = serde_yaml::from_str("'DE'").unwrap();
        assert_eq!(Value::from_yaml(&v).unwrap(), Value::from("DE"));
        let v: serde_yaml::Value = serde_yaml::from_str("[1, 2]").unwrap();
        assert!(Value::from_yaml(&v).is_err());
    }
}
