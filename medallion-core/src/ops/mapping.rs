//! Schema mapping: projection, renaming and type casting.
//!
//! Projection is atomic: the output holds exactly the active mappings'
//! columns, in mapping order, and nothing from the input survives
//! unmapped. Casting is permissive: a cell that cannot be converted becomes
//! null, while an unknown type name or missing format is a configuration
//! error.

use crate::error::{EngineError, Result};
use crate::job::{ColumnMapping, TimestampSpec};
use crate::table::{Column, DataType, Table, Value};
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use chrono_tz::Tz;
use std::collections::HashSet;
use std::str::FromStr;

/// Name of the column appended by [`add_ingestion_timestamp`].
pub const INGESTION_TIMESTAMP_COLUMN: &str = "ingestion_timestamp";

/// Target type of a column mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputType {
    String,
    Float,
    Int,
    Bool,
    DatetimeUtc,
}

impl FromStr for OutputType {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "string" => Ok(OutputType::String),
            "float" | "double" => Ok(OutputType::Float),
            "int" => Ok(OutputType::Int),
            "bool" | "boolean" => Ok(OutputType::Bool),
            "datetime_utc" => Ok(OutputType::DatetimeUtc),
            other => Err(EngineError::config(format!("unknown output_type: {other}"))),
        }
    }
}

/// Select, rename and cast columns per `mappings`.
pub fn project(table: &Table, mappings: &[ColumnMapping]) -> Result<Table> {
    let mut seen = HashSet::new();
    let mut columns = Vec::new();

    for mapping in mappings.iter().filter(|m| m.active) {
        if !seen.insert(mapping.output_name.as_str()) {
            return Err(EngineError::config(format!(
                "output column '{}' is mapped more than once",
                mapping.output_name
            )));
        }
        let source = table.require_column(&mapping.input_name)?;
        let output_type: OutputType = mapping.output_type.parse()?;
        let column = cast_column(
            source,
            &mapping.output_name,
            output_type,
            mapping.timestamp_spec.as_ref(),
        )?;

        let nullified = column.null_count().saturating_sub(source.null_count());
        if nullified > 0 {
            tracing::warn!(
                column = %mapping.input_name,
                output_type = %mapping.output_type,
                nullified,
                "Values could not be cast and were set to null"
            );
        }
        columns.push(column);
    }

    Table::new(columns)
}

/// Cast one column to `output_type`, naming the result `name`.
pub fn cast_column(
    source: &Column,
    name: &str,
    output_type: OutputType,
    timestamp: Option<&TimestampSpec>,
) -> Result<Column> {
    let column = match output_type {
        OutputType::String => Column::new(
            name,
            DataType::Utf8,
            source.values.iter().map(cast_to_string).collect(),
        ),
        OutputType::Float => Column::new(
            name,
            DataType::Float64,
            source.values.iter().map(cast_to_float).collect(),
        ),
        OutputType::Int => Column::new(
            name,
            DataType::Int64,
            source.values.iter().map(cast_to_int).collect(),
        ),
        OutputType::Bool => Column::new(
            name,
            DataType::Boolean,
            source.values.iter().map(cast_to_bool).collect(),
        ),
        OutputType::DatetimeUtc => {
            let parser = TimestampParser::from_spec(timestamp)?;
            Column::new(
                name,
                DataType::Timestamp(parser.output_tz),
                source.values.iter().map(|v| parser.parse(v)).collect(),
            )
        }
    };
    Ok(column)
}

fn cast_to_string(value: &Value) -> Value {
    match value {
        Value::Null => Value::Null,
        Value::Str(s) => Value::Str(s.clone()),
        other => Value::Str(other.to_string()),
    }
}

fn cast_to_float(value: &Value) -> Value {
    match value {
        Value::Str(s) => s
            .trim()
            .parse::<f64>()
            .map_or(Value::Null, Value::Float),
        Value::Int(i) => Value::Float(*i as f64),
        Value::Float(f) => Value::Float(*f),
        Value::Bool(b) => Value::Float(if *b { 1.0 } else { 0.0 }),
        Value::Null | Value::Timestamp(_) => Value::Null,
    }
}

fn cast_to_int(value: &Value) -> Value {
    match value {
        Value::Str(s) => {
            let s = s.trim();
            match s.parse::<i64>() {
                Ok(i) => Value::Int(i),
                Err(_) => s.parse::<f64>().ok().and_then(integral).into(),
            }
        }
        Value::Int(i) => Value::Int(*i),
        Value::Float(f) => integral(*f).into(),
        Value::Bool(b) => Value::Int(i64::from(*b)),
        Value::Null | Value::Timestamp(_) => Value::Null,
    }
}

/// Integral, in-range floats convert; anything else has no integer value.
fn integral(f: f64) -> Option<i64> {
    const LIMIT: f64 = 9_223_372_036_854_775_808.0; // 2^63
    (f.is_finite() && f.fract() == 0.0 && (-LIMIT..LIMIT).contains(&f)).then_some(f as i64)
}

fn cast_to_bool(value: &Value) -> Value {
    match value {
        Value::Str(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "t" | "yes" | "y" | "1" => Value::Bool(true),
            "false" | "f" | "no" | "n" | "0" => Value::Bool(false),
            _ => Value::Null,
        },
        Value::Int(i) => Value::Bool(*i != 0),
        Value::Float(f) if !f.is_nan() => Value::Bool(*f != 0.0),
        Value::Bool(b) => Value::Bool(*b),
        _ => Value::Null,
    }
}

/// Resolve an IANA zone name.
pub fn parse_timezone(name: &str) -> Result<Tz> {
    name.parse::<Tz>()
        .map_err(|_| EngineError::config(format!("unknown timezone: {name}")))
}

/// Parses local wall-clock strings and converts them between zones.
struct TimestampParser<'a> {
    format: &'a str,
    input_tz: Tz,
    output_tz: Tz,
}

impl<'a> TimestampParser<'a> {
    fn from_spec(spec: Option<&'a TimestampSpec>) -> Result<Self> {
        let spec = spec.ok_or_else(|| {
            EngineError::config("timestamp.input_format is required for datetime_utc")
        })?;
        let format = spec.input_format.as_deref().ok_or_else(|| {
            EngineError::config("timestamp.input_format is required for datetime_utc")
        })?;
        Ok(Self {
            format,
            input_tz: parse_timezone(&spec.input_timezone)?,
            output_tz: parse_timezone(&spec.output_timezone)?,
        })
    }

    fn parse(&self, value: &Value) -> Value {
        match value {
            Value::Str(s) => self
                .localize(s.trim())
                .map_or(Value::Null, |dt| Value::Timestamp(dt.with_timezone(&self.output_tz))),
            Value::Timestamp(ts) => Value::Timestamp(ts.with_timezone(&self.output_tz)),
            _ => Value::Null,
        }
    }

    /// Ambiguous (fall-back) and skipped (spring-forward) wall times have
    /// no single instant and yield `None`.
    fn localize(&self, s: &str) -> Option<DateTime<Tz>> {
        let naive = parse_naive(s, self.format)?;
        self.input_tz.from_local_datetime(&naive).single()
    }
}

/// Parse with a strftime format, allowing formats that stop at the hour or
/// at the date.
fn parse_naive(s: &str, format: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
        return Some(dt);
    }
    // chrono requires minutes for a datetime; supply them for hour-only formats.
    if let Ok(dt) = NaiveDateTime::parse_from_str(&format!("{s}|00"), &format!("{format}|%M")) {
        return Some(dt);
    }
    NaiveDate::parse_from_str(s, format)
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Append a constant `ingestion_timestamp` column (ISO-8601, UTC).
pub fn add_ingestion_timestamp(table: &Table, at: DateTime<Utc>) -> Result<Table> {
    let stamp = at.to_rfc3339_opts(SecondsFormat::Micros, false);
    let column = Column::new(
        INGESTION_TIMESTAMP_COLUMN,
        DataType::Utf8,
        vec![Value::Str(stamp); table.num_rows()],
    );
    table.with_column(column)
}
