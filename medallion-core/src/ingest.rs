//! Raw file readers feeding the Bronze layer.
//!
//! Raw inputs become all-string tables: CSV keeps empty fields as null,
//! JSON records are flattened to text with missing keys read as `""`.

use crate::error::{EngineError, Result};
use crate::table::{Column, DataType, Table, Value};
use serde_json::Value as JsonValue;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

/// Raw source format of a Bronze job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Csv,
    Json,
}

impl FromStr for SourceFormat {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "csv" => Ok(SourceFormat::Csv),
            "json" => Ok(SourceFormat::Json),
            other => Err(EngineError::config(format!("unknown source type: {other}"))),
        }
    }
}

/// Read a raw file of the given format.
pub fn read_raw(path: &Path, format: SourceFormat) -> Result<Table> {
    if !path.exists() {
        return Err(EngineError::not_found(path));
    }
    tracing::info!(path = %path.display(), ?format, "Reading raw input");
    let mut file = File::open(path)?;
    match format {
        SourceFormat::Csv => parse_csv(file),
        SourceFormat::Json => {
            let mut text = String::new();
            file.read_to_string(&mut text)?;
            parse_json(&text)
        }
    }
}

/// Parse CSV with a header row. Short records are padded with nulls.
pub fn parse_csv<R: Read>(reader: R) -> Result<Table> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);
    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let mut values: Vec<Vec<Value>> = vec![Vec::new(); headers.len()];

    for record in reader.records() {
        let record = record?;
        for (i, column) in values.iter_mut().enumerate() {
            column.push(match record.get(i) {
                Some(field) if !field.is_empty() => Value::Str(field.to_string()),
                _ => Value::Null,
            });
        }
    }

    Table::new(
        headers
            .into_iter()
            .zip(values)
            .map(|(name, values)| Column::new(name, DataType::Utf8, values))
            .collect(),
    )
}

/// Parse a JSON array of flat records.
///
/// Columns appear in first-seen key order. Missing keys and JSON nulls
/// become `""`; booleans render as `True`/`False`; nested values keep
/// their JSON text.
pub fn parse_json(text: &str) -> Result<Table> {
    let document: JsonValue = serde_json::from_str(text)?;
    let JsonValue::Array(records) = document else {
        return Err(EngineError::schema("expected a JSON array of records"));
    };

    let mut names: Vec<String> = Vec::new();
    for record in &records {
        let JsonValue::Object(fields) = record else {
            return Err(EngineError::schema("expected every JSON record to be an object"));
        };
        for key in fields.keys() {
            if !names.contains(key) {
                names.push(key.clone());
            }
        }
    }

    let columns = names
        .into_iter()
        .map(|name| {
            let values = records
                .iter()
                .map(|record| Value::Str(stringify(record.get(&name))))
                .collect();
            Column::new(name, DataType::Utf8, values)
        })
        .collect();
    Table::new(columns)
}

fn stringify(value: Option<&JsonValue>) -> String {
    match value {
        None | Some(JsonValue::Null) => String::new(),
        Some(JsonValue::String(s)) => s.clone(),
        Some(JsonValue::Bool(true)) => "True".to_string(),
        Some(JsonValue::Bool(false)) => "False".to_string(),
        Some(JsonValue::Number(n)) => n.to_string(),
        Some(nested) => nested.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_csv_empty_fields_are_null() {
        let data = "Timestamp,Zone,Value\n2024-01-01T00,DE,\n2024-01-01T01,\"FR, north\",12.5\n";
        let table = parse_csv(data.as_bytes()).unwrap();

        assert_eq!(table.column_names(), vec!["Timestamp", "Zone", "Value"]);
        assert_eq!(
            table.column("Value").unwrap().values,
            vec![Value::Null, Value::from("12.5")]
        );
        assert_eq!(table.column("Zone").unwrap().values[1], Value::from("FR, north"));
    }

    #[test]
    fn test_csv_short_record_is_padded() {
        let table = parse_csv("a,b\n1\n".as_bytes()).unwrap();
        assert_eq!(table.column("b").unwrap().values, vec![Value::Null]);
    }

    #[test]
    fn test_json_records_are_stringified_in_key_order() {
        let data = r#"[
            {"zone": "DE", "mw": 10, "ok": true},
            {"zone": null, "extra": {"a": 1}, "mw": 2.5}
        ]"#;
        let table = parse_json(data).unwrap();

        assert_eq!(table.column_names(), vec!["zone", "mw", "ok", "extra"]);
        assert_eq!(
            table.column("zone").unwrap().values,
            vec![Value::from("DE"), Value::from("")]
        );
        assert_eq!(
            table.column("mw").unwrap().values,
            vec![Value::from("10"), Value::from("2.5")]
        );
        assert_eq!(table.column("ok").unwrap().values[0], Value::from("True"));
        assert_eq!(table.column("ok").unwrap().values[1], Value::from(""));
        assert_eq!(table.column("extra").unwrap().values[1], Value::from(r#"{"a":1}"#));
    }

    #[test]
    fn test_json_must_be_array_of_objects() {
        assert!(matches!(
            parse_json(r#"{"a": 1}"#).unwrap_err(),
            EngineError::Schema { .. }
        ));
        assert!(matches!(
            parse_json("[1, 2]").unwrap_err(),
            EngineError::Schema { .. }
        ));
    }

    #[test]
    fn test_unknown_source_type() {
        assert!(matches!(
            "xml".parse::<SourceFormat>().unwrap_err(),
            EngineError::Configuration { .. }
        ));
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_raw(&dir.path().join("absent.csv"), SourceFormat::Csv).unwrap_err();
        assert!(matches!(err, EngineError::NotFound { .. }));
    }

    #[test]
    fn test_read_raw_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prices.json");
        std::fs::write(&path, r#"[{"price": "41.2"}]"#).unwrap();

        let table = read_raw(&path, SourceFormat::Json).unwrap();
        assert_eq!(table.num_rows(), 1);
        assert_eq!(table.column("price").unwrap().data_type, DataType::Utf8);
    }
}
