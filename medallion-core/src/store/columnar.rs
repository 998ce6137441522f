//! Parquet-backed table store.
//!
//! Tables map onto a single Arrow record batch per file:
//! `Utf8`, `Int64`, `Float64`, `Boolean` and `Timestamp(µs, tz)`.
//! Files produced by other writers are normalized on read (narrower
//! integers and floats widen, `LargeUtf8` narrows, any timestamp unit
//! becomes microseconds).

use crate::error::{EngineError, Result};
use crate::persistence::atomic_write;
use crate::store::TableStore;
use crate::table::{Column, DataType, Table, Value};
use arrow::array::{
    Array, ArrayRef, AsArray, BooleanArray, Float64Array, Int64Array, RecordBatch,
    RecordBatchOptions, StringArray, TimestampMicrosecondArray,
};
use arrow::datatypes::{
    DataType as ArrowType, Field, Float64Type, Int64Type, Schema, TimeUnit,
    TimestampMicrosecondType,
};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::file::properties::WriterProperties;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Table store writing one Parquet file per location under `root`.
#[derive(Debug, Clone)]
pub struct ParquetStore {
    root: PathBuf,
}

impl ParquetStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Relative locations resolve under the store root; absolute ones are
    /// used as given.
    pub fn resolve(&self, location: &Path) -> PathBuf {
        if location.is_absolute() {
            location.to_path_buf()
        } else {
            self.root.join(location)
        }
    }
}

impl TableStore for ParquetStore {
    fn read_table(&self, location: &Path) -> Result<Table> {
        let path = self.resolve(location);
        if !path.is_file() {
            return Err(EngineError::not_found(path));
        }
        let file = std::fs::File::open(&path)?;
        let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
        let schema = builder.schema().clone();
        let reader = builder.build()?;

        let mut batches = Vec::new();
        for batch in reader {
            batches.push(batch?);
        }
        let table = decode_batches(&schema, &batches)?;
        tracing::debug!(
            path = %path.display(),
            rows = table.num_rows(),
            columns = table.num_columns(),
            "Read parquet table"
        );
        Ok(table)
    }

    fn write_table(&self, table: &Table, location: &Path) -> Result<()> {
        let path = self.resolve(location);
        // Parquet has no representation for a schema without leaf columns.
        if table.num_columns() == 0 {
            return Err(EngineError::schema(format!(
                "cannot store a table with no columns at {}",
                path.display()
            )));
        }
        let batch = encode_table(table)?;

        let mut buffer = Vec::new();
        let props = WriterProperties::builder().build();
        let mut writer = ArrowWriter::try_new(&mut buffer, batch.schema(), Some(props))?;
        writer.write(&batch)?;
        writer.close()?;

        atomic_write(&path, &buffer)?;
        tracing::debug!(
            path = %path.display(),
            rows = table.num_rows(),
            bytes = buffer.len(),
            "Wrote parquet table"
        );
        Ok(())
    }

    fn exists(&self, location: &Path) -> bool {
        self.resolve(location).is_file()
    }
}

fn arrow_type(data_type: DataType) -> ArrowType {
    match data_type {
        DataType::Utf8 => ArrowType::Utf8,
        DataType::Int64 => ArrowType::Int64,
        DataType::Float64 => ArrowType::Float64,
        DataType::Boolean => ArrowType::Boolean,
        DataType::Timestamp(tz) => {
            ArrowType::Timestamp(TimeUnit::Microsecond, Some(Arc::from(tz.name())))
        }
    }
}

fn encode_table(table: &Table) -> Result<RecordBatch> {
    let fields: Vec<Field> = table
        .columns()
        .iter()
        .map(|c| Field::new(c.name.clone(), arrow_type(c.data_type), true))
        .collect();
    let schema = Arc::new(Schema::new(fields));
    let arrays: Vec<ArrayRef> = table.columns().iter().map(encode_column).collect();
    let options = RecordBatchOptions::new().with_row_count(Some(table.num_rows()));
    Ok(RecordBatch::try_new_with_options(schema, arrays, &options)?)
}

fn encode_column(column: &Column) -> ArrayRef {
    let values = &column.values;
    match column.data_type {
        DataType::Utf8 => Arc::new(StringArray::from(
            values
                .iter()
                .map(|v| v.as_str().map(str::to_string))
                .collect::<Vec<Option<String>>>(),
        )),
        DataType::Int64 => Arc::new(Int64Array::from(
            values
                .iter()
                .map(|v| match v {
                    Value::Int(i) => Some(*i),
                    _ => None,
                })
                .collect::<Vec<_>>(),
        )),
        DataType::Float64 => Arc::new(Float64Array::from(
            values
                .iter()
                .map(|v| match v {
                    Value::Float(f) => Some(*f),
                    _ => None,
                })
                .collect::<Vec<_>>(),
        )),
        DataType::Boolean => Arc::new(BooleanArray::from(
            values
                .iter()
                .map(|v| match v {
                    Value::Bool(b) => Some(*b),
                    _ => None,
                })
                .collect::<Vec<_>>(),
        )),
        DataType::Timestamp(tz) => Arc::new(
            TimestampMicrosecondArray::from(
                values
                    .iter()
                    .map(|v| match v {
                        Value::Timestamp(ts) => Some(ts.timestamp_micros()),
                        _ => None,
                    })
                    .collect::<Vec<_>>(),
            )
            .with_timezone(tz.name()),
        ),
    }
}

/// Map a stored Arrow type onto the engine's column types.
fn engine_type(name: &str, arrow: &ArrowType) -> Result<DataType> {
    match arrow {
        ArrowType::Utf8 | ArrowType::LargeUtf8 | ArrowType::Utf8View => Ok(DataType::Utf8),
        ArrowType::Int8
        | ArrowType::Int16
        | ArrowType::Int32
        | ArrowType::Int64
        | ArrowType::UInt8
        | ArrowType::UInt16
        | ArrowType::UInt32
        | ArrowType::UInt64 => Ok(DataType::Int64),
        ArrowType::Float16 | ArrowType::Float32 | ArrowType::Float64 => Ok(DataType::Float64),
        ArrowType::Boolean => Ok(DataType::Boolean),
        ArrowType::Timestamp(_, tz) => Ok(DataType::Timestamp(parse_arrow_timezone(
            name,
            tz.as_deref(),
        )?)),
        ArrowType::Null => Ok(DataType::Utf8),
        other => Err(EngineError::schema(format!(
            "column '{name}' has unsupported stored type {other}"
        ))),
    }
}

fn parse_arrow_timezone(name: &str, tz: Option<&str>) -> Result<Tz> {
    match tz {
        None | Some("UTC" | "utc" | "Z" | "+00:00" | "Etc/UTC") => Ok(Tz::UTC),
        Some(other) => other.parse::<Tz>().map_err(|_| {
            EngineError::schema(format!(
                "column '{name}' uses unsupported timezone '{other}'"
            ))
        }),
    }
}

fn decode_batches(schema: &Schema, batches: &[RecordBatch]) -> Result<Table> {
    let mut columns = Vec::with_capacity(schema.fields().len());
    for (idx, field) in schema.fields().iter().enumerate() {
        let data_type = engine_type(field.name(), field.data_type())?;
        let target = arrow_type(data_type);
        let mut values = Vec::new();
        for batch in batches {
            let array = arrow::compute::cast(batch.column(idx), &target)?;
            decode_array(&array, data_type, &mut values);
        }
        columns.push(Column::new(field.name().clone(), data_type, values));
    }
    Table::new(columns)
}

fn decode_array(array: &ArrayRef, data_type: DataType, out: &mut Vec<Value>) {
    out.reserve(array.len());
    match data_type {
        DataType::Utf8 => {
            let arr = array.as_string::<i32>();
            out.extend((0..arr.len()).map(|i| {
                if arr.is_null(i) {
                    Value::Null
                } else {
                    Value::Str(arr.value(i).to_string())
                }
            }));
        }
        DataType::Int64 => {
            let arr = array.as_primitive::<Int64Type>();
            out.extend((0..arr.len()).map(|i| {
                if arr.is_null(i) {
                    Value::Null
                } else {
                    Value::Int(arr.value(i))
                }
            }));
        }
        DataType::Float64 => {
            let arr = array.as_primitive::<Float64Type>();
            out.extend((0..arr.len()).map(|i| {
                if arr.is_null(i) {
                    Value::Null
                } else {
                    Value::Float(arr.value(i))
                }
            }));
        }
        DataType::Boolean => {
            let arr = array.as_boolean();
            out.extend((0..arr.len()).map(|i| {
                if arr.is_null(i) {
                    Value::Null
                } else {
                    Value::Bool(arr.value(i))
                }
            }));
        }
        DataType::Timestamp(tz) => {
            let arr = array.as_primitive::<TimestampMicrosecondType>();
            out.extend((0..arr.len()).map(|i| {
                if arr.is_null(i) {
                    return Value::Null;
                }
                DateTime::<Utc>::from_timestamp_micros(arr.value(i))
                    .map_or(Value::Null, |dt| Value::Timestamp(dt.with_timezone(&tz)))
            }));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn sample_table() -> Table {
        let berlin: Tz = "Europe/Berlin".parse().unwrap();
        Table::new(vec![
            Column::new(
                "region",
                DataType::Utf8,
                vec![Value::from("DE"), Value::Null],
            ),
            Column::new("mw", DataType::Int64, vec![Value::Int(5), Value::Null]),
            Column::new(
                "price",
                DataType::Float64,
                vec![Value::Float(1.5), Value::Float(f64::NAN)],
            ),
            Column::new(
                "peak",
                DataType::Boolean,
                vec![Value::Bool(true), Value::Null],
            ),
            Column::new(
                "ts",
                DataType::Timestamp(berlin),
                vec![
                    Value::Timestamp(berlin.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()),
                    Value::Null,
                ],
            ),
        ])
        .unwrap()
    }

    #[test]
    fn test_parquet_store_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = ParquetStore::new(dir.path());
        let location = Path::new("gold/daily.parquet");
        let table = sample_table();

        store.write_table(&table, location).unwrap();
        assert!(store.exists(location));
        assert!(dir.path().join("gold/daily.parquet").is_file());

        let read = store.read_table(location).unwrap();
        assert_eq!(read, table);
    }

    #[test]
    fn test_parquet_store_empty_table_keeps_schema() {
        let dir = TempDir::new().unwrap();
        let store = ParquetStore::new(dir.path());
        let table = Table::new(vec![Column::new("id", DataType::Int64, vec![])]).unwrap();

        store.write_table(&table, Path::new("empty.parquet")).unwrap();
        let read = store.read_table(Path::new("empty.parquet")).unwrap();
        assert_eq!(read.num_rows(), 0);
        assert_eq!(read.column("id").unwrap().data_type, DataType::Int64);
    }

    #[test]
    fn test_parquet_store_rejects_table_without_columns() {
        let dir = TempDir::new().unwrap();
        let store = ParquetStore::new(dir.path());

        let err = store
            .write_table(&Table::empty(), Path::new("empty.parquet"))
            .unwrap_err();
        assert!(matches!(err, EngineError::Schema { .. }));
        assert!(!store.exists(Path::new("empty.parquet")));
    }

    #[test]
    fn test_parquet_store_missing_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = ParquetStore::new(dir.path());
        let err = store.read_table(Path::new("missing.parquet")).unwrap_err();
        assert!(matches!(err, EngineError::NotFound { .. }));
    }

    #[test]
    fn test_parquet_reads_narrow_integer_files() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("foreign.parquet");

        let schema = Arc::new(Schema::new(vec![Field::new(
            "qty",
            ArrowType::Int32,
            true,
        )]));
        let array: ArrayRef = Arc::new(arrow::array::Int32Array::from(vec![Some(3), None]));
        let batch = RecordBatch::try_new(schema.clone(), vec![array]).unwrap();
        let file = std::fs::File::create(&path).unwrap();
        let mut writer = ArrowWriter::try_new(file, schema, None).unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();

        let store = ParquetStore::new(dir.path());
        let table = store.read_table(Path::new("foreign.parquet")).unwrap();
        assert_eq!(table.column("qty").unwrap().data_type, DataType::Int64);
        assert_eq!(
            table.column("qty").unwrap().values,
            vec![Value::Int(3), Value::Null]
        );
    }
}
