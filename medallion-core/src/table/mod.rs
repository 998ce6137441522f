//! In-memory columnar tables.
//!
//! A [`Table`] is an ordered list of uniquely named, equally long, typed
//! columns. Tables are immutable values: every operator builds a new one.

pub mod value;

pub use value::Value;

use crate::error::{EngineError, Result};
use chrono_tz::Tz;
use std::collections::HashSet;
use std::fmt;

/// Declared type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Utf8,
    Int64,
    Float64,
    Boolean,
    /// Instants rendered in the given zone.
    Timestamp(Tz),
}

impl DataType {
    pub fn is_numeric(&self) -> bool {
        matches!(self, DataType::Int64 | DataType::Float64)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Utf8 => write!(f, "string"),
            DataType::Int64 => write!(f, "int"),
            DataType::Float64 => write!(f, "float"),
            DataType::Boolean => write!(f, "bool"),
            DataType::Timestamp(tz) => write!(f, "timestamp[{}]", tz.name()),
        }
    }
}

/// A named, typed sequence of values.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub data_type: DataType,
    pub values: Vec<Value>,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: DataType, values: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            data_type,
            values,
        }
    }

    /// Column of `len` nulls.
    pub fn nulls(name: impl Into<String>, data_type: DataType, len: usize) -> Self {
        Self::new(name, data_type, vec![Value::Null; len])
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn null_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_null()).count()
    }

    /// Same values under a different name.
    pub fn renamed(&self, name: impl Into<String>) -> Self {
        Self::new(name, self.data_type, self.values.clone())
    }

    /// Values at `indices`; `None` entries produce nulls (unmatched join rows).
    fn gather(&self, indices: &[Option<usize>]) -> Column {
        let values = indices
            .iter()
            .map(|idx| idx.map_or(Value::Null, |i| self.values[i].clone()))
            .collect();
        Column::new(self.name.clone(), self.data_type, values)
    }
}

/// An immutable table value.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    columns: Vec<Column>,
    num_rows: usize,
}

impl Table {
    /// Build a table, validating names, lengths and value types.
    pub fn new(columns: Vec<Column>) -> Result<Self> {
        let num_rows = columns.first().map_or(0, Column::len);
        let mut seen = HashSet::new();
        for column in &columns {
            if !seen.insert(column.name.as_str()) {
                return Err(EngineError::schema(format!(
                    "duplicate column name '{}'",
                    column.name
                )));
            }
            if column.len() != num_rows {
                return Err(EngineError::schema(format!(
                    "column '{}' has {} rows, expected {}",
                    column.name,
                    column.len(),
                    num_rows
                )));
            }
            if let Some(bad) = column
                .values
                .iter()
                .find(|v| !v.conforms_to(column.data_type))
            {
                return Err(EngineError::schema(format!(
                    "column '{}' of type {} holds incompatible value {:?}",
                    column.name, column.data_type, bad
                )));
            }
        }
        Ok(Self { columns, num_rows })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.num_rows == 0
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn into_columns(self) -> Vec<Column> {
        self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Look up a column or fail with a schema error.
    pub fn require_column(&self, name: &str) -> Result<&Column> {
        self.column(name)
            .ok_or_else(|| EngineError::missing_column(name))
    }

    /// Values of one row, in column order.
    pub fn row(&self, index: usize) -> Vec<&Value> {
        self.columns.iter().map(|c| &c.values[index]).collect()
    }

    /// A new table holding the rows at `indices`, in that order.
    pub fn take(&self, indices: &[usize]) -> Table {
        let gather: Vec<Option<usize>> = indices.iter().copied().map(Some).collect();
        self.take_optional(&gather)
    }

    /// Like [`Table::take`], with `None` producing an all-null row.
    pub(crate) fn take_optional(&self, indices: &[Option<usize>]) -> Table {
        Table {
            columns: self.columns.iter().map(|c| c.gather(indices)).collect(),
            num_rows: indices.len(),
        }
    }

    /// A new table with `column` appended, or replacing a same-named column
    /// in place.
    pub fn with_column(&self, column: Column) -> Result<Table> {
        if !self.columns.is_empty() && column.len() != self.num_rows {
            return Err(EngineError::schema(format!(
                "column '{}' has {} rows, expected {}",
                column.name,
                column.len(),
                self.num_rows
            )));
        }
        let mut columns = self.columns.clone();
        match columns.iter().position(|c| c.name == column.name) {
            Some(idx) => columns[idx] = column,
            None => columns.push(column),
        }
        Table::new(columns)
    }

    /// Rows of `self` followed by rows of `other`, aligned by column name.
    ///
    /// Columns missing on one side are null-filled; the column order is
    /// `self`'s columns then `other`'s new ones. Int and float columns of
    /// the same name widen to float; any other type clash is a schema error.
    pub fn concat(&self, other: &Table) -> Result<Table> {
        let mut names: Vec<&str> = self.column_names();
        for name in other.column_names() {
            if self.column(name).is_none() {
                names.push(name);
            }
        }

        let mut columns = Vec::with_capacity(names.len());
        for name in names {
            let left = self.column(name);
            let right = other.column(name);
            let data_type = match (left, right) {
                (Some(l), Some(r)) => unify_types(name, l.data_type, r.data_type)?,
                (Some(l), None) => l.data_type,
                (None, Some(r)) => r.data_type,
                (None, None) => unreachable!("name collected from one of the tables"),
            };
            let mut values = Vec::with_capacity(self.num_rows + other.num_rows);
            append_values(&mut values, left, self.num_rows, data_type);
            append_values(&mut values, right, other.num_rows, data_type);
            columns.push(Column::new(name, data_type, values));
        }
        Table::new(columns)
    }
}

fn unify_types(name: &str, left: DataType, right: DataType) -> Result<DataType> {
    match (left, right) {
        (l, r) if l == r => Ok(l),
        (DataType::Int64, DataType::Float64) | (DataType::Float64, DataType::Int64) => {
            Ok(DataType::Float64)
        }
        // Same instants, different rendering zone: keep the left zone.
        (DataType::Timestamp(tz), DataType::Timestamp(_)) => Ok(DataType::Timestamp(tz)),
        (l, r) => Err(EngineError::schema(format!(
            "column '{name}' has incompatible types {l} and {r}"
        ))),
    }
}

fn append_values(out: &mut Vec<Value>, column: Option<&Column>, rows: usize, target: DataType) {
    match column {
        None => out.extend(std::iter::repeat_n(Value::Null, rows)),
        Some(column) => out.extend(column.values.iter().map(|v| match (v, target) {
            (Value::Int(i), DataType::Float64) => Value::Float(*i as f64),
            (Value::Timestamp(ts), DataType::Timestamp(tz)) => {
                Value::Timestamp(ts.with_timezone(&tz))
            }
            _ => v.clone(),
        })),
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.column_names().join(" | "))?;
        for i in 0..self.num_rows {
            let cells: Vec<String> = self.row(i).iter().map(|v| v.to_string()).collect();
            writeln!(f, "{}", cells.join(" | "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(values: &[i64]) -> Column {
        Column::new(
            "id",
            DataType::Int64,
            values.iter().copied().map(Value::Int).collect(),
        )
    }

    #[test]
    fn test_new_rejects_duplicate_names() {
        let err = Table::new(vec![ids(&[1]), ids(&[2])]).unwrap_err();
        assert!(err.to_string().contains("duplicate column name 'id'"));
    }

    #[test]
    fn test_new_rejects_ragged_columns() {
        let name = Column::new("name", DataType::Utf8, vec![Value::from("a")]);
        assert!(Table::new(vec![ids(&[1, 2]), name]).is_err());
    }

    #[test]
    fn test_new_rejects_mistyped_values() {
        let col = Column::new("id", DataType::Int64, vec![Value::from("1")]);
        assert!(Table::new(vec![col]).is_err());
    }

    #[test]
    fn test_take_and_with_column() {
        let table = Table::new(vec![ids(&[10, 20, 30])]).unwrap();
        let taken = table.take(&[2, 0]);
        assert_eq!(taken.num_rows(), 2);
        assert_eq!(taken.column("id").unwrap().values[0], Value::Int(30));

        let flag = Column::new("flag", DataType::Boolean, vec![true.into(), false.into()]);
        let extended = taken.with_column(flag).unwrap();
        assert_eq!(extended.column_names(), vec!["id", "flag"]);

        // Original is untouched.
        assert_eq!(table.num_rows(), 3);
        assert_eq!(table.num_columns(), 1);
    }

    #[test]
    fn test_with_column_replaces_in_place() {
        let table = Table::new(vec![
            ids(&[1]),
            Column::new("name", DataType::Utf8, vec![Value::from("a")]),
        ])
        .unwrap();
        let replaced = table
            .with_column(Column::new("id", DataType::Utf8, vec![Value::from("x")]))
            .unwrap();
        assert_eq!(replaced.column_names(), vec!["id", "name"]);
        assert_eq!(replaced.column("id").unwrap().data_type, DataType::Utf8);
    }

    #[test]
    fn test_concat_aligns_and_widens() {
        let old = Table::new(vec![ids(&[1])]).unwrap();
        let new = Table::new(vec![
            Column::new("id", DataType::Float64, vec![Value::Float(2.5)]),
            Column::new("note", DataType::Utf8, vec![Value::from("n")]),
        ])
        .unwrap();

        let all = old.concat(&new).unwrap();
        assert_eq!(all.column_names(), vec!["id", "note"]);
        assert_eq!(all.column("id").unwrap().data_type, DataType::Float64);
        assert_eq!(
            all.column("id").unwrap().values,
            vec![Value::Float(1.0), Value::Float(2.5)]
        );
        assert_eq!(
            all.column("note").unwrap().values,
            vec![Value::Null, Value::from("n")]
        );
    }

    #[test]
    fn test_concat_rejects_type_clash() {
        let old = Table::new(vec![ids(&[1])]).unwrap();
        let new = Table::new(vec![Column::new("id", DataType::Utf8, vec!["1".into()])]).unwrap();
        assert!(old.concat(&new).is_err());
    }
}
