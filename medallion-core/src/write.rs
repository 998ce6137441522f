//! Write coordinator: the overwrite and append-merge protocol shared by
//! all layers.
//!
//! Append concatenates `existing ++ new` and keeps the **last** occurrence of
//! every merge key (or of every full row when no keys are given), so new
//! data wins on collision and replaying a run never duplicates rows.

use crate::error::{EngineError, Result};
use crate::job::WriteSpec;
use crate::store::TableStore;
use crate::table::{Table, Value};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Output write mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Overwrite,
    Append,
}

impl FromStr for WriteMode {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "overwrite" => Ok(WriteMode::Overwrite),
            "append" => Ok(WriteMode::Append),
            other => Err(EngineError::config(format!("unknown output mode: {other}"))),
        }
    }
}

impl fmt::Display for WriteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteMode::Overwrite => write!(f, "overwrite"),
            WriteMode::Append => write!(f, "append"),
        }
    }
}

/// Applies a [`WriteSpec`] on top of a [`TableStore`].
pub struct WriteCoordinator<'a> {
    store: &'a dyn TableStore,
}

impl<'a> WriteCoordinator<'a> {
    pub fn new(store: &'a dyn TableStore) -> Self {
        Self { store }
    }

    /// Persist `table` at `destination` per `spec`, returning the number of
    /// rows now stored there.
    ///
    /// The mode and the table's shape are validated before anything is read
    /// or written, so an invalid job never leaves output behind.
    pub fn write(&self, table: &Table, destination: &Path, spec: &WriteSpec) -> Result<usize> {
        let mode: WriteMode = spec.mode.parse()?;
        if table.num_columns() == 0 {
            return Err(EngineError::config(format!(
                "refusing to write a table with no columns to {}",
                destination.display()
            )));
        }
        tracing::info!(
            destination = %destination.display(),
            mode = %mode,
            merge_keys = ?spec.merge_keys,
            rows = table.num_rows(),
            "Writing table"
        );

        if mode == WriteMode::Overwrite || !self.store.exists(destination) {
            self.store.write_table(table, destination)?;
            return Ok(table.num_rows());
        }

        let existing = self.store.read_table(destination)?;
        let combined = existing.concat(table)?;
        let merged = dedup_keep_last(&combined, &spec.merge_keys)?;
        tracing::debug!(
            existing = existing.num_rows(),
            incoming = table.num_rows(),
            merged = merged.num_rows(),
            "Merged append"
        );
        self.store.write_table(&merged, destination)?;
        Ok(merged.num_rows())
    }
}

/// Drop all but the last occurrence of each key.
///
/// With empty `keys`, whole rows are compared. Surviving rows keep their
/// relative order.
pub fn dedup_keep_last(table: &Table, keys: &[String]) -> Result<Table> {
    let key_columns: Vec<usize> = if keys.is_empty() {
        (0..table.num_columns()).collect()
    } else {
        keys.iter()
            .map(|k| {
                table
                    .column_index(k)
                    .ok_or_else(|| EngineError::schema(format!("merge key '{k}' not found")))
            })
            .collect::<Result<_>>()?
    };

    let columns = table.columns();
    let mut seen: HashSet<Vec<&Value>> = HashSet::with_capacity(table.num_rows());
    let mut keep = Vec::with_capacity(table.num_rows());
    for row in (0..table.num_rows()).rev() {
        let key: Vec<&Value> = key_columns
            .iter()
            .map(|&c| &columns[c].values[row])
            .collect();
        if seen.insert(key) {
            keep.push(row);
        }
    }
    keep.reverse();
    Ok(table.take(&keep))
}
