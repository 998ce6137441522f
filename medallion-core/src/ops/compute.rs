//! Computed (derived) columns.

use crate::error::Result;
use crate::formula::Formula;
use crate::job::ComputedColumn;
use crate::table::{Column, Table};

/// Append or overwrite one column per entry, in order. Later formulas may
/// reference columns computed by earlier ones.
pub fn compute(table: &Table, computed: &[ComputedColumn]) -> Result<Table> {
    let mut current = table.clone();
    for entry in computed {
        let formula = Formula::parse(&entry.formula)?;
        let (data_type, values) = formula.evaluate(&current)?;
        tracing::debug!(column = %entry.name, formula = formula.text(), "Computed column");
        current = current.with_column(Column::new(entry.name.clone(), data_type, values))?;
    }
    Ok(current)
}
