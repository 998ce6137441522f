//! Row filtering.

use crate::error::{EngineError, Result};
use crate::job::FilterRule;
use crate::table::{Table, Value};
use std::cmp::Ordering;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOperator {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
    IsNull,
    IsNotNull,
}

impl FromStr for FilterOperator {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "==" => Ok(FilterOperator::Eq),
            "!=" => Ok(FilterOperator::Ne),
            ">" => Ok(FilterOperator::Gt),
            "<" => Ok(FilterOperator::Lt),
            ">=" => Ok(FilterOperator::Ge),
            "<=" => Ok(FilterOperator::Le),
            "is_null" | "is Null" => Ok(FilterOperator::IsNull),
            "is_not_null" | "is not Null" => Ok(FilterOperator::IsNotNull),
            other => Err(EngineError::config(format!("unknown filter operator: {other}"))),
        }
    }
}

impl FilterOperator {
    fn needs_value(self) -> bool {
        !matches!(self, FilterOperator::IsNull | FilterOperator::IsNotNull)
    }

    /// Whether `cell` passes this operator against `literal`.
    pub fn matches(self, cell: &Value, literal: &Value) -> bool {
        let ord = cell.compare(literal);
        match self {
            FilterOperator::Eq => ord == Some(Ordering::Equal),
            FilterOperator::Ne => ord != Some(Ordering::Equal),
            FilterOperator::Gt => ord == Some(Ordering::Greater),
            FilterOperator::Lt => ord == Some(Ordering::Less),
            FilterOperator::Ge => matches!(ord, Some(Ordering::Greater | Ordering::Equal)),
            FilterOperator::Le => matches!(ord, Some(Ordering::Less | Ordering::Equal)),
            FilterOperator::IsNull => cell.is_null(),
            FilterOperator::IsNotNull => !cell.is_null(),
        }
    }
}

/// Keep the rows satisfying every rule, preserving order and columns.
pub fn filter(table: &Table, rules: &[FilterRule]) -> Result<Table> {
    let mut current = table.clone();
    for rule in rules {
        let operator: FilterOperator = rule.operator.parse()?;
        let literal = match (&rule.value, operator.needs_value()) {
            (Some(value), true) => Value::from_yaml(value)?,
            (None, true) => {
                return Err(EngineError::config(format!(
                    "filter on '{}' with operator '{}' requires a value",
                    rule.column, rule.operator
                )));
            }
            (_, false) => Value::Null,
        };

        let column = current.require_column(&rule.column)?;
        let keep: Vec<usize> = column
            .values
            .iter()
            .enumerate()
            .filter(|(_, cell)| operator.matches(cell, &literal))
            .map(|(i, _)| i)
            .collect();

        tracing::debug!(
            column = %rule.column,
            operator = %rule.operator,
            before = current.num_rows(),
            after = keep.len(),
            "Applied filter rule"
        );
        current = current.take(&keep);
    }
    Ok(current)
}
