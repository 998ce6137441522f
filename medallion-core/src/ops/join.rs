//! Chained multi-way joins.
//!
//! A chain `[a ⨝ b, _ ⨝ c]` resolves `a` once; every later step joins the
//! accumulated result with the next right table.

use crate::error::{EngineError, Result};
use crate::job::JoinSpec;
use crate::table::{Column, DataType, Table, Value};
use std::collections::{HashMap, HashSet};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinHow {
    Left,
    Right,
    Inner,
    Outer,
}

impl FromStr for JoinHow {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "left" => Ok(JoinHow::Left),
            "right" => Ok(JoinHow::Right),
            "inner" => Ok(JoinHow::Inner),
            "outer" => Ok(JoinHow::Outer),
            other => Err(EngineError::config(format!("unknown join type: {other}"))),
        }
    }
}

/// Run the join chain over `tables` (keyed by table id).
pub fn join(tables: &HashMap<String, Table>, specs: &[JoinSpec]) -> Result<Table> {
    let Some(first) = specs.first() else {
        if tables.len() != 1 {
            return Err(EngineError::config(format!(
                "no joins configured but {} input tables given",
                tables.len()
            )));
        }
        return tables
            .values()
            .next()
            .cloned()
            .ok_or_else(|| EngineError::config("no input tables given"));
    };

    let mut result = lookup(tables, &first.left_table_id)?.clone();
    for spec in specs {
        let right = lookup(tables, &spec.right_table_id)?;
        let how: JoinHow = spec.how.parse()?;
        result = merge(&result, right, how, &spec.key_pairs)?;
        tracing::debug!(
            right = %spec.right_table_id,
            how = %spec.how,
            rows = result.num_rows(),
            "Applied join step"
        );
    }
    Ok(result)
}

fn lookup<'a>(tables: &'a HashMap<String, Table>, id: &str) -> Result<&'a Table> {
    tables.get(id).ok_or_else(|| EngineError::not_found(id))
}

/// One relational merge step.
pub fn merge(
    left: &Table,
    right: &Table,
    how: JoinHow,
    key_pairs: &[(String, String)],
) -> Result<Table> {
    if key_pairs.is_empty() {
        return Err(EngineError::config("join requires at least one key pair"));
    }
    let mut left_keys = Vec::with_capacity(key_pairs.len());
    let mut right_keys = Vec::with_capacity(key_pairs.len());
    for (l, r) in key_pairs {
        let lc = left.require_column(l)?;
        let rc = right.require_column(r)?;
        if !key_types_compatible(lc.data_type, rc.data_type) {
            return Err(EngineError::schema(format!(
                "join keys '{l}' ({}) and '{r}' ({}) have different types",
                lc.data_type, rc.data_type
            )));
        }
        left_keys.push(lc);
        right_keys.push(rc);
    }

    let key_of = |cols: &[&Column], row: usize| -> Vec<Value> {
        cols.iter().map(|c| c.values[row].clone()).collect()
    };
    let index = |cols: &[&Column], rows: usize| {
        let mut index: HashMap<Vec<Value>, Vec<usize>> = HashMap::new();
        for row in 0..rows {
            index.entry(key_of(cols, row)).or_default().push(row);
        }
        index
    };

    let mut pairs: Vec<(Option<usize>, Option<usize>)> = Vec::new();
    match how {
        JoinHow::Left | JoinHow::Inner | JoinHow::Outer => {
            let right_index = index(&right_keys, right.num_rows());
            let mut matched_right = HashSet::new();
            for i in 0..left.num_rows() {
                match right_index.get(&key_of(&left_keys, i)) {
                    Some(js) => {
                        for &j in js {
                            pairs.push((Some(i), Some(j)));
                            matched_right.insert(j);
                        }
                    }
                    None if how != JoinHow::Inner => pairs.push((Some(i), None)),
                    None => {}
                }
            }
            if how == JoinHow::Outer {
                pairs.extend(
                    (0..right.num_rows())
                        .filter(|j| !matched_right.contains(j))
                        .map(|j| (None, Some(j))),
                );
                let pair_key = |p: &(Option<usize>, Option<usize>)| match p {
                    (Some(i), _) => key_of(&left_keys, *i),
                    (None, Some(j)) => key_of(&right_keys, *j),
                    (None, None) => Vec::new(),
                };
                pairs.sort_by(|a, b| compare_keys(&pair_key(a), &pair_key(b)));
            }
        }
        JoinHow::Right => {
            let left_index = index(&left_keys, left.num_rows());
            for j in 0..right.num_rows() {
                match left_index.get(&key_of(&right_keys, j)) {
                    Some(is) => pairs.extend(is.iter().map(|&i| (Some(i), Some(j)))),
                    None => pairs.push((None, Some(j))),
                }
            }
        }
    }

    let left_rows: Vec<Option<usize>> = pairs.iter().map(|p| p.0).collect();
    let right_rows: Vec<Option<usize>> = pairs.iter().map(|p| p.1).collect();
    let left_part = left.take_optional(&left_rows);
    let right_part = right.take_optional(&right_rows);

    layout(left_part, right_part, key_pairs)
}

/// Left columns then right columns, coalescing same-named key pairs and
/// suffixing other clashes with `_x` / `_y`.
fn layout(left: Table, right: Table, key_pairs: &[(String, String)]) -> Result<Table> {
    let coalesced: HashSet<&str> = key_pairs
        .iter()
        .filter(|(l, r)| l == r)
        .map(|(l, _)| l.as_str())
        .collect();
    let left_names: HashSet<String> = left.column_names().iter().map(|s| s.to_string()).collect();
    let right_names: HashSet<String> =
        right.column_names().iter().map(|s| s.to_string()).collect();
    let clashes = |name: &str| {
        !coalesced.contains(name) && left_names.contains(name) && right_names.contains(name)
    };

    let mut columns = Vec::with_capacity(left.num_columns() + right.num_columns());
    for column in left.columns() {
        if coalesced.contains(column.name.as_str()) {
            let other = right.require_column(&column.name)?;
            let values = column
                .values
                .iter()
                .zip(&other.values)
                .map(|(l, r)| match (l, r, column.data_type) {
                    (Value::Null, Value::Timestamp(ts), DataType::Timestamp(tz)) => {
                        Value::Timestamp(ts.with_timezone(&tz))
                    }
                    (Value::Null, r, _) => r.clone(),
                    (l, _, _) => l.clone(),
                })
                .collect();
            columns.push(Column::new(column.name.clone(), column.data_type, values));
        } else if clashes(&column.name) {
            columns.push(column.renamed(format!("{}_x", column.name)));
        } else {
            columns.push(column.clone());
        }
    }
    for column in right.columns() {
        if coalesced.contains(column.name.as_str()) {
            continue;
        }
        if clashes(&column.name) {
            columns.push(column.renamed(format!("{}_y", column.name)));
        } else {
            columns.push(column.clone());
        }
    }
    Table::new(columns)
}

fn key_types_compatible(left: DataType, right: DataType) -> bool {
    left == right || matches!((left, right), (DataType::Timestamp(_), DataType::Timestamp(_)))
}

fn compare_keys(a: &[Value], b: &[Value]) -> std::cmp::Ordering {
    a.iter()
        .zip(b)
        .map(|(x, y)| x.total_cmp(y))
        .find(|o| o.is_ne())
        .unwrap_or(std::cmp::Ordering::Equal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn load() -> Table {
        Table::new(vec![
            Column::new("zone", DataType::Utf8, vec!["DE".into(), "FR".into(), "NL".into()]),
            Column::new(
                "mw",
                DataType::Float64,
                vec![Value::Float(1.0), Value::Float(2.0), Value::Float(3.0)],
            ),
        ])
        .unwrap()
    }

    fn prices() -> Table {
        Table::new(vec![
            Column::new("region", DataType::Utf8, vec!["FR".into(), "DE".into(), "BE".into()]),
            Column::new(
                "price",
                DataType::Float64,
                vec![Value::Float(50.0), Value::Float(40.0), Value::Float(60.0)],
            ),
        ])
        .unwrap()
    }

    fn tables(entries: Vec<(&str, Table)>) -> HashMap<String, Table> {
        entries.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
    }

    fn keys() -> Vec<(String, String)> {
        vec![("zone".to_string(), "region".to_string())]
    }

    #[test]
    fn test_no_joins_requires_single_table() {
        let one = tables(vec![("load", load())]);
        assert_eq!(join(&one, &[]).unwrap(), load());

        let two = tables(vec![("load", load()), ("prices", prices())]);
        assert!(matches!(
            join(&two, &[]).unwrap_err(),
            EngineError::Configuration { .. }
        ));
    }

    #[test]
    fn test_left_join_follows_left_order() {
        let out = merge(&load(), &prices(), JoinHow::Left, &keys()).unwrap();
        assert_eq!(out.column_names(), vec!["zone", "mw", "region", "price"]);
        assert_eq!(
            out.column("price").unwrap().values,
            vec![Value::Float(40.0), Value::Float(50.0), Value::Null]
        );
    }

    #[test]
    fn test_inner_right_and_outer() {
        let inner = merge(&load(), &prices(), JoinHow::Inner, &keys()).unwrap();
        assert_eq!(inner.num_rows(), 2);

        let right = merge(&load(), &prices(), JoinHow::Right, &keys()).unwrap();
        assert_eq!(
            right.column("region").unwrap().values,
            vec![Value::from("FR"), Value::from("DE"), Value::from("BE")]
        );
        assert_eq!(right.column("zone").unwrap().values[2], Value::Null);

        let outer = merge(&load(), &prices(), JoinHow::Outer, &keys()).unwrap();
        assert_eq!(outer.num_rows(), 4);
        // Sorted by key: BE (right only), DE, FR, NL (left only).
        assert_eq!(
            outer.column("region").unwrap().values,
            vec![Value::from("BE"), Value::from("DE"), Value::from("FR"), Value::Null]
        );
    }

    #[test]
    fn test_same_named_keys_coalesce_and_clashes_get_suffixes() {
        let left = Table::new(vec![
            Column::new("zone", DataType::Utf8, vec!["DE".into()]),
            Column::new("value", DataType::Float64, vec![Value::Float(1.0)]),
        ])
        .unwrap();
        let right = Table::new(vec![
            Column::new("zone", DataType::Utf8, vec!["DE".into(), "FR".into()]),
            Column::new("value", DataType::Float64, vec![Value::Float(2.0), Value::Float(3.0)]),
        ])
        .unwrap();
        let pairs = vec![("zone".to_string(), "zone".to_string())];

        let out = merge(&left, &right, JoinHow::Outer, &pairs).unwrap();
        assert_eq!(out.column_names(), vec!["zone", "value_x", "value_y"]);
        assert_eq!(
            out.column("zone").unwrap().values,
            vec![Value::from("DE"), Value::from("FR")]
        );
    }

    #[test]
    fn test_duplicate_matches_produce_cartesian_rows() {
        let right = Table::new(vec![
            Column::new("region", DataType::Utf8, vec!["DE".into(), "DE".into()]),
            Column::new("price", DataType::Float64, vec![Value::Float(1.0), Value::Float(2.0)]),
        ])
        .unwrap();
        let out = merge(&load(), &right, JoinHow::Inner, &keys()).unwrap();
        assert_eq!(out.num_rows(), 2);
    }

    #[test]
    fn test_null_keys_match() {
        let left = Table::new(vec![Column::new("k", DataType::Utf8, vec![Value::Null])]).unwrap();
        let right = Table::new(vec![
            Column::new("k", DataType::Utf8, vec![Value::Null]),
            Column::new("v", DataType::Int64, vec![Value::Int(7)]),
        ])
        .unwrap();
        let pairs = vec![("k".to_string(), "k".to_string())];
        let out = merge(&left, &right, JoinHow::Inner, &pairs).unwrap();
        assert_eq!(out.column("v").unwrap().values, vec![Value::Int(7)]);
    }

    #[test]
    fn test_chain_uses_accumulated_left() {
        let fx = Table::new(vec![
            Column::new("region", DataType::Utf8, vec!["DE".into()]),
            Column::new("rate", DataType::Float64, vec![Value::Float(1.1)]),
        ])
        .unwrap();
        let inputs = tables(vec![("load", load()), ("prices", prices()), ("fx", fx)]);
        let specs = vec![
            JoinSpec::new("load", "prices", "inner", &[("zone", "region")]),
            // Left id is ignored after the first step; "price" only exists
            // on the accumulated result.
            JoinSpec::new("ignored", "fx", "left", &[("region", "region")]),
        ];

        let out = join(&inputs, &specs).unwrap();
        assert_eq!(out.column_names(), vec!["zone", "mw", "region", "price", "rate"]);
        assert_eq!(
            out.column("rate").unwrap().values,
            vec![Value::Float(1.1), Value::Null]
        );
    }

    #[test]
    fn test_errors() {
        let inputs = tables(vec![("load", load()), ("prices", prices())]);

        let unknown = JoinSpec::new("load", "missing", "left", &[("zone", "region")]);
        assert!(matches!(
            join(&inputs, &[unknown]).unwrap_err(),
            EngineError::NotFound { .. }
        ));

        let bad_how = JoinSpec::new("load", "prices", "cross", &[("zone", "region")]);
        assert!(matches!(
            join(&inputs, &[bad_how]).unwrap_err(),
            EngineError::Configuration { .. }
        ));

        let no_keys = JoinSpec::new("load", "prices", "left", &[]);
        assert!(matches!(
            join(&inputs, &[no_keys]).unwrap_err(),
            EngineError::Configuration { .. }
        ));

        let bad_key = JoinSpec::new("load", "prices", "left", &[("nope", "region")]);
        assert!(matches!(
            join(&inputs, &[bad_key]).unwrap_err(),
            EngineError::Schema { .. }
        ));
    }
}
