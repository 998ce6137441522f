//! Grouped aggregation with per-metric filters and time bucketing.
//!
//! Every metric is computed on its own (optionally filtered) view of the
//! input and grouped independently. The per-metric results are then outer
//! merged on the group key, so a key seen by any metric gets exactly one
//! output row; numeric metrics missing for that key read `0`.

use crate::error::{EngineError, Result};
use crate::job::{AggregationSpec, MetricSpec};
use crate::table::{Column, DataType, Table, Value};
use chrono::{DateTime, TimeZone};
use chrono_tz::Tz;
use std::collections::{HashMap, HashSet};
use std::str::FromStr;

/// Aggregation function of one metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggFn {
    Sum,
    Mean,
    Median,
    Count,
    NUnique,
    Min,
    Max,
    First,
    Last,
    Std,
    Var,
}

impl FromStr for AggFn {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sum" => Ok(AggFn::Sum),
            "mean" | "avg" => Ok(AggFn::Mean),
            "median" => Ok(AggFn::Median),
            "count" => Ok(AggFn::Count),
            "nunique" => Ok(AggFn::NUnique),
            "min" => Ok(AggFn::Min),
            "max" => Ok(AggFn::Max),
            "first" => Ok(AggFn::First),
            "last" => Ok(AggFn::Last),
            "std" => Ok(AggFn::Std),
            "var" => Ok(AggFn::Var),
            other => Err(EngineError::config(format!(
                "unknown aggregation function: {other}"
            ))),
        }
    }
}

impl AggFn {
    fn requires_numeric(self) -> bool {
        matches!(
            self,
            AggFn::Sum | AggFn::Mean | AggFn::Median | AggFn::Std | AggFn::Var
        )
    }

    /// Result column type for an input column of `input` type.
    pub fn output_type(self, column: &str, input: DataType) -> Result<DataType> {
        if self.requires_numeric() && !input.is_numeric() {
            return Err(EngineError::schema(format!(
                "cannot apply {self:?} to column '{column}' of type {input}"
            )));
        }
        Ok(match self {
            AggFn::Sum => input,
            AggFn::Mean | AggFn::Median | AggFn::Std | AggFn::Var => DataType::Float64,
            AggFn::Count | AggFn::NUnique => DataType::Int64,
            AggFn::Min | AggFn::Max | AggFn::First | AggFn::Last => input,
        })
    }

    /// Reduce one group. Nulls and NaN are skipped.
    pub fn apply(self, values: &[&Value]) -> Value {
        let present: Vec<&Value> = values.iter().copied().filter(|v| !is_missing(v)).collect();
        match self {
            AggFn::Sum => sum(&present),
            AggFn::Mean => {
                let xs = floats(&present);
                if xs.is_empty() {
                    Value::Null
                } else {
                    Value::Float(xs.iter().sum::<f64>() / xs.len() as f64)
                }
            }
            AggFn::Median => median(floats(&present)),
            AggFn::Var => variance(&floats(&present)).map_or(Value::Null, Value::Float),
            AggFn::Std => variance(&floats(&present)).map_or(Value::Null, |v| Value::Float(v.sqrt())),
            AggFn::Count => Value::Int(present.len() as i64),
            AggFn::NUnique => {
                let distinct: HashSet<&Value> = present.iter().copied().collect();
                Value::Int(distinct.len() as i64)
            }
            AggFn::Min => present
                .iter()
                .min_by(|a, b| a.total_cmp(b))
                .map_or(Value::Null, |v| (*v).clone()),
            AggFn::Max => present
                .iter()
                .max_by(|a, b| a.total_cmp(b))
                .map_or(Value::Null, |v| (*v).clone()),
            AggFn::First => present.first().map_or(Value::Null, |v| (*v).clone()),
            AggFn::Last => present.last().map_or(Value::Null, |v| (*v).clone()),
        }
    }
}

fn is_missing(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Float(f) => f.is_nan(),
        _ => false,
    }
}

fn floats(values: &[&Value]) -> Vec<f64> {
    values.iter().filter_map(|v| v.as_f64()).collect()
}

/// Empty groups yield null; the post-merge fill turns that into a typed 0.
/// Integer sums that overflow `i64` fall back to a float sum.
fn sum(values: &[&Value]) -> Value {
    if values.is_empty() {
        return Value::Null;
    }
    if values.iter().all(|v| matches!(v, Value::Int(_))) {
        let total = values.iter().try_fold(0i64, |acc, v| match v {
            Value::Int(i) => acc.checked_add(*i),
            _ => None,
        });
        if let Some(total) = total {
            return Value::Int(total);
        }
    }
    Value::Float(floats(values).iter().sum())
}

fn median(mut xs: Vec<f64>) -> Value {
    if xs.is_empty() {
        return Value::Null;
    }
    xs.sort_by(f64::total_cmp);
    let mid = xs.len() / 2;
    let m = if xs.len() % 2 == 0 {
        (xs[mid - 1] + xs[mid]) / 2.0
    } else {
        xs[mid]
    };
    Value::Float(m)
}

/// Sample variance (n - 1 denominator).
fn variance(xs: &[f64]) -> Option<f64> {
    if xs.len() < 2 {
        return None;
    }
    let n = xs.len() as f64;
    let mean = xs.iter().sum::<f64>() / n;
    Some(xs.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0))
}

/// Time bucket width, e.g. `h`, `15min`, `1D`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grain {
    step_micros: i64,
}

impl FromStr for Grain {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
        let (count, unit) = s.split_at(split);
        let count: i64 = if count.is_empty() {
            1
        } else {
            count
                .parse()
                .map_err(|_| EngineError::config(format!("invalid grain: {s}")))?
        };
        let unit_micros: i64 = match unit {
            "s" | "S" | "sec" => 1_000_000,
            "min" | "T" => 60_000_000,
            "h" | "H" => 3_600_000_000,
            "D" | "d" => 86_400_000_000,
            _ => return Err(EngineError::config(format!("invalid grain: {s}"))),
        };
        match count.checked_mul(unit_micros) {
            Some(step_micros) if step_micros > 0 => Ok(Self { step_micros }),
            _ => Err(EngineError::config(format!("invalid grain: {s}"))),
        }
    }
}

impl Grain {
    /// Floor on the wall clock of `ts`'s zone. Wall times that do not exist
    /// or are ambiguous after flooring yield `None`.
    pub fn floor(&self, ts: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        let wall = ts.naive_local().and_utc().timestamp_micros();
        let floored = wall.div_euclid(self.step_micros) * self.step_micros;
        let naive = DateTime::from_timestamp_micros(floored)?.naive_utc();
        ts.timezone().from_local_datetime(&naive).single()
    }
}

/// Replace `column` with its timestamps floored to `grain`.
fn bucket(table: &Table, column: &str, grain: Grain) -> Result<Table> {
    let source = table.require_column(column)?;
    if !matches!(source.data_type, DataType::Timestamp(_)) {
        return Err(EngineError::schema(format!(
            "time bucketing requires a timestamp column, '{column}' is {}",
            source.data_type
        )));
    }
    let values = source
        .values
        .iter()
        .map(|v| match v {
            Value::Timestamp(ts) => grain.floor(ts).map_or(Value::Null, Value::Timestamp),
            _ => Value::Null,
        })
        .collect();
    table.with_column(Column::new(column, source.data_type, values))
}

struct Metric<'a> {
    spec: &'a MetricSpec,
    agg_fn: AggFn,
    output_type: DataType,
}

/// Aggregate `table` per `spec`. Absent or disabled specs return the input.
pub fn aggregate(table: &Table, spec: Option<&AggregationSpec>) -> Result<Table> {
    let spec = match spec {
        Some(spec) if spec.enabled => spec,
        _ => return Ok(table.clone()),
    };
    if spec.group_by.is_empty() {
        return Err(EngineError::config("aggregation requires a non-empty group_by"));
    }
    if spec.metrics.is_empty() {
        return Err(EngineError::config("aggregation requires at least one metric"));
    }

    let bucketed;
    let table = match (&spec.grain, &spec.timestamp_column) {
        (Some(grain), Some(column)) => {
            bucketed = bucket(table, column, grain.parse()?)?;
            &bucketed
        }
        (None, None) => table,
        _ => {
            return Err(EngineError::config(
                "grain and timestamp_column must be given together",
            ));
        }
    };

    let metrics = resolve_metrics(table, spec)?;
    let key_columns: Vec<&Column> = spec
        .group_by
        .iter()
        .map(|name| table.require_column(name))
        .collect::<Result<_>>()?;

    // Union of group keys over all metrics, in first-seen order.
    let mut keys: Vec<Vec<Value>> = Vec::new();
    let mut key_index: HashMap<Vec<Value>, usize> = HashMap::new();
    let mut results: Vec<HashMap<usize, Value>> = Vec::with_capacity(metrics.len());

    for metric in &metrics {
        let rows = metric_rows(table, metric.spec)?;
        let source = table.require_column(&metric.spec.column)?;

        let mut groups: Vec<(usize, Vec<&Value>)> = Vec::new();
        let mut group_of: HashMap<usize, usize> = HashMap::new();
        for row in rows {
            let key: Vec<Value> = key_columns.iter().map(|c| c.values[row].clone()).collect();
            let next = keys.len();
            let k = *key_index.entry(key.clone()).or_insert(next);
            if k == next {
                keys.push(key);
            }
            let g = *group_of.entry(k).or_insert_with(|| {
                groups.push((k, Vec::new()));
                groups.len() - 1
            });
            groups[g].1.push(&source.values[row]);
        }

        tracing::debug!(
            metric = metric.spec.output_name(),
            agg = %metric.spec.agg_fn,
            groups = groups.len(),
            "Aggregated metric"
        );
        results.push(
            groups
                .into_iter()
                .map(|(k, values)| (k, metric.agg_fn.apply(&values)))
                .collect(),
        );
    }

    let mut order: Vec<usize> = (0..keys.len()).collect();
    order.sort_by(|&a, &b| compare_keys(&keys[a], &keys[b]));

    let mut columns: Vec<Column> = key_columns
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let values = order.iter().map(|&k| keys[k][i].clone()).collect();
            Column::new(c.name.clone(), c.data_type, values)
        })
        .collect();

    for (metric, result) in metrics.iter().zip(&results) {
        let output_type = widened_type(metric, result);
        let fill = zero_of(output_type);
        let values = order
            .iter()
            .map(|&k| match result.get(&k) {
                Some(Value::Int(i)) if output_type == DataType::Float64 => Value::Float(*i as f64),
                Some(v) if !v.is_null() => v.clone(),
                _ => fill.clone(),
            })
            .collect();
        columns.push(Column::new(metric.spec.output_name(), output_type, values));
    }

    Table::new(columns)
}

fn resolve_metrics<'a>(table: &Table, spec: &'a AggregationSpec) -> Result<Vec<Metric<'a>>> {
    let mut names: HashSet<&str> = spec.group_by.iter().map(String::as_str).collect();
    spec.metrics
        .iter()
        .map(|m| {
            if !names.insert(m.output_name()) {
                return Err(EngineError::config(format!(
                    "aggregation output column '{}' is defined more than once",
                    m.output_name()
                )));
            }
            let agg_fn: AggFn = m.agg_fn.parse()?;
            let source = table.require_column(&m.column)?;
            Ok(Metric {
                spec: m,
                agg_fn,
                output_type: agg_fn.output_type(&m.column, source.data_type)?,
            })
        })
        .collect()
}

/// Row indices passing the metric's own equality filter.
fn metric_rows(table: &Table, metric: &MetricSpec) -> Result<Vec<usize>> {
    let mut conditions = Vec::with_capacity(metric.filter.len());
    for (column, literal) in &metric.filter {
        conditions.push((table.require_column(column)?, Value::from_yaml(literal)?));
    }
    Ok((0..table.num_rows())
        .filter(|&row| {
            conditions
                .iter()
                .all(|(col, lit)| col.values[row].compare(lit) == Some(std::cmp::Ordering::Equal))
        })
        .collect())
}

fn compare_keys(a: &[Value], b: &[Value]) -> std::cmp::Ordering {
    a.iter()
        .zip(b)
        .map(|(x, y)| x.total_cmp(y))
        .find(|o| o.is_ne())
        .unwrap_or(std::cmp::Ordering::Equal)
}

/// An integer metric with any overflowed (float) group becomes Float64.
fn widened_type(metric: &Metric<'_>, result: &HashMap<usize, Value>) -> DataType {
    if metric.output_type == DataType::Int64
        && result.values().any(|v| matches!(v, Value::Float(_)))
    {
        tracing::warn!(
            metric = metric.spec.output_name(),
            "Integer sum overflowed, widening to float"
        );
        DataType::Float64
    } else {
        metric.output_type
    }
}

fn zero_of(data_type: DataType) -> Value {
    match data_type {
        DataType::Int64 => Value::Int(0),
        DataType::Float64 => Value::Float(0.0),
        _ => Value::Null,
    }
}
