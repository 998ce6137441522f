//! Declarative job definitions for the Bronze, Silver and Gold layers.
//!
//! These mirror the YAML job files one to one. Fields whose *values* carry
//! meaning (modes, operators, type names, aggregation functions) stay
//! strings here and are interpreted by the operators, which reject unknown
//! values with a configuration error instead of a parse error.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

fn default_true() -> bool {
    true
}

fn default_output_type() -> String {
    "string".to_string()
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_mode() -> String {
    "overwrite".to_string()
}

fn default_how() -> String {
    "left".to_string()
}

/// A layer job file: a list of jobs under `sources`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerFile<J> {
    #[serde(default = "Vec::new")]
    pub sources: Vec<J>,
}

impl<J> Default for LayerFile<J> {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
        }
    }
}

/// Location of one input table: `<dir>/<name>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputSpec {
    pub dir: PathBuf,
    pub name: String,
}

impl InputSpec {
    pub fn location(&self) -> PathBuf {
        self.dir.join(&self.name)
    }

    /// Table id used by joins: the file name without extension.
    pub fn table_id(&self) -> String {
        Path::new(&self.name)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.name.clone())
    }
}

/// How a job's output is persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteSpec {
    /// `overwrite` or `append`.
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(default)]
    pub merge_keys: Vec<String>,
}

impl Default for WriteSpec {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            merge_keys: Vec::new(),
        }
    }
}

impl WriteSpec {
    pub fn overwrite() -> Self {
        Self::default()
    }

    pub fn append(merge_keys: &[&str]) -> Self {
        Self {
            mode: "append".to_string(),
            merge_keys: merge_keys.iter().map(|k| k.to_string()).collect(),
        }
    }
}

/// Output destination plus write protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputSpec {
    pub dir: PathBuf,
    pub name: String,
    #[serde(flatten)]
    pub write: WriteSpec,
}

impl OutputSpec {
    pub fn location(&self) -> PathBuf {
        self.dir.join(&self.name)
    }
}

/// How one output column is derived from one input column.
///
/// Bronze files spell the names `input`/`output`; Silver files use
/// `input_column`/`output_column`. Both are accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMapping {
    #[serde(rename = "input_column", alias = "input")]
    pub input_name: String,
    #[serde(rename = "output_column", alias = "output")]
    pub output_name: String,
    #[serde(default = "default_output_type")]
    pub output_type: String,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default, rename = "timestamp", skip_serializing_if = "Option::is_none")]
    pub timestamp_spec: Option<TimestampSpec>,
}

impl ColumnMapping {
    pub fn new(input: &str, output: &str, output_type: &str) -> Self {
        Self {
            input_name: input.to_string(),
            output_name: output.to_string(),
            output_type: output_type.to_string(),
            active: true,
            timestamp_spec: None,
        }
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    pub fn with_timestamp(mut self, spec: TimestampSpec) -> Self {
        self.timestamp_spec = Some(spec);
        self
    }
}

/// Parsing rules for `datetime_utc` columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimestampSpec {
    /// strftime-style format, e.g. `%Y-%m-%dT%H`.
    #[serde(default)]
    pub input_format: Option<String>,
    #[serde(default = "default_timezone")]
    pub input_timezone: String,
    #[serde(default = "default_timezone")]
    pub output_timezone: String,
}

impl TimestampSpec {
    pub fn new(input_format: &str, input_timezone: &str, output_timezone: &str) -> Self {
        Self {
            input_format: Some(input_format.to_string()),
            input_timezone: input_timezone.to_string(),
            output_timezone: output_timezone.to_string(),
        }
    }
}

/// One row predicate; rules in a list are ANDed in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterRule {
    pub column: String,
    pub operator: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_yaml::Value>,
}

impl FilterRule {
    pub fn new(column: &str, operator: &str, value: Option<serde_yaml::Value>) -> Self {
        Self {
            column: column.to_string(),
            operator: operator.to_string(),
            value,
        }
    }
}

/// Grouped aggregation.
///
/// `grain` + `timestamp_column` enable time bucketing (Silver jobs).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregationSpec {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub group_by: Vec<String>,
    #[serde(default)]
    pub metrics: Vec<MetricSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_column: Option<String>,
}

/// One aggregated metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub column: String,
    #[serde(rename = "agg", alias = "agg_fn")]
    pub agg_fn: String,
    /// Column = value equalities restricting the rows this metric sees.
    #[serde(default, with = "ordered_pairs", skip_serializing_if = "Vec::is_empty")]
    pub filter: Vec<(String, serde_yaml::Value)>,
}

impl MetricSpec {
    pub fn new(column: &str, agg_fn: &str) -> Self {
        Self {
            name: None,
            column: column.to_string(),
            agg_fn: agg_fn.to_string(),
            filter: Vec::new(),
        }
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn filtered(mut self, column: &str, value: impl Into<serde_yaml::Value>) -> Self {
        self.filter.push((column.to_string(), value.into()));
        self
    }

    /// The column name this metric produces.
    pub fn output_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.column)
    }
}

/// One step of a join chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinSpec {
    #[serde(rename = "left")]
    pub left_table_id: String,
    #[serde(rename = "right")]
    pub right_table_id: String,
    /// `left`, `right`, `inner` or `outer`.
    #[serde(default = "default_how")]
    pub how: String,
    /// Left key column -> right key column, in declaration order.
    #[serde(rename = "based_on", default, with = "ordered_pairs")]
    pub key_pairs: Vec<(String, String)>,
}

impl JoinSpec {
    pub fn new(left: &str, right: &str, how: &str, keys: &[(&str, &str)]) -> Self {
        Self {
            left_table_id: left.to_string(),
            right_table_id: right.to_string(),
            how: how.to_string(),
            key_pairs: keys
                .iter()
                .map(|(l, r)| (l.to_string(), r.to_string()))
                .collect(),
        }
    }
}

/// A derived column computed row-wise from a formula.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputedColumn {
    pub name: String,
    pub formula: String,
}

impl ComputedColumn {
    pub fn new(name: &str, formula: &str) -> Self {
        Self {
            name: name.to_string(),
            formula: formula.to_string(),
        }
    }
}

/// Bronze: raw file -> selected/renamed string table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BronzeJob {
    pub id: String,
    /// Raw input format: `csv` or `json`.
    #[serde(rename = "type")]
    pub source_type: String,
    pub input: InputSpec,
    pub output: OutputSpec,
    #[serde(default)]
    pub columns: Vec<ColumnMapping>,
}

/// Silver: Bronze table -> typed, bucketed, filtered table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SilverJob {
    pub id: String,
    pub input: InputSpec,
    pub output: OutputSpec,
    #[serde(default)]
    pub mappings: Vec<ColumnMapping>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregation: Option<AggregationSpec>,
    #[serde(default)]
    pub filter: Vec<FilterRule>,
}

/// Gold: Silver tables -> joined, aggregated, derived table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoldJob {
    pub id: String,
    #[serde(default)]
    pub input: Vec<InputSpec>,
    pub output: OutputSpec,
    #[serde(default)]
    pub joins: Vec<JoinSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregation: Option<AggregationSpec>,
    #[serde(default)]
    pub post_calculations: Vec<ComputedColumn>,
}

/// (De)serialize a YAML mapping as an ordered list of pairs.
mod ordered_pairs {
    use serde::de::{DeserializeOwned, MapAccess, Visitor};
    use serde::ser::SerializeMap;
    use serde::{Deserializer, Serialize, Serializer};
    use std::fmt;
    use std::marker::PhantomData;

    #[allow(clippy::ptr_arg)]
    pub fn serialize<S, V>(pairs: &Vec<(String, V)>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        V: Serialize,
    {
        let mut map = serializer.serialize_map(Some(pairs.len()))?;
        for (k, v) in pairs {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }

    pub fn deserialize<'de, D, V>(deserializer: D) -> Result<Vec<(String, V)>, D::Error>
    where
        D: Deserializer<'de>,
        V: DeserializeOwned,
    {
        struct PairsVisitor<V>(PhantomData<V>);

        impl<'de, V: DeserializeOwned> Visitor<'de> for PairsVisitor<V> {
            type Value = Vec<(String, V)>;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a mapping")
            }

            fn visit_unit<E>(self) -> Result<Self::Value, E> {
                Ok(Vec::new())
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut pairs = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((k, v)) = map.next_entry::<String, V>()? {
                    pairs.push((k, v));
                }
                Ok(pairs)
            }
        }

        deserializer.deserialize_any(PairsVisitor(PhantomData))
    }
}
