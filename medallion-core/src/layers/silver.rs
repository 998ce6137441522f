//! Silver: Bronze table → typed, time-bucketed, filtered table.

use super::{JobOutcome, Layer, LayerReport};
use crate::error::Result;
use crate::job::SilverJob;
use crate::ops::{aggregate, filter, project};
use crate::store::TableStore;
use crate::write::WriteCoordinator;

pub struct SilverLayer<'a> {
    store: &'a dyn TableStore,
    jobs: &'a [SilverJob],
}

impl<'a> SilverLayer<'a> {
    pub fn new(store: &'a dyn TableStore, jobs: &'a [SilverJob]) -> Self {
        Self { store, jobs }
    }

    pub fn run(&self) -> Result<LayerReport> {
        tracing::info!(jobs = self.jobs.len(), "Running silver layer");
        let mut report = LayerReport::new(Layer::Silver);
        for job in self.jobs {
            report.outcomes.push(self.run_job(job)?);
        }
        Ok(report)
    }

    pub fn run_job(&self, job: &SilverJob) -> Result<JobOutcome> {
        let input = self.store.read_table(&job.input.location())?;
        let typed = project(&input, &job.mappings)?;
        let aggregated = aggregate(&typed, job.aggregation.as_ref())?;
        let table = filter(&aggregated, &job.filter)?;

        let destination = job.output.location();
        let rows = WriteCoordinator::new(self.store).write(&table, &destination, &job.output.write)?;
        tracing::info!(job = %job.id, rows, destination = %destination.display(), "Silver job complete");
        Ok(JobOutcome {
            job_id: job.id.clone(),
            destination,
            rows,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::job::{
        AggregationSpec, ColumnMapping, FilterRule, InputSpec, MetricSpec, OutputSpec,
        TimestampSpec, WriteSpec,
    };
    use crate::store::MemoryStore;
    use crate::table::{Column, DataType, Table, Value};
    use chrono::TimeZone;
    use chrono_tz::Tz;
    use pretty_assertions::assert_eq;
    use std::path::Path;

    fn bronze_load() -> Table {
        let s = |v: &str| Value::from(v);
        Table::new(vec![
            Column::new(
                "period",
                DataType::Utf8,
                vec![s("2024-01-15 10:15"), s("2024-01-15 10:45"), s("2024-01-15 11:05"), s("bad")],
            ),
            Column::new(
                "value",
                DataType::Utf8,
                vec![s("10"), s("20"), s("-5"), s("7")],
            ),
        ])
        .unwrap()
    }

    fn job() -> SilverJob {
        SilverJob {
            id: "load".into(),
            input: InputSpec {
                dir: "bronze".into(),
                name: "load.parquet".into(),
            },
            output: OutputSpec {
                dir: "silver".into(),
                name: "load.parquet".into(),
                write: WriteSpec::overwrite(),
            },
            mappings: vec![
                ColumnMapping::new("period", "ts", "datetime_utc").with_timestamp(
                    TimestampSpec::new("%Y-%m-%d %H:%M", "Europe/Berlin", "UTC"),
                ),
                ColumnMapping::new("value", "mw", "float"),
            ],
            aggregation: Some(AggregationSpec {
                enabled: true,
                group_by: vec!["ts".into()],
                metrics: vec![MetricSpec::new("mw", "sum")],
                grain: Some("h".into()),
                timestamp_column: Some("ts".into()),
            }),
            filter: vec![FilterRule::new("mw", ">", Some(0.into()))],
        }
    }

    #[test]
    fn test_silver_job_types_buckets_and_filters() {
        let store = MemoryStore::new();
        store
            .write_table(&bronze_load(), Path::new("bronze/load.parquet"))
            .unwrap();

        let report = SilverLayer::new(&store, &[job()]).run().unwrap();
        assert_eq!(report.destination("load"), Some(Path::new("silver/load.parquet")));

        let out = store.read_table(Path::new("silver/load.parquet")).unwrap();
        let utc = |h| Value::Timestamp(Tz::UTC.with_ymd_and_hms(2024, 1, 15, h, 0, 0).unwrap());
        // 10:xx Berlin = 09:xx UTC sums to 30; 11:05 bucket is -5 and
        // filtered; the unparsable row forms a null-key group of 7.
        assert_eq!(out.column("ts").unwrap().values, vec![utc(9), Value::Null]);
        assert_eq!(
            out.column("mw").unwrap().values,
            vec![Value::Float(30.0), Value::Float(7.0)]
        );
    }

    #[test]
    fn test_missing_input_table_is_not_found() {
        let store = MemoryStore::new();
        let err = SilverLayer::new(&store, &[job()]).run().unwrap_err();
        assert!(matches!(err, EngineError::NotFound { .. }));
    }

    #[test]
    fn test_bad_filter_operator_writes_nothing() {
        let store = MemoryStore::new();
        store
            .write_table(&bronze_load(), Path::new("bronze/load.parquet"))
            .unwrap();
        let mut bad = job();
        bad.filter = vec![FilterRule::new("mw", "between", Some(1.into()))];

        let err = SilverLayer::new(&store, &[bad]).run().unwrap_err();
        assert!(err.is_configuration());
        assert!(!store.exists(Path::new("silver/load.parquet")));
    }

    #[test]
    fn test_only_inactive_mappings_writes_nothing() {
        let store = MemoryStore::new();
        store
            .write_table(&bronze_load(), Path::new("bronze/load.parquet"))
            .unwrap();
        let mut bad = job();
        bad.mappings = vec![ColumnMapping::new("value", "mw", "float").inactive()];
        bad.aggregation = None;
        bad.filter.clear();

        let err = SilverLayer::new(&store, &[bad]).run().unwrap_err();
        assert!(err.is_configuration());
        assert!(!store.exists(Path::new("silver/load.parquet")));
    }
}
