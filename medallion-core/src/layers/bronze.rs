//! Bronze: raw file → selected, renamed, timestamped string table.

use super::{JobOutcome, Layer, LayerReport};
use crate::error::Result;
use crate::ingest::{SourceFormat, read_raw};
use crate::job::BronzeJob;
use crate::ops::{add_ingestion_timestamp, project};
use crate::store::TableStore;
use crate::write::WriteCoordinator;
use chrono::Utc;
use std::path::{Path, PathBuf};

pub struct BronzeLayer<'a> {
    store: &'a dyn TableStore,
    raw_root: PathBuf,
    jobs: &'a [BronzeJob],
}

impl<'a> BronzeLayer<'a> {
    /// `raw_root` is the base that job input directories resolve against.
    pub fn new(store: &'a dyn TableStore, raw_root: &Path, jobs: &'a [BronzeJob]) -> Self {
        Self {
            store,
            raw_root: raw_root.to_path_buf(),
            jobs,
        }
    }

    pub fn run(&self, run_id: &str) -> Result<LayerReport> {
        tracing::info!(run_id, jobs = self.jobs.len(), "Running bronze layer");
        let mut report = LayerReport::new(Layer::Bronze);
        for job in self.jobs {
            report.outcomes.push(self.run_job(job, run_id)?);
        }
        Ok(report)
    }

    /// Raw inputs live under `<raw_root>/<input.dir>/<run_id>/<input.name>`.
    pub fn input_path(&self, job: &BronzeJob, run_id: &str) -> PathBuf {
        self.raw_root
            .join(&job.input.dir)
            .join(run_id)
            .join(&job.input.name)
    }

    pub fn run_job(&self, job: &BronzeJob, run_id: &str) -> Result<JobOutcome> {
        let format: SourceFormat = job.source_type.parse()?;
        let raw = read_raw(&self.input_path(job, run_id), format)?;
        let projected = project(&raw, &job.columns)?;
        let table = add_ingestion_timestamp(&projected, Utc::now())?;

        let destination = job.output.location();
        let rows = WriteCoordinator::new(self.store).write(&table, &destination, &job.output.write)?;
        tracing::info!(job = %job.id, rows, destination = %destination.display(), "Bronze job complete");
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
    use crate::job::{ColumnMapping, InputSpec, OutputSpec, WriteSpec};
    use crate::ops::INGESTION_TIMESTAMP_COLUMN;
    use crate::store::MemoryStore;
    use crate::table::Value;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn job(source_type: &str, name: &str) -> BronzeJob {
        BronzeJob {
            id: "prices".into(),
            source_type: source_type.into(),
            input: InputSpec {
                dir: "raw/prices".into(),
                name: name.into(),
            },
            output: OutputSpec {
                dir: "bronze".into(),
                name: "prices.parquet".into(),
                write: WriteSpec::append(&["ts", "zone"]),
            },
            columns: vec![
                ColumnMapping::new("Timestamp", "ts", "string"),
                ColumnMapping::new("Zone", "zone", "string"),
                ColumnMapping::new("Comment", "comment", "string").inactive(),
            ],
        }
    }

    fn write_raw(root: &Path, run_id: &str, name: &str, content: &str) {
        let dir = root.join("raw/prices").join(run_id);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(name), content).unwrap();
    }

    #[test]
    fn test_bronze_csv_job() {
        let root = TempDir::new().unwrap();
        write_raw(
            root.path(),
            "20240101_000000",
            "prices.csv",
            "Timestamp,Zone,Comment\n2024-01-01T00,DE,x\n",
        );
        let store = MemoryStore::new();
        let jobs = vec![job("csv", "prices.csv")];

        let report = BronzeLayer::new(&store, root.path(), &jobs)
            .run("20240101_000000")
            .unwrap();
        assert_eq!(report.outcomes[0].rows, 1);

        let table = store
            .read_table(Path::new("bronze/prices.parquet"))
            .unwrap();
        assert_eq!(
            table.column_names(),
            vec!["ts", "zone", INGESTION_TIMESTAMP_COLUMN]
        );
        assert_eq!(table.column("zone").unwrap().values, vec![Value::from("DE")]);
    }

    #[test]
    fn test_bronze_replay_does_not_duplicate() {
        let root = TempDir::new().unwrap();
        write_raw(
            root.path(),
            "r1",
            "prices.json",
            r#"[{"Timestamp": "2024-01-01T00", "Zone": "DE", "Comment": null}]"#,
        );
        let store = MemoryStore::new();
        let jobs = vec![job("json", "prices.json")];
        let layer = BronzeLayer::new(&store, root.path(), &jobs);

        layer.run("r1").unwrap();
        let report = layer.run("r1").unwrap();
        assert_eq!(report.outcomes[0].rows, 1);
    }

    #[test]
    fn test_missing_raw_file_is_not_found() {
        let root = TempDir::new().unwrap();
        let store = MemoryStore::new();
        let jobs = vec![job("csv", "prices.csv")];

        let err = BronzeLayer::new(&store, root.path(), &jobs)
            .run("r1")
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound { .. }));
        assert!(store.is_empty());
    }

    #[test]
    fn test_unknown_source_type_writes_nothing() {
        let root = TempDir::new().unwrap();
        let store = MemoryStore::new();
        let jobs = vec![job("xlsx", "prices.xlsx")];

        let err = BronzeLayer::new(&store, root.path(), &jobs)
            .run("r1")
            .unwrap_err();
        assert!(err.is_configuration());
        assert!(store.is_empty());
    }
}
