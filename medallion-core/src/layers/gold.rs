//! Gold: Silver tables → joined, aggregated, derived table.

use super::{JobOutcome, Layer, LayerReport};
use crate::error::{EngineError, Result};
use crate::job::GoldJob;
use crate::ops::{aggregate, compute, join};
use crate::store::TableStore;
use crate::table::Table;
use crate::write::WriteCoordinator;
use std::collections::HashMap;

pub struct GoldLayer<'a> {
    store: &'a dyn TableStore,
    jobs: &'a [GoldJob],
}

impl<'a> GoldLayer<'a> {
    pub fn new(store: &'a dyn TableStore, jobs: &'a [GoldJob]) -> Self {
        Self { store, jobs }
    }

    pub fn run(&self) -> Result<LayerReport> {
        tracing::info!(jobs = self.jobs.len(), "Running gold layer");
        let mut report = LayerReport::new(Layer::Gold);
        for job in self.jobs {
            report.outcomes.push(self.run_job(job)?);
        }
        Ok(report)
    }

    pub fn run_job(&self, job: &GoldJob) -> Result<JobOutcome> {
        let inputs = self.load_inputs(job)?;
        let joined = join(&inputs, &job.joins)?;
        let aggregated = aggregate(&joined, job.aggregation.as_ref())?;
        let table = compute(&aggregated, &job.post_calculations)?;

        let destination = job.output.location();
        let rows = WriteCoordinator::new(self.store).write(&table, &destination, &job.output.write)?;
        tracing::info!(job = %job.id, rows, destination = %destination.display(), "Gold job complete");
        Ok(JobOutcome {
            job_id: job.id.clone(),
            destination,
            rows,
        })
    }

    /// Input tables keyed by file stem.
    fn load_inputs(&self, job: &GoldJob) -> Result<HashMap<String, Table>> {
        let mut tables = HashMap::with_capacity(job.input.len());
        for input in &job.input {
            let id = input.table_id();
            let table = self.store.read_table(&input.location())?;
            if tables.insert(id.clone(), table).is_some() {
                return Err(EngineError::config(format!(
                    "gold job '{}' has two inputs with table id '{id}'",
                    job.id
                )));
            }
        }
        Ok(tables)
    }
}
