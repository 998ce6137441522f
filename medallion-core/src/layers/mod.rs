//! Bronze / Silver / Gold orchestration.
//!
//! Each layer runs its jobs in file order. A job either writes exactly one
//! table or fails; the first failure stops the layer, leaving earlier jobs'
//! outputs in place.

pub mod bronze;
pub mod gold;
pub mod silver;

pub use bronze::BronzeLayer;
pub use gold::GoldLayer;
pub use silver::SilverLayer;

use crate::error::Result;
use crate::job::{BronzeJob, GoldJob, LayerFile, SilverJob};
use crate::persistence::load_yaml;
use crate::store::TableStore;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// Refinement stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Layer {
    Bronze,
    Silver,
    Gold,
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Layer::Bronze => write!(f, "bronze"),
            Layer::Silver => write!(f, "silver"),
            Layer::Gold => write!(f, "gold"),
        }
    }
}

/// Result of one successful job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobOutcome {
    pub job_id: String,
    pub destination: PathBuf,
    /// Rows stored at the destination after the write.
    pub rows: usize,
}

/// Outcomes of every job of one layer run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerReport {
    pub layer: Layer,
    pub outcomes: Vec<JobOutcome>,
}

impl LayerReport {
    fn new(layer: Layer) -> Self {
        Self {
            layer,
            outcomes: Vec::new(),
        }
    }

    /// Output location of `job_id`, if it ran.
    pub fn destination(&self, job_id: &str) -> Option<&Path> {
        self.outcomes
            .iter()
            .find(|o| o.job_id == job_id)
            .map(|o| o.destination.as_path())
    }
}

/// Job lists for all three layers.
#[derive(Debug, Clone, Default)]
pub struct PipelineJobs {
    pub bronze: Vec<BronzeJob>,
    pub silver: Vec<SilverJob>,
    pub gold: Vec<GoldJob>,
}

impl PipelineJobs {
    /// Load the three YAML job files.
    pub fn load(bronze: &Path, silver: &Path, gold: &Path) -> Result<Self> {
        Ok(Self {
            bronze: load_yaml::<LayerFile<BronzeJob>>(bronze)?.sources,
            silver: load_yaml::<LayerFile<SilverJob>>(silver)?.sources,
            gold: load_yaml::<LayerFile<GoldJob>>(gold)?.sources,
        })
    }
}

/// Run Bronze, Silver and Gold in order for one run id.
pub fn run_pipeline(
    store: &dyn TableStore,
    raw_root: &Path,
    jobs: &PipelineJobs,
    run_id: &str,
) -> Result<Vec<LayerReport>> {
    tracing::info!(run_id, "Starting pipeline run");
    let reports = vec![
        BronzeLayer::new(store, raw_root, &jobs.bronze).run(run_id)?,
        SilverLayer::new(store, &jobs.silver).run()?,
        GoldLayer::new(store, &jobs.gold).run()?,
    ];
    tracing::info!(run_id, "Pipeline run complete");
    Ok(reports)
}
