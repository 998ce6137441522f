//! # Medallion Core
//!
//! Declarative table refinement engine for Bronze/Silver/Gold pipelines.
//! Provides the in-memory table model, the Parquet table store, the
//! overwrite/append-merge write protocol, the projection, filter,
//! aggregation, join and formula operators, raw file readers, and the
//! per-layer job orchestrators.

pub mod config;
pub mod error;
pub mod formula;
pub mod ingest;
pub mod job;
pub mod layers;
pub mod ops;
pub mod persistence;
pub mod store;
pub mod table;
pub mod write;

// Re-export commonly used types at the crate root.
pub use config::{EngineSettings, SettingsOverrides, load_settings};
pub use error::{EngineError, Result};
pub use job::{
    AggregationSpec, BronzeJob, ColumnMapping, ComputedColumn, FilterRule, GoldJob, InputSpec,
    JoinSpec, LayerFile, MetricSpec, OutputSpec, SilverJob, TimestampSpec, WriteSpec,
};
pub use layers::{
    BronzeLayer, GoldLayer, JobOutcome, Layer, LayerReport, PipelineJobs, SilverLayer,
    run_pipeline,
};
pub use store::{MemoryStore, ParquetStore, TableStore};
pub use table::{Column, DataType, Table, Value};
pub use write::{WriteCoordinator, WriteMode};
