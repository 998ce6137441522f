//! Declarative table operators.
//!
//! Each operator is a pure function from input table(s) plus a job fragment
//! to a new table.

pub mod aggregate;
pub mod compute;
pub mod filter;
pub mod join;
pub mod mapping;

pub use aggregate::{AggFn, Grain, aggregate};
pub use compute::compute;
pub use filter::{FilterOperator, filter};
pub use join::{JoinHow, join};
pub use mapping::{INGESTION_TIMESTAMP_COLUMN, OutputType, add_ingestion_timestamp, project};
