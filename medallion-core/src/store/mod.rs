//! Table store adapter: named tables read and written as whole units.
//!
//! The store holds no business logic: `write_table` overwrites
//! unconditionally and `read_table` fails with `NotFound` for absent
//! locations. The append/merge protocol lives in [`crate::write`].

pub mod columnar;
pub mod memory;

pub use columnar::ParquetStore;
pub use memory::MemoryStore;

use crate::error::Result;
use crate::table::Table;
use std::path::Path;

/// Trait for table storage backends.
pub trait TableStore: Send + Sync {
    /// Read the table stored at `location`.
    fn read_table(&self, location: &Path) -> Result<Table>;

    /// Persist `table` at `location`, replacing any previous content.
    fn write_table(&self, table: &Table, location: &Path) -> Result<()>;

    /// Check whether a table exists at `location`.
    fn exists(&self, location: &Path) -> bool;
}
