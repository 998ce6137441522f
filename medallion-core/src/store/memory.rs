//! In-memory table store.

use crate::error::{EngineError, Result};
use crate::store::TableStore;
use crate::table::Table;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// In-memory table store for tests and embedding.
///
/// Thread-safe via `Mutex<HashMap>`. Does not persist across process restarts.
pub struct MemoryStore {
    tables: Mutex<HashMap<PathBuf, Table>>,
}

impl MemoryStore {
    /// Create an empty in-memory store.
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(HashMap::new()),
        }
    }

    /// Number of stored tables.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<PathBuf, Table>> {
        // A panic mid-insert cannot leave a half-written table behind.
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TableStore for MemoryStore {
    fn read_table(&self, location: &Path) -> Result<Table> {
        self.lock()
            .get(location)
            .cloned()
            .ok_or_else(|| EngineError::not_found(location))
    }

    fn write_table(&self, table: &Table, location: &Path) -> Result<()> {
        self.lock().insert(location.to_path_buf(), table.clone());
        Ok(())
    }

    fn exists(&self, location: &Path) -> bool {
        self.lock().contains_key(location)
    }
}
