//! Shared file utilities: atomic writes and YAML job-file loading.

use crate::error::{EngineError, Result};
use serde::de::DeserializeOwned;
use std::io;
use std::path::Path;

/// Atomically write raw bytes to a file.
///
/// Writes to a `.tmp` sibling file, then renames onto the target path, so a
/// reader sees either the previous content or the new one, never a partial
/// file. Creates parent directories if they don't exist.
pub fn atomic_write(path: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = tmp_sibling(path);
    std::fs::write(&tmp, data)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// `data.parquet` -> `data.parquet.tmp`, keeping the original extension so
/// two outputs differing only by extension never share a temp file.
fn tmp_sibling(path: &Path) -> std::path::PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Load and deserialize a YAML file.
///
/// A missing file is a [`EngineError::NotFound`]; malformed YAML surfaces
/// as [`EngineError::Yaml`]. An empty document yields `T::default()`.
pub fn load_yaml<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    if !path.exists() {
        return Err(EngineError::not_found(path));
    }
    let content = std::fs::read_to_string(path)?;
    if content.trim().is_empty() {
        return Ok(T::default());
    }
    Ok(serde_yaml::from_str(&content)?)
}
