//! Engine settings.
//!
//! Settings are layered with figment: built-in defaults, then the user
//! config file, then `medallion.toml` in the workspace, then `MEDALLION_`
//! environment variables (`__` separates nested keys), then explicit
//! overrides from the caller.

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the workspace settings file.
pub const SETTINGS_FILE: &str = "medallion.toml";

/// Top-level settings for a pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Base directory that relative raw-input and table locations resolve
    /// against.
    pub data_root: PathBuf,
    pub jobs: JobFiles,
    pub logging: LoggingSettings,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from("."),
            jobs: JobFiles::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl EngineSettings {
    /// Resolve a job file path against `data_root` when relative.
    pub fn job_file(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.data_root.join(path)
        }
    }
}

/// Locations of the per-layer YAML job files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobFiles {
    pub bronze: PathBuf,
    pub silver: PathBuf,
    pub gold: PathBuf,
}

impl Default for JobFiles {
    fn default() -> Self {
        Self {
            bronze: PathBuf::from("configs/bronze.yml"),
            silver: PathBuf::from("configs/silver.yml"),
            gold: PathBuf::from("configs/gold.yml"),
        }
    }
}

/// Logging sinks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Directory for rolling JSON log files; the platform data directory
    /// when unset.
    pub dir: Option<PathBuf>,
    /// Whether to write the JSON file log at all.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            dir: None,
            json: true,
        }
    }
}

/// Command-line overrides; unset fields leave lower layers alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SettingsOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_root: Option<PathBuf>,
}

/// Load settings from all layers.
pub fn load_settings(
    workspace: Option<&Path>,
    overrides: Option<&SettingsOverrides>,
) -> Result<EngineSettings, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(EngineSettings::default()));

    if let Some(dirs) = directories::ProjectDirs::from("dev", "medallion", "medallion") {
        let user_config = dirs.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(ws) = workspace {
        let ws_config = ws.join(SETTINGS_FILE);
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // MEDALLION_DATA_ROOT, MEDALLION_JOBS__BRONZE, MEDALLION_LOGGING__JSON, ...
    figment = figment.merge(Env::prefixed("MEDALLION_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    figment.extract().map_err(Box::new)
}
