//! File-based settings shared by the engine, classifier and batch runner.

use crate::batch::BatchConfig;
use crate::discovery::DiscoveryConfig;
use crate::error::{Error, Result};
use crate::evolution::ClassifierConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level settings document
///
/// Every section and field is optional; missing values fall back to the
/// defaults of the corresponding config type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Discovery engine settings
    pub discovery: DiscoveryConfig,
    /// Evolutionary classifier settings
    pub classifier: ClassifierConfig,
    /// Batch runner settings
    pub batch: BatchConfig,
    /// Plugin manifest directories
    pub plugin_dirs: Vec<PathBuf>,
    /// Where the lineage log is persisted, if anywhere
    pub lineage_log: Option<PathBuf>,
}

impl Settings {
    /// Loads settings from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|e| Error::file_read(path, e))?;
        serde_json::from_slice(&data).map_err(|e| {
            Error::internal(format!("invalid settings file '{}': {}", path.display(), e))
        })
    }
}
