//! Error types for the strata-core library.
//!
//! Only [`Error::FileRead`] ever escapes a `discover`/`analyze` call. The
//! other variants are produced internally, logged, and folded into the
//! result of the surrounding operation.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for strata operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for all strata operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Failed to read an input file
    #[error("failed to read file '{path}': {source}")]
    FileRead {
        /// Path to the file that failed to read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Failed to write an output file
    #[error("failed to write file '{path}': {source}")]
    FileWrite {
        /// Path to the file that failed to write
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// A plugin failed to load or initialize
    #[error("failed to load plugin '{source_name}': {details}")]
    PluginLoad {
        /// Manifest path or built-in identifier of the plugin
        source_name: String,
        /// Detailed description of the failure
        details: String,
    },

    /// A detector or engine profile failed while inspecting a file
    #[error("detector '{detector}' failed: {details}")]
    Detector {
        /// Name of the failing detector
        detector: String,
        /// Detailed description of the failure
        details: String,
    },

    /// A single unit of a batch run failed
    #[error("{path}: {reason}")]
    BatchItem {
        /// Input path of the failed unit
        path: PathBuf,
        /// Failure reason reported by the worker
        reason: String,
    },

    /// The persisted lineage log could not be decoded or encoded
    #[error("invalid lineage log '{path}': {details}")]
    LineageStore {
        /// Path of the lineage log
        path: PathBuf,
        /// Detailed description of the failure
        details: String,
    },

    /// No plugin is registered under the given name
    #[error("unknown plugin: '{0}'")]
    UnknownPlugin(String),

    /// Generic internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Creates a new file read error
    pub fn file_read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileRead {
            path: path.into(),
            source,
        }
    }

    /// Creates a new file write error
    pub fn file_write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileWrite {
            path: path.into(),
            source,
        }
    }

    /// Creates a new plugin load error
    pub fn plugin_load(source_name: impl Into<String>, details: impl Into<String>) -> Self {
        Self::PluginLoad {
            source_name: source_name.into(),
            details: details.into(),
        }
    }

    /// Creates a new detector error
    pub fn detector(detector: impl Into<String>, details: impl Into<String>) -> Self {
        Self::Detector {
            detector: detector.into(),
            details: details.into(),
        }
    }

    /// Creates a new batch item error
    pub fn batch_item(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::BatchItem {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Creates a new lineage store error
    pub fn lineage_store(path: impl Into<PathBuf>, details: impl Into<String>) -> Self {
        Self::LineageStore {
            path: path.into(),
            details: details.into(),
        }
    }

    /// Creates a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns true if this error only affects one plugin, detector or batch item
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::PluginLoad { .. } | Self::Detector { .. } | Self::BatchItem { .. }
        )
    }
}
