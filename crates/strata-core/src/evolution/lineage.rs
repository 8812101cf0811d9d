//! Persistent log of cross-profile match patterns.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use tracing::debug;

/// First sighting of a cross-profile pattern
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineageRecord {
    /// Canonical pattern key, e.g. `gta_iv->gta_v`
    pub pattern: String,
    /// When the pattern was first observed
    pub first_seen: DateTime<Utc>,
    /// Lowercased extension of the file that introduced the pattern
    pub file_type_hint: Option<String>,
    /// Per-profile confidence at first sighting
    pub confidence_by_profile: BTreeMap<String, f64>,
}

/// Builds the canonical key for a set of profile names
///
/// Names are sorted and deduplicated, so the key does not depend on the
/// order the profiles matched in.
pub fn canonical_pattern<I, S>(profiles: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut names: Vec<String> = profiles.into_iter().map(|p| p.as_ref().to_string()).collect();
    names.sort();
    names.dedup();
    names.join("->")
}

/// Append-only set of lineage records, unique by pattern
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LineageLog {
    #[serde(default)]
    total_analyses: u64,
    #[serde(default)]
    records: Vec<LineageRecord>,
}

impl LineageLog {
    /// Creates an empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a log from disk; a missing file yields an empty log
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = match fs::read(path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No lineage log at {}, starting fresh", path.display());
                return Ok(Self::new());
            }
            Err(e) => return Err(Error::file_read(path, e)),
        };

        let mut log: Self =
            serde_json::from_slice(&data).map_err(|e| Error::lineage_store(path, e.to_string()))?;
        let before = log.records.len();
        let mut seen = std::collections::BTreeSet::new();
        log.records.retain(|r| seen.insert(r.pattern.clone()));
        if log.records.len() != before {
            debug!(
                "Dropped {} duplicate pattern(s) from {}",
                before - log.records.len(),
                path.display()
            );
        }
        Ok(log)
    }

    /// Writes the log as pretty-printed JSON, creating parent directories
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| Error::file_write(parent, e))?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| Error::lineage_store(path, e.to_string()))?;
        fs::write(path, json).map_err(|e| Error::file_write(path, e))
    }

    /// Returns true if `pattern` has been recorded
    pub fn contains(&self, pattern: &str) -> bool {
        self.records.iter().any(|r| r.pattern == pattern)
    }

    /// Records a pattern unless it is already known
    ///
    /// Returns true if the record was new.
    pub fn insert(&mut self, record: LineageRecord) -> bool {
        if self.contains(&record.pattern) {
            return false;
        }
        self.records.push(record);
        true
    }

    /// Records, in order of first sighting
    pub fn records(&self) -> &[LineageRecord] {
        &self.records
    }

    /// Number of distinct patterns
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if no pattern has been recorded
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Analyses performed over the lifetime of this log
    pub fn total_analyses(&self) -> u64 {
        self.total_analyses
    }

    pub(crate) fn count_analysis(&mut self) {
        self.total_analyses += 1;
    }
}
