//! Evolutionary classification across engine generations.
//!
//! The [`EvolutionaryClassifier`] runs every [`EngineProfile`] against a
//! file, keeps the matches above the acceptance threshold, and derives:
//!
//! - the chain of matched generations in release order
//! - the reader best suited to the file
//! - human-readable insights
//!
//! Files matching two or more generations feed a [`LineageLog`] of
//! cross-generation patterns, which can be persisted across runs.

mod lineage;

pub use lineage::{canonical_pattern, LineageLog, LineageRecord};

use crate::discovery::{read_header, Probe, DEFAULT_HEADER_WINDOW};
use crate::error::Result;
use crate::profiles::{default_profiles, timeline_rank, EngineProfile, ProfileMatch, ENGINE_TIMELINE};
use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Configuration for the classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Profile matches at or below this confidence are ignored
    pub acceptance_threshold: f64,
    /// A match above this confidence is reported as the best match
    pub best_match_threshold: f64,
    /// Reader recommended when no profile matches
    pub universal_reader: String,
    /// Header bytes read from each file
    pub header_window: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            acceptance_threshold: 0.3,
            best_match_threshold: 0.7,
            universal_reader: "universal_binary_reader".to_string(),
            header_window: DEFAULT_HEADER_WINDOW,
        }
    }
}

/// Derived observation about one analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Insight {
    /// More than one generation matched
    CrossProfile {
        /// Matched profiles, best first
        profiles: Vec<String>,
    },
    /// Matched generations in release order
    LineageChain {
        /// Profiles, oldest first
        chain: Vec<String>,
    },
    /// The strongest match above the best-match threshold
    BestMatch {
        /// Winning profile
        profile: String,
        /// Its confidence
        confidence: f64,
    },
}

impl fmt::Display for Insight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Insight::CrossProfile { profiles } => {
                write!(f, "Cross-profile compatibility detected: {}", profiles.join(", "))
            }
            Insight::LineageChain { chain } => {
                write!(f, "Evolutionary lineage: {}", chain.join(" -> "))
            }
            Insight::BestMatch {
                profile,
                confidence,
            } => write!(
                f,
                "Best match: {} ({:.1}% confidence)",
                profile,
                confidence * 100.0
            ),
        }
    }
}

/// Output of one classification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvolutionResult {
    /// Analyzed file
    pub path: PathBuf,
    /// Accepted matches, best first
    pub matches: Vec<ProfileMatch>,
    /// Confidence per accepted profile
    pub confidence_by_profile: BTreeMap<String, f64>,
    /// Accepted profiles in release order
    pub lineage_chain: Vec<String>,
    /// Reader to use for the file
    pub recommended_reader: String,
    /// Derived observations
    pub insights: Vec<Insight>,
    /// Pattern key if this analysis introduced a new lineage pattern
    pub new_pattern: Option<String>,
}

/// Snapshot of what the classifier has learned
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningReport {
    /// Analyses performed, including those from a loaded log
    pub total_analyses: u64,
    /// Number of distinct cross-profile patterns
    pub distinct_patterns: usize,
    /// Recorded patterns, in order of first sighting
    pub patterns: Vec<LineageRecord>,
    /// Known generations, oldest first
    pub engine_timeline: Vec<String>,
}

/// Classifies files against engine generation profiles and learns
/// cross-generation patterns
pub struct EvolutionaryClassifier {
    profiles: Vec<Arc<dyn EngineProfile>>,
    config: ClassifierConfig,
    log: Mutex<LineageLog>,
}

impl Default for EvolutionaryClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EvolutionaryClassifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.profiles.iter().map(|p| p.name()).collect();
        f.debug_struct("EvolutionaryClassifier")
            .field("profiles", &names)
            .field("config", &self.config)
            .finish()
    }
}

impl EvolutionaryClassifier {
    /// Creates a classifier with the built-in profiles and an empty log
    pub fn new() -> Self {
        Self::with_profiles(default_profiles())
    }

    /// Creates a classifier with the given profiles
    pub fn with_profiles(profiles: Vec<Arc<dyn EngineProfile>>) -> Self {
        Self {
            profiles,
            config: ClassifierConfig::default(),
            log: Mutex::new(LineageLog::new()),
        }
    }

    /// Replaces the configuration
    pub fn with_config(mut self, config: ClassifierConfig) -> Self {
        self.config = config;
        self
    }

    /// Starts from a previously persisted log
    pub fn with_log(self, log: LineageLog) -> Self {
        *self.log.lock() = log;
        self
    }

    /// Returns the active configuration
    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Reads the header window of `path` and classifies it
    ///
    /// Fails only if the file cannot be read.
    pub fn analyze(&self, path: impl AsRef<Path>) -> Result<EvolutionResult> {
        let path = path.as_ref();
        let (header, file_size) = read_header(path, self.config.header_window)?;
        Ok(self.analyze_header(path, &header, file_size))
    }

    /// Classifies an already-read header
    pub fn analyze_header(&self, path: &Path, header: &[u8], file_size: u64) -> EvolutionResult {
        let probe = Probe::new(path, header, file_size);

        let mut matches: Vec<ProfileMatch> = Vec::new();
        for profile in &self.profiles {
            match profile.analyze(&probe) {
                Ok(m) if m.confidence > self.config.acceptance_threshold => matches.push(m),
                Ok(_) => {}
                Err(e) => warn!(
                    "Profile {} failed on {}: {}",
                    profile.name(),
                    path.display(),
                    e
                ),
            }
        }
        matches.sort_by(|a, b| {
            b.confidence
                .total_cmp(&a.confidence)
                .then_with(|| a.profile.cmp(&b.profile))
        });

        let confidence_by_profile: BTreeMap<String, f64> = matches
            .iter()
            .map(|m| (m.profile.clone(), m.confidence))
            .collect();

        let lineage_chain: Vec<String> = ENGINE_TIMELINE
            .iter()
            .filter(|e| confidence_by_profile.contains_key(e.profile))
            .map(|e| e.profile.to_string())
            .collect();

        let recommended_reader = matches
            .iter()
            .max_by(|a, b| rank_for_reader(a, b))
            .map_or_else(
                || self.config.universal_reader.clone(),
                |m| format!("{}_reader", m.profile),
            );

        let mut insights = Vec::new();
        if matches.len() > 1 {
            insights.push(Insight::CrossProfile {
                profiles: matches.iter().map(|m| m.profile.clone()).collect(),
            });
            if lineage_chain.len() > 1 {
                insights.push(Insight::LineageChain {
                    chain: lineage_chain.clone(),
                });
            }
        }
        if let Some(best) = matches
            .iter()
            .filter(|m| m.confidence > self.config.best_match_threshold)
            .max_by(|a, b| rank_for_reader(a, b))
        {
            insights.push(Insight::BestMatch {
                profile: best.profile.clone(),
                confidence: best.confidence,
            });
        }

        let new_pattern = self.record(path, &confidence_by_profile);

        debug!(
            "Classified {}: {} match(es), reader {}",
            path.display(),
            matches.len(),
            recommended_reader
        );

        EvolutionResult {
            path: path.to_path_buf(),
            matches,
            confidence_by_profile,
            lineage_chain,
            recommended_reader,
            insights,
            new_pattern,
        }
    }

    fn record(&self, path: &Path, confidence_by_profile: &BTreeMap<String, f64>) -> Option<String> {
        let mut log = self.log.lock();
        log.count_analysis();

        if confidence_by_profile.len() < 2 {
            return None;
        }
        let pattern = canonical_pattern(confidence_by_profile.keys());
        let record = LineageRecord {
            pattern: pattern.clone(),
            first_seen: Utc::now(),
            file_type_hint: path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.to_ascii_lowercase()),
            confidence_by_profile: confidence_by_profile.clone(),
        };
        if log.insert(record) {
            info!("New lineage pattern: {}", pattern);
            Some(pattern)
        } else {
            None
        }
    }

    /// Summarizes what has been learned so far
    pub fn learning_report(&self) -> LearningReport {
        let log = self.log.lock();
        LearningReport {
            total_analyses: log.total_analyses(),
            distinct_patterns: log.len(),
            patterns: log.records().to_vec(),
            engine_timeline: ENGINE_TIMELINE
                .iter()
                .map(|e| e.description.to_string())
                .collect(),
        }
    }

    /// Returns a copy of the lineage log
    pub fn lineage_log(&self) -> LineageLog {
        self.log.lock().clone()
    }

    /// Persists the lineage log to `path`
    pub fn save_log(&self, path: impl AsRef<Path>) -> Result<()> {
        self.log.lock().save(path)
    }
}

/// Ordering for the reader choice: confidence, then the later generation,
/// then the lexicographically smaller name.
fn rank_for_reader(a: &ProfileMatch, b: &ProfileMatch) -> Ordering {
    a.confidence
        .total_cmp(&b.confidence)
        .then_with(|| timeline_rank(&a.profile).cmp(&timeline_rank(&b.profile)))
        .then_with(|| b.profile.cmp(&a.profile))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use pretty_assertions::assert_eq;

    /// Profile returning a fixed confidence
    struct Fixed(&'static str, f64);

    impl EngineProfile for Fixed {
        fn name(&self) -> &str {
            self.0
        }

        fn display_name(&self) -> &str {
            self.0
        }

        fn analyze(&self, _probe: &Probe<'_>) -> Result<ProfileMatch> {
            Ok(ProfileMatch::new(self.0, self.1, "fixed".to_string(), "blob"))
        }
    }

    struct Broken;

    impl EngineProfile for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        fn display_name(&self) -> &str {
            "Broken"
        }

        fn analyze(&self, _probe: &Probe<'_>) -> Result<ProfileMatch> {
            Err(Error::detector("broken", "truncated table"))
        }
    }

    fn classifier(profiles: Vec<Arc<dyn EngineProfile>>) -> EvolutionaryClassifier {
        EvolutionaryClassifier::with_profiles(profiles)
    }

    fn run(c: &EvolutionaryClassifier, name: &str) -> EvolutionResult {
        c.analyze_header(Path::new(name), b"", 0)
    }

    #[test]
    fn test_equal_confidence_prefers_later_generation() {
        let c = classifier(vec![
            Arc::new(Fixed("gta_v", 0.9)),
            Arc::new(Fixed("gta_iv", 0.9)),
        ]);
        let result = run(&c, "tex.wtd");

        assert_eq!(result.recommended_reader, "gta_v_reader");
        assert_eq!(result.lineage_chain, vec!["gta_iv", "gta_v"]);
        assert_eq!(result.new_pattern.as_deref(), Some("gta_iv->gta_v"));

        let texts: Vec<String> = result.insights.iter().map(ToString::to_string).collect();
        assert!(texts.contains(&"Evolutionary lineage: gta_iv -> gta_v".to_string()));
        assert!(texts.contains(&"Best match: gta_v (90.0% confidence)".to_string()));
    }

    #[test]
    fn test_higher_confidence_beats_later_generation() {
        let c = classifier(vec![
            Arc::new(Fixed("gta_v", 0.6)),
            Arc::new(Fixed("midnight_club_3", 0.8)),
        ]);
        assert_eq!(run(&c, "a").recommended_reader, "midnight_club_3_reader");
    }

    #[test]
    fn test_nothing_accepted_uses_universal_reader() {
        let c = classifier(vec![Arc::new(Fixed("gta_v", 0.3)), Arc::new(Broken)]);
        let result = run(&c, "a");
        assert!(result.matches.is_empty());
        assert!(result.insights.is_empty());
        assert_eq!(result.recommended_reader, "universal_binary_reader");
        assert_eq!(c.learning_report().total_analyses, 1);
    }

    #[test]
    fn test_pattern_recorded_once() {
        let c = classifier(vec![
            Arc::new(Fixed("red_dead_redemption", 0.7)),
            Arc::new(Fixed("gta_iv", 0.5)),
        ]);
        let first = run(&c, "a.wft");
        let second = run(&c, "b.wft");

        assert!(first.new_pattern.is_some());
        assert!(second.new_pattern.is_none());
        // 0.7 is not above the best-match threshold
        assert!(!first
            .insights
            .iter()
            .any(|i| matches!(i, Insight::BestMatch { .. })));

        let report = c.learning_report();
        assert_eq!(report.total_analyses, 2);
        assert_eq!(report.distinct_patterns, 1);
        assert_eq!(report.patterns[0].file_type_hint.as_deref(), Some("wft"));
        assert_eq!(report.engine_timeline.len(), 5);
    }

    #[test]
    fn test_concurrent_analyses_record_pattern_once() {
        let c = classifier(vec![
            Arc::new(Fixed("gta_iv", 0.8)),
            Arc::new(Fixed("gta_v", 0.9)),
        ]);

        let learned: usize = std::thread::scope(|scope| {
            let workers: Vec<_> = (0..16)
                .map(|_| {
                    scope.spawn(|| {
                        (0..50)
                            .filter(|i| run(&c, &format!("{}.ydr", i)).new_pattern.is_some())
                            .count()
                    })
                })
                .collect();
            workers.into_iter().map(|w| w.join().unwrap()).sum()
        });

        assert_eq!(learned, 1);
        let report = c.learning_report();
        assert_eq!(report.total_analyses, 800);
        assert_eq!(report.distinct_patterns, 1);
        assert_eq!(report.patterns[0].pattern, "gta_iv->gta_v");
    }

    #[test]
    fn test_single_match_has_no_lineage() {
        let c = classifier(vec![Arc::new(Fixed("gta_iv", 0.85))]);
        let result = run(&c, "a");
        assert!(result.lineage_chain.len() == 1);
        assert!(result.new_pattern.is_none());
        assert_eq!(result.insights.len(), 1);
        assert!(c.lineage_log().is_empty());
    }

    #[test]
    fn test_builtin_profiles_on_real_header() {
        let c = EvolutionaryClassifier::new();
        // GTA IV extension fallback plus RDR float constants
        let result = c.analyze_header(Path::new("cargo.wtd"), b"\x00\x00\x80\x3f\x00\x00", 6);
        assert_eq!(result.lineage_chain, vec!["gta_iv", "red_dead_redemption"]);
        assert_eq!(result.recommended_reader, "red_dead_redemption_reader");
    }

    #[test]
    fn test_analyze_missing_file() {
        let c = EvolutionaryClassifier::new();
        assert!(matches!(
            c.analyze("/no/such/file.wtd"),
            Err(Error::FileRead { .. })
        ));
    }

    #[test]
    fn test_log_survives_save_and_load() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("lineage.json");

        let c = classifier(vec![Arc::new(Fixed("gta_v", 0.9)), Arc::new(Fixed("gta_iv", 0.9))]);
        run(&c, "a");
        c.save_log(&path).unwrap();

        let restored = classifier(vec![Arc::new(Fixed("gta_v", 0.9)), Arc::new(Fixed("gta_iv", 0.9))])
            .with_log(LineageLog::load(&path).unwrap());
        assert!(run(&restored, "b").new_pattern.is_none());
        assert_eq!(restored.learning_report().total_analyses, 2);
    }
}
