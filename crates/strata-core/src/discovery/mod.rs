//! Multi-candidate format discovery.
//!
//! The [`DiscoveryEngine`] reads a bounded header window from a file once
//! and hands the same [`Probe`] to every registered [`Detector`]. All
//! emitted [`Candidate`]s are merged into one ranked list:
//!
//! 1. Candidates without evidence are dropped, confidences are clamped to `[0, 1]`
//! 2. Duplicates by `format` collapse to the highest-confidence one
//! 3. The survivors are sorted by confidence, then by method priority
//!    (signature > structure/profile > extension)
//!
//! The ranking is a total order, so the result does not depend on the
//! order detectors were registered or executed in.
//!
//! ## Extensibility
//!
//! ```no_run
//! use strata_core::discovery::{Candidate, DetectionMethod, Detector, Probe};
//! use strata_core::Result;
//!
//! struct ElfDetector;
//!
//! impl Detector for ElfDetector {
//!     fn name(&self) -> &str {
//!         "elf"
//!     }
//!
//!     fn method(&self) -> DetectionMethod {
//!         DetectionMethod::Signature
//!     }
//!
//!     fn detect(&self, probe: &Probe<'_>) -> Result<Vec<Candidate>> {
//!         if probe.header.starts_with(b"\x7fELF") {
//!             return Ok(vec![Candidate::new("elf", 0.95, DetectionMethod::Signature)
//!                 .with_evidence("ELF magic")]);
//!         }
//!         Ok(vec![])
//!     }
//! }
//! ```

mod extension;
mod signature;
mod structure;

use crate::error::{Error, Result};
use crate::plugins::PluginRegistry;
use crate::profiles::{default_profiles, ProfileDetector};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, trace, warn};

pub use extension::{ExtensionDetector, ExtensionRule};
pub use signature::{SignatureDetector, SignatureEntry};
pub use structure::{shannon_entropy, StructureDetector};

/// Number of header bytes handed to detectors by default
pub const DEFAULT_HEADER_WINDOW: usize = 512;

/// Kind of evidence a detector relies on
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    /// Leading magic bytes
    Signature,
    /// Structural heuristics over the header
    Structure,
    /// File name extension
    Extension,
    /// Engine/game generation profile
    Profile,
}

impl DetectionMethod {
    /// Tie-break rank at equal confidence; lower wins
    pub fn priority(self) -> u8 {
        match self {
            DetectionMethod::Signature => 0,
            DetectionMethod::Structure | DetectionMethod::Profile => 1,
            DetectionMethod::Extension => 2,
        }
    }

    /// Returns the lowercase method name
    pub fn as_str(self) -> &'static str {
        match self {
            DetectionMethod::Signature => "signature",
            DetectionMethod::Structure => "structure",
            DetectionMethod::Extension => "extension",
            DetectionMethod::Profile => "profile",
        }
    }
}

impl fmt::Display for DetectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// One scored hypothesis about a file's format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Stable format identifier (e.g. `png`, `wtd`, `rpf7`)
    pub format: String,
    /// Confidence on the shared 0..=1 scale
    pub confidence: f64,
    /// Method that produced this candidate
    pub method: DetectionMethod,
    /// Human-readable justification, in the order it was gathered
    pub evidence: Vec<String>,
    /// Whether a handler is known for this format above the actionable threshold
    pub can_process: bool,
    /// Compatible engine or game identifiers; empty when generic
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub games: BTreeSet<String>,
}

impl Candidate {
    /// Creates a candidate with no evidence; confidence is clamped to `[0, 1]`
    pub fn new(format: impl Into<String>, confidence: f64, method: DetectionMethod) -> Self {
        Self {
            format: format.into(),
            confidence: clamp_confidence(confidence),
            method,
            evidence: Vec::new(),
            can_process: false,
            games: BTreeSet::new(),
        }
    }

    /// Appends one line of evidence
    pub fn with_evidence(mut self, evidence: impl Into<String>) -> Self {
        self.evidence.push(evidence.into());
        self
    }

    /// Adds compatible games
    pub fn with_games<I, S>(mut self, games: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.games.extend(games.into_iter().map(Into::into));
        self
    }

    /// Sets the handler availability hint
    pub fn with_can_process(mut self, can_process: bool) -> Self {
        self.can_process = can_process;
        self
    }

    /// A candidate may only leave the engine with a format and some evidence
    pub fn is_emittable(&self) -> bool {
        !self.format.is_empty()
            && !self.evidence.is_empty()
            && (0.0..=1.0).contains(&self.confidence)
    }

    /// Total ranking order: confidence descending, then method priority,
    /// then format, evidence and games to break any remaining tie.
    pub fn rank(&self, other: &Self) -> Ordering {
        other
            .confidence
            .total_cmp(&self.confidence)
            .then_with(|| self.method.priority().cmp(&other.method.priority()))
            .then_with(|| self.method.cmp(&other.method))
            .then_with(|| self.format.cmp(&other.format))
            .then_with(|| self.evidence.cmp(&other.evidence))
            .then_with(|| self.games.cmp(&other.games))
    }
}

fn clamp_confidence(confidence: f64) -> f64 {
    if confidence.is_nan() {
        0.0
    } else {
        confidence.clamp(0.0, 1.0)
    }
}

/// Shared, read-only view of one file handed to every detector
#[derive(Debug, Clone, Copy)]
pub struct Probe<'a> {
    /// Path of the file under analysis
    pub path: &'a Path,
    /// Bounded prefix of the file contents
    pub header: &'a [u8],
    /// Full size of the file in bytes
    pub file_size: u64,
}

impl<'a> Probe<'a> {
    /// Creates a new probe
    pub fn new(path: &'a Path, header: &'a [u8], file_size: u64) -> Self {
        Self {
            path,
            header,
            file_size,
        }
    }

    /// Lowercased extension without the leading dot
    pub fn extension(&self) -> Option<String> {
        self.path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
    }

    /// The first `len` header bytes (or fewer, if the header is shorter)
    pub fn window(&self, len: usize) -> &'a [u8] {
        &self.header[..self.header.len().min(len)]
    }
}

/// A self-contained detection strategy
///
/// Detectors are pure functions of the [`Probe`]: they never re-read the
/// file and must return the same candidates for the same input.
pub trait Detector: Send + Sync {
    /// Short identifier used in logs
    fn name(&self) -> &str;

    /// Kind of evidence this detector relies on
    fn method(&self) -> DetectionMethod;

    /// Inspect the probe and return zero or more candidates
    fn detect(&self, probe: &Probe<'_>) -> Result<Vec<Candidate>>;
}

/// Output of one file's analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryResult {
    /// Analyzed file
    pub path: PathBuf,
    /// Size of the file in bytes
    pub file_size: u64,
    /// Deduplicated candidates, best first
    pub candidates: Vec<Candidate>,
    /// Head of `candidates`
    pub primary: Option<Candidate>,
    /// Detector kinds that ran without failing
    pub methods_used: BTreeSet<DetectionMethod>,
    /// Detector kinds that produced at least one candidate
    pub methods_matched: BTreeSet<DetectionMethod>,
}

impl DiscoveryResult {
    /// Returns true if no candidate survived
    pub fn is_unrecognized(&self) -> bool {
        self.candidates.is_empty()
    }
}

/// Configuration for the discovery engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Header bytes read from each file
    pub header_window: usize,
    /// Minimum confidence for a candidate to be marked processable
    pub actionable_confidence: f64,
    /// Maximum candidates to keep (0 = unlimited)
    pub max_candidates: usize,
    /// Append low-confidence placeholder candidates for weak results
    pub fallback_candidates: bool,
    /// Placeholders are added when the best confidence is below this
    pub fallback_below: f64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            header_window: DEFAULT_HEADER_WINDOW,
            actionable_confidence: 0.6,
            max_candidates: 0,
            fallback_candidates: false,
            fallback_below: 0.5,
        }
    }
}

impl DiscoveryConfig {
    /// Creates a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the header window size
    pub fn header_window(mut self, bytes: usize) -> Self {
        self.header_window = bytes;
        self
    }

    /// Sets the actionable confidence threshold
    pub fn actionable_confidence(mut self, confidence: f64) -> Self {
        self.actionable_confidence = confidence;
        self
    }

    /// Sets the maximum number of candidates to keep
    pub fn max_candidates(mut self, max: usize) -> Self {
        self.max_candidates = max;
        self
    }

    /// Enables placeholder candidates when nothing scores `fallback_below`
    /// or higher
    pub fn fallback_candidates(mut self, enabled: bool) -> Self {
        self.fallback_candidates = enabled;
        self
    }

    /// Sets the confidence below which placeholders are added
    pub fn fallback_below(mut self, confidence: f64) -> Self {
        self.fallback_below = confidence;
        self
    }
}

/// Runs every registered detector against a file and ranks the results
pub struct DiscoveryEngine {
    detectors: Vec<Box<dyn Detector>>,
    config: DiscoveryConfig,
    handlers: Option<Arc<PluginRegistry>>,
}

impl Default for DiscoveryEngine {
    fn default() -> Self {
        Self::with_default_detectors()
    }
}

impl fmt::Debug for DiscoveryEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscoveryEngine")
            .field("detectors", &self.detector_names())
            .field("config", &self.config)
            .field("handlers", &self.handlers.is_some())
            .finish()
    }
}

impl DiscoveryEngine {
    /// Creates an engine with no detectors
    pub fn new() -> Self {
        Self {
            detectors: Vec::new(),
            config: DiscoveryConfig::default(),
            handlers: None,
        }
    }

    /// Creates an engine with the built-in signature, structure, extension
    /// and engine profile detectors
    pub fn with_default_detectors() -> Self {
        let mut engine = Self::new();
        engine
            .register(SignatureDetector::default())
            .register(StructureDetector::default())
            .register(ExtensionDetector::default());
        for profile in default_profiles() {
            engine.register(ProfileDetector::new(profile));
        }
        engine
    }

    /// Creates an engine whose tables and extra detectors come from the
    /// loaded plugins. Handler availability is resolved against the registry.
    ///
    /// Rebuild the engine after a plugin reload; it snapshots the tables.
    pub fn from_registry(registry: Arc<PluginRegistry>, config: DiscoveryConfig) -> Self {
        let tables = registry.format_tables();

        let mut signatures = SignatureDetector::default();
        signatures.extend_from_tables(&tables);
        let mut extensions = ExtensionDetector::default();
        extensions.extend_from_tables(&tables);

        let mut engine = Self::new().with_config(config);
        engine
            .register(signatures)
            .register(StructureDetector::default())
            .register(extensions);
        for profile in default_profiles() {
            engine.register(ProfileDetector::new(profile));
        }
        for detector in registry.detectors() {
            engine.register_boxed(detector);
        }
        engine.handlers = Some(registry);
        engine
    }

    /// Replaces the configuration
    pub fn with_config(mut self, config: DiscoveryConfig) -> Self {
        self.config = config;
        self
    }

    /// Returns the active configuration
    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    /// Registers a detector
    pub fn register<D: Detector + 'static>(&mut self, detector: D) -> &mut Self {
        self.register_boxed(Box::new(detector))
    }

    /// Registers an already boxed detector
    pub fn register_boxed(&mut self, detector: Box<dyn Detector>) -> &mut Self {
        self.detectors.push(detector);
        self
    }

    /// Names of the registered detectors, in registration order
    pub fn detector_names(&self) -> Vec<&str> {
        self.detectors.iter().map(|d| d.name()).collect()
    }

    /// Reads the header window of `path` and runs all detectors on it
    ///
    /// Fails only if the file cannot be read.
    pub fn discover(&self, path: impl AsRef<Path>) -> Result<DiscoveryResult> {
        let path = path.as_ref();
        let (header, file_size) = read_header(path, self.config.header_window)?;
        Ok(self.discover_header(path, &header, file_size))
    }

    /// Runs all detectors against an already-read header
    pub fn discover_header(&self, path: &Path, header: &[u8], file_size: u64) -> DiscoveryResult {
        let probe = Probe::new(path, header, file_size);
        let mut collected = Vec::new();
        let mut methods_used = BTreeSet::new();
        let mut methods_matched = BTreeSet::new();

        for detector in &self.detectors {
            match detector.detect(&probe) {
                Ok(candidates) => {
                    methods_used.insert(detector.method());
                    let before = collected.len();
                    for candidate in candidates {
                        let candidate = normalize(candidate);
                        if candidate.is_emittable() {
                            trace!(
                                "{} proposed {} ({:.2}) for {}",
                                detector.name(),
                                candidate.format,
                                candidate.confidence,
                                path.display()
                            );
                            collected.push(candidate);
                        } else {
                            trace!(
                                "Dropping evidence-free candidate '{}' from {}",
                                candidate.format,
                                detector.name()
                            );
                        }
                    }
                    if collected.len() > before {
                        methods_matched.insert(detector.method());
                    }
                }
                Err(e) => {
                    warn!(
                        "Detector {} failed on {}: {}",
                        detector.name(),
                        path.display(),
                        e
                    );
                }
            }
        }

        let mut candidates = merge_candidates(collected);
        let weak = candidates
            .first()
            .map_or(true, |c| c.confidence < self.config.fallback_below);
        if self.config.fallback_candidates && weak {
            candidates.extend(placeholder_candidates(file_size));
            candidates = merge_candidates(candidates);
        }
        for candidate in &mut candidates {
            candidate.can_process = self.is_actionable(candidate);
        }
        if self.config.max_candidates > 0 {
            candidates.truncate(self.config.max_candidates);
        }

        debug!(
            "Discovery of {}: {} candidate(s), primary {:?}",
            path.display(),
            candidates.len(),
            candidates.first().map(|c| c.format.as_str())
        );

        DiscoveryResult {
            path: path.to_path_buf(),
            file_size,
            primary: candidates.first().cloned(),
            candidates,
            methods_used,
            methods_matched,
        }
    }

    fn is_actionable(&self, candidate: &Candidate) -> bool {
        if candidate.confidence < self.config.actionable_confidence {
            return false;
        }
        match &self.handlers {
            Some(registry) => {
                let game = candidate.games.iter().next().map(String::as_str);
                registry.find_handler(&candidate.format, game).is_some()
            }
            None => candidate.can_process,
        }
    }
}

/// Generic guesses for files no detector recognized with confidence
fn placeholder_candidates(file_size: u64) -> Vec<Candidate> {
    let mut placeholders = Vec::with_capacity(2);
    if file_size > 100 {
        placeholders.push(
            Candidate::new("unknown_rage", 0.3, DetectionMethod::Structure)
                .with_evidence("file size and structure suggest a RAGE engine format")
                .with_games(["rage_engine"]),
        );
    }
    placeholders.push(
        Candidate::new("binary_data", 0.2, DetectionMethod::Structure)
            .with_evidence("raw binary data, format unknown"),
    );
    placeholders
}

fn normalize(mut candidate: Candidate) -> Candidate {
    candidate.confidence = clamp_confidence(candidate.confidence);
    candidate
}

/// Collapses candidates sharing a format to the best-ranked one and sorts
/// the survivors best first.
pub fn merge_candidates(candidates: Vec<Candidate>) -> Vec<Candidate> {
    let mut best: HashMap<String, Candidate> = HashMap::new();
    for candidate in candidates {
        let better = best
            .get(&candidate.format)
            .map_or(true, |existing| candidate.rank(existing) == Ordering::Less);
        if better {
            best.insert(candidate.format.clone(), candidate);
        }
    }

    let mut merged: Vec<Candidate> = best.into_values().collect();
    merged.sort_by(|a, b| a.rank(b));
    merged
}

/// Reads at most `window` bytes from the start of `path` and the file size
pub(crate) fn read_header(path: &Path, window: usize) -> Result<(Vec<u8>, u64)> {
    let file = File::open(path).map_err(|e| Error::file_read(path, e))?;
    let file_size = file
        .metadata()
        .map_err(|e| Error::file_read(path, e))?
        .len();

    let mut header = Vec::with_capacity(window.min(file_size as usize));
    file.take(window as u64)
        .read_to_end(&mut header)
        .map_err(|e| Error::file_read(path, e))?;

    Ok((header, file_size))
}

/// Lowercase hex rendering of a byte string
pub(crate) fn hex_string(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use tempfile::NamedTempFile;

    struct FixedDetector {
        name: &'static str,
        method: DetectionMethod,
        output: Vec<Candidate>,
    }

    impl Detector for FixedDetector {
        fn name(&self) -> &str {
            self.name
        }

        fn method(&self) -> DetectionMethod {
            self.method
        }

        fn detect(&self, _probe: &Probe<'_>) -> Result<Vec<Candidate>> {
            Ok(self.output.clone())
        }
    }

    struct FailingDetector;

    impl Detector for FailingDetector {
        fn name(&self) -> &str {
            "failing"
        }

        fn method(&self) -> DetectionMethod {
            DetectionMethod::Structure
        }

        fn detect(&self, _probe: &Probe<'_>) -> Result<Vec<Candidate>> {
            Err(Error::detector("failing", "corrupt header"))
        }
    }

    fn fixed(name: &'static str, method: DetectionMethod, output: Vec<Candidate>) -> FixedDetector {
        FixedDetector {
            name,
            method,
            output,
        }
    }

    #[test]
    fn test_png_signature_is_primary() {
        let engine = DiscoveryEngine::with_default_detectors();
        let result = engine.discover_header(Path::new("blob.bin"), b"\x89PNG", 4);

        let primary = result.primary.expect("png should be recognized");
        assert_eq!(primary.format, "png");
        assert!(primary.confidence >= 0.9);
        assert_eq!(primary.method, DetectionMethod::Signature);
    }

    #[test]
    fn test_json_extension_fallback() {
        let engine = DiscoveryEngine::with_default_detectors();
        let result = engine.discover_header(Path::new("settings.json"), b"\x01\x02", 2);

        let primary = result.primary.expect("json should be recognized");
        assert_eq!(primary.format, "json");
        assert_eq!(primary.method, DetectionMethod::Extension);
        assert!((primary.confidence - 0.95).abs() < 1e-9);
    }

    #[test]
    fn test_dedup_keeps_highest_confidence() {
        let mut engine = DiscoveryEngine::new();
        engine
            .register(fixed(
                "low",
                DetectionMethod::Extension,
                vec![Candidate::new("wtd", 0.5, DetectionMethod::Extension).with_evidence("ext")],
            ))
            .register(fixed(
                "high",
                DetectionMethod::Signature,
                vec![Candidate::new("wtd", 0.95, DetectionMethod::Signature).with_evidence("magic")],
            ));

        let result = engine.discover_header(Path::new("a.wtd"), b"WTD\0", 4);
        assert_eq!(result.candidates.len(), 1);
        assert_eq!(result.candidates[0].confidence, 0.95);
        assert_eq!(result.candidates[0].method, DetectionMethod::Signature);
    }

    #[test]
    fn test_tie_broken_by_method_priority() {
        let merged = merge_candidates(vec![
            Candidate::new("a", 0.8, DetectionMethod::Extension).with_evidence("x"),
            Candidate::new("b", 0.8, DetectionMethod::Signature).with_evidence("y"),
            Candidate::new("c", 0.8, DetectionMethod::Profile).with_evidence("z"),
        ]);
        let formats: Vec<_> = merged.iter().map(|c| c.format.as_str()).collect();
        assert_eq!(formats, vec!["b", "c", "a"]);
    }

    #[test]
    fn test_order_independent() {
        let detectors = || {
            vec![
                fixed(
                    "one",
                    DetectionMethod::Extension,
                    vec![Candidate::new("wtd", 0.7, DetectionMethod::Extension).with_evidence("ext")],
                ),
                fixed(
                    "two",
                    DetectionMethod::Profile,
                    vec![
                        Candidate::new("wtd", 0.7, DetectionMethod::Profile).with_evidence("gta iv"),
                        Candidate::new("texture", 0.6, DetectionMethod::Profile).with_evidence("t"),
                    ],
                ),
                fixed(
                    "three",
                    DetectionMethod::Structure,
                    vec![Candidate::new("texture", 0.6, DetectionMethod::Structure).with_evidence("dims")],
                ),
            ]
        };

        let mut forward = DiscoveryEngine::new();
        for d in detectors() {
            forward.register(d);
        }
        let mut reversed = DiscoveryEngine::new();
        for d in detectors().into_iter().rev() {
            reversed.register(d);
        }

        let path = Path::new("x.wtd");
        let a = forward.discover_header(path, b"", 0);
        let b = reversed.discover_header(path, b"", 0);
        assert_eq!(a.candidates, b.candidates);
        assert_eq!(a, forward.discover_header(path, b"", 0));
    }

    #[test]
    fn test_candidate_invariants_hold_for_arbitrary_headers() {
        let engine = DiscoveryEngine::with_default_detectors();
        let headers: Vec<Vec<u8>> = vec![
            vec![],
            vec![0; 4],
            (0..=255u8).collect(),
            b"RPF7\x00\x00\x00\x00\x10\x00\x00\x00 padding padding padding".to_vec(),
            vec![0xff; 512],
            b"\x00\x01\x00\x01\x00\x00\x80\x3fMP3_data".to_vec(),
        ];
        for header in headers {
            let result =
                engine.discover_header(Path::new("unknown"), &header, header.len() as u64 * 100);
            for candidate in &result.candidates {
                assert!((0.0..=1.0).contains(&candidate.confidence));
                assert!(!candidate.evidence.is_empty());
            }
        }
    }

    #[test]
    fn test_evidence_free_and_out_of_range_candidates() {
        let mut engine = DiscoveryEngine::new();
        engine.register(fixed(
            "sloppy",
            DetectionMethod::Structure,
            vec![
                Candidate::new("silent", 0.9, DetectionMethod::Structure),
                Candidate {
                    confidence: 7.5,
                    ..Candidate::new("loud", 0.0, DetectionMethod::Structure).with_evidence("x")
                },
            ],
        ));

        let result = engine.discover_header(Path::new("f"), b"", 0);
        assert_eq!(result.candidates.len(), 1);
        assert_eq!(result.candidates[0].format, "loud");
        assert_eq!(result.candidates[0].confidence, 1.0);
    }

    #[test]
    fn test_failing_detector_is_isolated() {
        let mut engine = DiscoveryEngine::new();
        engine.register(FailingDetector).register(fixed(
            "ok",
            DetectionMethod::Signature,
            vec![Candidate::new("zip", 0.9, DetectionMethod::Signature).with_evidence("PK")],
        ));

        let result = engine.discover_header(Path::new("f.zip"), b"PK\x03\x04", 4);
        assert_eq!(result.primary.map(|c| c.format), Some("zip".to_string()));
        assert!(!result.methods_used.contains(&DetectionMethod::Structure));
        assert!(result.methods_matched.contains(&DetectionMethod::Signature));
    }

    #[test]
    fn test_empty_file_recognized_by_extension_only() {
        let mut file = tempfile::Builder::new().suffix(".xml").tempfile().unwrap();
        file.flush().unwrap();

        let engine = DiscoveryEngine::with_default_detectors();
        let result = engine.discover(file.path()).unwrap();
        assert_eq!(result.file_size, 0);
        assert!(result
            .candidates
            .iter()
            .all(|c| c.method == DetectionMethod::Extension));
        assert_eq!(result.primary.map(|c| c.format), Some("xml".to_string()));
    }

    #[test]
    fn test_discover_reads_bounded_header() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"\x89PNG\r\n\x1a\n").unwrap();
        file.write_all(&vec![0u8; 4096]).unwrap();
        file.flush().unwrap();

        let engine = DiscoveryEngine::with_default_detectors()
            .with_config(DiscoveryConfig::new().header_window(16));
        let result = engine.discover(file.path()).unwrap();
        assert_eq!(result.file_size, 4096 + 8);
        assert_eq!(result.primary.unwrap().format, "png");
    }

    #[test]
    fn test_unreadable_file_is_an_error() {
        let engine = DiscoveryEngine::with_default_detectors();
        let err = engine
            .discover("/definitely/not/here.wtd")
            .expect_err("missing file must fail");
        assert!(matches!(err, Error::FileRead { .. }));
    }

    #[test]
    fn test_max_candidates() {
        let engine = DiscoveryEngine::with_default_detectors()
            .with_config(DiscoveryConfig::new().max_candidates(1));
        let result = engine.discover_header(Path::new("tex.wtd"), b"WTD\0RSC\0\0\0\0\0\0\0\0\0", 4096);
        assert_eq!(result.candidates.len(), 1);
    }

    #[test]
    fn test_profile_hits_gated_by_actionable_confidence() {
        let mut engine = DiscoveryEngine::new();
        engine.register(ProfileDetector::new(Arc::new(crate::profiles::GtaIv)));
        let header = [0u8; 16];

        // The GTA IV extension fallback scores 0.6
        let result = engine.discover_header(Path::new("tex.wtd"), &header, 4096);
        let primary = result.primary.unwrap();
        assert_eq!(primary.format, "wtd");
        assert!(primary.can_process);

        let strict = engine.with_config(DiscoveryConfig::new().actionable_confidence(0.9));
        let result = strict.discover_header(Path::new("tex.wtd"), &header, 4096);
        assert!(!result.primary.unwrap().can_process);
    }

    #[test]
    fn test_fallback_candidates_are_opt_in() {
        let header = [0u8; 64];
        let blob = Path::new("blob");
        assert!(DiscoveryEngine::new()
            .discover_header(blob, &header, 4096)
            .is_unrecognized());

        let fallback = DiscoveryConfig::new().fallback_candidates(true);
        let engine = DiscoveryEngine::new().with_config(fallback.clone());
        let result = engine.discover_header(blob, &header, 4096);
        let formats: Vec<&str> = result.candidates.iter().map(|c| c.format.as_str()).collect();
        assert_eq!(formats, vec!["unknown_rage", "binary_data"]);
        assert!(result.candidates.iter().all(|c| !c.can_process));

        // Small files only get the generic placeholder
        let result = engine.discover_header(blob, &header, 64);
        assert_eq!(result.primary.map(|c| c.format), Some("binary_data".to_string()));

        let mut weak = DiscoveryEngine::new().with_config(fallback.clone());
        weak.register(fixed(
            "weak",
            DetectionMethod::Structure,
            vec![Candidate::new("mystery", 0.4, DetectionMethod::Structure).with_evidence("hunch")],
        ));
        let result = weak.discover_header(blob, &header, 4096);
        let formats: Vec<&str> = result.candidates.iter().map(|c| c.format.as_str()).collect();
        assert_eq!(formats, vec!["mystery", "unknown_rage", "binary_data"]);

        let mut confident = DiscoveryEngine::new().with_config(fallback);
        confident.register(fixed(
            "sig",
            DetectionMethod::Signature,
            vec![Candidate::new("png", 0.99, DetectionMethod::Signature).with_evidence("magic")],
        ));
        let result = confident.discover_header(blob, &header, 4096);
        assert_eq!(result.candidates.len(), 1);
    }

    #[test]
    fn test_hex_string() {
        assert_eq!(hex_string(b"\x89PNG"), "89504e47");
        assert_eq!(hex_string(&[]), "");
    }
}
