//! Magic-number detection.

use super::{hex_string, Candidate, DetectionMethod, Detector, Probe};
use crate::error::Result;
use crate::plugins::FormatTables;

/// Generation identifiers used for game compatibility sets
const GTA_IV: &str = "gta_iv";
const RDR: &str = "red_dead_redemption";
const GTA_V: &str = "gta_v";
const RDR2: &str = "red_dead_redemption_2";

/// A single magic-number rule
#[derive(Debug, Clone, PartialEq)]
pub struct SignatureEntry {
    /// Leading bytes that identify the format
    pub magic: Vec<u8>,
    /// Format identifier emitted on a match
    pub format: String,
    /// Human-readable format name
    pub label: String,
    /// Compatible games
    pub games: Vec<String>,
    /// Confidence of a match
    pub confidence: f64,
}

impl SignatureEntry {
    /// Creates a new entry with the default signature confidence
    pub fn new(magic: &[u8], format: &str, label: &str) -> Self {
        Self {
            magic: magic.to_vec(),
            format: format.to_string(),
            label: label.to_string(),
            games: Vec::new(),
            confidence: SignatureDetector::DEFAULT_CONFIDENCE,
        }
    }

    /// Sets the compatible games
    pub fn games(mut self, games: &[&str]) -> Self {
        self.games = games.iter().map(|g| g.to_string()).collect();
        self
    }

    /// Sets the match confidence
    pub fn confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }
}

/// Matches the header prefix against a table of magic numbers
#[derive(Debug, Clone)]
pub struct SignatureDetector {
    entries: Vec<SignatureEntry>,
}

impl Default for SignatureDetector {
    fn default() -> Self {
        let entries = vec![
            // Common container and image formats
            SignatureEntry::new(b"\x89PNG", "png", "PNG image").confidence(0.99),
            SignatureEntry::new(b"\xff\xd8\xff", "jpg", "JPEG image").confidence(0.98),
            SignatureEntry::new(b"DDS ", "dds", "DirectDraw Surface"),
            SignatureEntry::new(b"BM", "bmp", "Bitmap image").confidence(0.85),
            SignatureEntry::new(b"RIFF", "riff", "RIFF container").confidence(0.85),
            SignatureEntry::new(b"PK\x03\x04", "zip", "ZIP archive"),
            SignatureEntry::new(b"<?xml", "xml", "XML document").confidence(0.9),
            // RAGE archives and resources
            SignatureEntry::new(b"RPF6", "rpf6", "RAGE package file v6").games(&[GTA_IV, RDR]),
            SignatureEntry::new(b"RPF7", "rpf7", "RAGE package file v7").games(&[GTA_V, RDR2]),
            SignatureEntry::new(b"WTD\0", "wtd", "Texture dictionary").games(&[GTA_IV, RDR]),
            SignatureEntry::new(b"YTD\0", "ytd", "Texture dictionary").games(&[GTA_V, RDR2]),
            SignatureEntry::new(b"WDR\0", "wdr", "Drawable").games(&[GTA_IV]),
            SignatureEntry::new(b"WVD\0", "wvd", "Visual dictionary").games(&[RDR]),
            SignatureEntry::new(b"YDR\0", "ydr", "Drawable").games(&[GTA_V, RDR2]),
            SignatureEntry::new(b"WFT\0", "wft", "Fragment").games(&[GTA_IV, RDR]),
            SignatureEntry::new(b"YFT\0", "yft", "Fragment").games(&[GTA_V, RDR2]),
            SignatureEntry::new(b"WDD\0", "wdd", "Drawable dictionary").games(&[RDR]),
            SignatureEntry::new(b"YDD\0", "ydd", "Drawable dictionary").games(&[GTA_V, RDR2]),
            SignatureEntry::new(b"WMAP", "wmap", "Map data").games(&[RDR]),
            SignatureEntry::new(b"YMAP", "ymap", "Map data").games(&[GTA_V, RDR2]),
            SignatureEntry::new(b"YTYP", "ytyp", "Archetype definitions").games(&[GTA_V, RDR2]),
            SignatureEntry::new(b"RSC", "rage_resource", "RAGE resource")
                .games(&[GTA_IV, RDR, GTA_V, RDR2]),
            SignatureEntry::new(b"RSD", "rsd", "RAGE resource data")
                .games(&[GTA_IV, RDR, GTA_V, RDR2]),
        ];
        Self { entries }
    }
}

impl SignatureDetector {
    /// Confidence of a magic-number match unless the entry overrides it
    pub const DEFAULT_CONFIDENCE: f64 = 0.95;

    /// Creates a detector with an empty table
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Adds an entry
    pub fn push(&mut self, entry: SignatureEntry) {
        self.entries.push(entry);
    }

    /// Returns the table
    pub fn entries(&self) -> &[SignatureEntry] {
        &self.entries
    }

    /// Adds the magic numbers contributed by plugins
    ///
    /// Pairs already present in the table are left untouched.
    pub fn extend_from_tables(&mut self, tables: &FormatTables) {
        for (magic, format) in &tables.magic_numbers {
            if magic.is_empty()
                || self
                    .entries
                    .iter()
                    .any(|e| e.magic == *magic && e.format == *format)
            {
                continue;
            }
            let info = tables.formats.get(format);
            self.entries.push(SignatureEntry {
                magic: magic.clone(),
                format: format.clone(),
                label: info.map_or_else(|| format.clone(), |i| i.name.clone()),
                games: info.map(|i| i.games.clone()).unwrap_or_default(),
                confidence: info.map_or(Self::DEFAULT_CONFIDENCE, |i| i.confidence),
            });
        }
    }
}

impl Detector for SignatureDetector {
    fn name(&self) -> &str {
        "signature"
    }

    fn method(&self) -> DetectionMethod {
        DetectionMethod::Signature
    }

    fn detect(&self, probe: &Probe<'_>) -> Result<Vec<Candidate>> {
        let hits = self
            .entries
            .iter()
            .filter(|e| !e.magic.is_empty() && probe.header.starts_with(&e.magic))
            .map(|e| {
                Candidate::new(e.format.clone(), e.confidence, DetectionMethod::Signature)
                    .with_evidence(format!(
                        "magic number {} ({})",
                        hex_string(&e.magic),
                        e.label
                    ))
                    .with_games(e.games.iter().cloned())
                    .with_can_process(true)
            })
            .collect();
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::FormatInfo;
    use std::path::Path;

    fn detect(header: &[u8]) -> Vec<Candidate> {
        SignatureDetector::default()
            .detect(&Probe::new(Path::new("f"), header, header.len() as u64))
            .unwrap()
    }

    #[test]
    fn test_rage_magic_carries_games() {
        let hits = detect(b"YDR\0\x01\x02");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].format, "ydr");
        assert!(hits[0].games.contains("gta_v"));
        assert_eq!(hits[0].evidence[0], "magic number 59445200 (Drawable)");
    }

    #[test]
    fn test_no_match_on_empty_header() {
        assert!(detect(b"").is_empty());
        assert!(detect(b"\x89PN").is_empty());
    }

    #[test]
    fn test_extend_from_tables() {
        let mut tables = FormatTables::default();
        tables.magic_numbers.insert(b"GIF8".to_vec(), "gif".to_string());
        tables.formats.insert(
            "gif".to_string(),
            FormatInfo {
                name: "GIF image".to_string(),
                confidence: 0.9,
                ..FormatInfo::default()
            },
        );

        let mut detector = SignatureDetector::default();
        let before = detector.entries().len();
        detector.extend_from_tables(&tables);
        detector.extend_from_tables(&tables);
        assert_eq!(detector.entries().len(), before + 1);

        let hits = detector
            .detect(&Probe::new(Path::new("x"), b"GIF89a", 6))
            .unwrap();
        assert_eq!(hits[0].format, "gif");
        assert_eq!(hits[0].confidence, 0.9);
    }
}
