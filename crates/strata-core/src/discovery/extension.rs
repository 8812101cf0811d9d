//! File-extension detection.

use super::{Candidate, DetectionMethod, Detector, Probe};
use crate::error::Result;
use crate::plugins::FormatTables;
use std::collections::BTreeMap;

/// Confidence used for extensions learned from plugin tables
const PLUGIN_EXTENSION_CONFIDENCE: f64 = 0.5;

/// What an extension claims about a file
#[derive(Debug, Clone, PartialEq)]
pub struct ExtensionRule {
    /// Format identifier emitted on a match
    pub format: String,
    /// Human-readable format name
    pub label: String,
    /// Confidence of the claim
    pub confidence: f64,
    /// Compatible games
    pub games: Vec<String>,
}

impl ExtensionRule {
    fn new(format: &str, label: &str, confidence: f64) -> Self {
        Self {
            format: format.to_string(),
            label: label.to_string(),
            confidence,
            games: Vec::new(),
        }
    }
}

/// Maps lowercased extensions to format claims
#[derive(Debug, Clone)]
pub struct ExtensionDetector {
    rules: BTreeMap<String, ExtensionRule>,
}

impl Default for ExtensionDetector {
    fn default() -> Self {
        let table = [
            ("txt", ExtensionRule::new("txt", "Text file", 0.95)),
            ("xml", ExtensionRule::new("xml", "XML document", 0.95)),
            ("json", ExtensionRule::new("json", "JSON document", 0.95)),
            ("png", ExtensionRule::new("png", "PNG image", 0.9)),
            ("jpg", ExtensionRule::new("jpg", "JPEG image", 0.9)),
            ("jpeg", ExtensionRule::new("jpg", "JPEG image", 0.9)),
            ("bmp", ExtensionRule::new("bmp", "Bitmap image", 0.9)),
            ("tga", ExtensionRule::new("tga", "Targa image", 0.85)),
            ("dds", ExtensionRule::new("dds", "DirectDraw Surface", 0.8)),
            // RAGE extensions are reused across generations with different layouts
            ("wvd", ExtensionRule::new("wvd", "Visual dictionary", 0.5)),
            ("wtd", ExtensionRule::new("wtd", "Texture dictionary", 0.5)),
            ("wft", ExtensionRule::new("wft", "Fragment", 0.5)),
            ("wdr", ExtensionRule::new("wdr", "Drawable", 0.5)),
            ("ytd", ExtensionRule::new("ytd", "Texture dictionary", 0.5)),
            ("ydr", ExtensionRule::new("ydr", "Drawable", 0.5)),
            ("yft", ExtensionRule::new("yft", "Fragment", 0.5)),
            ("ydd", ExtensionRule::new("ydd", "Drawable dictionary", 0.5)),
        ];
        Self {
            rules: table
                .into_iter()
                .map(|(ext, rule)| (ext.to_string(), rule))
                .collect(),
        }
    }
}

impl ExtensionDetector {
    /// Creates a detector with no rules
    pub fn empty() -> Self {
        Self {
            rules: BTreeMap::new(),
        }
    }

    /// Adds or replaces the rule for `extension` (with or without the dot)
    pub fn insert(&mut self, extension: &str, rule: ExtensionRule) {
        self.rules.insert(normalize_extension(extension), rule);
    }

    /// Returns the rule for `extension`
    pub fn rule(&self, extension: &str) -> Option<&ExtensionRule> {
        self.rules.get(&normalize_extension(extension))
    }

    /// Adds extensions declared in plugin format tables
    ///
    /// Built-in rules win over plugin-declared ones.
    pub fn extend_from_tables(&mut self, tables: &FormatTables) {
        for (format, info) in &tables.formats {
            for ext in &info.extensions {
                let key = normalize_extension(ext);
                if key.is_empty() || self.rules.contains_key(&key) {
                    continue;
                }
                self.rules.insert(
                    key,
                    ExtensionRule {
                        format: format.clone(),
                        label: info.name.clone(),
                        confidence: info.confidence.min(PLUGIN_EXTENSION_CONFIDENCE),
                        games: info.games.clone(),
                    },
                );
            }
        }
    }
}

fn normalize_extension(extension: &str) -> String {
    extension.trim_start_matches('.').to_ascii_lowercase()
}

impl Detector for ExtensionDetector {
    fn name(&self) -> &str {
        "extension"
    }

    fn method(&self) -> DetectionMethod {
        DetectionMethod::Extension
    }

    fn detect(&self, probe: &Probe<'_>) -> Result<Vec<Candidate>> {
        let Some(ext) = probe.extension() else {
            return Ok(Vec::new());
        };
        let Some(rule) = self.rules.get(&ext) else {
            return Ok(Vec::new());
        };

        Ok(vec![Candidate::new(
            rule.format.clone(),
            rule.confidence,
            DetectionMethod::Extension,
        )
        .with_evidence(format!("file extension .{} ({})", ext, rule.label))
        .with_games(rule.games.iter().cloned())])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::FormatInfo;
    use std::path::Path;

    fn detect(name: &str) -> Vec<Candidate> {
        ExtensionDetector::default()
            .detect(&Probe::new(Path::new(name), b"", 0))
            .unwrap()
    }

    #[test]
    fn test_case_insensitive() {
        let hits = detect("PHOTO.JPEG");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].format, "jpg");
        assert_eq!(hits[0].confidence, 0.9);
    }

    #[test]
    fn test_unknown_or_missing_extension() {
        assert!(detect("README").is_empty());
        assert!(detect("data.bin").is_empty());
    }

    #[test]
    fn test_plugin_extensions_do_not_override() {
        let mut tables = FormatTables::default();
        tables.formats.insert(
            "ypt".to_string(),
            FormatInfo {
                name: "Particle dictionary".to_string(),
                extensions: vec![".ypt".to_string(), ".png".to_string()],
                confidence: 0.9,
                ..FormatInfo::default()
            },
        );

        let mut detector = ExtensionDetector::default();
        detector.extend_from_tables(&tables);
        assert_eq!(detector.rule(".ypt").unwrap().confidence, 0.5);
        assert_eq!(detector.rule("png").unwrap().format, "png");
    }
}
