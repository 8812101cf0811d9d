//! Structural heuristics over the header window.
//!
//! Each check is weak on its own, so every emitted candidate names the
//! exact observations that produced it.

use super::{Candidate, DetectionMethod, Detector, Probe};
use crate::error::Result;

/// Headers shorter than this carry too little structure to judge
const MIN_HEADER: usize = 8;

/// One structural observation; returns evidence when it holds
type Check = fn(&[u8]) -> Option<String>;

/// A family of related structural checks
struct PatternFamily {
    format: &'static str,
    base_confidence: f64,
    games: &'static [&'static str],
    checks: &'static [Check],
}

const PATTERN_FAMILIES: &[PatternFamily] = &[
    PatternFamily {
        format: "possible_archive",
        base_confidence: 0.7,
        games: &["gta_iv", "red_dead_redemption", "gta_v"],
        checks: &[archive_entry_count, archive_flags],
    },
    PatternFamily {
        format: "possible_texture",
        base_confidence: 0.6,
        games: &["gta_iv", "red_dead_redemption", "gta_v"],
        checks: &[texture_format_code, texture_mip_marker],
    },
    PatternFamily {
        format: "possible_model",
        base_confidence: 0.65,
        games: &["gta_iv", "red_dead_redemption", "gta_v"],
        checks: &[model_vertex_count, model_face_count],
    },
    PatternFamily {
        format: "possible_fragment",
        base_confidence: 0.55,
        games: &["gta_iv", "red_dead_redemption"],
        checks: &[fragment_part_count, fragment_unit_float],
    },
];

fn read_u32_le(data: &[u8], offset: usize) -> Option<u32> {
    let bytes = data.get(offset..offset.checked_add(4)?)?;
    Some(u32::from_le_bytes(bytes.try_into().ok()?))
}

fn read_u16_le(data: &[u8], offset: usize) -> Option<u16> {
    let bytes = data.get(offset..offset.checked_add(2)?)?;
    Some(u16::from_le_bytes(bytes.try_into().ok()?))
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    !needle.is_empty() && haystack.windows(needle.len()).any(|w| w == needle)
}

fn archive_entry_count(data: &[u8]) -> Option<String> {
    if data.len() <= 24 {
        return None;
    }
    let count = read_u32_le(data, 8)?;
    (count < 1_000_000).then(|| format!("plausible entry count {} at 0x08", count))
}

fn archive_flags(data: &[u8]) -> Option<String> {
    let flags = data.get(4..8)?;
    matches!(flags, [0, 0, 0, 0] | [1, 0, 0, 0]).then(|| "archive flag word at 0x04".to_string())
}

fn texture_format_code(data: &[u8]) -> Option<String> {
    if data.len() <= 16 {
        return None;
    }
    let code = read_u32_le(data, 0)?;
    matches!(code, 0 | 8 | 0x10 | 0x20).then(|| format!("texture format code {:#x}", code))
}

fn texture_mip_marker(data: &[u8]) -> Option<String> {
    (contains(data, b"\x00\x00\x00\x01") || contains(data, b"\x00\x00\x00\x02"))
        .then(|| "mipmap level marker".to_string())
}

fn model_vertex_count(data: &[u8]) -> Option<String> {
    if data.len() <= 32 {
        return None;
    }
    let count = read_u32_le(data, 4)?;
    (count > 0 && count < 100_000).then(|| format!("plausible vertex count {}", count))
}

fn model_face_count(data: &[u8]) -> Option<String> {
    if data.len() <= 40 {
        return None;
    }
    let count = read_u32_le(data, 8)?;
    (count > 0 && count < 500_000).then(|| format!("plausible face count {}", count))
}

fn fragment_part_count(data: &[u8]) -> Option<String> {
    if data.len() <= 20 {
        return None;
    }
    let count = read_u32_le(data, 4)?;
    (count < 10_000).then(|| format!("plausible fragment part count {}", count))
}

fn fragment_unit_float(data: &[u8]) -> Option<String> {
    let window = &data[..data.len().min(100)];
    contains(window, b"\x00\x00\x80\x3f").then(|| "float 1.0 near the header".to_string())
}

/// Normalized Shannon entropy of `data` in `[0, 1]`
///
/// Empty input has zero entropy.
pub fn shannon_entropy(data: &[u8]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let mut counts = [0usize; 256];
    for &b in data {
        counts[b as usize] += 1;
    }
    let len = data.len() as f64;
    let bits: f64 = counts
        .iter()
        .filter(|&&c| c > 0)
        .map(|&c| {
            let p = c as f64 / len;
            -p * p.log2()
        })
        .sum();
    (bits / 8.0).clamp(0.0, 1.0)
}

/// Heuristic detector for RAGE resource tokens, texture dimensions,
/// asset layout families and entropy class
#[derive(Debug, Clone)]
pub struct StructureDetector {
    high_entropy: f64,
    low_entropy: f64,
}

impl Default for StructureDetector {
    fn default() -> Self {
        Self {
            high_entropy: 0.85,
            low_entropy: 0.3,
        }
    }
}

impl StructureDetector {
    fn rage_resource(&self, header: &[u8]) -> Option<Candidate> {
        if header.len() < 16 {
            return None;
        }
        let token = [&b"RSC"[..], b"WVD", b"WTD"]
            .into_iter()
            .find(|t| contains(header, t))?;
        Some(
            Candidate::new("rage_resource", 0.7, DetectionMethod::Structure)
                .with_evidence(format!(
                    "RAGE token '{}' in header",
                    String::from_utf8_lossy(token)
                ))
                .with_can_process(true),
        )
    }

    fn texture_dimensions(&self, header: &[u8]) -> Option<Candidate> {
        let width = read_u16_le(header, 0)?;
        let height = read_u16_le(header, 2)?;
        let plausible = |d: u16| (16..=8192).contains(&d);
        (plausible(width) && plausible(height)).then(|| {
            Candidate::new("raw_texture", 0.6, DetectionMethod::Structure)
                .with_evidence(format!("plausible texture dimensions {}x{}", width, height))
        })
    }

    fn pattern_families(&self, header: &[u8]) -> Vec<Candidate> {
        PATTERN_FAMILIES
            .iter()
            .filter_map(|family| {
                let evidence: Vec<String> =
                    family.checks.iter().filter_map(|check| check(header)).collect();
                if evidence.is_empty() {
                    return None;
                }
                let score =
                    family.base_confidence * evidence.len() as f64 / family.checks.len() as f64;
                let mut candidate = Candidate::new(family.format, score, DetectionMethod::Structure)
                    .with_games(family.games.iter().copied())
                    .with_can_process(score > 0.6);
                candidate.evidence = evidence;
                Some(candidate)
            })
            .collect()
    }

    fn entropy_class(&self, header: &[u8], file_size: u64) -> Option<Candidate> {
        let entropy = shannon_entropy(header);
        if entropy > self.high_entropy && file_size > 1000 {
            Some(
                Candidate::new("compressed_data", 0.75, DetectionMethod::Structure)
                    .with_evidence(format!("high header entropy {:.2}", entropy)),
            )
        } else if entropy < self.low_entropy && file_size > 100 {
            Some(
                Candidate::new("structured_binary", 0.65, DetectionMethod::Structure)
                    .with_evidence(format!("low header entropy {:.2}", entropy)),
            )
        } else {
            None
        }
    }
}

impl Detector for StructureDetector {
    fn name(&self) -> &str {
        "structure"
    }

    fn method(&self) -> DetectionMethod {
        DetectionMethod::Structure
    }

    fn detect(&self, probe: &Probe<'_>) -> Result<Vec<Candidate>> {
        let header = probe.header;
        if header.len() < MIN_HEADER {
            return Ok(Vec::new());
        }

        let mut candidates = Vec::new();
        candidates.extend(self.rage_resource(header));
        candidates.extend(self.texture_dimensions(header));
        candidates.extend(self.pattern_families(header));
        candidates.extend(self.entropy_class(header, probe.file_size));
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn detect(header: &[u8], size: u64) -> Vec<Candidate> {
        StructureDetector::default()
            .detect(&Probe::new(Path::new("f"), header, size))
            .unwrap()
    }

    fn find<'a>(candidates: &'a [Candidate], format: &str) -> Option<&'a Candidate> {
        candidates.iter().find(|c| c.format == format)
    }

    #[test]
    fn test_short_header_abstains() {
        assert!(detect(b"RSC\0\0\0\0", 7).is_empty());
    }

    #[test]
    fn test_rage_token() {
        let hits = detect(b"\0\0\0\0RSC\x05\0\0\0\0\0\0\0\0\0\0", 17);
        let rage = find(&hits, "rage_resource").expect("token should be found");
        assert_eq!(rage.confidence, 0.7);
        assert!(rage.evidence[0].contains("RSC"));
    }

    #[test]
    fn test_texture_dimensions() {
        let mut header = vec![0u8; 12];
        header[0..2].copy_from_slice(&256u16.to_le_bytes());
        header[2..4].copy_from_slice(&512u16.to_le_bytes());
        let hits = detect(&header, 12);
        let tex = find(&hits, "raw_texture").unwrap();
        assert_eq!(tex.evidence[0], "plausible texture dimensions 256x512");

        header[0..2].copy_from_slice(&9000u16.to_le_bytes());
        assert!(find(&detect(&header, 12), "raw_texture").is_none());
    }

    #[test]
    fn test_archive_family_scores_by_fraction() {
        let mut header = vec![0xAAu8; 32];
        header[4..8].copy_from_slice(&[1, 0, 0, 0]);
        header[8..12].copy_from_slice(&42u32.to_le_bytes());
        let hits = detect(&header, 32);
        let archive = find(&hits, "possible_archive").unwrap();
        assert!((archive.confidence - 0.7).abs() < 1e-9);
        assert_eq!(archive.evidence.len(), 2);
        assert!(archive.can_process);

        header[4] = 7;
        let hits = detect(&header, 32);
        let archive = find(&hits, "possible_archive").unwrap();
        assert!((archive.confidence - 0.35).abs() < 1e-9);
        assert!(!archive.can_process);
    }

    #[test]
    fn test_entropy() {
        assert_eq!(shannon_entropy(&[]), 0.0);
        assert_eq!(shannon_entropy(&[7; 64]), 0.0);
        let all: Vec<u8> = (0..=255).collect();
        assert!((shannon_entropy(&all) - 1.0).abs() < 1e-9);

        let hits = detect(&all, 10_000);
        assert!(find(&hits, "compressed_data").is_some());

        let hits = detect(&[0x41; 64], 500);
        assert!(find(&hits, "structured_binary").is_some());
        assert!(find(&detect(&[0x41; 64], 64), "structured_binary").is_none());
    }
}
