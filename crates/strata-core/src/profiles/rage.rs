//! Built-in RAGE engine generation profiles.
//!
//! Every profile first looks for its signatures within a small leading
//! window, then falls back to a single structural observation.

use super::{EngineProfile, ProfileMatch};
use crate::discovery::Probe;
use crate::error::Result;

/// Signatures searched for anywhere in the first `window` header bytes
struct SignatureTable {
    window: usize,
    confidence: f64,
    /// (token, description, suggested format)
    entries: &'static [(&'static [u8], &'static str, &'static str)],
}

impl SignatureTable {
    fn find(&self, profile: &str, probe: &Probe<'_>) -> Option<ProfileMatch> {
        let window = probe.window(self.window);
        self.entries
            .iter()
            .find(|(token, _, _)| contains(window, token))
            .map(|(_, description, format)| {
                ProfileMatch::new(
                    profile,
                    self.confidence,
                    format!("signature: {}", description),
                    format,
                )
            })
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    !needle.is_empty() && haystack.windows(needle.len()).any(|w| w == needle)
}

/// Max Payne 3 (RAGE 1.2)
#[derive(Debug, Clone, Copy, Default)]
pub struct MaxPayne3;

impl MaxPayne3 {
    const SIGNATURES: SignatureTable = SignatureTable {
        window: 8,
        confidence: 0.9,
        entries: &[
            (b"MP3H", "MP3 Header", "max_payne_3_header"),
            (b"MP3T", "MP3 Texture", "max_payne_3_texture"),
            (b"MP3M", "MP3 Model", "max_payne_3_model"),
        ],
    };
}

impl EngineProfile for MaxPayne3 {
    fn name(&self) -> &str {
        "max_payne_3"
    }

    fn display_name(&self) -> &str {
        "Max Payne 3"
    }

    fn analyze(&self, probe: &Probe<'_>) -> Result<ProfileMatch> {
        if let Some(m) = Self::SIGNATURES.find(self.name(), probe) {
            return Ok(m);
        }

        let window = probe.window(64);
        if contains(window, b"\0\0\0\0MP3") || window.get(4..8) == Some(&b"MP3_"[..]) {
            return Ok(ProfileMatch::new(
                self.name(),
                0.7,
                "structure: MP3 asset tag".to_string(),
                "max_payne_3_asset",
            ));
        }
        Ok(ProfileMatch::none(self.name()))
    }
}

/// GTA IV (RAGE 1.0)
#[derive(Debug, Clone, Copy, Default)]
pub struct GtaIv;

impl GtaIv {
    const SIGNATURES: SignatureTable = SignatureTable {
        window: 12,
        confidence: 0.85,
        entries: &[
            (b"IVB\0", "IV Binary", "gta_iv_binary"),
            (b"IVT\0", "IV Texture", "gta_iv_texture"),
            (b"IVM\0", "IV Model", "gta_iv_model"),
            (b"RAGEIV", "RAGE IV Header", "gta_iv_header"),
        ],
    };

    const EXTENSIONS: &'static [&'static str] = &["wtd", "wdr", "wft", "wbn"];
}

impl EngineProfile for GtaIv {
    fn name(&self) -> &str {
        "gta_iv"
    }

    fn display_name(&self) -> &str {
        "GTA IV"
    }

    fn analyze(&self, probe: &Probe<'_>) -> Result<ProfileMatch> {
        if let Some(m) = Self::SIGNATURES.find(self.name(), probe) {
            return Ok(m);
        }

        if let Some(ext) = probe.extension() {
            if Self::EXTENSIONS.contains(&ext.as_str()) {
                return Ok(ProfileMatch::new(
                    self.name(),
                    0.6,
                    format!("extension: .{}", ext),
                    &ext,
                ));
            }
        }
        Ok(ProfileMatch::none(self.name()))
    }
}

/// Midnight Club 3 (RAGE 0.5)
#[derive(Debug, Clone, Copy, Default)]
pub struct MidnightClub3;

impl MidnightClub3 {
    const SIGNATURES: SignatureTable = SignatureTable {
        window: 16,
        confidence: 0.8,
        entries: &[
            (b"MC3", "MC3 Header", "midnight_club_3_header"),
            (b"RACECAR", "Vehicle Data", "midnight_club_3_vehicle"),
            (b"TRACK", "Track Data", "midnight_club_3_track"),
        ],
    };

    const SIZE_RANGE: std::ops::RangeInclusive<u64> = 1024..=10 * 1024 * 1024;
}

impl EngineProfile for MidnightClub3 {
    fn name(&self) -> &str {
        "midnight_club_3"
    }

    fn display_name(&self) -> &str {
        "Midnight Club 3"
    }

    fn analyze(&self, probe: &Probe<'_>) -> Result<ProfileMatch> {
        if let Some(m) = Self::SIGNATURES.find(self.name(), probe) {
            return Ok(m);
        }

        let compressed = probe.header.starts_with(b"\x78\x9c") || probe.header.starts_with(b"\x1f\x8b");
        if compressed && Self::SIZE_RANGE.contains(&probe.file_size) {
            return Ok(ProfileMatch::new(
                self.name(),
                0.5,
                "structure: compressed asset of typical size".to_string(),
                "midnight_club_3_compressed",
            ));
        }
        Ok(ProfileMatch::none(self.name()))
    }
}

/// Red Dead Redemption (RAGE 1.3)
#[derive(Debug, Clone, Copy, Default)]
pub struct RedDeadRedemption;

impl RedDeadRedemption {
    const SIGNATURES: SignatureTable = SignatureTable {
        window: 16,
        confidence: 0.95,
        entries: &[
            (b"RDR1", "RDR Header", "red_dead_redemption_header"),
            (b"RDRT", "RDR Texture", "red_dead_redemption_texture"),
            (b"RDRM", "RDR Model", "red_dead_redemption_model"),
            (b"WEST", "Western Asset", "red_dead_redemption_asset"),
        ],
    };
}

impl EngineProfile for RedDeadRedemption {
    fn name(&self) -> &str {
        "red_dead_redemption"
    }

    fn display_name(&self) -> &str {
        "Red Dead Redemption"
    }

    fn analyze(&self, probe: &Probe<'_>) -> Result<ProfileMatch> {
        if let Some(m) = Self::SIGNATURES.find(self.name(), probe) {
            return Ok(m);
        }

        // 1.0f and 2.0f as little-endian floats
        if contains(probe.header, b"\x00\x00\x80\x3f") || contains(probe.header, b"\x00\x00\x00\x40") {
            return Ok(ProfileMatch::new(
                self.name(),
                0.7,
                "structure: world-space float constants".to_string(),
                "red_dead_redemption_world_data",
            ));
        }
        Ok(ProfileMatch::none(self.name()))
    }
}

/// GTA V (RAGE 1.8)
#[derive(Debug, Clone, Copy, Default)]
pub struct GtaV;

impl GtaV {
    const SIGNATURES: SignatureTable = SignatureTable {
        window: 8,
        confidence: 0.9,
        entries: &[
            (b"RPF7", "RPF7 Archive", "rpf7"),
            (b"YDR\0", "Drawable", "ydr"),
            (b"YDD\0", "Drawable Dictionary", "ydd"),
            (b"YFT\0", "Fragment", "yft"),
        ],
    };
}

impl EngineProfile for GtaV {
    fn name(&self) -> &str {
        "gta_v"
    }

    fn display_name(&self) -> &str {
        "GTA V"
    }

    fn analyze(&self, probe: &Probe<'_>) -> Result<ProfileMatch> {
        Ok(Self::SIGNATURES
            .find(self.name(), probe)
            .unwrap_or_else(|| ProfileMatch::none(self.name())))
    }
}
