//! Plugins compiled into the crate.

use super::{FormatInfo, FormatTables, Plugin, PluginDescriptor};
use crate::discovery::{Candidate, DetectionMethod, Detector, Probe};
use crate::error::{Error, Result};
use std::collections::BTreeMap;

fn info(name: &str, magic: &[u8], extensions: &[&str], games: &[&str], confidence: f64) -> FormatInfo {
    FormatInfo {
        name: name.to_string(),
        magic: magic.to_vec(),
        extensions: extensions.iter().map(|e| e.to_string()).collect(),
        games: games.iter().map(|g| g.to_string()).collect(),
        structure: String::new(),
        confidence,
    }
}

/// Common non-engine formats every other plugin may rely on
#[derive(Debug, Clone, Copy, Default)]
pub struct BaseFormatsPlugin;

impl BaseFormatsPlugin {
    const FORMATS: &'static [&'static str] = &["dds", "png", "jpg", "xml", "json", "txt"];
}

impl Plugin for BaseFormatsPlugin {
    fn descriptor(&self) -> PluginDescriptor {
        PluginDescriptor {
            name: "Base Format Support".to_string(),
            version: "1.0.0".to_string(),
            author: "strata".to_string(),
            description: "Common image, text and markup formats".to_string(),
            games: Vec::new(),
            formats: Self::FORMATS.iter().map(|f| f.to_string()).collect(),
            base: true,
        }
    }

    fn format_database(&self) -> BTreeMap<String, FormatInfo> {
        BTreeMap::from([
            ("dds".to_string(), info("DirectDraw Surface", b"DDS ", &[".dds"], &[], 0.95)),
            ("png".to_string(), info("PNG image", b"\x89PNG", &[".png"], &[], 0.99)),
            ("jpg".to_string(), info("JPEG image", b"\xff\xd8\xff", &[".jpg", ".jpeg"], &[], 0.98)),
            ("xml".to_string(), info("XML document", b"<?xml", &[".xml"], &[], 0.9)),
            ("json".to_string(), info("JSON document", b"{", &[".json"], &[], 0.95)),
            ("txt".to_string(), info("Text file", b"", &[".txt"], &[], 0.8)),
        ])
    }

    fn can_handle(&self, format: &str, _game: Option<&str>) -> bool {
        Self::FORMATS.iter().any(|f| f.eq_ignore_ascii_case(format))
    }
}

const GTA_IV: &str = "gta_iv";
const RDR: &str = "red_dead_redemption";
const GTA_V: &str = "gta_v";
const RDR2: &str = "red_dead_redemption_2";

/// RAGE archive and resource formats across engine generations
#[derive(Debug, Clone, Default)]
pub struct RageDiscoveryPlugin {
    texture_target: Option<String>,
}

impl RageDiscoveryPlugin {
    /// Format texture dictionaries are exported to
    pub fn texture_target(&self) -> Option<&str> {
        self.texture_target.as_deref()
    }
}

impl Plugin for RageDiscoveryPlugin {
    fn descriptor(&self) -> PluginDescriptor {
        PluginDescriptor {
            name: "RAGE Discovery".to_string(),
            version: "3.0.0".to_string(),
            author: "strata".to_string(),
            description: "RAGE archives, resources and generation detection".to_string(),
            games: vec![
                GTA_IV.to_string(),
                RDR.to_string(),
                GTA_V.to_string(),
                RDR2.to_string(),
            ],
            formats: self.format_database().into_keys().collect(),
            base: false,
        }
    }

    fn format_database(&self) -> BTreeMap<String, FormatInfo> {
        let all = [GTA_IV, RDR, GTA_V, RDR2];
        BTreeMap::from([
            ("rpf6".to_string(), info("RAGE package file v6", b"RPF6", &[".rpf"], &[GTA_IV, RDR], 0.95)),
            ("rpf7".to_string(), info("RAGE package file v7", b"RPF7", &[".rpf"], &[GTA_V, RDR2], 0.95)),
            ("wtd".to_string(), info("Texture dictionary", b"WTD\0", &[".wtd"], &[GTA_IV, RDR], 0.95)),
            ("ytd".to_string(), info("Texture dictionary", b"YTD\0", &[".ytd"], &[GTA_V, RDR2], 0.95)),
            ("wdr".to_string(), info("Drawable", b"WDR\0", &[".wdr"], &[GTA_IV], 0.95)),
            ("wvd".to_string(), info("Visual dictionary", b"WVD\0", &[".wvd"], &[RDR], 0.95)),
            ("ydr".to_string(), info("Drawable", b"YDR\0", &[".ydr"], &[GTA_V, RDR2], 0.95)),
            ("wft".to_string(), info("Fragment", b"WFT\0", &[".wft"], &[GTA_IV, RDR], 0.95)),
            ("yft".to_string(), info("Fragment", b"YFT\0", &[".yft"], &[GTA_V, RDR2], 0.95)),
            ("wdd".to_string(), info("Drawable dictionary", b"WDD\0", &[".wdd"], &[RDR], 0.95)),
            ("ydd".to_string(), info("Drawable dictionary", b"YDD\0", &[".ydd"], &[GTA_V, RDR2], 0.95)),
            ("wmap".to_string(), info("Map data", b"WMAP", &[".wmap"], &[RDR], 0.95)),
            ("ymap".to_string(), info("Map data", b"YMAP", &[".ymap"], &[GTA_V, RDR2], 0.95)),
            ("ytyp".to_string(), info("Archetype definitions", b"YTYP", &[".ytyp"], &[GTA_V, RDR2], 0.95)),
            ("rage_resource".to_string(), info("RAGE resource", b"RSC", &[], &all, 0.95)),
            ("rsd".to_string(), info("RAGE resource data", b"RSD", &[".rsd"], &all, 0.95)),
        ])
    }

    fn can_handle(&self, format: &str, game: Option<&str>) -> bool {
        let db = self.format_database();
        let Some(entry) = db.get(&format.to_ascii_lowercase()) else {
            return false;
        };
        game.map_or(true, |g| entry.games.iter().any(|eg| eg.eq_ignore_ascii_case(g)))
    }

    fn initialize(&mut self, tables: &FormatTables) -> Result<()> {
        if !tables.provides("dds") {
            return Err(Error::plugin_load(
                "RAGE Discovery",
                "texture export target 'dds' is not provided by a base plugin",
            ));
        }
        self.texture_target = Some("dds".to_string());
        Ok(())
    }

    fn detectors(&self) -> Vec<Box<dyn Detector>> {
        vec![Box::new(RageEraDetector::default())]
    }
}

/// Scores a file against the format families of each RAGE era
#[derive(Debug, Clone)]
pub struct RageEraDetector {
    eras: Vec<(&'static str, Vec<&'static [u8]>)>,
}

impl Default for RageEraDetector {
    fn default() -> Self {
        Self {
            eras: vec![
                (GTA_IV, vec![&b"RPF6"[..], b"WTD\0", b"WDR\0", b"WFT\0"]),
                (RDR, vec![&b"RPF6"[..], b"WVD\0", b"WTD\0", b"WFT\0", b"WDD\0", b"WMAP"]),
                (GTA_V, vec![&b"RPF6"[..], b"RPF7", b"YTD\0", b"YDR\0", b"YFT\0", b"YDD\0", b"YMAP", b"YTYP"]),
                (RDR2, vec![&b"RPF7"[..], b"YTD\0", b"YDR\0", b"YFT\0", b"YDD\0", b"YMAP", b"YTYP"]),
            ],
        }
    }
}

impl Detector for RageEraDetector {
    fn name(&self) -> &str {
        "rage_era"
    }

    fn method(&self) -> DetectionMethod {
        DetectionMethod::Profile
    }

    fn detect(&self, probe: &Probe<'_>) -> Result<Vec<Candidate>> {
        let mut candidates = Vec::new();
        for (era, magics) in &self.eras {
            let matched: Vec<String> = magics
                .iter()
                .filter(|m| probe.header.starts_with(m))
                .map(|m| String::from_utf8_lossy(m).trim_end_matches('\0').to_string())
                .collect();
            if matched.is_empty() {
                continue;
            }

            let confidence = (0.3 + 0.1 * matched.len() as f64).min(0.8);
            candidates.push(
                Candidate::new(format!("rage_{}_era", era), confidence, DetectionMethod::Profile)
                    .with_evidence(format!("matches {} era formats: {}", era, matched.join(", ")))
                    .with_games([*era])
                    .with_can_process(confidence > 0.5),
            );
        }
        Ok(candidates)
    }
}
