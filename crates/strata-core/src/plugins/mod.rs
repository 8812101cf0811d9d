//! Plugin modules and the registry that loads them.
//!
//! A plugin contributes format knowledge (a format database and magic
//! numbers), optional extra [`Detector`]s, and claims the formats it can
//! process. Plugins come from two sources:
//!
//! - built-in plugins compiled into the crate
//! - JSON manifests found in plugin directories
//!
//! Base plugins are always initialized before the others, so a plugin
//! may depend on formats a base plugin provides.

mod builtin;
mod manifest;
mod registry;

pub use builtin::{BaseFormatsPlugin, RageDiscoveryPlugin, RageEraDetector};
pub use manifest::ManifestPlugin;
pub use registry::{BuiltinPlugin, LoadReport, PluginHandle, PluginRegistry, PluginSource};

use crate::discovery::Detector;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Metadata describing a plugin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginDescriptor {
    /// Unique plugin name
    pub name: String,
    /// Plugin version
    pub version: String,
    /// Author
    #[serde(default)]
    pub author: String,
    /// Short description
    #[serde(default)]
    pub description: String,
    /// Games this plugin explicitly supports
    #[serde(default)]
    pub games: Vec<String>,
    /// Formats this plugin handles
    #[serde(default)]
    pub formats: Vec<String>,
    /// Whether the plugin must load before all others
    #[serde(default)]
    pub base: bool,
}

impl PluginDescriptor {
    /// Returns true if the plugin explicitly lists `game`
    pub fn supports_game(&self, game: &str) -> bool {
        self.games.iter().any(|g| g.eq_ignore_ascii_case(game))
    }

    /// Returns true if the plugin lists `format`
    pub fn supports_format(&self, format: &str) -> bool {
        self.formats.iter().any(|f| f.eq_ignore_ascii_case(format))
    }
}

/// One entry of a plugin's format database
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormatInfo {
    /// Human-readable name
    pub name: String,
    /// Leading magic bytes, hex-encoded in manifests
    #[serde(with = "hex_bytes", skip_serializing_if = "Vec::is_empty")]
    pub magic: Vec<u8>,
    /// File extensions, with or without the leading dot
    pub extensions: Vec<String>,
    /// Compatible games
    pub games: Vec<String>,
    /// Free-form layout description
    pub structure: String,
    /// Confidence of a magic match on the shared 0..=1 scale
    pub confidence: f64,
}

/// Merged format knowledge of every loaded plugin
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormatTables {
    /// Format database keyed by format identifier
    pub formats: BTreeMap<String, FormatInfo>,
    /// Magic bytes to format identifier
    pub magic_numbers: BTreeMap<Vec<u8>, String>,
}

impl FormatTables {
    /// Merges a plugin's contribution; later plugins override earlier ones
    pub fn merge(&mut self, plugin: &dyn Plugin) {
        for (format, info) in plugin.format_database() {
            if !info.magic.is_empty() {
                self.magic_numbers.insert(info.magic.clone(), format.clone());
            }
            self.formats.insert(format, info);
        }
        self.magic_numbers.extend(plugin.magic_numbers());
    }

    /// Returns true if some loaded plugin provides `format`
    pub fn provides(&self, format: &str) -> bool {
        self.formats.contains_key(format)
    }
}

/// A unit of format knowledge and processing capability
pub trait Plugin: Send + Sync {
    /// Plugin metadata
    fn descriptor(&self) -> PluginDescriptor;

    /// Formats this plugin knows about
    fn format_database(&self) -> BTreeMap<String, FormatInfo> {
        BTreeMap::new()
    }

    /// Magic numbers beyond those in the format database
    fn magic_numbers(&self) -> BTreeMap<Vec<u8>, String> {
        BTreeMap::new()
    }

    /// Whether this plugin can process `format`, optionally for one game
    fn can_handle(&self, format: &str, game: Option<&str>) -> bool;

    /// Called once with the tables of all plugins loaded before this one
    fn initialize(&mut self, tables: &FormatTables) -> Result<()> {
        let _ = tables;
        Ok(())
    }

    /// Extra detectors contributed to discovery
    fn detectors(&self) -> Vec<Box<dyn Detector>> {
        Vec::new()
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&crate::discovery::hex_string(bytes))
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        super::decode_hex(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid hex byte string '{}'", s)))
    }
}

/// Decodes a hex byte string such as `89504e47`; whitespace is ignored
pub(crate) fn decode_hex(s: &str) -> Option<Vec<u8>> {
    let digits: Vec<u8> = s.bytes().filter(|b| !b.is_ascii_whitespace()).collect();
    if digits.len() % 2 != 0 {
        return None;
    }
    digits
        .chunks(2)
        .map(|pair| {
            let pair = std::str::from_utf8(pair).ok()?;
            u8::from_str_radix(pair, 16).ok()
        })
        .collect()
}
