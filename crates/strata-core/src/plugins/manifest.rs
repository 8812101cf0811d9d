//! Plugins declared by JSON manifests.
//!
//! A manifest looks like:
//!
//! ```json
//! {
//!   "plugin": {
//!     "name": "Particle Support",
//!     "version": "1.0.0",
//!     "games": ["gta_v"],
//!     "formats": ["ypt"]
//!   },
//!   "formats": {
//!     "ypt": { "name": "Particle dictionary", "magic": "59505400", "extensions": [".ypt"], "confidence": 0.9 }
//!   },
//!   "magic_numbers": { "59505400": "ypt" },
//!   "requires_formats": ["dds"]
//! }
//! ```
//!
//! A file without a `plugin` section is not a plugin and is skipped.

use super::{decode_hex, FormatInfo, FormatTables, Plugin, PluginDescriptor};
use crate::error::{Error, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct ManifestFile {
    plugin: Option<PluginDescriptor>,
    #[serde(default)]
    formats: BTreeMap<String, FormatInfo>,
    #[serde(default)]
    magic_numbers: BTreeMap<String, String>,
    #[serde(default)]
    requires_formats: Vec<String>,
}

/// A plugin loaded from a JSON manifest
#[derive(Debug, Clone)]
pub struct ManifestPlugin {
    descriptor: PluginDescriptor,
    formats: BTreeMap<String, FormatInfo>,
    magic_numbers: BTreeMap<Vec<u8>, String>,
    requires_formats: Vec<String>,
}

impl ManifestPlugin {
    /// Parses a manifest
    ///
    /// Returns `Ok(None)` if the document has no `plugin` section.
    pub fn parse(source_name: &str, data: &[u8]) -> Result<Option<Self>> {
        let file: ManifestFile = serde_json::from_slice(data)
            .map_err(|e| Error::plugin_load(source_name, e.to_string()))?;
        let Some(descriptor) = file.plugin else {
            return Ok(None);
        };
        if descriptor.name.trim().is_empty() {
            return Err(Error::plugin_load(source_name, "plugin name is empty"));
        }

        let mut magic_numbers = BTreeMap::new();
        for (hex, format) in file.magic_numbers {
            let bytes = decode_hex(&hex).filter(|b| !b.is_empty()).ok_or_else(|| {
                Error::plugin_load(source_name, format!("invalid magic number '{}'", hex))
            })?;
            magic_numbers.insert(bytes, format);
        }

        Ok(Some(Self {
            descriptor,
            formats: file.formats,
            magic_numbers,
            requires_formats: file.requires_formats,
        }))
    }

    /// Reads and parses a manifest file
    pub fn from_path(path: &Path) -> Result<Option<Self>> {
        let data = std::fs::read(path).map_err(|e| Error::file_read(path, e))?;
        Self::parse(&path.display().to_string(), &data)
    }

    /// Formats that must be provided by previously loaded plugins
    pub fn requires_formats(&self) -> &[String] {
        &self.requires_formats
    }
}

/// Decides whether a manifest declares a base plugin
///
/// An explicit `plugin.base` flag wins. Otherwise a file whose name
/// contains `base_format` is treated as a base plugin.
pub(crate) fn is_base_manifest(path: &Path, data: &[u8]) -> bool {
    let explicit = serde_json::from_slice::<serde_json::Value>(data)
        .ok()
        .and_then(|v| v.pointer("/plugin/base").and_then(|b| b.as_bool()));
    explicit.unwrap_or_else(|| {
        path.file_name()
            .and_then(|n| n.to_str())
            .map_or(false, |n| n.to_ascii_lowercase().contains("base_format"))
    })
}

impl Plugin for ManifestPlugin {
    fn descriptor(&self) -> PluginDescriptor {
        self.descriptor.clone()
    }

    fn format_database(&self) -> BTreeMap<String, FormatInfo> {
        self.formats.clone()
    }

    fn magic_numbers(&self) -> BTreeMap<Vec<u8>, String> {
        self.magic_numbers.clone()
    }

    fn can_handle(&self, format: &str, game: Option<&str>) -> bool {
        let knows_format =
            self.descriptor.supports_format(format) || self.formats.contains_key(format);
        knows_format && game.map_or(true, |g| self.descriptor.supports_game(g))
    }

    fn initialize(&mut self, tables: &FormatTables) -> Result<()> {
        if let Some(missing) = self.requires_formats.iter().find(|f| !tables.provides(f)) {
            return Err(Error::plugin_load(
                &self.descriptor.name,
                format!("required format '{}' is not provided by any loaded plugin", missing),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const MANIFEST: &str = r#"{
        "plugin": {"name": "Particles", "version": "1.0.0", "games": ["gta_v"], "formats": ["ypt"]},
        "formats": {"ypt": {"name": "Particle dictionary", "extensions": [".ypt"], "confidence": 0.9}},
        "magic_numbers": {"59505400": "ypt"},
        "requires_formats": ["dds"]
    }"#;

    #[test]
    fn test_parse_manifest() {
        let plugin = ManifestPlugin::parse("p.json", MANIFEST.as_bytes())
            .unwrap()
            .unwrap();
        assert_eq!(plugin.descriptor().name, "Particles");
        assert_eq!(plugin.magic_numbers().get(&b"YPT\0".to_vec()), Some(&"ypt".to_string()));
        assert!(plugin.can_handle("ypt", Some("gta_v")));
        assert!(plugin.can_handle("ypt", None));
        assert!(!plugin.can_handle("ypt", Some("gta_iv")));
        assert!(!plugin.can_handle("wtd", None));
    }

    #[test]
    fn test_not_a_plugin() {
        assert!(ManifestPlugin::parse("x.json", br#"{"formats": {}}"#)
            .unwrap()
            .is_none());
        assert!(ManifestPlugin::parse("x.json", b"[1, 2").is_err());
    }

    #[test]
    fn test_required_formats() {
        let mut plugin = ManifestPlugin::parse("p.json", MANIFEST.as_bytes())
            .unwrap()
            .unwrap();
        let mut tables = FormatTables::default();
        assert!(plugin.initialize(&tables).is_err());

        tables.formats.insert("dds".to_string(), FormatInfo::default());
        assert!(plugin.initialize(&tables).is_ok());
    }

    #[test]
    fn test_base_classification() {
        let flagged = br#"{"plugin": {"name": "a", "version": "1", "base": true}}"#;
        let unflagged = br#"{"plugin": {"name": "a", "version": "1"}}"#;
        let denied = br#"{"plugin": {"name": "a", "version": "1", "base": false}}"#;

        assert!(is_base_manifest(&PathBuf::from("x.json"), flagged));
        assert!(!is_base_manifest(&PathBuf::from("x.json"), unflagged));
        assert!(is_base_manifest(&PathBuf::from("my_base_formats.json"), unflagged));
        assert!(!is_base_manifest(&PathBuf::from("my_base_formats.json"), denied));
    }
}
