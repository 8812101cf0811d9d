//! Plugin registry with base-first loading and hot reload.

use super::manifest::{is_base_manifest, ManifestPlugin};
use super::{BaseFormatsPlugin, FormatTables, Plugin, PluginDescriptor, RageDiscoveryPlugin};
use crate::discovery::Detector;
use crate::error::{Error, Result};
use parking_lot::RwLock;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Shared handle to a loaded plugin
pub type PluginHandle = Arc<dyn Plugin>;

/// A plugin compiled into the crate
#[derive(Clone, Copy)]
pub struct BuiltinPlugin {
    /// Identifier used in logs
    pub id: &'static str,
    /// Whether the plugin loads in the base phase
    pub base: bool,
    /// Creates a fresh instance
    pub factory: fn() -> Box<dyn Plugin>,
}

impl fmt::Debug for BuiltinPlugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuiltinPlugin")
            .field("id", &self.id)
            .field("base", &self.base)
            .finish()
    }
}

/// Where a loaded plugin came from
#[derive(Debug, Clone)]
pub enum PluginSource {
    /// Compiled into the crate
    Builtin(BuiltinPlugin),
    /// Declared by a JSON manifest
    Manifest(PathBuf),
}

impl PluginSource {
    fn label(&self) -> String {
        match self {
            PluginSource::Builtin(b) => format!("builtin:{}", b.id),
            PluginSource::Manifest(path) => path.display().to_string(),
        }
    }
}

/// Outcome of a [`PluginRegistry::load`] call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    /// Names of plugins loaded, in load order
    pub loaded: Vec<String>,
    /// Sources that were not plugins
    pub skipped: Vec<String>,
    /// Sources that failed, with the reason
    pub failed: Vec<String>,
}

struct Entry {
    descriptor: PluginDescriptor,
    handle: PluginHandle,
    source: PluginSource,
    fingerprint: Option<blake3::Hash>,
}

struct Pending {
    source: PluginSource,
    base: bool,
    bytes: Option<Vec<u8>>,
}

/// Name-indexed set of loaded plugins
///
/// Reads (`get`, `list`, `find_handler`) may run concurrently. `load` and
/// `reload` hold the write lock for their whole duration, so concurrent
/// callers never observe a half-loaded registry.
pub struct PluginRegistry {
    builtins: Vec<BuiltinPlugin>,
    entries: RwLock<Vec<Entry>>,
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.list().into_iter().map(|d| d.name).collect();
        f.debug_struct("PluginRegistry")
            .field("builtins", &self.builtins)
            .field("loaded", &names)
            .finish()
    }
}

impl PluginRegistry {
    /// Creates a registry without built-in plugins
    pub fn new() -> Self {
        Self {
            builtins: Vec::new(),
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Creates a registry that also loads the crate's built-in plugins
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry
            .register_builtin(BuiltinPlugin {
                id: "base_formats",
                base: true,
                factory: || Box::new(BaseFormatsPlugin),
            })
            .register_builtin(BuiltinPlugin {
                id: "rage_discovery",
                base: false,
                factory: || Box::new(RageDiscoveryPlugin::default()),
            });
        registry
    }

    /// Adds a built-in plugin to be instantiated on the next load
    pub fn register_builtin(&mut self, builtin: BuiltinPlugin) -> &mut Self {
        self.builtins.push(builtin);
        self
    }

    /// Loads built-in plugins and every `*.json` manifest directly inside
    /// `directories`
    ///
    /// Base plugins are initialized first, then the rest. Within each
    /// phase, built-ins come first, then manifests in directory order and
    /// by file name. A failing source is logged and skipped. A plugin
    /// with the same name as an already loaded one replaces it.
    pub fn load<P: AsRef<Path>>(&self, directories: &[P]) -> LoadReport {
        let mut report = LoadReport::default();
        let mut pending: Vec<Pending> = self
            .builtins
            .iter()
            .map(|b| Pending {
                source: PluginSource::Builtin(*b),
                base: b.base,
                bytes: None,
            })
            .collect();

        for dir in directories {
            pending.extend(scan_directory(dir.as_ref(), &mut report));
        }

        // Stable: keeps discovery order within each phase
        pending.sort_by_key(|p| !p.base);

        let mut entries = self.entries.write();
        for item in pending {
            let label = item.source.label();
            match instantiate(&item, &entries) {
                Ok(Some(entry)) => {
                    info!(
                        "Loaded plugin {} v{} from {}",
                        entry.descriptor.name, entry.descriptor.version, label
                    );
                    report.loaded.push(entry.descriptor.name.clone());
                    upsert(&mut entries, entry);
                }
                Ok(None) => {
                    debug!("{} has no plugin section, skipping", label);
                    report.skipped.push(label);
                }
                Err(e) => {
                    warn!("Failed to load plugin from {}: {}", label, e);
                    report.failed.push(format!("{}: {}", label, e));
                }
            }
        }

        info!("{} plugin(s) registered", entries.len());
        report
    }

    /// Returns the plugin named `name`
    pub fn get(&self, name: &str) -> Option<PluginHandle> {
        self.entries
            .read()
            .iter()
            .find(|e| e.descriptor.name == name)
            .map(|e| Arc::clone(&e.handle))
    }

    /// Descriptors of all loaded plugins, in load order
    pub fn list(&self) -> Vec<PluginDescriptor> {
        self.entries
            .read()
            .iter()
            .map(|e| e.descriptor.clone())
            .collect()
    }

    /// Number of loaded plugins
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if no plugin is loaded
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Re-instantiates the plugin named `name` from the source it was loaded from
    ///
    /// On failure the previous instance stays registered and the error is
    /// returned.
    pub fn reload(&self, name: &str) -> Result<()> {
        let mut entries = self.entries.write();
        let index = entries
            .iter()
            .position(|e| e.descriptor.name == name)
            .ok_or_else(|| Error::UnknownPlugin(name.to_string()))?;

        let source = entries[index].source.clone();
        let bytes = match &source {
            PluginSource::Manifest(path) => {
                Some(std::fs::read(path).map_err(|e| Error::file_read(path, e))?)
            }
            PluginSource::Builtin(_) => None,
        };
        let item = Pending {
            base: entries[index].descriptor.base,
            source,
            bytes,
        };

        // The plugin sees the tables of everything loaded before it
        let entry = instantiate(&item, &entries[..index])?.ok_or_else(|| {
            Error::plugin_load(item.source.label(), "manifest no longer declares a plugin")
        })?;
        if entry.descriptor.name != name {
            return Err(Error::plugin_load(
                item.source.label(),
                format!("plugin was renamed to '{}'", entry.descriptor.name),
            ));
        }

        let unchanged = entries[index].fingerprint.is_some()
            && entries[index].fingerprint == entry.fingerprint;
        info!(
            "Reloaded plugin {} v{}{}",
            entry.descriptor.name,
            entry.descriptor.version,
            if unchanged { " (unchanged)" } else { "" }
        );
        entries[index] = entry;
        Ok(())
    }

    /// Finds a plugin able to process `format`
    ///
    /// With a game, plugins explicitly listing that game are tried first.
    /// Otherwise, or if none of them claims the format, the first plugin
    /// claiming the format alone wins.
    pub fn find_handler(&self, format: &str, game: Option<&str>) -> Option<PluginHandle> {
        let entries = self.entries.read();
        let game_specific = game.and_then(|g| {
            entries
                .iter()
                .find(|e| e.descriptor.supports_game(g) && e.handle.can_handle(format, Some(g)))
        });
        game_specific
            .or_else(|| entries.iter().find(|e| e.handle.can_handle(format, None)))
            .map(|e| Arc::clone(&e.handle))
    }

    /// Merged format tables of all loaded plugins
    pub fn format_tables(&self) -> FormatTables {
        merged_tables(&self.entries.read())
    }

    /// Extra detectors contributed by loaded plugins
    pub fn detectors(&self) -> Vec<Box<dyn Detector>> {
        self.entries
            .read()
            .iter()
            .flat_map(|e| e.handle.detectors())
            .collect()
    }
}

fn scan_directory(dir: &Path, report: &mut LoadReport) -> Vec<Pending> {
    if !dir.is_dir() {
        debug!("Plugin directory {} does not exist", dir.display());
        return Vec::new();
    }

    let mut found = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
    {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!("Failed to read plugin directory entry: {}", e);
                continue;
            }
        };
        let path = entry.path();
        let is_manifest = entry.file_type().is_file()
            && path
                .extension()
                .and_then(|e| e.to_str())
                .map_or(false, |e| e.eq_ignore_ascii_case("json"));
        if !is_manifest {
            continue;
        }

        match std::fs::read(path) {
            Ok(bytes) => found.push(Pending {
                base: is_base_manifest(path, &bytes),
                source: PluginSource::Manifest(path.to_path_buf()),
                bytes: Some(bytes),
            }),
            Err(e) => {
                warn!("Failed to read plugin manifest {}: {}", path.display(), e);
                report
                    .failed
                    .push(format!("{}: {}", path.display(), Error::file_read(path, e)));
            }
        }
    }
    found
}

fn instantiate(item: &Pending, loaded: &[Entry]) -> Result<Option<Entry>> {
    let (mut plugin, fingerprint): (Box<dyn Plugin>, _) = match (&item.source, &item.bytes) {
        (PluginSource::Builtin(b), _) => ((b.factory)(), None),
        (PluginSource::Manifest(path), Some(bytes)) => {
            match ManifestPlugin::parse(&path.display().to_string(), bytes)? {
                Some(p) => (Box::new(p), Some(blake3::hash(bytes))),
                None => return Ok(None),
            }
        }
        (PluginSource::Manifest(path), None) => {
            return Err(Error::internal(format!(
                "manifest {} queued without contents",
                path.display()
            )))
        }
    };

    plugin.initialize(&merged_tables(loaded))?;
    let mut descriptor = plugin.descriptor();
    descriptor.base = descriptor.base || item.base;

    Ok(Some(Entry {
        descriptor,
        handle: Arc::from(plugin),
        source: item.source.clone(),
        fingerprint,
    }))
}

fn merged_tables(entries: &[Entry]) -> FormatTables {
    let mut tables = FormatTables::default();
    for entry in entries {
        tables.merge(entry.handle.as_ref());
    }
    tables
}

fn upsert(entries: &mut Vec<Entry>, entry: Entry) {
    match entries
        .iter()
        .position(|e| e.descriptor.name == entry.descriptor.name)
    {
        Some(index) => {
            warn!(
                "Plugin {} replaced by a later definition",
                entry.descriptor.name
            );
            entries[index] = entry;
        }
        None => entries.push(entry),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::TempDir;

    const NO_DIRS: &[&Path] = &[];

    fn write(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_builtins_load_base_first() {
        let registry = PluginRegistry::with_builtins();
        let report = registry.load(NO_DIRS);
        assert_eq!(report.loaded, vec!["Base Format Support", "RAGE Discovery"]);
        assert!(report.failed.is_empty());
        assert!(registry.list()[0].base);
    }

    #[test]
    fn test_base_manifest_loads_before_dependent_despite_name_order() {
        let dir = TempDir::new().unwrap();
        // Sorts before the base manifest by name
        write(
            dir.path(),
            "a_particles.json",
            r#"{"plugin": {"name": "Particles", "version": "1", "formats": ["ypt"]},
                "requires_formats": ["tex"]}"#,
        );
        write(
            dir.path(),
            "z_textures.json",
            r#"{"plugin": {"name": "Textures", "version": "1", "base": true, "formats": ["tex"]},
                "formats": {"tex": {"name": "Texture", "magic": "54455800"}}}"#,
        );

        let registry = PluginRegistry::new();
        let report = registry.load(&[dir.path()]);
        assert_eq!(report.loaded, vec!["Textures", "Particles"]);
        assert!(report.failed.is_empty());
    }

    #[test]
    fn test_failures_are_isolated() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "broken.json", "{ nope");
        write(dir.path(), "data.json", r#"{"unrelated": true}"#);
        write(dir.path(), "notes.txt", "not a manifest");
        write(
            dir.path(),
            "ok.json",
            r#"{"plugin": {"name": "Ok", "version": "1", "formats": ["okf"]}}"#,
        );

        let registry = PluginRegistry::new();
        let report = registry.load(&[dir.path()]);
        assert_eq!(report.loaded, vec!["Ok"]);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.failed.len(), 1);
        assert!(report.failed[0].contains("broken.json"));
        assert!(registry.get("Ok").is_some());
    }

    #[test]
    fn test_readers_never_see_partial_registry() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let registry = PluginRegistry::with_builtins();
        registry.load(NO_DIRS);
        let done = AtomicBool::new(false);

        std::thread::scope(|scope| {
            let readers: Vec<_> = (0..4)
                .map(|_| {
                    scope.spawn(|| {
                        let mut reads = 0usize;
                        while !done.load(Ordering::SeqCst) || reads == 0 {
                            let mut names: Vec<String> =
                                registry.list().into_iter().map(|d| d.name).collect();
                            names.sort();
                            assert_eq!(names, vec!["Base Format Support", "RAGE Discovery"]);
                            assert!(registry.find_handler("dds", None).is_some());
                            assert!(registry.find_handler("ytd", Some("gta_v")).is_some());
                            reads += 1;
                        }
                        reads
                    })
                })
                .collect();

            for _ in 0..50 {
                registry.reload("RAGE Discovery").unwrap();
                registry.reload("Base Format Support").unwrap();
                assert_eq!(registry.load(NO_DIRS).loaded.len(), 2);
            }
            done.store(true, Ordering::SeqCst);

            for reader in readers {
                assert!(reader.join().unwrap() > 0);
            }
        });
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_missing_directory_is_ignored() {
        let registry = PluginRegistry::with_builtins();
        let report = registry.load(&[Path::new("/definitely/not/a/plugin/dir")]);
        assert_eq!(report.loaded.len(), 2);
    }

    #[test]
    fn test_find_handler_prefers_game_specific() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "generic.json",
            r#"{"plugin": {"name": "Generic", "version": "1", "formats": ["ytd"]}}"#,
        );

        let registry = PluginRegistry::with_builtins();
        registry.load(&[dir.path()]);

        // Generic loads after the built-in base plugin, but RAGE Discovery
        // lists gta_v explicitly.
        let handler = registry.find_handler("ytd", Some("gta_v")).unwrap();
        assert_eq!(handler.descriptor().name, "RAGE Discovery");

        // No plugin lists the game, so format-only matching applies
        let handler = registry.find_handler("png", Some("gta_v")).unwrap();
        assert_eq!(handler.descriptor().name, "Base Format Support");

        assert!(registry.find_handler("unknown_format", None).is_none());
    }

    #[test]
    fn test_reload_manifest() {
        let dir = TempDir::new().unwrap();
        let path = write(
            dir.path(),
            "p.json",
            r#"{"plugin": {"name": "P", "version": "1.0.0", "formats": ["a"]}}"#,
        );
        let registry = PluginRegistry::new();
        registry.load(&[dir.path()]);

        fs::write(
            &path,
            r#"{"plugin": {"name": "P", "version": "2.0.0", "formats": ["a", "b"]}}"#,
        )
        .unwrap();
        registry.reload("P").unwrap();
        assert_eq!(registry.list()[0].version, "2.0.0");
        assert!(registry.find_handler("b", None).is_some());

        // A broken edit keeps the previous instance
        fs::write(&path, "{").unwrap();
        assert!(registry.reload("P").is_err());
        assert_eq!(registry.list()[0].version, "2.0.0");
    }

    #[test]
    fn test_reload_unknown() {
        let registry = PluginRegistry::with_builtins();
        registry.load(NO_DIRS);
        assert!(matches!(
            registry.reload("Nope"),
            Err(Error::UnknownPlugin(name)) if name == "Nope"
        ));
        registry.reload("RAGE Discovery").unwrap();
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_format_tables_merge() {
        let registry = PluginRegistry::with_builtins();
        registry.load(NO_DIRS);
        let tables = registry.format_tables();
        assert!(tables.provides("dds"));
        assert!(tables.provides("ytd"));
        assert_eq!(registry.detectors().len(), 1);
    }
}
