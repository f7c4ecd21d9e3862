//! Plugin loader (§4.7 steps 2-3, §6 `plugin.*` routes). Discovers
//! plugins by walking a set of directories, following symbolic links
//! once, and applying each registered factory to candidate entries.
//! Process launching itself is out of scope (§1); this module only
//! discovers and catalogs plugins.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use vessel_shared::Result;

/// A plugin's declared configuration, read from its manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginConfig {
    pub abstract_description: String,
    pub author: String,
    pub service_roles: Vec<String>,
    pub should_boot: bool,
    pub default_arguments: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plugin {
    pub name: String,
    pub binary_path: PathBuf,
    pub config: PluginConfig,
}

/// Recognizes one kind of candidate directory entry and turns it into a
/// [`Plugin`]. The loader tries every registered factory against each
/// entry in scan order; the first match wins.
pub trait PluginFactory: Send + Sync {
    fn try_create(&self, entry: &Path) -> Option<Plugin>;
}

/// The one concrete factory this crate ships: a plugin is a directory
/// containing `config.json` (deserializing to [`PluginConfig`]) and a
/// binary named after the directory itself.
pub struct ManifestPluginFactory;

impl PluginFactory for ManifestPluginFactory {
    fn try_create(&self, entry: &Path) -> Option<Plugin> {
        if !entry.is_dir() {
            return None;
        }
        let name = entry.file_name()?.to_str()?.to_string();
        let manifest_path = entry.join("config.json");
        let manifest = std::fs::read_to_string(&manifest_path).ok()?;
        let config: PluginConfig = serde_json::from_str(&manifest).ok()?;
        let binary_path = entry.join(&name);
        if !binary_path.is_file() {
            return None;
        }
        Some(Plugin {
            name,
            binary_path,
            config,
        })
    }
}

/// Catalogs plugins discovered from a scan. Directories earlier in scan
/// order shadow same-named plugins found later (§4.7 "earlier directories
/// shadow later ones").
pub struct PluginLoader {
    factories: Vec<Box<dyn PluginFactory>>,
    plugins: RwLock<Vec<Plugin>>,
}

impl PluginLoader {
    pub fn new(factories: Vec<Box<dyn PluginFactory>>) -> Self {
        Self {
            factories,
            plugins: RwLock::new(Vec::new()),
        }
    }

    pub fn with_default_factories() -> Self {
        Self::new(vec![Box::new(ManifestPluginFactory)])
    }

    /// Scans `dirs` in order, skipping any that do not exist. Replaces the
    /// loader's catalog with what this scan finds.
    pub fn scan(&self, dirs: &[PathBuf]) -> Result<()> {
        let mut found = Vec::new();
        let mut seen_names = HashSet::new();

        for dir in dirs {
            if !dir.is_dir() {
                continue;
            }
            for entry in WalkDir::new(dir).max_depth(1).min_depth(1) {
                let entry = entry.map_err(|e| vessel_shared::Error::internal(format!("plugin scan: {e}")))?;
                let resolved = resolve_symlink_once(entry.path());
                for factory in &self.factories {
                    if let Some(plugin) = factory.try_create(&resolved) {
                        if seen_names.insert(plugin.name.clone()) {
                            found.push(plugin);
                        }
                        break;
                    }
                }
            }
        }

        *self.plugins.write() = found;
        Ok(())
    }

    /// Plugins whose config declares `should_boot` (§4.7 step 3).
    pub fn bootable(&self) -> Vec<Plugin> {
        self.plugins.read().iter().filter(|p| p.config.should_boot).cloned().collect()
    }

    /// Returns the first match across all directories in scan order
    /// (§4.7 "findPlugin").
    pub fn find_plugin(&self, name: &str) -> Option<Plugin> {
        self.plugins.read().iter().find(|p| p.name == name).cloned()
    }

    pub fn list(&self) -> Vec<Plugin> {
        self.plugins.read().clone()
    }
}

/// Follows a symlink exactly once; a symlink pointing at another symlink
/// is left unresolved (§4.7 "following symbolic links once").
fn resolve_symlink_once(path: &Path) -> PathBuf {
    match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_symlink() => match std::fs::read_link(path) {
            Ok(target) if target.is_absolute() => target,
            Ok(target) => path.parent().map(|p| p.join(target)).unwrap_or_else(|| path.to_path_buf()),
            Err(_) => path.to_path_buf(),
        },
        _ => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_plugin(dir: &Path, name: &str, should_boot: bool) {
        let plugin_dir = dir.join(name);
        std::fs::create_dir_all(&plugin_dir).unwrap();
        let config = PluginConfig {
            abstract_description: "test plugin".to_string(),
            author: "tests".to_string(),
            service_roles: vec!["network".to_string()],
            should_boot,
            default_arguments: vec![],
        };
        std::fs::write(plugin_dir.join("config.json"), serde_json::to_string(&config).unwrap()).unwrap();
        std::fs::write(plugin_dir.join(name), b"#!/bin/sh\n").unwrap();
    }

    #[test]
    fn scan_discovers_plugins() {
        let dir = TempDir::new().unwrap();
        write_plugin(dir.path(), "net-helper", true);
        write_plugin(dir.path(), "logger", false);

        let loader = PluginLoader::with_default_factories();
        loader.scan(&[dir.path().to_path_buf()]).unwrap();

        assert_eq!(loader.list().len(), 2);
        assert_eq!(loader.bootable().len(), 1);
        assert_eq!(loader.bootable()[0].name, "net-helper");
    }

    #[test]
    fn earlier_directory_shadows_later_same_name() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        write_plugin(first.path(), "dup", true);
        write_plugin(second.path(), "dup", false);

        let loader = PluginLoader::with_default_factories();
        loader
            .scan(&[first.path().to_path_buf(), second.path().to_path_buf()])
            .unwrap();

        assert_eq!(loader.list().len(), 1);
        assert!(loader.find_plugin("dup").unwrap().config.should_boot);
    }

    #[test]
    fn find_plugin_returns_none_when_missing() {
        let loader = PluginLoader::with_default_factories();
        assert!(loader.find_plugin("ghost").is_none());
    }

    #[test]
    fn nonexistent_directory_is_skipped() {
        let loader = PluginLoader::with_default_factories();
        loader.scan(&[PathBuf::from("/definitely/does/not/exist")]).unwrap();
        assert!(loader.list().is_empty());
    }
}
