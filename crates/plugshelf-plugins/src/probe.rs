//! Local installation probing

use plugshelf_config::HostConfig;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Host-owned view of what is installed and active
pub trait InstallProbe: Send + Sync {
    /// Main plugin file of the installed package with this slug, relative to
    /// the plugins directory
    fn installed_file(&self, slug: &str) -> Option<PathBuf>;

    /// Whether the given plugin file is active
    fn is_active(&self, plugin_file: &Path) -> bool;
}

/// Probes a plugins directory laid out as `<dir>/<slug>/<slug>.<ext>`
pub struct DirectoryProbe {
    plugins_dir: PathBuf,
    active: HashSet<PathBuf>,
}

impl DirectoryProbe {
    pub fn new(plugins_dir: impl Into<PathBuf>, active: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            plugins_dir: plugins_dir.into(),
            active: active.into_iter().collect(),
        }
    }

    pub fn from_config(host: &HostConfig) -> Self {
        Self::new(host.plugins_dir.clone(), host.active_plugins.iter().cloned())
    }
}

impl InstallProbe for DirectoryProbe {
    fn installed_file(&self, slug: &str) -> Option<PathBuf> {
        let dir = self.plugins_dir.join(slug);
        if !dir.is_dir() {
            return None;
        }

        WalkDir::new(&dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .find(|e| e.path().file_stem().is_some_and(|stem| stem == slug))
            .map(|e| PathBuf::from(slug).join(e.file_name()))
    }

    fn is_active(&self, plugin_file: &Path) -> bool {
        self.active.contains(plugin_file)
    }
}

/// In-memory probe for hosts that already track installation state
#[derive(Debug, Default, Clone)]
pub struct MemoryProbe {
    installed: HashMap<String, PathBuf>,
    active: HashSet<PathBuf>,
}

impl MemoryProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a slug as installed at `plugin_file`
    pub fn install(mut self, slug: &str, plugin_file: impl Into<PathBuf>) -> Self {
        self.installed.insert(slug.to_string(), plugin_file.into());
        self
    }

    /// Mark a slug as installed and active
    pub fn activate(mut self, slug: &str, plugin_file: impl Into<PathBuf>) -> Self {
        let plugin_file = plugin_file.into();
        self.active.insert(plugin_file.clone());
        self.installed.insert(slug.to_string(), plugin_file);
        self
    }
}

impl InstallProbe for MemoryProbe {
    fn installed_file(&self, slug: &str) -> Option<PathBuf> {
        self.installed.get(slug).cloned()
    }

    fn is_active(&self, plugin_file: &Path) -> bool {
        self.active.contains(plugin_file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directory_probe_finds_main_file() {
        let dir = tempfile::tempdir().unwrap();
        let plugin_dir = dir.path().join("smart-gallery");
        std::fs::create_dir_all(&plugin_dir).unwrap();
        std::fs::write(plugin_dir.join("readme.txt"), "").unwrap();
        std::fs::write(plugin_dir.join("smart-gallery.php"), "").unwrap();

        let probe = DirectoryProbe::new(
            dir.path(),
            [PathBuf::from("smart-gallery/smart-gallery.php")],
        );
        let file = probe.installed_file("smart-gallery").unwrap();
        assert_eq!(file, PathBuf::from("smart-gallery/smart-gallery.php"));
        assert!(probe.is_active(&file));
    }

    #[test]
    fn test_directory_probe_missing_or_without_main_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("forms")).unwrap();
        std::fs::write(dir.path().join("forms").join("other.php"), "").unwrap();

        let probe = DirectoryProbe::new(dir.path(), Vec::new());
        assert!(probe.installed_file("forms").is_none());
        assert!(probe.installed_file("absent").is_none());
    }

    #[test]
    fn test_memory_probe() {
        let probe = MemoryProbe::new()
            .install("forms", "forms/forms.php")
            .activate("gallery", "gallery/gallery.php");

        assert_eq!(probe.installed_file("forms"), Some(PathBuf::from("forms/forms.php")));
        assert!(!probe.is_active(Path::new("forms/forms.php")));
        assert!(probe.is_active(Path::new("gallery/gallery.php")));
        assert!(probe.installed_file("slider").is_none());
    }
}
