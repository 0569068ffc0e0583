use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use serde::Deserialize;

use crate::fs::Filesystem;

const MODULES_JSON: &str = ".terraform/modules/modules.json";

#[derive(Debug, Deserialize)]
struct ModulesFile {
    #[serde(rename = "Modules", default)]
    modules: Vec<ModuleEntry>,
}

#[derive(Debug, Deserialize)]
struct ModuleEntry {
    #[serde(rename = "Key", default)]
    key: String,
    #[serde(rename = "Source", default)]
    source: String,
    #[serde(rename = "Dir", default)]
    dir: String,
}

/// Where `terraform init` put non-local module sources.
#[derive(Debug, Default, Clone)]
pub struct ModuleRegistry {
    by_source: BTreeMap<String, PathBuf>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads the module index under `root`. A missing or unreadable index
    /// gives an empty registry.
    pub fn load(fs: &dyn Filesystem, root: &Path) -> Self {
        let path = root.join(MODULES_JSON);
        if !fs.exists(&path) {
            return Self::default();
        }
        let parsed = fs
            .read_to_string(&path)
            .and_then(|text| serde_json::from_str::<ModulesFile>(&text).map_err(Into::into));
        match parsed {
            Ok(file) => {
                let mut registry = Self::default();
                for entry in file.modules {
                    if entry.source.is_empty() || entry.dir.is_empty() {
                        continue;
                    }
                    debug!("registry: {} ({}) -> {}", entry.source, entry.key, entry.dir);
                    registry
                        .by_source
                        .entry(entry.source)
                        .or_insert_with(|| root.join(entry.dir));
                }
                registry
            }
            Err(e) => {
                warn!("ignoring module index {}: {e}", path.display());
                Self::default()
            }
        }
    }

    pub fn register(&mut self, source: impl Into<String>, dir: impl Into<PathBuf>) {
        self.by_source.insert(source.into(), dir.into());
    }

    pub fn resolve(&self, source: &str) -> Option<&Path> {
        self.by_source.get(source).map(PathBuf::as_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemoryFilesystem;

    #[test]
    fn loads_module_index() {
        let fs = MemoryFilesystem::new().with_file(
            "/infra/.terraform/modules/modules.json",
            r#"{"Modules":[
                {"Key":"","Source":"","Dir":"."},
                {"Key":"vpc","Source":"terraform-aws-modules/vpc/aws","Dir":".terraform/modules/vpc"}
            ]}"#,
        );
        let registry = ModuleRegistry::load(&fs, Path::new("/infra"));
        assert_eq!(
            registry.resolve("terraform-aws-modules/vpc/aws"),
            Some(Path::new("/infra/.terraform/modules/vpc"))
        );
        assert_eq!(registry.resolve("other"), None);
    }

    #[test]
    fn missing_or_broken_index_is_empty() {
        let fs = MemoryFilesystem::new().with_file("/a/.terraform/modules/modules.json", "{not json");
        assert!(ModuleRegistry::load(&fs, Path::new("/a")).resolve("x").is_none());
        assert!(ModuleRegistry::load(&fs, Path::new("/b")).resolve("x").is_none());
    }
}
