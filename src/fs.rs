use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use path_absolutize::Absolutize;
use walkdir::WalkDir;

/// Filesystem abstraction: lets callers control how directories are listed
/// and files are read.
pub trait Filesystem {
    fn read_to_string(&self, path: &Path) -> Result<String>;

    /// Names of the regular files directly inside `dir`, sorted.
    fn read_dir(&self, dir: &Path) -> Result<Vec<String>>;

    fn is_dir(&self, path: &Path) -> bool;

    fn exists(&self, path: &Path) -> bool;
}

/// The real filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsFilesystem;

impl Filesystem for OsFilesystem {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
    }

    fn read_dir(&self, dir: &Path) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = entry.with_context(|| format!("listing {}", dir.display()))?;
            if entry.file_type().is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        Ok(names)
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

/// In-memory filesystem keyed by normalised path. Directories exist
/// implicitly as parents of the files added.
#[derive(Debug, Default, Clone)]
pub struct MemoryFilesystem {
    files: BTreeMap<PathBuf, String>,
}

impl MemoryFilesystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: impl AsRef<Path>, contents: impl Into<String>) -> Self {
        self.insert(path, contents);
        self
    }

    pub fn insert(&mut self, path: impl AsRef<Path>, contents: impl Into<String>) {
        self.files.insert(normalize(path.as_ref()), contents.into());
    }
}

fn normalize(path: &Path) -> PathBuf {
    path.absolutize()
        .map(|p| p.into_owned())
        .unwrap_or_else(|_| path.to_path_buf())
}

impl Filesystem for MemoryFilesystem {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        self.files
            .get(&normalize(path))
            .cloned()
            .ok_or_else(|| anyhow!("missing file: {}", path.display()))
    }

    fn read_dir(&self, dir: &Path) -> Result<Vec<String>> {
        let dir = normalize(dir);
        if !self.is_dir(&dir) {
            return Err(anyhow!("not a directory: {}", dir.display()));
        }
        Ok(self
            .files
            .keys()
            .filter(|p| p.parent() == Some(dir.as_path()))
            .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .collect())
    }

    fn is_dir(&self, path: &Path) -> bool {
        let dir = normalize(path);
        self.files.keys().any(|p| p.starts_with(&dir) && *p != dir)
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.contains_key(&normalize(path)) || self.is_dir(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_fs_lists_direct_children() {
        let fs = MemoryFilesystem::new()
            .with_file("/infra/main.tf", "")
            .with_file("/infra/b.tf", "")
            .with_file("/infra/modules/vpc/main.tf", "");
        assert_eq!(fs.read_dir(Path::new("/infra")).unwrap(), vec!["b.tf", "main.tf"]);
        assert!(fs.is_dir(Path::new("/infra/modules")));
        assert!(!fs.is_dir(Path::new("/infra/main.tf")));
        assert!(fs.read_dir(Path::new("/nowhere")).is_err());
    }

    #[test]
    fn memory_fs_normalises_parent_segments() {
        let fs = MemoryFilesystem::new().with_file("/infra/shared/main.tf", "x = 1");
        let path = Path::new("/infra/app/../shared/main.tf");
        assert_eq!(fs.read_to_string(path).unwrap(), "x = 1");
        assert!(fs.exists(Path::new("/infra/app/../shared")));
    }

    #[test]
    fn os_fs_reads_sorted_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("z.tf"), "").unwrap();
        std::fs::write(dir.path().join("a.tf"), "a = 1").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();

        let fs = OsFilesystem;
        assert_eq!(fs.read_dir(dir.path()).unwrap(), vec!["a.tf", "z.tf"]);
        assert_eq!(fs.read_to_string(&dir.path().join("a.tf")).unwrap(), "a = 1");
        assert!(fs.is_dir(&dir.path().join("sub")));
    }
}
