//! File access for `load_file` and `@` includes
//!
//! All file access made by a [`Config`](crate::Config) goes through a
//! [`FileResolver`], so that configurations can be loaded from somewhere
//! other than the local file system.

use std::io;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;

/// Trait for locating and reading configuration files
pub trait FileResolver {
    /// Returns true if `path` names a readable file
    fn exists(&self, path: &Path) -> bool;

    /// Reads the whole file as UTF-8 text
    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    /// Returns the absolute form of `path`, used to identify files
    fn resolve_absolute(&self, path: &Path) -> PathBuf;
}

/// Resolver backed by the local file system
#[derive(Debug, Default, Clone, Copy)]
pub struct FileSystemResolver;

impl FileResolver for FileSystemResolver {
    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn resolve_absolute(&self, path: &Path) -> PathBuf {
        std::fs::canonicalize(path)
            .or_else(|_| std::path::absolute(path))
            .unwrap_or_else(|_| path.to_path_buf())
    }
}

/// Resolver holding files in memory, keyed by absolute path
///
/// Relative paths are taken to be relative to `/`.
#[derive(Debug, Default, Clone)]
pub struct MemoryFileResolver {
    files: IndexMap<PathBuf, String>,
}

impl MemoryFileResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a file
    pub fn insert(&mut self, path: impl AsRef<Path>, contents: impl Into<String>) {
        let path = self.resolve_absolute(path.as_ref());
        self.files.insert(path, contents.into());
    }

    pub fn with_file(mut self, path: impl AsRef<Path>, contents: impl Into<String>) -> Self {
        self.insert(path, contents);
        self
    }
}

impl FileResolver for MemoryFileResolver {
    fn exists(&self, path: &Path) -> bool {
        self.files.contains_key(&self.resolve_absolute(path))
    }

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        self.files
            .get(&self.resolve_absolute(path))
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.display().to_string()))
    }

    fn resolve_absolute(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            Path::new("/").join(path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_resolver() {
        let resolver = MemoryFileResolver::new()
            .with_file("/cfg/main.cfg", "a: 1")
            .with_file("lib/extra.cfg", "b: 2");

        assert!(resolver.exists(Path::new("/cfg/main.cfg")));
        assert!(resolver.exists(Path::new("/lib/extra.cfg")));
        assert!(resolver.exists(Path::new("lib/extra.cfg")));
        assert!(!resolver.exists(Path::new("/cfg/missing.cfg")));

        assert_eq!(
            resolver
                .read_to_string(Path::new("/cfg/main.cfg"))
                .expect("Should read"),
            "a: 1"
        );
        let err = resolver
            .read_to_string(Path::new("/nope.cfg"))
            .expect_err("Should fail");
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_file_system_resolver() {
        let dir = tempfile::tempdir().expect("Should create temp dir");
        let file = dir.path().join("x.cfg");
        std::fs::write(&file, "x: 1").expect("Should write");

        let resolver = FileSystemResolver;
        assert!(resolver.exists(&file));
        assert!(!resolver.exists(dir.path()));
        assert_eq!(resolver.read_to_string(&file).expect("Should read"), "x: 1");
        assert!(resolver.resolve_absolute(&file).is_absolute());
    }
}
