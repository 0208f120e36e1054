//! Filesystem and record fixtures

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use mediashelf_worker::models::{MediaRecord, MediaStatus};
use mediashelf_worker::Config;

/// Temporary media root, removed when dropped
pub struct MediaLibrary {
    _dir: TempDir,
    root: PathBuf,
}

impl MediaLibrary {
    /// Create an empty media root
    ///
    /// # Panics
    ///
    /// Panics if the temporary directory cannot be created.
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("create temp media root");
        let root = dir
            .path()
            .canonicalize()
            .expect("canonicalize temp media root");
        Self { _dir: dir, root }
    }

    /// Canonical absolute path of the root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path of a root-relative entry
    pub fn path(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    /// Worker configuration rooted here with default layout and settings
    pub fn config(&self) -> Config {
        Config::with_media_root(&self.root)
    }

    /// Write a file, creating parent directories
    pub fn write(&self, relative: &str, contents: &[u8]) -> PathBuf {
        let path = self.path(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create fixture parent");
        }
        fs::write(&path, contents).expect("write fixture file");
        path
    }

    /// Create a directory and its parents
    pub fn mkdir(&self, relative: &str) -> PathBuf {
        let path = self.path(relative);
        fs::create_dir_all(&path).expect("create fixture dir");
        path
    }

    pub fn exists(&self, relative: &str) -> bool {
        self.path(relative).exists()
    }
}

impl Default for MediaLibrary {
    fn default() -> Self {
        Self::new()
    }
}

/// Available media record at `path` with the given MIME type
pub fn media_record(path: &str, mime_type: &str) -> MediaRecord {
    let name = path.rsplit('/').next().unwrap_or(path);
    let mut record = MediaRecord::new(name, path);
    record.mime_type = mime_type.to_string();
    record.status = MediaStatus::Available;
    record
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_record_takes_name_from_path() {
        let record = media_record("Movies/clip.mp4", "video/mp4");
        assert_eq!(record.name, "clip.mp4");
        assert_eq!(record.path, "Movies/clip.mp4");
        assert_eq!(record.status, MediaStatus::Available);
    }

    #[test]
    fn test_library_writes_nested_files() {
        let library = MediaLibrary::new();
        library.write("a/b/c.txt", b"hello");
        assert!(library.exists("a/b/c.txt"));
        assert_eq!(fs::read(library.path("a/b/c.txt")).unwrap(), b"hello");
    }
}
