//! Path-confined filesystem access
//!
//! Every path handed to the worker by a caller (task payloads, scan
//! targets, layout directories) goes through [`MediaFs::resolve_safely`]
//! before anything touches the disk. Resolution is lexical: `.` and `..`
//! are folded without consulting the filesystem, and the result must stay
//! inside the media root.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Component, Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{WorkerError, WorkerResult};

/// Filesystem primitives confined to a media root
#[derive(Debug, Clone)]
pub struct MediaFs {
    root: PathBuf,
}

impl MediaFs {
    /// Confine access to `root`, which must be an existing directory
    pub fn new(root: impl AsRef<Path>) -> WorkerResult<Self> {
        let root = root.as_ref();
        let root = root.canonicalize().map_err(|e| match e.kind() {
            ErrorKind::NotFound => {
                WorkerError::NotFound(format!("media root {}", root.display()))
            }
            _ => WorkerError::Io(e),
        })?;
        if !root.is_dir() {
            return Err(WorkerError::NotADirectory(root.display().to_string()));
        }
        Ok(Self { root })
    }

    /// The absolute media root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a caller-supplied path against the root.
    ///
    /// Fails with `InvalidPath` for blank input and `PathTraversal` when the
    /// normalized result leaves the root. Absolute input is accepted only if
    /// it already lies under the root.
    pub fn resolve_safely(&self, relative: &str) -> WorkerResult<PathBuf> {
        if relative.trim().is_empty() {
            return Err(WorkerError::InvalidPath("path must not be blank".to_string()));
        }
        if relative.contains('\0') {
            return Err(WorkerError::InvalidPath(format!(
                "path contains a NUL byte: {:?}",
                relative
            )));
        }

        let resolved = normalize(&self.root.join(relative));
        if !resolved.starts_with(&self.root) {
            tracing::warn!(input = relative, "Rejected path outside media root");
            return Err(WorkerError::PathTraversal(relative.to_string()));
        }
        Ok(resolved)
    }

    /// Root-relative, `/`-separated form of an absolute path under the root
    pub fn relative_path(&self, absolute: &Path) -> WorkerResult<String> {
        let relative = absolute
            .strip_prefix(&self.root)
            .map_err(|_| WorkerError::PathTraversal(absolute.display().to_string()))?;

        let parts: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Ok(parts.join("/"))
    }

    // ========== Directories ==========

    /// Create a directory and any missing parents. Idempotent.
    pub fn create_directory(&self, relative: &str) -> WorkerResult<PathBuf> {
        let dir = self.resolve_safely(relative)?;
        if dir.exists() && !dir.is_dir() {
            return Err(WorkerError::AlreadyExists(relative.to_string()));
        }
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Recursively delete a directory, children before parents
    pub fn delete_directory(&self, relative: &str) -> WorkerResult<()> {
        let dir = self.resolve_safely(relative)?;
        if dir == self.root {
            return Err(WorkerError::InvalidPath(
                "refusing to delete the media root".to_string(),
            ));
        }
        if !dir.exists() {
            return Err(WorkerError::NotFound(relative.to_string()));
        }
        if !dir.is_dir() {
            return Err(WorkerError::NotADirectory(relative.to_string()));
        }

        for entry in WalkDir::new(&dir).contents_first(true) {
            let entry = entry.map_err(walk_error)?;
            if entry.file_type().is_dir() {
                fs::remove_dir(entry.path())?;
            } else {
                fs::remove_file(entry.path())?;
            }
        }
        Ok(())
    }

    /// Atomically rename a directory, creating the destination's parents
    pub fn move_directory(&self, from: &str, to: &str) -> WorkerResult<PathBuf> {
        let source = self.resolve_safely(from)?;
        if !source.is_dir() {
            return Err(if source.exists() {
                WorkerError::NotADirectory(from.to_string())
            } else {
                WorkerError::NotFound(from.to_string())
            });
        }
        self.rename_into(&source, to)
    }

    /// Directories under the root whose name contains `fragment`,
    /// ignoring case. Results are root-relative; a blank fragment matches
    /// nothing.
    pub fn find_directories(&self, fragment: &str) -> WorkerResult<Vec<String>> {
        let needle = fragment.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(Vec::new());
        }

        let mut found = Vec::new();
        for entry in WalkDir::new(&self.root).min_depth(1).sort_by_file_name() {
            let entry = entry.map_err(walk_error)?;
            if entry.file_type().is_dir()
                && entry
                    .file_name()
                    .to_string_lossy()
                    .to_lowercase()
                    .contains(&needle)
            {
                found.push(self.relative_path(entry.path())?);
            }
        }
        Ok(found)
    }

    // ========== Files ==========

    /// Write a new file named `name` in `dir`, creating `dir` as needed.
    /// Never overwrites.
    pub fn create_file(&self, dir: &str, name: &str, contents: &[u8]) -> WorkerResult<PathBuf> {
        if !is_plain_file_name(name) {
            return Err(WorkerError::InvalidPath(format!(
                "{:?} is not a plain file name",
                name
            )));
        }
        let dir_path = self.create_directory(dir)?;
        let file = dir_path.join(name);

        let mut handle = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&file)
            .map_err(|e| match e.kind() {
                ErrorKind::AlreadyExists => {
                    WorkerError::AlreadyExists(category_relative_path(dir, name))
                }
                _ => WorkerError::Io(e),
            })?;
        handle.write_all(contents)?;
        Ok(file)
    }

    /// Read a whole regular file
    pub fn read_file(&self, relative: &str) -> WorkerResult<Vec<u8>> {
        let file = self.resolve_safely(relative)?;
        if !file.is_file() {
            return Err(WorkerError::NotFound(relative.to_string()));
        }
        fs::read(&file).map_err(|e| not_found_or_io(e, relative))
    }

    /// Delete a single file
    pub fn delete_file(&self, relative: &str) -> WorkerResult<()> {
        let file = self.resolve_safely(relative)?;
        if file.is_dir() {
            return Err(WorkerError::InvalidPath(format!(
                "{} is a directory",
                relative
            )));
        }
        fs::remove_file(&file).map_err(|e| not_found_or_io(e, relative))
    }

    /// Atomically rename a file, creating the destination's parents.
    ///
    /// Fails with `AlreadyExists` rather than replacing the destination.
    pub fn move_file(&self, from: &str, to: &str) -> WorkerResult<PathBuf> {
        let source = self.resolve_safely(from)?;
        if !source.is_file() {
            return Err(WorkerError::NotFound(from.to_string()));
        }
        self.rename_into(&source, to)
    }

    fn rename_into(&self, source: &Path, to: &str) -> WorkerResult<PathBuf> {
        let target = self.resolve_safely(to)?;
        if target.exists() {
            return Err(WorkerError::AlreadyExists(to.to_string()));
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::rename(source, &target)?;
        tracing::debug!(from = %source.display(), to = %target.display(), "Moved");
        Ok(target)
    }
}

/// Join a category path and a file name into a root-relative path.
///
/// Category paths are stored with a leading `/`; a bare `/` is the root.
pub fn category_relative_path(category_path: &str, file_name: &str) -> String {
    let category = category_path.trim().trim_matches('/');
    if category.is_empty() {
        file_name.to_string()
    } else {
        format!("{}/{}", category, file_name)
    }
}

/// A single plain file name: no separators, not `.` or `..`
pub fn is_plain_file_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    ) && !name.contains('/')
        && !name.contains('\\')
}

/// Fold `.` and `..` components without touching the filesystem
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => out.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            Component::Normal(part) => out.push(part),
        }
    }
    out
}

fn not_found_or_io(err: std::io::Error, relative: &str) -> WorkerError {
    match err.kind() {
        ErrorKind::NotFound => WorkerError::NotFound(relative.to_string()),
        _ => WorkerError::Io(err),
    }
}

fn walk_error(err: walkdir::Error) -> WorkerError {
    match err.into_io_error() {
        Some(io) => WorkerError::Io(io),
        None => WorkerError::Internal("filesystem loop detected while walking".to_string()),
    }
}
