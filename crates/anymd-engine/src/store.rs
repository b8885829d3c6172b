//! Local markdown cache directory.
//!
//! Files are addressed by object display name, sanitized to a safe
//! filename plus a fixed `.md` extension. Sanitization is total and
//! idempotent: every accepted display name maps to exactly one valid
//! file name.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anymd_core::AnymdResult;

/// Characters that cannot appear in a filename on any supported
/// platform; each is replaced with `_`.
const FORBIDDEN: &[char] = &['\\', '/', ':', '*', '?', '"', '<', '>', '|'];

const EXTENSION: &str = "md";

#[derive(Debug, Clone)]
pub struct FileMetadata {
    pub path: PathBuf,
    pub size: u64,
    pub created: Option<SystemTime>,
    pub modified: Option<SystemTime>,
}

pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Replace path-special characters with `_`.
    pub fn sanitize(name: &str) -> String {
        name.chars()
            .map(|c| if FORBIDDEN.contains(&c) { '_' } else { c })
            .collect()
    }

    /// Local path a display name resolves to.
    pub fn path_for(&self, name: &str) -> PathBuf {
        self.root
            .join(format!("{}.{}", Self::sanitize(name), EXTENSION))
    }

    fn ensure_root(&self) -> AnymdResult<()> {
        fs::create_dir_all(&self.root)?;
        Ok(())
    }

    /// Write content under the (sanitized) name, returning the path.
    pub fn write(&self, name: &str, content: &str) -> AnymdResult<PathBuf> {
        self.ensure_root()?;
        let path = self.path_for(name);
        fs::write(&path, content)?;
        Ok(path)
    }

    /// Content for the name, or `None` when absent.
    pub fn read(&self, name: &str) -> AnymdResult<Option<String>> {
        let path = self.path_for(name);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(fs::read_to_string(&path)?))
    }

    pub fn exists(&self, name: &str) -> bool {
        self.path_for(name).exists()
    }

    /// Delete the file for a name; false when it was not there.
    pub fn delete(&self, name: &str) -> AnymdResult<bool> {
        let path = self.path_for(name);
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(&path)?;
        Ok(true)
    }

    pub fn metadata(&self, name: &str) -> AnymdResult<Option<FileMetadata>> {
        let path = self.path_for(name);
        if !path.exists() {
            return Ok(None);
        }
        let meta = fs::metadata(&path)?;
        Ok(Some(FileMetadata {
            path,
            size: meta.len(),
            created: meta.created().ok(),
            modified: meta.modified().ok(),
        }))
    }

    /// Remove every file in the cache directory.
    pub fn clear(&self) -> AnymdResult<()> {
        if !self.root.exists() {
            return Ok(());
        }
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                fs::remove_file(entry.path())?;
            }
        }
        Ok(())
    }

    /// Total size of all cached files in bytes.
    pub fn cache_size(&self) -> AnymdResult<u64> {
        if !self.root.exists() {
            return Ok(0);
        }
        let mut total = 0u64;
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                total += entry.metadata()?.len();
            }
        }
        Ok(total)
    }
}
