//! Registry correlating local files with remote object identities.
//!
//! A path maps to at most one object at a time; re-registering a path
//! replaces the prior mapping (last registration wins). Mappings live
//! for the process lifetime so later saves keep syncing; only
//! `clear_all` drops everything at once.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileObjectMapping {
    pub object_id: String,
    pub object_name: String,
    pub file_path: PathBuf,
    pub space_id: String,
}

#[derive(Default)]
pub struct MappingTable {
    mappings: Mutex<HashMap<PathBuf, FileObjectMapping>>,
}

impl MappingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the mapping for its file path.
    pub fn register(&self, mapping: FileObjectMapping) {
        let mut map = self.mappings.lock().unwrap();
        map.insert(mapping.file_path.clone(), mapping);
    }

    pub fn lookup(&self, path: &Path) -> Option<FileObjectMapping> {
        self.mappings.lock().unwrap().get(path).cloned()
    }

    pub fn unregister(&self, path: &Path) -> Option<FileObjectMapping> {
        self.mappings.lock().unwrap().remove(path)
    }

    /// Drop every mapping. Hard-reset only.
    pub fn clear_all(&self) {
        self.mappings.lock().unwrap().clear();
    }

    /// Paths currently mapped to the given object.
    pub fn paths_for_object(&self, object_id: &str) -> Vec<PathBuf> {
        self.mappings
            .lock()
            .unwrap()
            .values()
            .filter(|m| m.object_id == object_id)
            .map(|m| m.file_path.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.mappings.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.lock().unwrap().is_empty()
    }
}
