//! Directory listing cache (§4.B "DirCache"), grounded on the
//! `AttributeCache` in `fs/cache.rs` generalized from per-inode attributes to
//! per-directory listings, and on `core.py`'s `invalidate_cache` /
//! `_ls`(`invalidate=True`) flow.
//!
//! A listing, once fetched, is cached until something mutates that
//! directory's contents (create, delete, rename, mkdir) invalidates it.
//! Invalidation also walks up to the parent, since a child's appearance or
//! disappearance changes the parent's own listing.

use crate::path::Path;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One entry of a directory listing, the client-facing projection of a
/// webHDFS `FileStatus` object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirEntry {
    pub name: String,
    pub kind: EntryKind,
    pub length: u64,
    pub permission: String,
    pub owner: String,
    pub group: String,
    pub modification_time: i64,
    pub replication: Option<u32>,
    pub block_size: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EntryKind {
    File,
    Directory,
}

#[derive(Default)]
pub struct DirCache {
    inner: Mutex<HashMap<String, Vec<DirEntry>>>,
}

impl DirCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &Path) -> Option<Vec<DirEntry>> {
        self.inner.lock().get(path.trim().as_str()).cloned()
    }

    pub fn put(&self, path: &Path, entries: Vec<DirEntry>) {
        self.inner.lock().insert(path.trim().as_str().to_string(), entries);
    }

    /// Drop the cached listing for `path` and for its parent directory.
    pub fn invalidate(&self, path: &Path) {
        let mut guard = self.inner.lock();
        guard.remove(path.trim().as_str());
        guard.remove(path.parent().as_str());
    }

    /// Drop every cached listing whose key starts with `path`'s prefix, used
    /// when a whole subtree is renamed or removed.
    pub fn invalidate_subtree(&self, path: &Path) {
        let prefix = path.trim().as_str().to_string();
        let mut guard = self.inner.lock();
        guard.retain(|k, _| !(k == &prefix || k.starts_with(&format!("{}/", prefix))));
        guard.remove(path.parent().as_str());
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str) -> DirEntry {
        DirEntry {
            name: name.to_string(),
            kind: EntryKind::File,
            length: 0,
            permission: "770".to_string(),
            owner: "me".to_string(),
            group: "me".to_string(),
            modification_time: 0,
            replication: None,
            block_size: None,
        }
    }

    #[test]
    fn invalidate_drops_path_and_parent() {
        let cache = DirCache::new();
        cache.put(&Path::new("/a/b"), vec![entry("c.txt")]);
        cache.put(&Path::new("/a"), vec![entry("b")]);
        cache.invalidate(&Path::new("/a/b"));
        assert!(cache.get(&Path::new("/a/b")).is_none());
        assert!(cache.get(&Path::new("/a")).is_none());
    }

    #[test]
    fn invalidate_subtree_drops_nested_listings() {
        let cache = DirCache::new();
        cache.put(&Path::new("/a/b"), vec![entry("c.txt")]);
        cache.put(&Path::new("/a/b/c"), vec![]);
        cache.put(&Path::new("/z"), vec![]);
        cache.invalidate_subtree(&Path::new("/a/b"));
        assert!(cache.get(&Path::new("/a/b")).is_none());
        assert!(cache.get(&Path::new("/a/b/c")).is_none());
        assert!(cache.get(&Path::new("/z")).is_some());
    }
}
