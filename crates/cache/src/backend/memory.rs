//! In-memory storage backend

use super::{StorageBackend, match_options};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Clone, Debug)]
struct MemoryBlob {
    data: Vec<u8>,
    modified: DateTime<Utc>,
}

/// Thread-safe storage backend that keeps blobs in a map
///
/// Useful for tests and for short-lived processes that want cache semantics
/// without touching disk. Contents vanish when the backend is dropped.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    blobs: RwLock<BTreeMap<PathBuf, MemoryBlob>>,
    containers: RwLock<BTreeSet<PathBuf>>,
    read_only: AtomicBool,
}

impl MemoryBackend {
    /// Create an empty backend
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the modified time of an existing blob
    ///
    /// Returns false when there is no blob at `path`.
    pub fn set_modified(&self, path: &Path, modified: DateTime<Utc>) -> bool {
        match self.blobs.write().get_mut(path) {
            Some(blob) => {
                blob.modified = modified;
                true
            }
            None => false,
        }
    }

    /// Reject all writes and deletes with a permission error
    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::SeqCst);
    }

    /// Number of stored blobs
    #[must_use]
    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    /// Returns true if no blobs are stored
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blobs.read().is_empty()
    }

    fn check_writable(&self, path: &Path, operation: &str) -> Result<()> {
        if self.read_only.load(Ordering::SeqCst) {
            return Err(Error::storage(
                io::Error::new(io::ErrorKind::PermissionDenied, "backend is read-only"),
                path,
                operation,
                1,
            ));
        }
        Ok(())
    }
}

impl StorageBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn exists(&self, path: &Path) -> bool {
        self.blobs.read().contains_key(path) || self.containers.read().contains(path)
    }

    fn is_blob(&self, path: &Path) -> bool {
        self.blobs.read().contains_key(path)
    }

    fn ensure_container(&self, path: &Path) -> Result<()> {
        if self.blobs.read().contains_key(path) {
            return Err(Error::container(
                io::Error::new(io::ErrorKind::AlreadyExists, "a blob occupies this path"),
                path,
            ));
        }
        self.containers.write().insert(path.to_path_buf());
        Ok(())
    }

    fn read(&self, path: &Path) -> Result<Option<Vec<u8>>> {
        Ok(self.blobs.read().get(path).map(|b| b.data.clone()))
    }

    fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        self.check_writable(path, "write")?;
        self.blobs.write().insert(
            path.to_path_buf(),
            MemoryBlob {
                data: data.to_vec(),
                modified: Utc::now(),
            },
        );
        Ok(())
    }

    fn delete(&self, path: &Path) -> Result<bool> {
        self.check_writable(path, "delete")?;
        Ok(self.blobs.write().remove(path).is_some())
    }

    fn modified_time(&self, path: &Path) -> Result<Option<DateTime<Utc>>> {
        Ok(self.blobs.read().get(path).map(|b| b.modified))
    }

    fn search(&self, pattern: &str) -> Result<Vec<PathBuf>> {
        let compiled =
            glob::Pattern::new(pattern).map_err(|e| Error::invalid_pattern(pattern, e.msg))?;
        let options = match_options();
        Ok(self
            .blobs
            .read()
            .keys()
            .filter(|p| compiled.matches_path_with(p, options))
            .cloned()
            .collect())
    }
}
