//! Storage Backend Abstraction
//!
//! Defines the `StorageBackend` trait the cache engine is written against.
//! Two implementations ship with the crate:
//! - [`LocalBackend`]: blobs as files on the local filesystem
//! - [`MemoryBackend`]: blobs in a process-local map, for tests and ephemeral use
//!
//! Paths handed to a backend are already fully mapped (container root joined
//! with the storage name); backends never interpret cache keys themselves.

mod local;
mod memory;

pub use local::{LocalBackend, RetryPolicy};
pub use memory::MemoryBackend;

use crate::Result;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

/// Storage primitive over named byte blobs
///
/// Implementations must be thread-safe (`Send + Sync`). Calls on different
/// paths may run concurrently from independent threads or processes; for the
/// same path the only guarantee is that a reader never observes a partially
/// written blob.
pub trait StorageBackend: Send + Sync {
    /// Short backend identifier used in diagnostics
    fn name(&self) -> &'static str;

    /// Whether anything (blob or container) exists at `path`
    fn exists(&self, path: &Path) -> bool;

    /// Whether `path` names a blob (as opposed to a container or nothing)
    fn is_blob(&self, path: &Path) -> bool;

    /// Create the container at `path` if it does not exist yet
    ///
    /// # Errors
    /// Returns [`crate::Error::ContainerCreation`] if the container cannot be created.
    fn ensure_container(&self, path: &Path) -> Result<()>;

    /// Read a blob; `Ok(None)` when there is no blob at `path`
    ///
    /// # Errors
    /// Returns an I/O error for failures other than absence.
    fn read(&self, path: &Path) -> Result<Option<Vec<u8>>>;

    /// Atomically replace the blob at `path`
    ///
    /// # Errors
    /// Returns [`crate::Error::Storage`] once transient failures have exhausted
    /// the backend's retries.
    fn write(&self, path: &Path, data: &[u8]) -> Result<()>;

    /// Remove the blob at `path`; `Ok(false)` when nothing was there
    ///
    /// # Errors
    /// Returns [`crate::Error::Storage`] if the blob exists but cannot be removed.
    fn delete(&self, path: &Path) -> Result<bool>;

    /// Last-modified time of the blob, `Ok(None)` when there is no blob
    ///
    /// # Errors
    /// Returns an I/O error if metadata cannot be read for reasons other than absence.
    fn modified_time(&self, path: &Path) -> Result<Option<DateTime<Utc>>>;

    /// Resolve a shell-glob pattern (`*`, `?`, `[...]`) against full paths
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidPattern`] for malformed patterns.
    fn search(&self, pattern: &str) -> Result<Vec<PathBuf>>;
}

/// Options shared by glob matching in every backend
///
/// `*` never crosses a path separator, so a pattern rooted at a container only
/// sees that container's direct children.
pub(crate) const fn match_options() -> glob::MatchOptions {
    glob::MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: false,
    }
}
