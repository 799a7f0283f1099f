//! Mapping cache keys to storage paths
//!
//! The storage layout is one flat container per store: every record is a
//! single blob named `prefix + key` (or just `key`) directly inside the root.
//! Keys are used verbatim; the only processing is rejecting keys that would
//! resolve outside the container.

use crate::{Error, Result};
use std::path::{Path, PathBuf};

/// Pure mapping from `(key, prefixed)` to a path inside the container root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathMapper {
    root: PathBuf,
    prefix: String,
}

impl PathMapper {
    /// Create a mapper for a container root and storage-name prefix
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            prefix: prefix.into(),
        }
    }

    /// Container root
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Prefix prepended to prefixed storage names
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Storage name for a key: `prefix + key` when `prefixed`, otherwise `key`
    ///
    /// # Errors
    /// Returns [`Error::InvalidKey`] if the resulting name is not a plain file name.
    pub fn storage_name(&self, key: &str, prefixed: bool) -> Result<String> {
        let name = if prefixed {
            format!("{}{key}", self.prefix)
        } else {
            key.to_string()
        };
        validate_name(key, &name)?;
        Ok(name)
    }

    /// Full path of the blob backing `key`
    ///
    /// # Errors
    /// Returns [`Error::InvalidKey`] for keys that cannot be used as file names.
    pub fn path(&self, key: &str, prefixed: bool) -> Result<PathBuf> {
        Ok(self.root.join(self.storage_name(key, prefixed)?))
    }

    /// Glob pattern rooted at the container for a caller pattern
    ///
    /// The root itself is escaped so glob metacharacters in directory names
    /// match literally.
    #[must_use]
    pub fn search_pattern(&self, pattern: &str, prefixed: bool) -> String {
        let root = glob::Pattern::escape(&self.root.to_string_lossy());
        let root = root.trim_end_matches(['/', '\\']);
        if prefixed {
            format!("{root}/{}{pattern}", glob::Pattern::escape(&self.prefix))
        } else {
            format!("{root}/{pattern}")
        }
    }
}

fn validate_name(key: &str, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::invalid_key(key, "empty storage name"));
    }
    if name == "." || name == ".." {
        return Err(Error::invalid_key(key, "refers to a directory"));
    }
    if name.contains(['/', '\\']) {
        return Err(Error::invalid_key(key, "contains a path separator"));
    }
    if name.contains('\0') {
        return Err(Error::invalid_key(key, "contains a NUL byte"));
    }
    Ok(())
}
