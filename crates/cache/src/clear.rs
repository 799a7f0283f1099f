//! Pattern-based bulk clearing
//!
//! Clearing resolves a glob against the container, drops protected and
//! too-young candidates, then deletes what is left. Individual delete failures
//! are logged and reported through [`ClearResult`] rather than aborting the run.

use crate::backend::StorageBackend;
use crate::path::PathMapper;
use crate::{Error, Result};
use chrono::{DateTime, Duration, Utc};
use std::path::{Path, PathBuf};

/// Options for a clear run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClearOptions {
    /// Glob matched against storage names
    pub pattern: String,
    /// Prepend the store prefix to `pattern`
    pub prefixed: bool,
    /// Also remove blobs matching a protected pattern
    pub include_protected: bool,
    /// Only remove blobs at least this many seconds old (0 = any age)
    pub minimum_age_secs: u64,
    /// Report what would be removed without deleting anything
    pub dry_run: bool,
}

impl Default for ClearOptions {
    fn default() -> Self {
        Self {
            pattern: "*".to_string(),
            prefixed: true,
            include_protected: false,
            minimum_age_secs: 0,
            dry_run: false,
        }
    }
}

impl ClearOptions {
    /// Clear storage names matching `pattern` (prefixed, protection honored)
    #[must_use]
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            ..Self::default()
        }
    }

    /// Match the pattern against raw storage names, without the prefix
    #[must_use]
    pub const fn unprefixed(mut self) -> Self {
        self.prefixed = false;
        self
    }

    /// Ignore protected patterns
    #[must_use]
    pub const fn include_protected(mut self) -> Self {
        self.include_protected = true;
        self
    }

    /// Only clear blobs at least `secs` seconds old
    #[must_use]
    pub const fn minimum_age(mut self, secs: u64) -> Self {
        self.minimum_age_secs = secs;
        self
    }

    /// Enable dry run mode
    #[must_use]
    pub const fn dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }
}

/// Outcome of a clear run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClearResult {
    candidates: Vec<PathBuf>,
    deleted: Vec<PathBuf>,
}

impl ClearResult {
    /// Number of candidates left after filtering
    #[must_use]
    pub fn total(&self) -> usize {
        self.candidates.len()
    }

    /// Number of blobs actually deleted
    #[must_use]
    pub fn count(&self) -> usize {
        self.deleted.len()
    }

    /// Candidates left after protection and age filtering
    #[must_use]
    pub fn candidates(&self) -> &[PathBuf] {
        &self.candidates
    }

    /// Candidates that were deleted
    #[must_use]
    pub fn deleted(&self) -> &[PathBuf] {
        &self.deleted
    }
}

/// Basename globs that are exempt from clearing
#[derive(Debug, Clone, Default)]
pub struct ProtectedPatterns {
    patterns: Vec<glob::Pattern>,
}

impl ProtectedPatterns {
    /// Empty set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pattern
    ///
    /// # Errors
    /// Returns [`Error::InvalidPattern`] if `pattern` is not a valid glob.
    pub fn add(&mut self, pattern: &str) -> Result<()> {
        let compiled =
            glob::Pattern::new(pattern).map_err(|e| Error::invalid_pattern(pattern, e.msg))?;
        if !self.patterns.contains(&compiled) {
            self.patterns.push(compiled);
        }
        Ok(())
    }

    /// Whether the basename of `path` matches any registered pattern
    #[must_use]
    pub fn is_protected(&self, path: &Path) -> bool {
        let Some(name) = path.file_name() else {
            return false;
        };
        let name = name.to_string_lossy();
        self.patterns.iter().any(|p| p.matches(&name))
    }

    /// Registered patterns as strings
    #[must_use]
    pub fn patterns(&self) -> Vec<&str> {
        self.patterns.iter().map(glob::Pattern::as_str).collect()
    }

    /// Number of registered patterns
    #[must_use]
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// Returns true if nothing is protected
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// Clear engine bound to one store's backend, layout and protection rules
pub struct ClearEngine<'a> {
    backend: &'a dyn StorageBackend,
    mapper: &'a PathMapper,
    protected: &'a ProtectedPatterns,
}

impl<'a> ClearEngine<'a> {
    /// Create an engine over borrowed store parts
    #[must_use]
    pub fn new(
        backend: &'a dyn StorageBackend,
        mapper: &'a PathMapper,
        protected: &'a ProtectedPatterns,
    ) -> Self {
        Self {
            backend,
            mapper,
            protected,
        }
    }

    /// Run a clear using the current time for age filtering
    ///
    /// # Errors
    /// Returns an error if the pattern is malformed or the search fails.
    pub fn run(&self, options: &ClearOptions) -> Result<ClearResult> {
        self.run_at(options, Utc::now())
    }

    /// Run a clear with an explicit clock
    ///
    /// # Errors
    /// Returns an error if the pattern is malformed, the search fails, or a
    /// candidate's modified time cannot be read.
    pub fn run_at(&self, options: &ClearOptions, now: DateTime<Utc>) -> Result<ClearResult> {
        let pattern = self
            .mapper
            .search_pattern(&options.pattern, options.prefixed);
        let found = self.backend.search(&pattern)?;
        let scanned = found.len();

        let mut candidates = Vec::with_capacity(found.len());
        for path in found {
            if !options.include_protected && self.protected.is_protected(&path) {
                tracing::debug!(path = %path.display(), "Skipping protected cache entry");
                continue;
            }
            if options.minimum_age_secs > 0 && !self.old_enough(&path, options, now)? {
                continue;
            }
            candidates.push(path);
        }

        let mut deleted = Vec::new();
        for path in &candidates {
            if !self.backend.is_blob(path) {
                continue;
            }
            if options.dry_run {
                tracing::info!(path = %path.display(), "[dry-run] Would remove");
                continue;
            }
            match self.backend.delete(path) {
                Ok(true) => {
                    tracing::debug!(path = %path.display(), "Removed cache entry");
                    deleted.push(path.clone());
                }
                Ok(false) => {
                    tracing::debug!(path = %path.display(), "Cache entry vanished before removal");
                }
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Failed to remove cache entry"
                    );
                }
            }
        }

        tracing::info!(
            pattern = %pattern,
            scanned = scanned,
            candidates = candidates.len(),
            removed = deleted.len(),
            dry_run = options.dry_run,
            "Cache clear complete"
        );

        Ok(ClearResult {
            candidates,
            deleted,
        })
    }

    fn old_enough(&self, path: &Path, options: &ClearOptions, now: DateTime<Utc>) -> Result<bool> {
        let Some(modified) = self.backend.modified_time(path)? else {
            return Ok(false);
        };
        let min_age = i64::try_from(options.minimum_age_secs).unwrap_or(i64::MAX);
        let cutoff = now
            .checked_sub_signed(Duration::seconds(min_age.min(i64::MAX / 1000)))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        Ok(modified <= cutoff)
    }
}
