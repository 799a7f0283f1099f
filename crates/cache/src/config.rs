//! Store configuration
//!
//! Configuration is plain serde data so it can be embedded in a host
//! application's own config file or loaded from a standalone TOML file:
//!
//! ```toml
//! root = "/var/cache/site"
//! prefix = "site-"
//! jitterWindowSecs = 30
//! protectedPatterns = ["keep-*"]
//! ```

use crate::backend::RetryPolicy;
use crate::{Error, Result};
use dirs::{cache_dir, home_dir};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding the cache root
pub const CACHE_DIR_ENV: &str = "STASH_CACHE_DIR";

/// Default record lifetime (one hour)
pub const DEFAULT_LIFETIME_SECS: i64 = 3600;

/// Configuration for a single cache store
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct CacheConfig {
    /// Container root; resolved from the environment when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,

    /// Prefix prepended to prefixed storage names
    pub prefix: String,

    /// Maximum jitter subtracted from a record's mtime at read time
    pub jitter_window_secs: u64,

    /// Whether reads can hit; a disabled store always misses
    pub enabled: bool,

    /// Basename globs exempt from bulk clearing
    pub protected_patterns: Vec<String>,

    /// Lifetime for callers that have no specific one
    pub default_lifetime_secs: i64,

    /// Attempts for a local write or delete before giving up
    pub write_attempts: u32,

    /// Fixed delay between attempts, in milliseconds
    pub retry_delay_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        Self {
            root: None,
            prefix: String::new(),
            jitter_window_secs: 0,
            enabled: true,
            protected_patterns: Vec::new(),
            default_lifetime_secs: DEFAULT_LIFETIME_SECS,
            write_attempts: retry.attempts,
            retry_delay_ms: u64::try_from(retry.delay.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

impl CacheConfig {
    /// Configuration rooted at an explicit directory
    #[must_use]
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
            ..Self::default()
        }
    }

    /// Set the storage-name prefix
    #[must_use]
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Set the jitter window
    #[must_use]
    pub const fn jitter_window(mut self, secs: u64) -> Self {
        self.jitter_window_secs = secs;
        self
    }

    /// Add a protected pattern
    #[must_use]
    pub fn protect(mut self, pattern: impl Into<String>) -> Self {
        self.protected_patterns.push(pattern.into());
        self
    }

    /// Parse configuration from TOML
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] if the document is invalid.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| Error::configuration(format!("Failed to parse cache config: {e}")))
    }

    /// Load configuration from a TOML file
    ///
    /// # Errors
    /// Returns an I/O error if the file cannot be read, or
    /// [`Error::Configuration`] if it is invalid.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::io(e, path, "read"))?;
        Self::from_toml_str(&content)
    }

    /// Retry policy for the local backend
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.write_attempts.max(1),
            delay: Duration::from_millis(self.retry_delay_ms),
        }
    }

    /// The configured root, or the first writable default location
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] if no candidate directory is writable.
    pub fn resolve_root(&self) -> Result<PathBuf> {
        if let Some(root) = self.root.as_ref().filter(|p| !p.as_os_str().is_empty()) {
            return Ok(root.clone());
        }
        default_root()
    }
}

/// Inputs for determining the default cache root
#[derive(Debug, Clone)]
struct RootInputs {
    override_dir: Option<PathBuf>,
    xdg_cache_home: Option<PathBuf>,
    os_cache_dir: Option<PathBuf>,
    home_dir: Option<PathBuf>,
    temp_dir: PathBuf,
}

/// Candidate roots, most specific first
///
/// `STASH_CACHE_DIR`, then `$XDG_CACHE_HOME/stash`, the platform cache
/// directory, `~/.stash/cache`, and the temp directory as a last resort.
fn root_candidates(inputs: RootInputs) -> impl Iterator<Item = PathBuf> {
    let RootInputs {
        override_dir,
        xdg_cache_home,
        os_cache_dir,
        home_dir: home,
        temp_dir,
    } = inputs;

    override_dir
        .filter(|p| !p.as_os_str().is_empty())
        .into_iter()
        .chain(xdg_cache_home.map(|p| p.join("stash")))
        .chain(os_cache_dir.map(|p| p.join("stash")))
        .chain(home.map(|p| p.join(".stash").join("cache")))
        .chain(std::iter::once(temp_dir.join("stash").join("cache")))
}

/// Whether blobs can be created in `dir`, creating it when missing
///
/// An existing directory may still be read-only, e.g. a mounted home in CI.
fn usable_root(dir: &Path) -> bool {
    if !dir.exists() {
        return match std::fs::create_dir_all(dir) {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(path = %dir.display(), error = %e, "Cannot create cache root candidate");
                false
            }
        };
    }

    let probe = dir.join(".stash-probe");
    if let Err(e) = std::fs::File::create(&probe) {
        tracing::debug!(path = %dir.display(), error = %e, "Cache root candidate not writable");
        return false;
    }
    if let Err(e) = std::fs::remove_file(&probe) {
        tracing::debug!(path = %probe.display(), error = %e, "Failed to remove write probe");
    }
    true
}

fn root_from_inputs(inputs: RootInputs) -> Result<PathBuf> {
    root_candidates(inputs)
        .find(|dir| usable_root(dir))
        .ok_or_else(|| Error::configuration("Failed to determine a writable cache directory"))
}

fn env_path(name: &str) -> Option<PathBuf> {
    std::env::var(name)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .map(PathBuf::from)
}

fn default_root() -> Result<PathBuf> {
    root_from_inputs(RootInputs {
        override_dir: env_path(CACHE_DIR_ENV),
        xdg_cache_home: env_path("XDG_CACHE_HOME"),
        os_cache_dir: cache_dir(),
        home_dir: home_dir(),
        temp_dir: std::env::temp_dir(),
    })
}
