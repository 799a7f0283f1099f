//! The cache store
//!
//! `CacheStore` maps keys to blobs, decides freshness at read time and encodes
//! structured values. It holds no per-record state in memory: everything it
//! knows about a record comes from the backend (content and modified time).

use crate::backend::{LocalBackend, StorageBackend};
use crate::clear::{ClearEngine, ClearOptions, ClearResult, ProtectedPatterns};
use crate::codec::{Codec, JsonCodec};
use crate::config::CacheConfig;
use crate::expiry::ExpiryPolicy;
use crate::path::PathMapper;
use crate::Result;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// File-backed cache of text and structured values
///
/// A store is `Send + Sync` and is meant to be shared behind an `Arc`.
/// Concurrent misses on the same key each compute and write; the last write
/// wins. No lock is held across a read-compute-write sequence.
pub struct CacheStore<C: Codec = JsonCodec> {
    backend: Arc<dyn StorageBackend>,
    mapper: PathMapper,
    expiry: ExpiryPolicy,
    protected: ProtectedPatterns,
    codec: C,
    enabled: AtomicBool,
    default_lifetime: i64,
}

impl<C: Codec> std::fmt::Debug for CacheStore<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore")
            .field("backend", &self.backend.name())
            .field("root", &self.mapper.root())
            .field("prefix", &self.mapper.prefix())
            .field("codec", &self.codec.name())
            .field("jitter_window", &self.expiry.jitter_window())
            .field("enabled", &self.is_enabled())
            .finish_non_exhaustive()
    }
}

impl CacheStore<JsonCodec> {
    /// Open a store on the local filesystem
    ///
    /// # Errors
    /// Returns [`crate::Error::ContainerCreation`] if the root cannot be created, or
    /// a configuration error for an invalid protected pattern.
    pub fn from_config(config: &CacheConfig) -> Result<Self> {
        let backend = Arc::new(LocalBackend::with_retry(config.retry_policy()));
        Self::with_backend(backend, config)
    }

    /// Open a store over any backend with the JSON codec
    ///
    /// # Errors
    /// Same as [`CacheStore::with_codec`].
    pub fn with_backend(backend: Arc<dyn StorageBackend>, config: &CacheConfig) -> Result<Self> {
        Self::with_codec(backend, config, JsonCodec::new())
    }
}

impl<C: Codec> CacheStore<C> {
    /// Open a store with an explicit backend and codec
    ///
    /// # Errors
    /// Returns [`crate::Error::ContainerCreation`] if the root container cannot be
    /// created, or [`crate::Error::InvalidPattern`] for a bad protected pattern.
    pub fn with_codec(
        backend: Arc<dyn StorageBackend>,
        config: &CacheConfig,
        codec: C,
    ) -> Result<Self> {
        let root = config.resolve_root()?;
        backend.ensure_container(&root)?;

        let mut protected = ProtectedPatterns::new();
        for pattern in &config.protected_patterns {
            protected.add(pattern)?;
        }

        tracing::debug!(
            backend = backend.name(),
            root = %root.display(),
            prefix = %config.prefix,
            codec = codec.name(),
            "Opened cache store"
        );

        Ok(Self {
            backend,
            mapper: PathMapper::new(root, config.prefix.clone()),
            expiry: ExpiryPolicy::new(config.jitter_window_secs),
            protected,
            codec,
            enabled: AtomicBool::new(config.enabled),
            default_lifetime: config.default_lifetime_secs,
        })
    }

    /// Container root
    #[must_use]
    pub fn root(&self) -> &Path {
        self.mapper.root()
    }

    /// Storage-name prefix
    #[must_use]
    pub fn prefix(&self) -> &str {
        self.mapper.prefix()
    }

    /// Key-to-path mapping
    #[must_use]
    pub fn mapper(&self) -> &PathMapper {
        &self.mapper
    }

    /// Underlying backend
    #[must_use]
    pub fn backend(&self) -> &dyn StorageBackend {
        self.backend.as_ref()
    }

    /// Freshness policy
    #[must_use]
    pub const fn expiry(&self) -> ExpiryPolicy {
        self.expiry
    }

    /// Value codec
    #[must_use]
    pub const fn codec(&self) -> &C {
        &self.codec
    }

    /// Configured default lifetime in seconds
    #[must_use]
    pub const fn default_lifetime(&self) -> i64 {
        self.default_lifetime
    }

    /// Turn reads on or off; a disabled store misses every lookup
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    /// Whether reads can hit
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Register a protected pattern
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidPattern`] for malformed globs.
    pub fn protect(&mut self, pattern: &str) -> Result<()> {
        self.protected.add(pattern)
    }

    /// Registered protected patterns
    #[must_use]
    pub fn protected_patterns(&self) -> &ProtectedPatterns {
        &self.protected
    }

    /// Path of the blob backing `key`
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidKey`] for keys that cannot be file names.
    pub fn path_for(&self, key: &str, prefixed: bool) -> Result<PathBuf> {
        self.mapper.path(key, prefixed)
    }

    /// Cached text for `key`, if present and fresh
    ///
    /// Bytes that are not valid UTF-8 are replaced rather than rejected.
    ///
    /// # Errors
    /// Returns an error for invalid keys or backend read failures; a miss is `Ok(None)`.
    pub fn get_text(&self, key: &str, lifetime_secs: i64, prefixed: bool) -> Result<Option<String>> {
        Ok(self
            .read_fresh(key, lifetime_secs, prefixed)?
            .map(|bytes| match String::from_utf8(bytes) {
                Ok(text) => text,
                Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
            }))
    }

    /// Cached structured value for `key`, if present and fresh
    ///
    /// # Errors
    /// Returns [`crate::Error::Deserialization`] if the stored bytes do not decode as `T`.
    pub fn get<T: DeserializeOwned>(
        &self,
        key: &str,
        lifetime_secs: i64,
        prefixed: bool,
    ) -> Result<Option<T>> {
        match self.read_fresh(key, lifetime_secs, prefixed)? {
            Some(bytes) => self.codec.decode(key, &bytes).map(Some),
            None => Ok(None),
        }
    }

    /// Store text verbatim under `key`
    ///
    /// # Errors
    /// Returns [`crate::Error::Storage`] if the write fails after retries.
    pub fn store_text(&self, key: &str, text: &str, prefixed: bool) -> Result<()> {
        self.write(key, text.as_bytes(), prefixed)
    }

    /// Encode and store a structured value under `key`
    ///
    /// # Errors
    /// Returns [`crate::Error::Serialization`] or [`crate::Error::Storage`].
    pub fn store<T: Serialize + ?Sized>(&self, key: &str, value: &T, prefixed: bool) -> Result<()> {
        let bytes = self.codec.encode(value)?;
        self.write(key, &bytes, prefixed)
    }

    /// Whether a fresh record exists for `key`
    ///
    /// # Errors
    /// Returns an error for invalid keys or unreadable metadata.
    pub fn exists(&self, key: &str, lifetime_secs: i64, prefixed: bool) -> Result<bool> {
        if !self.is_enabled() {
            return Ok(false);
        }
        let path = self.mapper.path(key, prefixed)?;
        let modified = self.backend.modified_time(&path)?;
        Ok(self.expiry.is_fresh(modified, lifetime_secs))
    }

    /// Remove the record for `key`; `Ok(false)` when there was none
    ///
    /// # Errors
    /// Returns [`crate::Error::Storage`] if the blob exists but cannot be removed.
    pub fn delete(&self, key: &str, prefixed: bool) -> Result<bool> {
        let path = self.mapper.path(key, prefixed)?;
        let removed = self.backend.delete(&path)?;
        tracing::debug!(key = %key, path = %path.display(), removed, "Cache entry deleted");
        Ok(removed)
    }

    /// Bulk-remove records matching `options`
    ///
    /// # Errors
    /// Returns an error for malformed patterns or failed searches.
    pub fn clear(&self, options: &ClearOptions) -> Result<ClearResult> {
        ClearEngine::new(self.backend.as_ref(), &self.mapper, &self.protected).run(options)
    }

    fn read_fresh(&self, key: &str, lifetime_secs: i64, prefixed: bool) -> Result<Option<Vec<u8>>> {
        if !self.is_enabled() {
            tracing::debug!(key = %key, "Cache disabled, treating as miss");
            return Ok(None);
        }
        let path = self.mapper.path(key, prefixed)?;
        let modified = self.backend.modified_time(&path)?;
        if !self.expiry.is_fresh(modified, lifetime_secs) {
            tracing::debug!(
                key = %key,
                present = modified.is_some(),
                "Cache miss"
            );
            return Ok(None);
        }
        let data = self.backend.read(&path)?;
        tracing::debug!(key = %key, hit = data.is_some(), "Cache lookup");
        Ok(data)
    }

    fn write(&self, key: &str, bytes: &[u8], prefixed: bool) -> Result<()> {
        let path = self.mapper.path(key, prefixed)?;
        self.backend.write(&path, bytes)?;
        tracing::debug!(
            key = %key,
            path = %path.display(),
            bytes = bytes.len(),
            "Cache entry stored"
        );
        Ok(())
    }
}

/// Reject keys before they reach a backend
///
/// Exposed for callers that derive keys from untrusted input and want to
/// validate them up front.
///
/// # Errors
/// Returns [`crate::Error::InvalidKey`] if `key` cannot be used as a storage name.
pub fn validate_key(key: &str) -> Result<()> {
    PathMapper::new("", "").storage_name(key, false).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use crate::backend::MemoryBackend;
    use chrono::{Duration, Utc};
    use serde::Deserialize;

    fn memory_store(prefix: &str) -> (Arc<MemoryBackend>, CacheStore) {
        let backend = Arc::new(MemoryBackend::new());
        let config = CacheConfig::with_root("/cache").prefix(prefix);
        let store = CacheStore::with_backend(backend.clone(), &config).unwrap();
        (backend, store)
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Menu {
        items: Vec<String>,
    }

    #[test]
    fn test_missing_key_is_miss() {
        let (_, store) = memory_store("");
        assert_eq!(store.get_text("nope", 60, true).unwrap(), None);
        assert_eq!(store.get::<Menu>("nope", 60, true).unwrap(), None);
        assert!(!store.exists("nope", 60, true).unwrap());
    }

    #[test]
    fn test_text_round_trip() {
        let (_, store) = memory_store("p-");
        store.store_text("greeting", "hello", true).unwrap();
        assert_eq!(
            store.get_text("greeting", 60, true).unwrap().as_deref(),
            Some("hello")
        );
        // Unprefixed name differs
        assert_eq!(store.get_text("greeting", 60, false).unwrap(), None);
    }

    #[test]
    fn test_value_round_trip() {
        let (_, store) = memory_store("");
        let menu = Menu {
            items: vec!["home".to_string(), "about".to_string()],
        };
        store.store("menu", &menu, true).unwrap();
        assert_eq!(store.get::<Menu>("menu", 60, true).unwrap(), Some(menu));
    }

    #[test]
    fn test_expired_record_is_miss() {
        let (backend, store) = memory_store("");
        store.store_text("k", "v", true).unwrap();
        let path = store.path_for("k", true).unwrap();
        backend.set_modified(&path, Utc::now() - Duration::seconds(120));

        assert_eq!(store.get_text("k", 60, true).unwrap(), None);
        assert!(!store.exists("k", 60, true).unwrap());
        assert_eq!(store.get_text("k", 600, true).unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn test_negative_lifetime_is_miss() {
        let (_, store) = memory_store("");
        store.store_text("k", "v", true).unwrap();
        assert_eq!(store.get_text("k", -1, true).unwrap(), None);
    }

    #[test]
    fn test_disabled_store_misses() {
        let (_, store) = memory_store("");
        store.store_text("k", "v", true).unwrap();
        store.set_enabled(false);
        assert_eq!(store.get_text("k", 60, true).unwrap(), None);
        assert!(!store.exists("k", 60, true).unwrap());

        store.set_enabled(true);
        assert!(store.exists("k", 60, true).unwrap());
    }

    #[test]
    fn test_malformed_value_is_deserialization_error() {
        let (_, store) = memory_store("");
        store.store_text("k", "{not json", true).unwrap();
        let err = store.get::<Menu>("k", 60, true).unwrap_err();
        assert!(matches!(err, Error::Deserialization { .. }));
        // Text access is unaffected
        assert!(store.get_text("k", 60, true).unwrap().is_some());
    }

    #[test]
    fn test_invalid_utf8_is_lossy() {
        let (backend, store) = memory_store("");
        let path = store.path_for("bin", true).unwrap();
        backend.write(&path, &[0x66, 0x6f, 0xff]).unwrap();
        assert_eq!(
            store.get_text("bin", 60, true).unwrap().as_deref(),
            Some("fo\u{fffd}")
        );
    }

    #[test]
    fn test_delete() {
        let (_, store) = memory_store("");
        store.store_text("k", "v", true).unwrap();
        assert!(store.delete("k", true).unwrap());
        assert!(!store.delete("k", true).unwrap());
        assert_eq!(store.get_text("k", 60, true).unwrap(), None);
    }

    #[test]
    fn test_store_failure_surfaces() {
        let (backend, store) = memory_store("");
        backend.set_read_only(true);
        let err = store.store_text("k", "v", true).unwrap_err();
        assert!(matches!(err, Error::Storage { .. }));
    }

    #[test]
    fn test_invalid_key_is_rejected() {
        let (_, store) = memory_store("");
        assert!(matches!(
            store.store_text("../escape", "v", true).unwrap_err(),
            Error::InvalidKey { .. }
        ));
        assert!(validate_key("a/b").is_err());
        assert!(validate_key("fine-key").is_ok());
    }

    #[test]
    fn test_protect_after_open() {
        let (_, mut store) = memory_store("");
        store.protect("keep*").unwrap();
        store.store_text("keep-1", "v", true).unwrap();
        store.store_text("drop-1", "v", true).unwrap();

        let result = store.clear(&ClearOptions::default()).unwrap();
        assert_eq!(result.count(), 1);
        assert!(store.exists("keep-1", 60, true).unwrap());
    }

    #[test]
    fn test_bad_protected_pattern_in_config() {
        let backend = Arc::new(MemoryBackend::new());
        let config = CacheConfig::with_root("/cache").protect("[oops");
        let err = CacheStore::with_backend(backend, &config).unwrap_err();
        assert!(matches!(err, Error::InvalidPattern { .. }));
    }
}
