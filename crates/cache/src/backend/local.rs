//! Local filesystem backend
//!
//! Every blob is a regular file. Writes go to a temporary file in the same
//! directory which is then renamed over the destination, so readers see either
//! the old content or the new content and never a torn write.

use super::{StorageBackend, match_options};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default number of attempts for a write or delete
pub const DEFAULT_ATTEMPTS: u32 = 5;

/// Default fixed delay between attempts
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(50);

/// Prefix of in-flight temporary files inside a container
const TEMP_PREFIX: &str = ".stash-tmp";

/// Bounded retry with a fixed backoff for transient I/O failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one (at least 1)
    pub attempts: u32,
    /// Delay between attempts
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_ATTEMPTS,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Retry policy that never retries
    #[must_use]
    pub const fn none() -> Self {
        Self {
            attempts: 1,
            delay: Duration::ZERO,
        }
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out
    ///
    /// Returns the last error together with the number of attempts made.
    fn run<T>(
        &self,
        operation: &str,
        path: &Path,
        mut op: impl FnMut() -> io::Result<T>,
    ) -> std::result::Result<T, (io::Error, u32)> {
        let max = self.attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op() {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::debug!(
                            operation = operation,
                            path = %path.display(),
                            attempts = attempt,
                            "Storage operation succeeded after retry"
                        );
                    }
                    return Ok(value);
                }
                Err(e) if attempt < max && is_transient(&e) => {
                    tracing::warn!(
                        operation = operation,
                        path = %path.display(),
                        attempt = attempt,
                        error = %e,
                        retry_in_ms = self.delay.as_millis(),
                        "Storage operation failed, retrying"
                    );
                    std::thread::sleep(self.delay);
                }
                Err(e) => return Err((e, attempt)),
            }
        }
    }
}

/// Errors that can clear up by waiting, such as lock contention
fn is_transient(err: &io::Error) -> bool {
    match err.kind() {
        io::ErrorKind::WouldBlock
        | io::ErrorKind::Interrupted
        | io::ErrorKind::TimedOut
        | io::ErrorKind::ResourceBusy => true,
        // Sharing violations on Windows surface as access denied
        io::ErrorKind::PermissionDenied => cfg!(windows),
        _ => false,
    }
}

/// In-flight temporary file written by this backend
fn is_temp_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with(TEMP_PREFIX))
}

/// Local file-based storage backend
#[derive(Debug, Clone, Default)]
pub struct LocalBackend {
    retry: RetryPolicy,
}

impl LocalBackend {
    /// Create a backend with the default retry policy
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a backend with a custom retry policy
    #[must_use]
    pub const fn with_retry(retry: RetryPolicy) -> Self {
        Self { retry }
    }

    /// The retry policy applied to writes and deletes
    #[must_use]
    pub const fn retry(&self) -> RetryPolicy {
        self.retry
    }

    fn write_once(path: &Path, data: &[u8]) -> io::Result<()> {
        let dir = path
            .parent()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "blob path has no parent"))?;

        let mut tmp = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .tempfile_in(dir)?;
        tmp.write_all(data)?;
        tmp.as_file().sync_all()?;
        set_blob_permissions(tmp.path())?;
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }
}

impl StorageBackend for LocalBackend {
    fn name(&self) -> &'static str {
        "local"
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_blob(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn ensure_container(&self, path: &Path) -> Result<()> {
        if path.is_dir() {
            return Ok(());
        }
        fs::create_dir_all(path).map_err(|e| Error::container(e, path))?;
        set_container_permissions(path).map_err(|e| Error::container(e, path))?;
        tracing::debug!(path = %path.display(), "Created cache container");
        Ok(())
    }

    fn read(&self, path: &Path) -> Result<Option<Vec<u8>>> {
        match fs::read(path) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::io(e, path, "read")),
        }
    }

    fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        self.retry
            .run("write", path, || Self::write_once(path, data))
            .map_err(|(e, attempts)| Error::storage(e, path, "write", attempts))
    }

    fn delete(&self, path: &Path) -> Result<bool> {
        let outcome = self.retry.run("delete", path, || match fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        });
        outcome.map_err(|(e, attempts)| Error::storage(e, path, "delete", attempts))
    }

    fn modified_time(&self, path: &Path) -> Result<Option<DateTime<Utc>>> {
        let metadata = match fs::metadata(path) {
            Ok(m) => m,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::io(e, path, "stat")),
        };
        if !metadata.is_file() {
            return Ok(None);
        }
        let modified = metadata
            .modified()
            .map_err(|e| Error::io(e, path, "read mtime"))?;
        Ok(Some(DateTime::<Utc>::from(modified)))
    }

    fn search(&self, pattern: &str) -> Result<Vec<PathBuf>> {
        let paths = glob::glob_with(pattern, match_options())
            .map_err(|e| Error::invalid_pattern(pattern, e.msg))?;

        let mut matches = Vec::new();
        for entry in paths {
            match entry {
                Ok(path) if is_temp_file(&path) => {
                    tracing::trace!(path = %path.display(), "Skipping in-flight temp file");
                }
                Ok(path) => matches.push(path),
                Err(e) => {
                    // Unreadable entries are skipped rather than failing the whole search
                    tracing::debug!(
                        path = %e.path().display(),
                        error = %e.error(),
                        "Skipping unreadable search entry"
                    );
                }
            }
        }
        Ok(matches)
    }
}

/// Group-writable, not world-writable
#[cfg(unix)]
fn set_container_permissions(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o775))
}

#[cfg(not(unix))]
fn set_container_permissions(_path: &Path) -> io::Result<()> {
    Ok(())
}

#[cfg(unix)]
fn set_blob_permissions(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o664))
}

#[cfg(not(unix))]
fn set_blob_permissions(_path: &Path) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use tempfile::TempDir;

    #[test]
    fn test_write_then_read() {
        let tmp = TempDir::new().unwrap();
        let backend = LocalBackend::new();
        let path = tmp.path().join("blob");

        backend.write(&path, b"hello").unwrap();
        assert!(backend.is_blob(&path));
        assert_eq!(backend.read(&path).unwrap(), Some(b"hello".to_vec()));
    }

    #[test]
    fn test_write_replaces_existing() {
        let tmp = TempDir::new().unwrap();
        let backend = LocalBackend::new();
        let path = tmp.path().join("blob");

        backend.write(&path, b"first").unwrap();
        backend.write(&path, b"second").unwrap();
        assert_eq!(backend.read(&path).unwrap(), Some(b"second".to_vec()));
    }

    #[test]
    fn test_write_leaves_no_temp_files() {
        let tmp = TempDir::new().unwrap();
        let backend = LocalBackend::new();
        backend.write(&tmp.path().join("blob"), b"x").unwrap();

        let names: Vec<_> = fs::read_dir(tmp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["blob".to_string()]);
    }

    #[test]
    fn test_read_missing_is_none() {
        let tmp = TempDir::new().unwrap();
        let backend = LocalBackend::new();
        assert_eq!(backend.read(&tmp.path().join("missing")).unwrap(), None);
        assert_eq!(backend.modified_time(&tmp.path().join("missing")).unwrap(), None);
    }

    #[test]
    fn test_delete_missing_returns_false() {
        let tmp = TempDir::new().unwrap();
        let backend = LocalBackend::new();
        assert!(!backend.delete(&tmp.path().join("missing")).unwrap());
    }

    #[test]
    fn test_delete_existing_returns_true() {
        let tmp = TempDir::new().unwrap();
        let backend = LocalBackend::new();
        let path = tmp.path().join("blob");
        backend.write(&path, b"x").unwrap();

        assert!(backend.delete(&path).unwrap());
        assert!(!backend.exists(&path));
    }

    #[test]
    fn test_write_into_missing_container_fails_without_retry() {
        let tmp = TempDir::new().unwrap();
        let backend = LocalBackend::new();
        let path = tmp.path().join("nope").join("blob");

        let err = backend.write(&path, b"x").unwrap_err();
        match err {
            Error::Storage { attempts, .. } => assert_eq!(attempts, 1),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_ensure_container_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let backend = LocalBackend::new();
        let dir = tmp.path().join("a").join("b");

        backend.ensure_container(&dir).unwrap();
        backend.ensure_container(&dir).unwrap();
        assert!(backend.exists(&dir));
        assert!(!backend.is_blob(&dir));
    }

    #[cfg(unix)]
    #[test]
    fn test_permissions_are_group_writable() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        let backend = LocalBackend::new();
        let dir = tmp.path().join("container");
        backend.ensure_container(&dir).unwrap();
        let blob = dir.join("blob");
        backend.write(&blob, b"x").unwrap();

        let dir_mode = fs::metadata(&dir).unwrap().permissions().mode() & 0o777;
        let blob_mode = fs::metadata(&blob).unwrap().permissions().mode() & 0o777;
        assert_eq!(dir_mode, 0o775);
        assert_eq!(blob_mode, 0o664);
    }

    #[test]
    fn test_search_matches_direct_children_only() {
        let tmp = TempDir::new().unwrap();
        let backend = LocalBackend::new();
        backend.write(&tmp.path().join("key-1"), b"1").unwrap();
        backend.write(&tmp.path().join("key-2"), b"2").unwrap();
        backend.write(&tmp.path().join("other"), b"3").unwrap();
        fs::create_dir(tmp.path().join("sub")).unwrap();
        fs::write(tmp.path().join("sub").join("key-3"), b"4").unwrap();

        let root = glob::Pattern::escape(&tmp.path().to_string_lossy());
        let mut found = backend.search(&format!("{root}/key-*")).unwrap();
        found.sort();
        assert_eq!(
            found,
            vec![tmp.path().join("key-1"), tmp.path().join("key-2")]
        );
    }

    #[test]
    fn test_search_skips_in_flight_temp_files() {
        let tmp = TempDir::new().unwrap();
        let backend = LocalBackend::new();
        backend.write(&tmp.path().join("a"), b"1").unwrap();

        // Same state a concurrent write is in before its rename
        let pending = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .tempfile_in(tmp.path())
            .unwrap();

        let root = glob::Pattern::escape(&tmp.path().to_string_lossy());
        let found = backend.search(&format!("{root}/*")).unwrap();
        assert_eq!(found, vec![tmp.path().join("a")]);

        pending.persist(tmp.path().join("b")).unwrap();
        assert_eq!(backend.read(&tmp.path().join("b")).unwrap(), Some(Vec::new()));
    }

    #[test]
    fn test_search_rejects_malformed_pattern() {
        let backend = LocalBackend::new();
        let err = backend.search("/tmp/[").unwrap_err();
        assert!(matches!(err, Error::InvalidPattern { .. }));
    }

    #[test]
    fn test_retry_policy_retries_transient_errors() {
        let policy = RetryPolicy {
            attempts: 3,
            delay: Duration::ZERO,
        };
        let calls = Cell::new(0);
        let result = policy.run("write", Path::new("/x"), || {
            calls.set(calls.get() + 1);
            if calls.get() < 3 {
                Err(io::Error::new(io::ErrorKind::WouldBlock, "locked"))
            } else {
                Ok(calls.get())
            }
        });
        assert_eq!(result.unwrap(), 3);
    }

    #[test]
    fn test_retry_policy_reports_exhaustion() {
        let policy = RetryPolicy {
            attempts: 2,
            delay: Duration::ZERO,
        };
        let result: std::result::Result<(), _> = policy.run("write", Path::new("/x"), || {
            Err(io::Error::new(io::ErrorKind::WouldBlock, "locked"))
        });
        let (err, attempts) = result.unwrap_err();
        assert_eq!(attempts, 2);
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
    }

    #[test]
    fn test_retry_policy_fails_fast_on_permanent_errors() {
        let policy = RetryPolicy {
            attempts: 5,
            delay: Duration::ZERO,
        };
        for kind in [
            io::ErrorKind::IsADirectory,
            io::ErrorKind::ReadOnlyFilesystem,
            io::ErrorKind::StorageFull,
            io::ErrorKind::NotFound,
        ] {
            let calls = Cell::new(0);
            let result: std::result::Result<(), _> = policy.run("write", Path::new("/x"), || {
                calls.set(calls.get() + 1);
                Err(io::Error::from(kind))
            });
            let (err, attempts) = result.unwrap_err();
            assert_eq!(attempts, 1, "{kind:?} was retried");
            assert_eq!(calls.get(), 1);
            assert_eq!(err.kind(), kind);
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_write_over_directory_fails_without_retry() {
        let tmp = TempDir::new().unwrap();
        let backend = LocalBackend::new();
        let path = tmp.path().join("dir");
        fs::create_dir(&path).unwrap();

        match backend.write(&path, b"v").unwrap_err() {
            Error::Storage { attempts, .. } => assert_eq!(attempts, 1),
            other => panic!("unexpected error: {other}"),
        }
    }
}
