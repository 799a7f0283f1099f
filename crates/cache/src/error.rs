//! Error types for the cache crate

// Rust 1.92 compiler bug: false positives for thiserror/miette derive macro fields
// https://github.com/rust-lang/rust/issues/147648
#![allow(unused_assignments)]

use miette::Diagnostic;
use std::path::Path;
use thiserror::Error;

/// Error type for cache operations
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// The storage container could not be created
    #[error("Failed to create cache container: {}", path.display())]
    #[diagnostic(
        code(stash::cache::container),
        help("Check that the cache root is writable and the disk is not full")
    )]
    ContainerCreation {
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
        /// Container path
        path: Box<Path>,
    },

    /// A write or delete failed after the backend gave up retrying
    #[error("Storage {operation} failed after {attempts} attempt(s): {}", path.display())]
    #[diagnostic(
        code(stash::cache::storage),
        help("Another process may hold the file, or the cache root lost write permission")
    )]
    Storage {
        /// The last I/O error observed
        #[source]
        source: std::io::Error,
        /// Path of the blob
        path: Box<Path>,
        /// Operation that failed (e.g., "write", "delete")
        operation: String,
        /// Number of attempts made
        attempts: u32,
    },

    /// I/O error during read, stat or search
    #[error("I/O {operation} failed{}", path.as_ref().map_or(String::new(), |p| format!(": {}", p.display())))]
    #[diagnostic(code(stash::cache::io))]
    Io {
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
        /// Path that caused the error, if available
        path: Option<Box<Path>>,
        /// Operation that failed (e.g., "read", "stat")
        operation: String,
    },

    /// Stored bytes could not be decoded
    #[error("Failed to decode cached value for '{key}': {message}")]
    #[diagnostic(
        code(stash::cache::deserialization),
        help("The record was written by a different codec or value type; clear it and regenerate")
    )]
    Deserialization {
        /// Key of the record
        key: String,
        /// Decoder message
        message: String,
    },

    /// A value could not be encoded
    #[error("Serialization error: {message}")]
    #[diagnostic(code(stash::cache::serialization))]
    Serialization {
        /// Encoder message
        message: String,
    },

    /// The API was used out of order
    #[error("Cache usage error: {message}")]
    #[diagnostic(code(stash::cache::usage))]
    Usage {
        /// What went wrong
        message: String,
    },

    /// A key cannot be mapped to a storage name
    #[error("Invalid cache key '{key}': {reason}")]
    #[diagnostic(
        code(stash::cache::invalid_key),
        help("Keys are used verbatim as file names and must not contain path separators")
    )]
    InvalidKey {
        /// The rejected key
        key: String,
        /// Why it was rejected
        reason: &'static str,
    },

    /// A glob pattern failed to parse
    #[error("Invalid glob pattern '{pattern}': {message}")]
    #[diagnostic(code(stash::cache::invalid_pattern))]
    InvalidPattern {
        /// The rejected pattern
        pattern: String,
        /// Parser message
        message: String,
    },

    /// Configuration or validation error
    #[error("Cache configuration error: {message}")]
    #[diagnostic(code(stash::cache::config))]
    Configuration {
        /// Error message describing the configuration issue
        message: String,
    },
}

impl Error {
    /// Create a configuration error
    #[must_use]
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration {
            message: msg.into(),
        }
    }

    /// Create a container creation error
    #[must_use]
    pub fn container(source: std::io::Error, path: impl AsRef<Path>) -> Self {
        Self::ContainerCreation {
            source,
            path: path.as_ref().into(),
        }
    }

    /// Create a storage error for an exhausted write or delete
    #[must_use]
    pub fn storage(
        source: std::io::Error,
        path: impl AsRef<Path>,
        operation: impl Into<String>,
        attempts: u32,
    ) -> Self {
        Self::Storage {
            source,
            path: path.as_ref().into(),
            operation: operation.into(),
            attempts,
        }
    }

    /// Create an I/O error with path context
    #[must_use]
    pub fn io(
        source: std::io::Error,
        path: impl AsRef<Path>,
        operation: impl Into<String>,
    ) -> Self {
        Self::Io {
            source,
            path: Some(path.as_ref().into()),
            operation: operation.into(),
        }
    }

    /// Create an I/O error without path context
    #[must_use]
    pub fn io_no_path(source: std::io::Error, operation: impl Into<String>) -> Self {
        Self::Io {
            source,
            path: None,
            operation: operation.into(),
        }
    }

    /// Create a deserialization error
    #[must_use]
    pub fn deserialization(key: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Deserialization {
            key: key.into(),
            message: msg.into(),
        }
    }

    /// Create a serialization error
    #[must_use]
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
        }
    }

    /// Create a usage error
    #[must_use]
    pub fn usage(msg: impl Into<String>) -> Self {
        Self::Usage {
            message: msg.into(),
        }
    }

    /// Create an invalid key error
    #[must_use]
    pub fn invalid_key(key: impl Into<String>, reason: &'static str) -> Self {
        Self::InvalidKey {
            key: key.into(),
            reason,
        }
    }

    /// Create an invalid pattern error
    #[must_use]
    pub fn invalid_pattern(pattern: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::InvalidPattern {
            pattern: pattern.into(),
            message: msg.into(),
        }
    }

    /// Returns true for misuse of the session API
    #[must_use]
    pub const fn is_usage(&self) -> bool {
        matches!(self, Self::Usage { .. })
    }
}

/// Result type for cache operations
pub type Result<T> = std::result::Result<T, Error>;
