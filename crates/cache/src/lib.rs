//! File-backed output and value caching for stash
//!
//! This crate caches rendered text, captured output and serde values as
//! individual blobs in a flat storage container:
//! - One blob per key, named `prefix + key` (or just `key`)
//! - Freshness decided at read time from the blob's modified time, with an
//!   optional random jitter so entries written together do not expire together
//! - Get-or-compute helpers for values, text and captured output
//! - Glob-based bulk clearing with protected patterns
//!
//! # Overview
//!
//! [`CacheStore`] is the entry point. It is `Send + Sync`; share it behind an
//! `Arc`, optionally through a [`CacheRegistry`]. Regions of generated output
//! are cached with a per-request [`BufferStack`] writing through an
//! [`OutputSink`].
//!
//! ```no_run
//! use stash_cache::{CacheConfig, CacheStore, ClearOptions};
//!
//! # fn main() -> stash_cache::Result<()> {
//! let store = CacheStore::from_config(&CacheConfig::default().prefix("site-"))?;
//!
//! let menu = store.generate("menu", 600, true, || -> stash_cache::Result<_> {
//!     Ok(Some(vec!["home".to_string(), "about".to_string()]))
//! })?;
//! assert!(menu.is_some());
//!
//! store.clear(&ClearOptions::new("menu*"))?;
//! # Ok(())
//! # }
//! ```
//!
//! # Storage
//!
//! Storage goes through the [`StorageBackend`] trait. [`LocalBackend`] writes
//! atomically to the local filesystem and retries transient failures;
//! [`MemoryBackend`] keeps everything in process.

mod backend;
mod buffer;
mod clear;
mod codec;
mod config;
mod error;
mod expiry;
mod generate;
mod output;
mod path;
mod registry;
mod store;

pub use backend::{LocalBackend, MemoryBackend, RetryPolicy, StorageBackend};
pub use buffer::{BufferStack, OutputSession, SessionState};
pub use clear::{ClearEngine, ClearOptions, ClearResult, ProtectedPatterns};
pub use codec::{Codec, JsonCodec};
pub use config::{CACHE_DIR_ENV, CacheConfig, DEFAULT_LIFETIME_SECS};
pub use error::{Error, Result};
pub use expiry::ExpiryPolicy;
pub use output::{CaptureHandle, OutputSink};
pub use path::PathMapper;
pub use registry::CacheRegistry;
pub use store::{CacheStore, validate_key};
