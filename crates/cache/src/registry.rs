//! Named store registry
//!
//! Applications with several caches (page fragments, query results, ...)
//! register each store under a name and look them up by name, or fall back to
//! a default when no name is given.

use crate::codec::{Codec, JsonCodec};
use crate::store::CacheStore;
use crate::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;

/// Registry of shared cache stores
///
/// Stores are shared behind an [`Arc`], so [`CacheStore::protect`] is no
/// longer reachable once a store is registered. Protected patterns belong in
/// [`CacheConfig::protect`](crate::CacheConfig::protect) or must be added
/// before the store is wrapped.
///
/// # Example
///
/// ```no_run
/// use stash_cache::{CacheConfig, CacheRegistry, CacheStore};
/// use std::sync::Arc;
///
/// # fn main() -> stash_cache::Result<()> {
/// let mut registry = CacheRegistry::new();
/// registry.register("pages", Arc::new(CacheStore::from_config(&CacheConfig::default())?));
/// registry.set_default("pages")?;
///
/// if let Some(store) = registry.get(None) {
///     store.store_text("home", "<html></html>", true)?;
/// }
/// # Ok(())
/// # }
/// ```
pub struct CacheRegistry<C: Codec = JsonCodec> {
    stores: HashMap<String, Arc<CacheStore<C>>>,
    default: Option<String>,
}

impl<C: Codec> Default for CacheRegistry<C> {
    fn default() -> Self {
        Self {
            stores: HashMap::new(),
            default: None,
        }
    }
}

impl<C: Codec> std::fmt::Debug for CacheRegistry<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheRegistry")
            .field("names", &self.names())
            .field("default", &self.default)
            .finish()
    }
}

impl<C: Codec> CacheRegistry<C> {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a store under `name`, replacing any existing one
    ///
    /// The first registered store becomes the default.
    pub fn register(&mut self, name: impl Into<String>, store: Arc<CacheStore<C>>) {
        let name = name.into();
        if self.default.is_none() {
            self.default = Some(name.clone());
        }
        if self.stores.insert(name.clone(), store).is_some() {
            tracing::debug!(name = %name, "Replaced registered cache store");
        }
    }

    /// Make `name` the store returned by `get(None)`
    ///
    /// # Errors
    /// Returns [`Error::Usage`] if no store is registered under `name`.
    pub fn set_default(&mut self, name: &str) -> Result<()> {
        if !self.stores.contains_key(name) {
            return Err(Error::usage(format!(
                "Unknown cache store '{}'. Available: {}",
                name,
                self.names().join(", ")
            )));
        }
        self.default = Some(name.to_string());
        Ok(())
    }

    /// Name of the default store
    #[must_use]
    pub fn default_name(&self) -> Option<&str> {
        self.default.as_deref()
    }

    /// Store by name, or the default store for `None`
    #[must_use]
    pub fn get(&self, name: Option<&str>) -> Option<Arc<CacheStore<C>>> {
        let name = name.or(self.default.as_deref())?;
        self.stores.get(name).cloned()
    }

    /// Remove a store; clears the default if it pointed at it
    pub fn unregister(&mut self, name: &str) -> Option<Arc<CacheStore<C>>> {
        let removed = self.stores.remove(name);
        if self.default.as_deref() == Some(name) {
            self.default = None;
        }
        removed
    }

    /// Registered names, sorted
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.stores.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of registered stores
    #[must_use]
    pub fn len(&self) -> usize {
        self.stores.len()
    }

    /// Returns true if nothing is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }
}
