//! Get-or-compute helpers
//!
//! Each helper checks the cache first and only runs the caller's closure on a
//! miss. Closures return their own error type; cache errors convert into it
//! through `From<Error>`. A failed closure caches nothing.

use crate::buffer::BufferStack;
use crate::codec::Codec;
use crate::output::OutputSink;
use crate::store::CacheStore;
use crate::Error;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::io;

impl<C: Codec> CacheStore<C> {
    /// Cached value for `key`, computing and storing it on a miss
    ///
    /// `compute` returning `Ok(None)` means "nothing to cache"; the miss is
    /// passed through and the next call computes again.
    ///
    /// # Errors
    /// Propagates `compute` failures and cache errors (including
    /// [`Error::Deserialization`] for an undecodable record).
    pub fn generate<T, F, E>(
        &self,
        key: &str,
        lifetime_secs: i64,
        prefixed: bool,
        compute: F,
    ) -> Result<Option<T>, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<Option<T>, E>,
        E: From<Error>,
    {
        if let Some(value) = self.get(key, lifetime_secs, prefixed)? {
            return Ok(Some(value));
        }
        let value = compute()?;
        match &value {
            Some(v) => self.store(key, v, prefixed)?,
            None => tracing::debug!(key = %key, "Generator produced nothing to cache"),
        }
        Ok(value)
    }

    /// Text form of [`Self::generate`]
    ///
    /// # Errors
    /// Propagates `compute` failures and cache errors.
    pub fn generate_text<F, E>(
        &self,
        key: &str,
        lifetime_secs: i64,
        prefixed: bool,
        compute: F,
    ) -> Result<Option<String>, E>
    where
        F: FnOnce() -> Result<Option<String>, E>,
        E: From<Error>,
    {
        if let Some(text) = self.get_text(key, lifetime_secs, prefixed)? {
            return Ok(Some(text));
        }
        let text = compute()?;
        if let Some(t) = &text {
            self.store_text(key, t, prefixed)?;
        }
        Ok(text)
    }
}

impl<C: Codec, W: io::Write> BufferStack<'_, C, W> {
    /// Cached output for `key`, rendering it through `compute` on a miss
    ///
    /// `compute` writes into the capture sink. The content is returned either
    /// way and, with `echo`, also written to the enclosing output.
    ///
    /// # Errors
    /// Propagates `compute` failures (the capture is discarded and nothing is
    /// stored) and cache errors from starting or ending the session.
    pub fn generate_html<F, E>(
        &mut self,
        key: &str,
        lifetime_secs: i64,
        prefixed: bool,
        echo: bool,
        compute: F,
    ) -> Result<String, E>
    where
        F: FnOnce(&mut OutputSink<W>) -> Result<(), E>,
        E: From<Error>,
    {
        if self.start(key, lifetime_secs, prefixed)?
            && let Err(e) = compute(self.output())
        {
            if let Err(abort_err) = self.abort() {
                tracing::warn!(key = %key, error = %abort_err, "Failed to abort output session");
            }
            return Err(e);
        }
        Ok(self.end(echo)?.into_content())
    }
}

#[cfg(test)]
mod tests {
    use crate::backend::MemoryBackend;
    use crate::config::CacheConfig;
    use crate::output::OutputSink;
    use crate::{BufferStack, CacheStore, Error};
    use std::cell::Cell;
    use std::fmt::Write as _;
    use std::sync::Arc;

    #[derive(Debug)]
    enum RenderError {
        Failed,
        Cache(Error),
    }

    impl From<Error> for RenderError {
        fn from(e: Error) -> Self {
            Self::Cache(e)
        }
    }

    fn store() -> CacheStore {
        let config = CacheConfig::with_root("/cache").prefix("gen-");
        CacheStore::with_backend(Arc::new(MemoryBackend::new()), &config).unwrap()
    }

    #[test]
    fn test_generate_computes_once() {
        let store = store();
        let calls = Cell::new(0);
        let compute = || -> Result<Option<Vec<u32>>, Error> {
            calls.set(calls.get() + 1);
            Ok(Some(vec![1, 2, 3]))
        };

        let first = store.generate("numbers", 60, true, compute).unwrap();
        let second = store.generate("numbers", 60, true, compute).unwrap();
        assert_eq!(first, Some(vec![1, 2, 3]));
        assert_eq!(first, second);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_generate_none_is_not_cached() {
        let store = store();
        let calls = Cell::new(0);
        for _ in 0..2 {
            let value: Option<u32> = store
                .generate("nothing", 60, true, || -> Result<_, Error> {
                    calls.set(calls.get() + 1);
                    Ok(None)
                })
                .unwrap();
            assert_eq!(value, None);
        }
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_generate_failure_caches_nothing() {
        let store = store();
        let result: Result<Option<u32>, RenderError> =
            store.generate("failing", 60, true, || Err(RenderError::Failed));
        assert!(matches!(result, Err(RenderError::Failed)));
        assert!(!store.exists("failing", 60, true).unwrap());
    }

    #[test]
    fn test_generate_surfaces_cache_errors() {
        let store = store();
        store.store_text("bad", "{", true).unwrap();
        let result: Result<Option<u32>, RenderError> =
            store.generate("bad", 60, true, || Ok(Some(1)));
        assert!(matches!(
            result,
            Err(RenderError::Cache(Error::Deserialization { .. }))
        ));
    }

    #[test]
    fn test_generate_text() {
        let store = store();
        let text = store
            .generate_text("t", 60, true, || -> Result<_, Error> {
                Ok(Some("fresh".to_string()))
            })
            .unwrap();
        assert_eq!(text.as_deref(), Some("fresh"));
        let again = store
            .generate_text("t", 60, true, || -> Result<_, Error> {
                Ok(Some("other".to_string()))
            })
            .unwrap();
        assert_eq!(again.as_deref(), Some("fresh"));
    }

    #[test]
    fn test_generate_html_replays() {
        let store = store();
        let mut buffers = BufferStack::new(&store, OutputSink::new(Vec::new()));
        let calls = Cell::new(0);

        for _ in 0..2 {
            let html = buffers
                .generate_html("page", 60, true, true, |out| -> Result<(), Error> {
                    calls.set(calls.get() + 1);
                    write!(out, "<h1>Title</h1>").map_err(|_| Error::usage("write failed"))
                })
                .unwrap();
            assert_eq!(html, "<h1>Title</h1>");
        }
        assert_eq!(calls.get(), 1);
        assert_eq!(
            buffers.into_output().into_inner(),
            b"<h1>Title</h1><h1>Title</h1>"
        );
    }

    #[test]
    fn test_generate_html_failure_restores_stack() {
        let store = store();
        let mut buffers = BufferStack::new(&store, OutputSink::new(Vec::new()));

        let result: Result<String, RenderError> =
            buffers.generate_html("broken", 60, true, true, |out| {
                out.emit("half").map_err(|e| RenderError::Cache(Error::io_no_path(e, "emit")))?;
                Err(RenderError::Failed)
            });
        assert!(matches!(result, Err(RenderError::Failed)));
        assert_eq!(buffers.depth(), 0);
        assert!(!buffers.output().is_capturing());
        assert!(!store.exists("broken", 60, true).unwrap());
        assert!(buffers.into_output().into_inner().is_empty());
    }
}
