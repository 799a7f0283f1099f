//! Capture-or-replay output sessions
//!
//! A [`BufferStack`] wraps regions of generated output. `start` either finds
//! fresh cached output for the key (the region is replayed and the generator
//! skipped) or opens a capture on the sink so the region's output can be
//! stored when it ends. Sessions nest and close strictly in reverse order.
//!
//! ```no_run
//! # use stash_cache::{BufferStack, CacheConfig, CacheStore, OutputSink};
//! # use std::fmt::Write as _;
//! # fn main() -> stash_cache::Result<()> {
//! let store = CacheStore::from_config(&CacheConfig::default())?;
//! let mut buffers = BufferStack::new(&store, OutputSink::stdout());
//! if buffers.start("sidebar", 300, true)? {
//!     write!(buffers.output(), "<nav>...</nav>").ok();
//! }
//! buffers.end(true)?;
//! # Ok(())
//! # }
//! ```

use crate::codec::{Codec, JsonCodec};
use crate::output::{CaptureHandle, OutputSink};
use crate::store::CacheStore;
use crate::{Error, Result};
use std::io;

/// Lifecycle of an output session
///
/// A session is resolved against the store as soon as it starts, so it is
/// observed either replaying or capturing, and closed once ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Cache hit; the cached content stands in for the generator
    Replaying,
    /// Cache miss; output is being captured for storage
    Capturing,
    /// Ended and popped off the stack
    Closed,
}

/// A closed output session returned by [`BufferStack::end`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputSession {
    key: String,
    prefixed: bool,
    content: String,
    hit: bool,
}

impl OutputSession {
    /// Cache key
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Whether the key was combined with the store prefix
    #[must_use]
    pub const fn prefixed(&self) -> bool {
        self.prefixed
    }

    /// Captured or replayed content
    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Take the content
    #[must_use]
    pub fn into_content(self) -> String {
        self.content
    }

    /// True if the content came from the cache
    #[must_use]
    pub const fn is_hit(&self) -> bool {
        self.hit
    }

    /// Always [`SessionState::Closed`] once returned
    #[must_use]
    pub const fn state(&self) -> SessionState {
        SessionState::Closed
    }
}

#[derive(Debug)]
enum Body {
    Replay(String),
    Capture(CaptureHandle),
}

#[derive(Debug)]
struct OpenSession {
    key: String,
    prefixed: bool,
    body: Body,
}

impl OpenSession {
    const fn state(&self) -> SessionState {
        match self.body {
            Body::Replay(_) => SessionState::Replaying,
            Body::Capture(_) => SessionState::Capturing,
        }
    }
}

/// LIFO stack of output sessions over one store and one sink
///
/// Owned by a single request; the store it borrows may be shared.
pub struct BufferStack<'s, C: Codec = JsonCodec, W: io::Write = io::Stdout> {
    store: &'s CacheStore<C>,
    sink: OutputSink<W>,
    sessions: Vec<OpenSession>,
}

impl<C: Codec, W: io::Write> std::fmt::Debug for BufferStack<'_, C, W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferStack")
            .field("sink", &self.sink)
            .field("sessions", &self.sessions)
            .finish_non_exhaustive()
    }
}

impl<'s, C: Codec, W: io::Write> BufferStack<'s, C, W> {
    /// Create an empty stack writing through `sink`
    pub const fn new(store: &'s CacheStore<C>, sink: OutputSink<W>) -> Self {
        Self {
            store,
            sink,
            sessions: Vec::new(),
        }
    }

    /// Store backing this stack
    #[must_use]
    pub const fn store(&self) -> &'s CacheStore<C> {
        self.store
    }

    /// Sink that generated output should be written to
    pub const fn output(&mut self) -> &mut OutputSink<W> {
        &mut self.sink
    }

    /// Number of open sessions
    #[must_use]
    pub fn depth(&self) -> usize {
        self.sessions.len()
    }

    /// State of the innermost open session
    #[must_use]
    pub fn current_state(&self) -> Option<SessionState> {
        self.sessions.last().map(OpenSession::state)
    }

    /// Open a session for `key`
    ///
    /// Returns `true` if the caller must generate the output (a miss, now
    /// being captured) and `false` if cached output will be replayed by
    /// [`Self::end`].
    ///
    /// # Errors
    /// Returns an error for invalid keys or backend read failures.
    pub fn start(&mut self, key: &str, lifetime_secs: i64, prefixed: bool) -> Result<bool> {
        let cached = self.store.get_text(key, lifetime_secs, prefixed)?;
        let generate = cached.is_none();
        let body = match cached {
            Some(text) => Body::Replay(text),
            None => Body::Capture(self.sink.begin_capture()),
        };
        self.sessions.push(OpenSession {
            key: key.to_string(),
            prefixed,
            body,
        });
        tracing::debug!(
            key = %key,
            depth = self.sessions.len(),
            generate,
            "Output session started"
        );
        Ok(generate)
    }

    /// Close the innermost session
    ///
    /// A capturing session stores what was written since `start`. With
    /// `echo`, the content is then written to the enclosing capture or the
    /// base writer.
    ///
    /// # Errors
    /// Returns [`Error::Usage`] if no session is open (the stack is left
    /// usable), or [`Error::Storage`] if the captured content cannot be stored.
    /// The session is closed either way; nothing is echoed after a storage
    /// failure.
    pub fn end(&mut self, echo: bool) -> Result<OutputSession> {
        let (session, content, hit) = self.pop("end")?;

        if !hit {
            self.store
                .store_text(&session.key, &content, session.prefixed)?;
        }
        if echo {
            self.sink
                .emit(&content)
                .map_err(|e| Error::io_no_path(e, "echo output"))?;
        }

        tracing::debug!(
            key = %session.key,
            hit,
            bytes = content.len(),
            depth = self.sessions.len(),
            "Output session ended"
        );

        Ok(OutputSession {
            key: session.key,
            prefixed: session.prefixed,
            content,
            hit,
        })
    }

    /// Drop the innermost session without storing anything
    ///
    /// Captured output is discarded.
    ///
    /// # Errors
    /// Returns [`Error::Usage`] if no session is open.
    pub fn abort(&mut self) -> Result<()> {
        let (session, content, _) = self.pop("abort")?;
        tracing::debug!(
            key = %session.key,
            discarded = content.len(),
            "Output session aborted"
        );
        Ok(())
    }

    /// Release the sink; open sessions are abandoned
    pub fn into_output(self) -> OutputSink<W> {
        if !self.sessions.is_empty() {
            tracing::warn!(
                open = self.sessions.len(),
                "Output sessions left open when buffer stack was released"
            );
        }
        self.sink
    }

    /// Pop the innermost session with its content and whether it was a hit
    fn pop(&mut self, operation: &str) -> Result<(OpenSession, String, bool)> {
        let Some(mut session) = self.sessions.pop() else {
            tracing::error!(operation, "No open output session");
            return Err(Error::usage(format!(
                "{operation} called with no open output session"
            )));
        };
        let body = std::mem::replace(&mut session.body, Body::Replay(String::new()));
        match body {
            Body::Replay(text) => Ok((session, text, true)),
            Body::Capture(handle) => {
                let depth = handle.depth();
                match self.sink.end_capture(handle) {
                    Ok(text) => Ok((session, text, false)),
                    Err(e) => {
                        // Captures opened directly on the sink are still on top
                        session.body = Body::Capture(CaptureHandle::at_depth(depth));
                        self.sessions.push(session);
                        Err(e)
                    }
                }
            }
        }
    }
}
