//! Output sink with nested capture
//!
//! Generated output is written to an [`OutputSink`]. While a capture is open,
//! writes land in the innermost capture buffer instead of the base writer.
//! Captures nest: closing one hands control back to the enclosing capture, or
//! to the base writer once none remain.

use crate::{Error, Result};
use std::fmt;
use std::io;

/// Token for an open capture
///
/// Returned by [`OutputSink::begin_capture`] and consumed by
/// [`OutputSink::end_capture`]. Captures must be closed innermost first.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "an open capture swallows output until it is ended"]
pub struct CaptureHandle {
    depth: usize,
}

impl CaptureHandle {
    pub(crate) const fn at_depth(depth: usize) -> Self {
        Self { depth }
    }

    /// Nesting level of this capture (1 = outermost)
    #[must_use]
    pub const fn depth(&self) -> usize {
        self.depth
    }
}

/// Writer that either passes output through or captures it
pub struct OutputSink<W: io::Write = io::Stdout> {
    base: W,
    captures: Vec<Vec<u8>>,
}

impl<W: io::Write> fmt::Debug for OutputSink<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputSink")
            .field("depth", &self.captures.len())
            .finish_non_exhaustive()
    }
}

impl OutputSink<io::Stdout> {
    /// Sink passing through to standard output
    #[must_use]
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: io::Write> OutputSink<W> {
    /// Wrap a base writer
    pub const fn new(base: W) -> Self {
        Self {
            base,
            captures: Vec::new(),
        }
    }

    /// Open a new innermost capture
    pub fn begin_capture(&mut self) -> CaptureHandle {
        self.captures.push(Vec::new());
        CaptureHandle {
            depth: self.captures.len(),
        }
    }

    /// Close the innermost capture and return what was written into it
    ///
    /// Invalid UTF-8 in the captured bytes is replaced.
    ///
    /// # Errors
    /// Returns [`Error::Usage`] if `handle` is not the innermost open capture.
    /// The capture stack is left unchanged in that case.
    pub fn end_capture(&mut self, handle: CaptureHandle) -> Result<String> {
        if handle.depth == 0 || handle.depth != self.captures.len() {
            return Err(Error::usage(format!(
                "capture at depth {} is not the innermost (open captures: {})",
                handle.depth,
                self.captures.len()
            )));
        }
        let bytes = self.captures.pop().unwrap_or_default();
        Ok(match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        })
    }

    /// Number of open captures
    #[must_use]
    pub fn depth(&self) -> usize {
        self.captures.len()
    }

    /// Whether output is currently being captured
    #[must_use]
    pub fn is_capturing(&self) -> bool {
        !self.captures.is_empty()
    }

    /// Write text to the innermost capture, or the base writer
    ///
    /// # Errors
    /// Returns the base writer's error when passing through.
    pub fn emit(&mut self, text: &str) -> io::Result<()> {
        io::Write::write_all(self, text.as_bytes())
    }

    /// Base writer
    pub const fn get_ref(&self) -> &W {
        &self.base
    }

    /// Mutable base writer
    pub const fn get_mut(&mut self) -> &mut W {
        &mut self.base
    }

    /// Unwrap the base writer, dropping any open captures
    pub fn into_inner(self) -> W {
        if !self.captures.is_empty() {
            tracing::warn!(open = self.captures.len(), "Dropping unfinished output captures");
        }
        self.base
    }
}

impl<W: io::Write> io::Write for OutputSink<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.captures.last_mut() {
            Some(capture) => {
                capture.extend_from_slice(buf);
                Ok(buf.len())
            }
            None => self.base.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.captures.is_empty() {
            self.base.flush()
        } else {
            Ok(())
        }
    }
}

impl<W: io::Write> fmt::Write for OutputSink<W> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.emit(s).map_err(|_| fmt::Error)
    }
}
