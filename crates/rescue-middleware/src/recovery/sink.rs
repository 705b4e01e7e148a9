//! Destinations for recovery log entries.
//!
//! The recovery middleware writes exactly one [`RecoveryEntry`] per unexpected
//! failure and never batches. Sinks own their synchronisation.

use super::stack::StackTrace;
use crate::context::RequestId;
use chrono::{DateTime, Local};
use http::Method;
use parking_lot::Mutex;
use std::fmt;
use std::io::Write;
use std::sync::Arc;

/// Marker tag written at the start of every entry.
pub const DEFAULT_MARKER: &str = "[Recovery]";

/// Diagnostic record of one unexpected failure.
#[derive(Debug, Clone)]
pub struct RecoveryEntry {
    /// When the failure was recovered.
    pub timestamp: DateTime<Local>,
    /// Marker tag.
    pub marker: String,
    /// Request the failure happened in.
    pub request_id: RequestId,
    /// Request method.
    pub method: Method,
    /// Request path.
    pub path: String,
    /// Request line and headers; empty if the dump could not be rendered.
    pub request_dump: String,
    /// Raw failure description. Never sent to the client.
    pub failure: String,
    /// Stack trace.
    pub stack: StackTrace,
    /// `true` if the failure was a panic rather than a returned error.
    pub panicked: bool,
}

impl fmt::Display for RecoveryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.panicked { "panic" } else { "error" };
        write!(
            f,
            "{} {kind} recovered:\n{}\n{}\n{}",
            self.marker, self.request_dump, self.failure, self.stack
        )
    }
}

/// A destination for recovery entries.
pub trait LogSink: Send + Sync + 'static {
    /// Writes one entry. Failures to write are the sink's to handle.
    fn write_entry(&self, entry: &RecoveryEntry);
}

impl<S: LogSink + ?Sized> LogSink for Arc<S> {
    fn write_entry(&self, entry: &RecoveryEntry) {
        (**self).write_entry(entry);
    }
}

impl<S: LogSink + ?Sized> LogSink for Box<S> {
    fn write_entry(&self, entry: &RecoveryEntry) {
        (**self).write_entry(entry);
    }
}

/// Emits each entry as one `tracing` error event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn write_entry(&self, entry: &RecoveryEntry) {
        tracing::error!(
            marker = %entry.marker,
            request_id = %entry.request_id,
            http.method = %entry.method,
            http.path = %entry.path,
            request_dump = %entry.request_dump,
            failure = %entry.failure,
            stack = %entry.stack,
            stack_truncated = entry.stack.is_truncated(),
            panicked = entry.panicked,
            "Recovered from unexpected failure"
        );
    }
}

/// Writes each entry as a timestamped block to an [`std::io::Write`].
///
/// The block is formatted up front and handed to the writer in a single
/// `write_all`.
pub struct WriterSink<W> {
    writer: Mutex<W>,
    color: bool,
}

impl<W: Write + Send + 'static> WriterSink<W> {
    /// Creates a sink over `writer`.
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
            color: false,
        }
    }

    /// Renders entries in red on ANSI terminals.
    #[must_use]
    pub fn with_color(mut self, color: bool) -> Self {
        self.color = color;
        self
    }

    /// Consumes the sink and returns the writer.
    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }

    fn format(&self, entry: &RecoveryEntry) -> String {
        let timestamp = entry.timestamp.format("%Y/%m/%d %H:%M:%S");
        if self.color {
            format!("\n\n\x1b[31m{timestamp} {entry}\x1b[0m\n")
        } else {
            format!("\n\n{timestamp} {entry}\n")
        }
    }
}

impl<W: Write + Send + 'static> LogSink for WriterSink<W> {
    fn write_entry(&self, entry: &RecoveryEntry) {
        let block = self.format(entry);
        let mut writer = self.writer.lock();
        if let Err(e) = writer.write_all(block.as_bytes()).and_then(|()| writer.flush()) {
            tracing::warn!(
                error = %e,
                request_id = %entry.request_id,
                "Failed to write recovery entry"
            );
        }
    }
}

impl<W> fmt::Debug for WriterSink<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriterSink")
            .field("color", &self.color)
            .finish_non_exhaustive()
    }
}

/// Keeps entries in memory.
///
/// Useful for tests and for exposing recent failures on a diagnostics page.
#[derive(Debug, Default)]
pub struct MemorySink {
    entries: Mutex<Vec<RecoveryEntry>>,
}

impl MemorySink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every entry written so far.
    #[must_use]
    pub fn entries(&self) -> Vec<RecoveryEntry> {
        self.entries.lock().clone()
    }

    /// Number of entries written so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns `true` if nothing was written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl LogSink for MemorySink {
    fn write_entry(&self, entry: &RecoveryEntry) {
        self.entries.lock().push(entry.clone());
    }
}
