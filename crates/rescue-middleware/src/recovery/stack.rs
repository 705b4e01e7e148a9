//! Bounded stack-trace capture.
//!
//! A trace is rendered into a fixed-size buffer. When it does not fit, the
//! buffer size is doubled and the render retried, up to a hard cap. A render
//! that fills the buffer completely counts as overflow, so a successful
//! capture is always strictly shorter than the buffer it was written into.

use std::backtrace::Backtrace;
use std::fmt::{self, Write as _};

/// Initial buffer size for a stack capture.
pub const DEFAULT_INITIAL_STACK_BYTES: usize = 8 * 1024;

/// Hard cap on the buffer size for a stack capture.
pub const DEFAULT_MAX_STACK_BYTES: usize = 1024 * 1024;

/// Grow-and-retry policy for rendering stack traces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackCapture {
    initial_bytes: usize,
    max_bytes: usize,
}

impl StackCapture {
    /// Creates a capture policy.
    ///
    /// `initial_bytes` is raised to at least 1 and `max_bytes` to at least
    /// `initial_bytes`.
    #[must_use]
    pub fn new(initial_bytes: usize, max_bytes: usize) -> Self {
        let initial_bytes = initial_bytes.max(1);
        Self {
            initial_bytes,
            max_bytes: max_bytes.max(initial_bytes),
        }
    }

    /// The first buffer size tried.
    #[must_use]
    pub const fn initial_bytes(&self) -> usize {
        self.initial_bytes
    }

    /// The largest buffer size ever allocated.
    #[must_use]
    pub const fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Captures the current thread's stack.
    #[must_use]
    pub fn capture(&self) -> StackTrace {
        self.render(&Backtrace::force_capture())
    }

    /// Renders `trace` with the grow-and-retry policy.
    pub fn render(&self, trace: &dyn fmt::Display) -> StackTrace {
        let mut size = self.initial_bytes;
        loop {
            let mut buffer = BoundedBuffer::with_limit(size);
            let fits = write!(buffer, "{trace}").is_ok();
            if fits || size >= self.max_bytes {
                return StackTrace {
                    text: buffer.text,
                    buffer_size: size,
                    truncated: !fits,
                };
            }
            size = size.saturating_mul(2).min(self.max_bytes);
        }
    }
}

impl Default for StackCapture {
    fn default() -> Self {
        Self::new(DEFAULT_INITIAL_STACK_BYTES, DEFAULT_MAX_STACK_BYTES)
    }
}

/// A rendered stack trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackTrace {
    text: String,
    buffer_size: usize,
    truncated: bool,
}

impl StackTrace {
    /// The rendered trace.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Length of the rendered trace in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.text.len()
    }

    /// Returns `true` if nothing was captured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Size of the buffer the final render used.
    #[must_use]
    pub const fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Returns `true` if the trace hit the cap and was cut short.
    #[must_use]
    pub const fn is_truncated(&self) -> bool {
        self.truncated
    }
}

impl fmt::Display for StackTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)?;
        if self.truncated {
            f.write_str("\n... (stack truncated)")?;
        }
        Ok(())
    }
}

/// A string that refuses to grow to `limit` bytes.
struct BoundedBuffer {
    text: String,
    limit: usize,
}

impl BoundedBuffer {
    fn with_limit(limit: usize) -> Self {
        Self {
            text: String::with_capacity(limit),
            limit,
        }
    }
}

impl fmt::Write for BoundedBuffer {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let room = self.limit.saturating_sub(self.text.len() + 1);
        if s.len() <= room {
            self.text.push_str(s);
            return Ok(());
        }

        let mut cut = room;
        while !s.is_char_boundary(cut) {
            cut -= 1;
        }
        self.text.push_str(&s[..cut]);
        Err(fmt::Error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Renders `len` bytes in small chunks, like a real backtrace does.
    struct Filler {
        len: usize,
    }

    impl fmt::Display for Filler {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            let mut written = 0;
            while written < self.len {
                let chunk = (self.len - written).min(7);
                f.write_str(&"x".repeat(chunk))?;
                written += chunk;
            }
            Ok(())
        }
    }

    #[test]
    fn test_fits_first_buffer() {
        let capture = StackCapture::new(64, 1024);
        let trace = capture.render(&Filler { len: 10 });
        assert_eq!(trace.len(), 10);
        assert_eq!(trace.buffer_size(), 64);
        assert!(!trace.is_truncated());
    }

    #[test]
    fn test_buffer_doubles_until_trace_fits() {
        let capture = StackCapture::new(16, 1 << 20);
        let trace = capture.render(&Filler { len: 1000 });
        assert_eq!(trace.len(), 1000);
        assert_eq!(trace.buffer_size(), 1024);
        assert!(!trace.is_truncated());
    }

    #[test]
    fn test_exact_fill_counts_as_overflow() {
        let capture = StackCapture::new(16, 1 << 20);
        let trace = capture.render(&Filler { len: 1024 });
        assert_eq!(trace.len(), 1024);
        assert_eq!(trace.buffer_size(), 2048);
    }

    #[test]
    fn test_cap_truncates() {
        let capture = StackCapture::new(16, 100);
        let trace = capture.render(&Filler { len: 1000 });
        assert!(trace.is_truncated());
        assert_eq!(trace.buffer_size(), 100);
        assert_eq!(trace.len(), 99);
        assert!(trace.to_string().ends_with("(stack truncated)"));
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        struct Wide;
        impl fmt::Display for Wide {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&"é".repeat(100))
            }
        }

        let trace = StackCapture::new(8, 8).render(&Wide);
        assert!(trace.is_truncated());
        assert!(trace.len() < 8);
        assert!(trace.as_str().chars().all(|c| c == 'é'));
    }

    #[test]
    fn test_limits_are_normalised() {
        let capture = StackCapture::new(0, 0);
        assert_eq!(capture.initial_bytes(), 1);
        assert_eq!(capture.max_bytes(), 1);

        let capture = StackCapture::new(4096, 1024);
        assert_eq!(capture.max_bytes(), 4096);
    }

    #[inline(never)]
    fn descend(depth: usize, capture: &StackCapture) -> StackTrace {
        if depth == 0 {
            return capture.capture();
        }
        let trace = descend(depth - 1, capture);
        std::hint::black_box(&trace);
        trace
    }

    #[test]
    fn test_deep_stack_is_never_truncated() {
        let capture = StackCapture::new(64, 64 * 1024 * 1024);
        let trace = descend(200, &capture);

        assert!(!trace.is_empty());
        assert!(!trace.is_truncated());
        assert!(trace.buffer_size() > capture.initial_bytes());
        assert!(trace.len() < trace.buffer_size());
    }
}
