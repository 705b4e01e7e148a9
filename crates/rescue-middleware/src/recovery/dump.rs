//! Request dumps for recovery log entries.
//!
//! The request is consumed by the handler chain, so the request line and
//! headers are snapshotted before the chain runs. The body is never part of a
//! dump.

use crate::types::Request;
use http::header::{HeaderName, AUTHORIZATION, COOKIE, HOST, PROXY_AUTHORIZATION};
use http::{HeaderMap, Method, Uri, Version};
use std::fmt::Write as _;

/// Placeholder written instead of redacted header values.
pub const REDACTED: &str = "[REDACTED]";

/// Headers redacted unless configured otherwise.
#[must_use]
pub fn default_redacted_headers() -> Vec<HeaderName> {
    vec![AUTHORIZATION, COOKIE, PROXY_AUTHORIZATION]
}

/// Request line and headers of an inbound request.
#[derive(Debug, Clone)]
pub struct RequestSnapshot {
    method: Method,
    uri: Uri,
    version: Version,
    headers: HeaderMap,
}

impl RequestSnapshot {
    /// Copies the request line and headers of `request`.
    #[must_use]
    pub fn capture(request: &Request) -> Self {
        Self {
            method: request.method().clone(),
            uri: request.uri().clone(),
            version: request.version(),
            headers: request.headers().clone(),
        }
    }

    /// The request method.
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The request path.
    #[must_use]
    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// Renders the snapshot in HTTP/1 wire layout:
    ///
    /// ```text
    /// GET /users/7?verbose=1 HTTP/1.1
    /// host: api.example.com
    /// authorization: [REDACTED]
    /// ```
    ///
    /// Values of `redact` headers are replaced with [`REDACTED`].
    #[must_use]
    pub fn render(&self, redact: &[HeaderName]) -> String {
        let target = self
            .uri
            .path_and_query()
            .map_or("/", |path_and_query| path_and_query.as_str());

        let mut dump = String::new();
        let _ = write!(dump, "{} {} {:?}\r\n", self.method, target, self.version);

        if !self.headers.contains_key(HOST) {
            if let Some(authority) = self.uri.authority() {
                let _ = write!(dump, "host: {authority}\r\n");
            }
        }

        for (name, value) in &self.headers {
            if redact.contains(name) {
                let _ = write!(dump, "{name}: {REDACTED}\r\n");
            } else {
                let _ = write!(dump, "{name}: {}\r\n", String::from_utf8_lossy(value.as_bytes()));
            }
        }

        dump.push_str("\r\n");
        dump
    }
}
