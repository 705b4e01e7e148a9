//! The recovery boundary.
//!
//! [`RecoveryMiddleware`] runs the rest of the chain and guarantees a
//! well-formed response no matter how the chain ends:
//!
//! | Chain outcome                       | Logged | Response                        |
//! |-------------------------------------|--------|---------------------------------|
//! | `Ok(response)`                      | no     | `response`, untouched           |
//! | `Err(Failure::Deliberate(e))`       | no     | `e.status()`, `{code, message}` |
//! | `panic_any(ErrorValue)`             | no     | same as a deliberate failure    |
//! | `Err(Failure::Unexpected(_))`       | yes    | 500, generic code and message   |
//! | any other panic                     | yes    | 500, generic code and message   |
//!
//! Unexpected failures produce one [`RecoveryEntry`] with the request dump,
//! the raw failure text and a bounded stack trace. None of that reaches the
//! client.
//!
//! # Example
//!
//! ```
//! use rescue_middleware::recovery::{RecoveryMiddleware, WriterSink};
//!
//! let recovery = RecoveryMiddleware::builder()
//!     .sink(WriterSink::new(std::io::stderr()))
//!     .marker("[api]")
//!     .build();
//! ```

pub mod dump;
mod panic;
pub mod sink;
pub mod stack;

pub use dump::{default_redacted_headers, RequestSnapshot};
pub use sink::{LogSink, MemorySink, RecoveryEntry, TracingSink, WriterSink, DEFAULT_MARKER};
pub use stack::{StackCapture, StackTrace, DEFAULT_INITIAL_STACK_BYTES, DEFAULT_MAX_STACK_BYTES};

use crate::context::{MiddlewareContext, Recovered};
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::types::{Outcome, Request, Response, ResponseExt};
use futures_util::future;
use futures_util::FutureExt;
use http::header::HeaderName;
use http::StatusCode;
use rescue_core::{codes, ErrorValue, Failure, MessageRegistry};
use std::any::Any;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::pin;
use std::sync::Arc;

/// Where the stack of an unexpected failure comes from.
enum StackSource<'a> {
    /// Recorded by the panic hook at the panic site.
    PanicSite(Backtrace),
    /// Captured by `anyhow` where the error was created.
    Origin(&'a Backtrace),
    /// Captured at the recovery boundary.
    Here,
}

impl<'a> StackSource<'a> {
    /// The error's own backtrace if `anyhow` captured one.
    fn origin(cause: &'a anyhow::Error) -> Self {
        let trace = cause.backtrace();
        if trace.status() == BacktraceStatus::Captured {
            Self::Origin(trace)
        } else {
            Self::Here
        }
    }
}

/// Middleware that converts every abnormal termination into a JSON error
/// response.
pub struct RecoveryMiddleware {
    sink: Arc<dyn LogSink>,
    registry: MessageRegistry,
    marker: String,
    stack: StackCapture,
    redact: Vec<HeaderName>,
}

impl RecoveryMiddleware {
    /// Creates a recovery middleware that writes to `sink`, using the
    /// process-wide message registry and default settings.
    pub fn new(sink: impl LogSink) -> Self {
        Self::builder().sink(sink).build()
    }

    /// Creates a builder.
    #[must_use]
    pub fn builder() -> RecoveryMiddlewareBuilder {
        RecoveryMiddlewareBuilder::new()
    }

    /// The registry used to build the generic 500.
    #[must_use]
    pub fn registry(&self) -> &MessageRegistry {
        &self.registry
    }

    /// The marker tag of log entries.
    #[must_use]
    pub fn marker(&self) -> &str {
        &self.marker
    }

    /// The stack capture policy.
    #[must_use]
    pub fn stack_capture(&self) -> StackCapture {
        self.stack
    }

    /// Runs `next` and answers any abnormal termination.
    pub async fn guard(
        &self,
        ctx: &mut MiddlewareContext,
        request: Request,
        next: Next<'_>,
    ) -> Response {
        let snapshot = RequestSnapshot::capture(&request);
        let outcome = {
            let mut chain = pin!(AssertUnwindSafe(next.run(ctx, request)).catch_unwind());
            future::poll_fn(|cx| {
                let _scope = panic::GuardScope::enter();
                chain.as_mut().poll(cx)
            })
            .await
        };

        let (failure, panic_site, panicked) = match outcome {
            Ok(Ok(response)) => return response,
            Ok(Err(failure)) => (failure, None, false),
            Err(payload) => {
                let (failure, trace) = classify_panic(payload);
                (failure, trace, true)
            }
        };

        let (error, deliberate) = match failure {
            Failure::Deliberate(error) => {
                tracing::debug!(
                    request_id = %ctx.request_id(),
                    status = error.status().as_u16(),
                    code = error.code(),
                    "Request aborted"
                );
                (error, true)
            }
            Failure::Unexpected(cause) => {
                let source = match panic_site {
                    Some(trace) => StackSource::PanicSite(trace),
                    None => StackSource::origin(&cause),
                };
                self.report(ctx, &snapshot, &format!("{cause:#}"), source, panicked);
                (self.internal_error(), false)
            }
        };

        ctx.set_extension(Recovered {
            status: error.status(),
            code: error.code(),
            deliberate,
        });
        Response::from_error(&error)
    }

    /// The generic 500 sent for unexpected failures.
    fn internal_error(&self) -> ErrorValue {
        self.registry
            .gen_error(StatusCode::INTERNAL_SERVER_ERROR, codes::ERROR, None)
    }

    /// Writes one entry for an unexpected failure. Never panics.
    fn report(
        &self,
        ctx: &MiddlewareContext,
        snapshot: &RequestSnapshot,
        failure: &str,
        source: StackSource<'_>,
        panicked: bool,
    ) {
        let request_dump = std::panic::catch_unwind(AssertUnwindSafe(|| {
            snapshot.render(&self.redact)
        }))
        .unwrap_or_default();

        let stack = match source {
            StackSource::PanicSite(trace) => self.stack.render(&trace),
            StackSource::Origin(trace) => self.stack.render(trace),
            StackSource::Here => self.stack.capture(),
        };

        let entry = RecoveryEntry {
            timestamp: chrono::Local::now(),
            marker: self.marker.clone(),
            request_id: ctx.request_id(),
            method: snapshot.method().clone(),
            path: snapshot.path().to_string(),
            request_dump,
            failure: failure.to_string(),
            stack,
            panicked,
        };

        let written = std::panic::catch_unwind(AssertUnwindSafe(|| self.sink.write_entry(&entry)));
        if written.is_err() {
            tracing::warn!(request_id = %entry.request_id, "Recovery log sink panicked");
        }
    }
}

impl std::fmt::Debug for RecoveryMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoveryMiddleware")
            .field("marker", &self.marker)
            .field("stack", &self.stack)
            .field("redact", &self.redact)
            .finish_non_exhaustive()
    }
}

/// Turns a panic payload into a failure, with the panic-site backtrace if one
/// was recorded. An [`ErrorValue`] payload is a deliberate abort; anything
/// else is a defect.
fn classify_panic(payload: Box<dyn Any + Send>) -> (Failure, Option<Backtrace>) {
    let trace = panic::take_panic_backtrace();
    match payload.downcast::<ErrorValue>() {
        Ok(error) => (Failure::Deliberate(*error), None),
        Err(payload) => {
            let description = panic::describe_payload(payload.as_ref());
            (Failure::msg(description), trace)
        }
    }
}

impl Middleware for RecoveryMiddleware {
    fn name(&self) -> &'static str {
        "recovery"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Outcome> {
        Box::pin(async move { Ok(self.guard(ctx, request, next).await) })
    }
}

/// Builder for [`RecoveryMiddleware`].
pub struct RecoveryMiddlewareBuilder {
    sink: Option<Arc<dyn LogSink>>,
    registry: Option<MessageRegistry>,
    marker: String,
    stack: StackCapture,
    redact: Vec<HeaderName>,
    panic_site_traces: bool,
}

impl RecoveryMiddlewareBuilder {
    /// Creates a builder with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            sink: None,
            registry: None,
            marker: DEFAULT_MARKER.to_string(),
            stack: StackCapture::default(),
            redact: default_redacted_headers(),
            panic_site_traces: true,
        }
    }

    /// Sets the log sink. Defaults to [`TracingSink`].
    #[must_use]
    pub fn sink(mut self, sink: impl LogSink) -> Self {
        self.sink = Some(Arc::new(sink));
        self
    }

    /// Sets a shared log sink.
    #[must_use]
    pub fn shared_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Sets the message registry. Defaults to [`MessageRegistry::global`].
    #[must_use]
    pub fn registry(mut self, registry: MessageRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Sets the marker tag of log entries.
    #[must_use]
    pub fn marker(mut self, marker: impl Into<String>) -> Self {
        self.marker = marker.into();
        self
    }

    /// Sets the stack capture buffer bounds.
    #[must_use]
    pub fn stack_limits(mut self, initial_bytes: usize, max_bytes: usize) -> Self {
        self.stack = StackCapture::new(initial_bytes, max_bytes);
        self
    }

    /// Replaces the set of headers redacted in request dumps.
    ///
    /// Names that are not valid header names are skipped.
    #[must_use]
    pub fn redact_headers<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.redact = names
            .into_iter()
            .filter_map(|name| {
                let name = name.as_ref();
                match HeaderName::from_bytes(name.as_bytes()) {
                    Ok(header) => Some(header),
                    Err(_) => {
                        tracing::warn!(
                            header = name,
                            "Ignoring invalid header name in redact list"
                        );
                        None
                    }
                }
            })
            .collect();
        self
    }

    /// Whether panics are traced from the panic site (default) or from the
    /// recovery boundary.
    ///
    /// Panic-site traces need a process panic hook, installed once and
    /// chained in front of the existing hook. While it is installed, panics
    /// recovered by the boundary are reported only to the sink.
    #[must_use]
    pub fn panic_site_traces(mut self, enabled: bool) -> Self {
        self.panic_site_traces = enabled;
        self
    }

    /// Builds the middleware.
    #[must_use]
    pub fn build(self) -> RecoveryMiddleware {
        if self.panic_site_traces {
            panic::install_backtrace_hook();
        }

        RecoveryMiddleware {
            sink: self.sink.unwrap_or_else(|| Arc::new(TracingSink)),
            registry: self
                .registry
                .unwrap_or_else(|| MessageRegistry::global().clone()),
            marker: self.marker,
            stack: self.stack,
            redact: self.redact,
        }
    }
}

impl Default for RecoveryMiddlewareBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http_body_util::{BodyExt, Full};

    fn make_request() -> Request {
        http::Request::builder()
            .method("GET")
            .uri("/orders/17")
            .header("authorization", "Bearer secret")
            .body(Full::new(Bytes::new()))
            .unwrap()
    }

    fn recovery(sink: &Arc<MemorySink>) -> RecoveryMiddleware {
        RecoveryMiddleware::builder()
            .sink(Arc::clone(sink))
            .registry(MessageRegistry::default())
            .stack_limits(256, 4 * 1024 * 1024)
            .build()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_normal_completion_is_untouched() {
        let sink = Arc::new(MemorySink::new());
        let middleware = recovery(&sink);
        let mut ctx = MiddlewareContext::new();

        let next = Next::handler(|_ctx, _req| {
            Box::pin(async {
                let outcome: Outcome = Ok(Response::json(StatusCode::CREATED, r#"{"id":17}"#));
                outcome
            })
        });

        let response = middleware.guard(&mut ctx, make_request(), next).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(body_json(response).await, serde_json::json!({"id": 17}));
        assert!(sink.is_empty());
        assert!(!ctx.has_extension::<Recovered>());
    }

    #[tokio::test]
    async fn test_deliberate_failure_is_formatted_without_logging() {
        let sink = Arc::new(MemorySink::new());
        let middleware = recovery(&sink);
        let mut ctx = MiddlewareContext::new();

        let next = Next::handler(|_ctx, _req| {
            Box::pin(async {
                let error = MessageRegistry::default().gen_error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    42,
                    Some("denied"),
                );
                let outcome: Outcome = Err(error.into());
                outcome
            })
        });

        let response = middleware.guard(&mut ctx, make_request(), next).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_json(response).await,
            serde_json::json!({"code": 42, "message": "denied"})
        );
        assert!(sink.is_empty());
        assert_eq!(
            ctx.get_extension::<Recovered>(),
            Some(&Recovered {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                code: 42,
                deliberate: true,
            })
        );
    }

    #[tokio::test]
    async fn test_unexpected_error_is_logged_and_hidden() {
        let sink = Arc::new(MemorySink::new());
        let middleware = recovery(&sink);
        let mut ctx = MiddlewareContext::new();

        let next = Next::handler(|_ctx, _req| {
            Box::pin(async {
                let outcome: Outcome = Err(anyhow::anyhow!("database password rejected").into());
                outcome
            })
        });

        let response = middleware.guard(&mut ctx, make_request(), next).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body, serde_json::json!({"code": codes::ERROR, "message": "fail"}));

        let entries = sink.entries();
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.marker, DEFAULT_MARKER);
        assert_eq!(entry.request_id, ctx.request_id());
        assert_eq!(entry.failure, "database password rejected");
        assert!(entry.request_dump.starts_with("GET /orders/17 HTTP/1.1"));
        assert!(!entry.request_dump.contains("Bearer secret"));
        assert!(!entry.stack.is_empty());
        assert!(!entry.panicked);
    }

    #[tokio::test]
    async fn test_panic_is_recovered() {
        let sink = Arc::new(MemorySink::new());
        let middleware = recovery(&sink);
        let mut ctx = MiddlewareContext::new();

        let next = Next::handler(|_ctx, _req| {
            Box::pin(async {
                let items = vec![1, 2, 3];
                let index = items.len() + 2;
                let body = items[index].to_string();
                let outcome: Outcome = Ok(Response::json(StatusCode::OK, body));
                outcome
            })
        });

        let response = middleware.guard(&mut ctx, make_request(), next).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let entries = sink.entries();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].panicked);
        assert!(entries[0].failure.contains("out of bounds"));
        assert!(!entries[0].stack.is_empty());
        assert_eq!(
            ctx.get_extension::<Recovered>().map(|r| r.deliberate),
            Some(false)
        );
    }

    #[tokio::test]
    async fn test_panic_with_error_value_is_deliberate() {
        let sink = Arc::new(MemorySink::new());
        let middleware = recovery(&sink);
        let mut ctx = MiddlewareContext::new();

        let next = Next::handler(|_ctx, _req| {
            let error = MessageRegistry::default().gen_error(
                StatusCode::UNAUTHORIZED,
                40101,
                Some("token expired"),
            );
            std::panic::panic_any(error)
        });

        let response = middleware.guard(&mut ctx, make_request(), next).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            body_json(response).await,
            serde_json::json!({"code": 40101, "message": "token expired"})
        );
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_panicking_sink_is_contained() {
        struct Exploding;
        impl LogSink for Exploding {
            fn write_entry(&self, _entry: &RecoveryEntry) {
                panic!("sink exploded");
            }
        }

        let middleware = RecoveryMiddleware::builder()
            .sink(Exploding)
            .registry(MessageRegistry::default())
            .build();
        let mut ctx = MiddlewareContext::new();

        let next = Next::handler(|_ctx, _req| {
            Box::pin(async {
                let outcome: Outcome = Err(Failure::msg("boom"));
                outcome
            })
        });

        let response = middleware.guard(&mut ctx, make_request(), next).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_generic_message_comes_from_registry() {
        let sink = Arc::new(MemorySink::new());
        let middleware = RecoveryMiddleware::builder()
            .sink(Arc::clone(&sink))
            .registry(
                MessageRegistry::builder()
                    .insert(codes::ERROR, "internal error, please retry")
                    .build(),
            )
            .build();
        let mut ctx = MiddlewareContext::new();

        let next = Next::handler(|_ctx, _req| {
            Box::pin(async {
                let outcome: Outcome = Err(Failure::msg("boom"));
                outcome
            })
        });

        let response = middleware.guard(&mut ctx, make_request(), next).await;
        assert_eq!(
            body_json(response).await,
            serde_json::json!({"code": 500, "message": "internal error, please retry"})
        );
    }

    #[test]
    fn test_builder_settings() {
        let middleware = RecoveryMiddleware::builder()
            .registry(MessageRegistry::default())
            .marker("[api]")
            .stack_limits(1024, 2048)
            .redact_headers(["x-api-key", "bad header"])
            .panic_site_traces(false)
            .build();

        assert_eq!(middleware.name(), "recovery");
        assert_eq!(middleware.marker(), "[api]");
        assert_eq!(middleware.stack_capture(), StackCapture::new(1024, 2048));
        assert_eq!(middleware.redact, vec![HeaderName::from_static("x-api-key")]);
    }
}
