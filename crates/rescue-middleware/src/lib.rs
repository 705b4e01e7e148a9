//! # Rescue Middleware
//!
//! A recovery boundary for request handlers.
//!
//! Handlers return an [`Outcome`]. Anything other than a normal response is
//! answered by the [`RecoveryMiddleware`] with a JSON body of the form
//! `{"code": <int>, "message": <string>}`:
//!
//! ```text
//! Request → Recovery → stages → Handler
//!              ↓
//!   Ok(response)           → passed through untouched
//!   Deliberate(ErrorValue) → its status, code and message; nothing logged
//!   Unexpected / panic     → 500 with the generic message; one log entry
//!                            carrying the request dump and stack trace
//! ```
//!
//! ## Example
//!
//! ```
//! use rescue_middleware::{
//!     MemorySink, MiddlewareContext, Outcome, Pipeline, RecoveryMiddleware, Request,
//! };
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let sink = Arc::new(MemorySink::new());
//! let pipeline = Pipeline::builder(RecoveryMiddleware::new(Arc::clone(&sink))).build();
//!
//! let request: Request = http::Request::builder()
//!     .uri("/boom")
//!     .body(Default::default())
//!     .unwrap();
//! let mut ctx = MiddlewareContext::new();
//! let response = pipeline
//!     .process(&mut ctx, request, |_ctx, _req| {
//!         Box::pin(async {
//!             let outcome: Outcome = Err(rescue_core::Failure::msg("db down"));
//!             outcome
//!         })
//!     })
//!     .await;
//!
//! assert_eq!(response.status(), 500);
//! assert_eq!(sink.len(), 1);
//! # });
//! ```

#![doc(html_root_url = "https://docs.rs/rescue-middleware/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod context;
pub mod middleware;
pub mod pipeline;
pub mod recovery;
pub mod types;

// Re-export main types at crate root
pub use context::{MiddlewareContext, Recovered, RequestId};
pub use middleware::{BoxFuture, FnMiddleware, HandlerFn, Middleware, Next};
pub use pipeline::{BoxedMiddleware, Pipeline, PipelineBuilder};
pub use recovery::{
    LogSink, MemorySink, RecoveryEntry, RecoveryMiddleware, RecoveryMiddlewareBuilder,
    RequestSnapshot, StackCapture, StackTrace, TracingSink, WriterSink,
};
pub use types::{Outcome, Request, Response, ResponseExt};
