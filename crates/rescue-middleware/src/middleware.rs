//! Core middleware trait and types.
//!
//! Middleware receives the request, the mutable context and a [`Next`]
//! continuation. Each stage returns an [`Outcome`]: `Ok(response)` on normal
//! completion, `Err(failure)` when the request terminated abnormally. The
//! recovery boundary turns every `Err` (and every panic) into a response.
//!
//! # Example
//!
//! ```
//! use rescue_middleware::{BoxFuture, Middleware, MiddlewareContext, Next, Outcome, Request};
//!
//! struct Timing;
//!
//! impl Middleware for Timing {
//!     fn name(&self) -> &'static str {
//!         "timing"
//!     }
//!
//!     fn process<'a>(
//!         &'a self,
//!         ctx: &'a mut MiddlewareContext,
//!         request: Request,
//!         next: Next<'a>,
//!     ) -> BoxFuture<'a, Outcome> {
//!         Box::pin(async move {
//!             let outcome = next.run(ctx, request).await;
//!             tracing::debug!(elapsed_ms = ctx.elapsed().as_millis() as u64, "Request finished");
//!             outcome
//!         })
//!     }
//! }
//! ```

use crate::context::MiddlewareContext;
use crate::types::{Outcome, Request};
use std::future::Future;
use std::pin::Pin;

/// A boxed future that returns `T`.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The core middleware trait.
///
/// # Invariants
///
/// - Middleware calls `next.run()` at most once (zero times to short-circuit)
/// - Middleware passes `Err` outcomes through unless it is the recovery boundary
pub trait Middleware: Send + Sync + 'static {
    /// Returns the unique name of this middleware stage.
    fn name(&self) -> &'static str;

    /// Process the request through this middleware.
    ///
    /// # Arguments
    ///
    /// * `ctx` - The mutable middleware context
    /// * `request` - The incoming HTTP request
    /// * `next` - Continuation that runs the rest of the chain
    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Outcome>;
}

/// The terminal handler of a chain.
pub type HandlerFn<'a> =
    Box<dyn FnOnce(&mut MiddlewareContext, Request) -> BoxFuture<'static, Outcome> + Send + 'a>;

/// Continuation that runs the rest of the chain.
///
/// Consumed by [`Next::run`], so it can be invoked at most once.
pub struct Next<'a> {
    inner: NextInner<'a>,
}

enum NextInner<'a> {
    /// More middleware to process
    Chain {
        middleware: &'a dyn Middleware,
        next: Box<Next<'a>>,
    },
    /// End of chain - invoke the handler
    Handler(HandlerFn<'a>),
}

impl<'a> Next<'a> {
    /// Creates a `Next` that will invoke `middleware`, then `next`.
    pub fn new(middleware: &'a dyn Middleware, next: Next<'a>) -> Self {
        Self {
            inner: NextInner::Chain {
                middleware,
                next: Box::new(next),
            },
        }
    }

    /// Creates a terminal `Next` that invokes the handler.
    pub fn handler<F>(f: F) -> Self
    where
        F: FnOnce(&mut MiddlewareContext, Request) -> BoxFuture<'static, Outcome> + Send + 'a,
    {
        Self {
            inner: NextInner::Handler(Box::new(f)),
        }
    }

    /// Invokes the next middleware or handler in the chain.
    pub async fn run(self, ctx: &mut MiddlewareContext, request: Request) -> Outcome {
        match self.inner {
            NextInner::Chain { middleware, next } => middleware.process(ctx, request, *next).await,
            NextInner::Handler(handler) => handler(ctx, request).await,
        }
    }
}

/// A middleware built from a function.
///
/// # Example
///
/// ```
/// use rescue_middleware::{BoxFuture, FnMiddleware, MiddlewareContext, Next, Outcome, Request};
///
/// fn passthrough<'a>(
///     ctx: &'a mut MiddlewareContext,
///     request: Request,
///     next: Next<'a>,
/// ) -> BoxFuture<'a, Outcome> {
///     Box::pin(next.run(ctx, request))
/// }
///
/// let middleware = FnMiddleware::new("passthrough", passthrough);
/// ```
pub struct FnMiddleware<F> {
    name: &'static str,
    func: F,
}

impl<F> FnMiddleware<F> {
    /// Creates a new function-based middleware.
    pub const fn new(name: &'static str, func: F) -> Self {
        Self { name, func }
    }
}

impl<F> Middleware for FnMiddleware<F>
where
    F: for<'a> Fn(&'a mut MiddlewareContext, Request, Next<'a>) -> BoxFuture<'a, Outcome>
        + Send
        + Sync
        + 'static,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Outcome> {
        (self.func)(ctx, request, next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Response, ResponseExt};
    use bytes::Bytes;
    use http::{Request as HttpRequest, StatusCode};
    use http_body_util::Full;
    use rescue_core::{Failure, MessageRegistry};

    struct TestMiddleware {
        name: &'static str,
    }

    #[derive(Debug, Default)]
    struct Visited(Vec<&'static str>);

    impl Middleware for TestMiddleware {
        fn name(&self) -> &'static str {
            self.name
        }

        fn process<'a>(
            &'a self,
            ctx: &'a mut MiddlewareContext,
            request: Request,
            next: Next<'a>,
        ) -> BoxFuture<'a, Outcome> {
            Box::pin(async move {
                let mut visited = ctx.remove_extension::<Visited>().unwrap_or_default();
                visited.0.push(self.name);
                ctx.set_extension(visited);
                next.run(ctx, request).await
            })
        }
    }

    fn make_request() -> Request {
        HttpRequest::builder()
            .uri("/test")
            .body(Full::new(Bytes::new()))
            .unwrap()
    }

    fn ok_handler() -> Next<'static> {
        Next::handler(|_ctx, _req| {
            Box::pin(async {
                let outcome: Outcome = Ok(Response::json(StatusCode::OK, r#"{"ok":true}"#));
                outcome
            })
        })
    }

    #[tokio::test]
    async fn test_middleware_name() {
        let mw = TestMiddleware { name: "test" };
        assert_eq!(mw.name(), "test");
    }

    #[tokio::test]
    async fn test_next_handler() {
        let mut ctx = MiddlewareContext::new();
        let response = ok_handler().run(&mut ctx, make_request()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_middleware_chain() {
        let mw1 = TestMiddleware { name: "first" };
        let mw2 = TestMiddleware { name: "second" };

        let mut ctx = MiddlewareContext::new();
        let next = Next::new(&mw1, Next::new(&mw2, ok_handler()));

        let response = next.run(&mut ctx, make_request()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(ctx.get_extension::<Visited>().unwrap().0, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_failure_propagates_through_chain() {
        let mw = TestMiddleware { name: "outer" };
        let mut ctx = MiddlewareContext::new();

        let handler = Next::handler(|_ctx, _req| {
            Box::pin(async {
                let registry = MessageRegistry::default();
                let outcome: Outcome =
                    Err(registry.gen_error(StatusCode::FORBIDDEN, 42, Some("denied")).into());
                outcome
            })
        });

        let outcome = Next::new(&mw, handler).run(&mut ctx, make_request()).await;
        match outcome {
            Err(Failure::Deliberate(error)) => assert_eq!(error.code(), 42),
            other => panic!("expected deliberate failure, got {other:?}"),
        }
    }

    fn tag_header<'a>(
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Outcome> {
        Box::pin(async move {
            let mut response = next.run(ctx, request).await?;
            response
                .headers_mut()
                .insert("x-tagged", http::HeaderValue::from_static("yes"));
            Ok::<_, Failure>(response)
        })
    }

    #[tokio::test]
    async fn test_fn_middleware() {
        let mw = FnMiddleware::new("tag", tag_header);
        assert_eq!(mw.name(), "tag");

        let mut ctx = MiddlewareContext::new();
        let response = Next::new(&mw, ok_handler())
            .run(&mut ctx, make_request())
            .await
            .unwrap();
        assert_eq!(response.headers().get("x-tagged").unwrap(), "yes");
    }
}
