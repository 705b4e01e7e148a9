//! Recovery-wrapped middleware pipeline.
//!
//! The recovery middleware is always the outermost stage. Every other stage,
//! and the handler, run inside it, so a panic or failure anywhere in the
//! chain still produces a response.
//!
//! ```text
//! Request → Recovery → stage 1 → … → stage N → Handler
//!                                                 ↓
//! Response ← Recovery ← stage 1 ← … ← stage N ←──┘
//! ```

use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::recovery::RecoveryMiddleware;
use crate::types::{Outcome, Request, Response};
use std::sync::Arc;

/// A type-erased middleware that can be stored in a vector.
pub type BoxedMiddleware = Arc<dyn Middleware>;

/// An immutable middleware pipeline guarded by a [`RecoveryMiddleware`].
///
/// # Example
///
/// ```
/// use rescue_middleware::{MemorySink, Pipeline, RecoveryMiddleware};
///
/// let pipeline = Pipeline::builder(RecoveryMiddleware::new(MemorySink::new())).build();
/// assert_eq!(pipeline.stage_names(), vec!["recovery"]);
/// ```
pub struct Pipeline {
    recovery: Arc<RecoveryMiddleware>,
    stages: Vec<BoxedMiddleware>,
}

impl Pipeline {
    /// Creates a pipeline builder around `recovery`.
    #[must_use]
    pub fn builder(recovery: RecoveryMiddleware) -> PipelineBuilder {
        PipelineBuilder::new(Arc::new(recovery))
    }

    /// Processes a request through the recovery boundary, every stage and
    /// `handler`.
    ///
    /// Always returns a response. The context is left for the caller to
    /// inspect; a [`crate::context::Recovered`] extension is present when the
    /// request terminated abnormally.
    pub async fn process<H>(
        &self,
        ctx: &mut MiddlewareContext,
        request: Request,
        handler: H,
    ) -> Response
    where
        H: FnOnce(&mut MiddlewareContext, Request) -> BoxFuture<'static, Outcome> + Send,
    {
        let next = self.build_chain(handler);
        self.recovery.guard(ctx, request, next).await
    }

    /// Builds the chain of stages inside the recovery boundary.
    fn build_chain<'a, H>(&'a self, handler: H) -> Next<'a>
    where
        H: FnOnce(&mut MiddlewareContext, Request) -> BoxFuture<'static, Outcome> + Send + 'a,
    {
        self.stages
            .iter()
            .rev()
            .fold(Next::handler(handler), |next, stage| {
                Next::new(stage.as_ref(), next)
            })
    }

    /// The recovery middleware guarding this pipeline.
    #[must_use]
    pub fn recovery(&self) -> &RecoveryMiddleware {
        &self.recovery
    }

    /// Returns the names of all stages in order, starting with `recovery`.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&'static str> {
        std::iter::once(self.recovery.name())
            .chain(self.stages.iter().map(|stage| stage.name()))
            .collect()
    }

    /// Returns the number of stages, including recovery.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len() + 1
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stage_names())
            .finish()
    }
}

/// Builder for constructing a [`Pipeline`].
pub struct PipelineBuilder {
    recovery: Arc<RecoveryMiddleware>,
    stages: Vec<BoxedMiddleware>,
}

impl PipelineBuilder {
    fn new(recovery: Arc<RecoveryMiddleware>) -> Self {
        Self {
            recovery,
            stages: Vec::new(),
        }
    }

    /// Appends a stage. Stages run in the order they are added.
    #[must_use]
    pub fn stage(mut self, middleware: impl Middleware) -> Self {
        self.stages.push(Arc::new(middleware));
        self
    }

    /// Appends a shared stage.
    #[must_use]
    pub fn shared_stage(mut self, middleware: BoxedMiddleware) -> Self {
        self.stages.push(middleware);
        self
    }

    /// Builds the pipeline.
    #[must_use]
    pub fn build(self) -> Pipeline {
        tracing::debug!(stages = self.stages.len() + 1, "Built recovery pipeline");
        Pipeline {
            recovery: self.recovery,
            stages: self.stages,
        }
    }
}
