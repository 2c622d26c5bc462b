//! Middleware pipeline — ordered stages composed around a terminal handler.
//!
//! Each stage implements a uniform `(request, next) -> response` contract.
//! A stage may short-circuit (return a response without calling `next`), wrap
//! (call `next`, then observe or decorate the returned response), or pass
//! through unchanged. Responses flow back up through the stages in reverse
//! order. The innermost call reaches the terminal domain handler, which the
//! pipeline treats as opaque.
//!
//! ## Core types
//!
//! - [`Middleware`] — trait implemented by all stages.
//! - [`Next`] — cursor into the remaining chain; call [`Next::run`] to
//!   advance to the next stage.
//! - [`MiddlewareHandler`] — type-erased, cheaply-cloneable stage function.
//! - [`Pipeline`] / [`PipelineBuilder`] — compose an ordered stage list into
//!   a single executable chain with an optional per-request timeout.

use std::{future::Future, pin::Pin, sync::Arc, time::Duration};

use tracing::{error, warn};

use crate::http::{Request, Response, StatusCode};

/// The boxed response future every stage returns.
pub type ResponseFuture = Pin<Box<dyn Future<Output = Response> + Send>>;

/// A type-erased, reference-counted stage function.
///
/// Every entry in the chain is stored as a `MiddlewareHandler`. The [`Arc`]
/// wrapper makes handlers cheap to clone so that [`Next`] can advance through
/// the chain without copying closures.
pub type MiddlewareHandler =
    Arc<dyn Fn(Request, Next) -> ResponseFuture + Send + Sync + 'static>;

/// The core trait for all pipeline stages.
///
/// Implementors receive the [`Request`] and a [`Next`] cursor. They may:
///
/// - **Pass through** — call `next.run(request).await` without modification.
/// - **Short-circuit** — return a [`Response`] directly without calling `next`.
/// - **Decorate** — call `next.run(request).await`, inspect the response, and
///   return a modified copy.
///
/// # Contract
///
/// - Implementations must be `Send + Sync` because stages are shared across
///   Tokio tasks.
/// - `handle` must return a pinned, `Send` future so it can be awaited on
///   multi-threaded runtimes.
pub trait Middleware: Send + Sync {
    /// Handle the request and optionally delegate to the rest of the chain.
    fn handle(&self, request: Request, next: Next) -> ResponseFuture;
}

/// Converts a [`Middleware`] implementation into a [`MiddlewareHandler`].
pub fn from_middleware<M>(middleware: Arc<M>) -> MiddlewareHandler
where
    M: Middleware + 'static,
{
    Arc::new(move |request: Request, next: Next| middleware.handle(request, next))
}

/// A cursor into the remaining stage chain for a single request.
///
/// `Next` is consumed on each call to [`run`](Self::run), so a stage cannot
/// invoke the rest of the chain more than once.
///
/// # Examples
///
/// ```rust,no_run
/// use gantry::http::{Request, Response};
/// use gantry::pipeline::{Middleware, Next, ResponseFuture};
///
/// struct PassThrough;
///
/// impl Middleware for PassThrough {
///     fn handle(&self, request: Request, next: Next) -> ResponseFuture {
///         Box::pin(async move { next.run(request).await })
///     }
/// }
/// ```
pub struct Next {
    chain: Vec<MiddlewareHandler>,
    // Tracks which stage to invoke on the next `run` call.
    index: usize,
}

impl Next {
    /// Creates a new `Next` positioned at the start of the given chain.
    pub fn new(chain: Vec<MiddlewareHandler>) -> Self {
        Self { chain, index: 0 }
    }

    /// Invokes the next stage in the chain and returns its response.
    ///
    /// Advances the internal cursor by one, clones the handler at the current
    /// position, and awaits it. An exhausted chain means no stage — not even
    /// the terminal handler — produced a response; that is a contract
    /// violation and is surfaced as a 500 internal error rather than being
    /// silently swallowed.
    pub async fn run(mut self, request: Request) -> Response {
        if self.index < self.chain.len() {
            let handler = self.chain[self.index].clone();
            self.index += 1;
            handler(request, self).await
        } else {
            error!(
                method = %request.method(),
                path = %request.path(),
                "stage chain exhausted without producing a response"
            );
            Response::error(StatusCode::InternalServerError, "Internal server error")
        }
    }
}

/// Builder for a [`Pipeline`].
///
/// Stages execute in the order they are added; the first stage added is the
/// outermost. The terminal domain handler is supplied to
/// [`build`](Self::build).
#[derive(Default)]
pub struct PipelineBuilder {
    stages: Vec<MiddlewareHandler>,
    timeout: Option<Duration>,
}

impl PipelineBuilder {
    /// Appends a stage to the chain.
    #[must_use]
    pub fn stage<M>(mut self, middleware: M) -> Self
    where
        M: Middleware + 'static,
    {
        self.stages.push(from_middleware(Arc::new(middleware)));
        self
    }

    /// Appends an already type-erased stage handler.
    #[must_use]
    pub fn stage_handler(mut self, handler: MiddlewareHandler) -> Self {
        self.stages.push(handler);
        self
    }

    /// Sets a per-request execution deadline. When it elapses the executor
    /// returns a 504 response and abandons the in-flight chain.
    #[must_use]
    pub fn timeout(mut self, limit: Duration) -> Self {
        self.timeout = Some(limit);
        self
    }

    /// Finalizes the pipeline around the terminal domain handler.
    ///
    /// The handler becomes the innermost element of the chain; it receives
    /// the request once every stage has passed it through.
    pub fn build<H, F>(self, handler: H) -> Pipeline
    where
        H: Fn(Request) -> F + Send + Sync + 'static,
        F: Future<Output = Response> + Send + 'static,
    {
        let mut chain = self.stages;
        chain.push(Arc::new(move |request: Request, _next: Next| {
            Box::pin(handler(request)) as ResponseFuture
        }));
        Pipeline {
            chain,
            timeout: self.timeout,
        }
    }
}

/// An ordered composition of stages wrapping a terminal handler.
///
/// The chain order is fixed for the lifetime of the pipeline instance.
/// `Pipeline` is shared across connection tasks via `Arc`; executing a
/// request only clones `Arc` handles.
pub struct Pipeline {
    chain: Vec<MiddlewareHandler>,
    timeout: Option<Duration>,
}

impl Pipeline {
    /// Starts building a pipeline.
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    /// Drives one request through the full stage chain.
    ///
    /// With a configured timeout, an overrunning chain is abandoned and a 504
    /// returned; notification tasks already dispatched by inner stages are
    /// detached and unaffected.
    pub async fn execute(&self, request: Request) -> Response {
        let method = request.method().clone();
        let path = request.path().to_owned();
        let next = Next::new(self.chain.clone());

        match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, next.run(request)).await {
                Ok(response) => response,
                Err(_) => {
                    warn!(%method, %path, timeout = ?limit, "request exceeded execution deadline");
                    Response::error(StatusCode::GatewayTimeout, "Request timed out")
                }
            },
            None => next.run(request).await,
        }
    }
}
