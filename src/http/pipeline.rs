//! Middleware pipeline executor.
//!
//! # Data Flow
//! ```text
//! PipelineBuilder::new()
//!     .stage(A).stage(B).stage(C)     first registered = outermost
//!     .build()
//!
//! run(ctx) → A.handle(ctx, next→B) → B.handle(ctx, next→C) → C.handle(ctx, next→∅)
//! ```
//!
//! # Design Decisions
//! - Chain composed once at build time, shared by every request
//! - `Next` is consumed by `run`, so a stage can delegate at most once
//! - Faults travel as `Err(GatewayError)`; only a containment stage turns them into responses
//! - Running past the last stage is a fault, not an implicit 404

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use futures_util::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::error::GatewayError;
use crate::http::request::X_REQUEST_ID;

/// Result of running (part of) the chain.
pub type StageResult = Result<Response<Body>, GatewayError>;

/// One unit of the middleware pipeline.
pub trait Stage: Send + Sync {
    /// Name used in startup logs.
    fn name(&self) -> &'static str;

    /// Handle the request, optionally delegating to the rest of the chain via `next`.
    fn handle<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, StageResult>;
}

/// Continuation bound to the remainder of the chain.
pub struct Next<'a> {
    rest: &'a [Arc<dyn Stage>],
}

impl<'a> Next<'a> {
    /// Run the remaining stages.
    pub fn run<'b>(self, ctx: &'b mut RequestContext) -> BoxFuture<'b, StageResult>
    where
        'a: 'b,
    {
        match self.rest.split_first() {
            Some((stage, rest)) => stage.handle(ctx, Next { rest }),
            None => Box::pin(async { Err(GatewayError::ChainExhausted) }),
        }
    }
}

/// Per-request state owned by one pipeline execution.
pub struct RequestContext {
    request: Option<Request<Body>>,
    method: Method,
    path: String,
    host: Option<String>,
    request_id: Option<String>,
    received_at: Instant,
    cancel: CancellationToken,
}

impl RequestContext {
    pub fn new(request: Request<Body>) -> Self {
        Self::with_cancellation(request, CancellationToken::new())
    }

    /// Context whose cancellation token is `cancel`, typically a child of the shutdown token.
    pub fn with_cancellation(request: Request<Body>, cancel: CancellationToken) -> Self {
        let host = request
            .headers()
            .get(axum::http::header::HOST)
            .and_then(|h| h.to_str().ok())
            .map(str::to_string)
            .or_else(|| request.uri().host().map(str::to_string));
        let request_id = request
            .headers()
            .get(X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        Self {
            method: request.method().clone(),
            path: request.uri().path().to_string(),
            host,
            request_id,
            received_at: Instant::now(),
            cancel,
            request: Some(request),
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    pub fn request_id(&self) -> &str {
        self.request_id.as_deref().unwrap_or("unknown")
    }

    pub fn received_at(&self) -> Instant {
        self.received_at
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Take ownership of the inbound request; later calls fail.
    pub fn take_request(&mut self) -> Result<Request<Body>, GatewayError> {
        self.request.take().ok_or(GatewayError::RequestConsumed)
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("request_id", &self.request_id)
            .field("request_taken", &self.request.is_none())
            .finish()
    }
}

/// Composed, immutable chain of stages.
#[derive(Clone)]
pub struct Pipeline {
    stages: Arc<[Arc<dyn Stage>]>,
}

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    /// Compose `stages` outer-to-inner.
    pub fn build(stages: Vec<Arc<dyn Stage>>) -> Self {
        Self {
            stages: stages.into(),
        }
    }

    pub async fn run(&self, ctx: &mut RequestContext) -> StageResult {
        Next { rest: &self.stages[..] }.run(ctx).await
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stage_names())
            .finish()
    }
}

/// Ordered registration of stages.
#[derive(Default)]
pub struct PipelineBuilder {
    stages: Vec<Arc<dyn Stage>>,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stage inside every stage registered so far.
    pub fn stage<S: Stage + 'static>(mut self, stage: S) -> Self {
        self.stages.push(Arc::new(stage));
        self
    }

    pub fn build(self) -> Pipeline {
        Pipeline::build(self.stages)
    }
}
