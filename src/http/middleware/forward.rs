//! Forwarding stage (terminal).
//!
//! # Responsibilities
//! - Match the request to a route and its upstream
//! - Buffer the request so retries can resend it
//! - Call the upstream's resilient invoker under the request deadline
//! - Map the final outcome to the client response
//!
//! # Design Decisions
//! - Never calls `next`; it is always the innermost stage
//! - On deadline the request token is cancelled and the call is awaited, so it
//!   resolves as `FatalFailure(Cancelled)` and leaves the breaker consistent

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use axum::response::IntoResponse;
use futures_util::future::{BoxFuture, FutureExt};

use crate::error::GatewayError;
use crate::http::pipeline::{Next, RequestContext, Stage, StageResult};
use crate::http::response::outcome_into_response;
use crate::resilience::outcome::CallOutcome;
use crate::routing::Router;
use crate::upstream::message::UpstreamRequest;
use crate::upstream::registry::UpstreamRegistry;

#[derive(Debug, Clone)]
pub struct ForwardStage {
    routes: Arc<Router>,
    upstreams: Arc<UpstreamRegistry>,
    request_timeout: Duration,
    max_body_bytes: usize,
}

impl ForwardStage {
    pub fn new(
        routes: Arc<Router>,
        upstreams: Arc<UpstreamRegistry>,
        request_timeout: Duration,
        max_body_bytes: usize,
    ) -> Self {
        Self {
            routes,
            upstreams,
            request_timeout,
            max_body_bytes,
        }
    }

    async fn forward(&self, ctx: &mut RequestContext) -> StageResult {
        let Some(route) = self.routes.match_route(ctx.host(), ctx.path()) else {
            tracing::warn!(request_id = %ctx.request_id(), path = %ctx.path(), "No route matched");
            return Ok((StatusCode::NOT_FOUND, "No matching route found").into_response());
        };

        let invoker = self
            .upstreams
            .get(&route.upstream)
            .ok_or_else(|| GatewayError::UnknownUpstream {
                route: route.name.clone(),
                upstream: route.upstream.clone(),
            })?;

        let request = ctx.take_request()?;
        let buffered = UpstreamRequest::from_request(request, self.max_body_bytes).await;
        let upstream_request = match buffered {
            Ok(req) => req,
            Err(e) => {
                tracing::warn!(request_id = %ctx.request_id(), error = %e, "Rejected request body");
                let status = match e {
                    GatewayError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
                    _ => StatusCode::BAD_REQUEST,
                };
                return Ok((status, e.to_string()).into_response());
            }
        };

        tracing::debug!(
            request_id = %ctx.request_id(),
            route = %route.name,
            upstream = %route.upstream,
            "Forwarding request"
        );

        let cancel = ctx.cancellation().child_token();
        let call = invoker.call(&upstream_request, &cancel);
        tokio::pin!(call);

        let outcome = tokio::select! {
            outcome = &mut call => outcome,
            _ = tokio::time::sleep(self.request_timeout) => {
                cancel.cancel();
                call.await
            }
        };

        if !outcome.is_success() {
            log_failure(ctx, &route.upstream, &outcome);
        }
        Ok(outcome_into_response(outcome))
    }
}

fn log_failure(ctx: &RequestContext, upstream: &str, outcome: &CallOutcome) {
    match outcome {
        CallOutcome::TransientFailure(failure) | CallOutcome::FatalFailure(failure) => {
            tracing::warn!(
                request_id = %ctx.request_id(),
                upstream = %upstream,
                outcome = outcome.label(),
                reason = %failure,
                "Upstream call did not succeed"
            );
        }
        CallOutcome::Success(_) => {}
    }
}

impl Stage for ForwardStage {
    fn name(&self) -> &'static str {
        "forward"
    }

    fn handle<'a>(

        &'a self,

        ctx: &'a mut RequestContext,

        _next: Next<'a>,

    ) -> BoxFuture<'a, StageResult> {
        self.forward(ctx).boxed()
    }
}
