//! Request timing and logging.
//!
//! Emits one `Request completed` event per response that comes back through
//! this stage, error-mapped responses included. A fault passing through
//! unconverted is not logged here; the containment stage outside owns it.

use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt};

use crate::http::pipeline::{Next, RequestContext, Stage, StageResult};
use crate::observability::metrics;
use crate::resilience::clock::{SharedClock, SystemClock};

#[derive(Debug, Clone)]
pub struct RequestLoggingStage {
    clock: SharedClock,
}

impl RequestLoggingStage {
    pub fn new(clock: SharedClock) -> Self {
        Self { clock }
    }
}

impl Default for RequestLoggingStage {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl Stage for RequestLoggingStage {
    fn name(&self) -> &'static str {
        "request_logging"
    }

    fn handle<'a>(

        &'a self,

        ctx: &'a mut RequestContext,

        next: Next<'a>,

    ) -> BoxFuture<'a, StageResult> {
        async move {
            let started = self.clock.now();
            let method = ctx.method().clone();
            let path = ctx.path().to_string();

            let response = next.run(&mut *ctx).await?;

            let elapsed = self.clock.now().saturating_duration_since(started);
            let status = response.status().as_u16();
            tracing::info!(
                request_id = %ctx.request_id(),
                method = %method,
                path = %path,
                status,
                elapsed_ms = elapsed.as_millis() as u64,
                "Request completed"
            );
            metrics::record_request(method.as_str(), status, elapsed);

            Ok(response)
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GatewayError;
    use crate::http::pipeline::Pipeline;
    use axum::body::Body;
    use axum::http::{Request, Response, StatusCode};
    use std::sync::Mutex;
    use tracing::field::{Field, Visit};
    use tracing_subscriber::layer::{Context, SubscriberExt};
    use tracing_subscriber::Layer;

    /// Keeps `message` and `status` of every event.
    #[derive(Clone, Default)]
    struct Events(Arc<Mutex<Vec<(String, Option<u64>)>>>);

    struct Fields(String, Option<u64>);

    impl Visit for Fields {
        fn record_u64(&mut self, field: &Field, value: u64) {
            if field.name() == "status" {
                self.1 = Some(value);
            }
        }

        fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
            if field.name() == "message" {
                self.0 = format!("{:?}", value);
            }
        }
    }

    impl<S: tracing::Subscriber> Layer<S> for Events {
        fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
            let mut fields = Fields(String::new(), None);
            event.record(&mut fields);
            self.0.lock().unwrap().push((fields.0, fields.1));
        }
    }

    struct Reply(StatusCode);

    impl Stage for Reply {
        fn name(&self) -> &'static str {
            "reply"
        }

        fn handle<'a>(
            &'a self,
            _ctx: &'a mut RequestContext,
            _next: Next<'a>,
        ) -> BoxFuture<'a, StageResult> {
            let status = self.0;
            async move {
                let mut response = Response::new(Body::empty());
                *response.status_mut() = status;
                Ok(response)
            }
            .boxed()
        }
    }

    struct Fault;

    impl Stage for Fault {
        fn name(&self) -> &'static str {
            "fault"
        }

        fn handle<'a>(
            &'a self,
            _ctx: &'a mut RequestContext,
            _next: Next<'a>,
        ) -> BoxFuture<'a, StageResult> {
            async { Err(GatewayError::internal("ledger offline")) }.boxed()
        }
    }

    fn ctx() -> RequestContext {
        RequestContext::new(Request::builder().uri("/stock").body(Body::empty()).unwrap())
    }

    #[tokio::test]
    async fn test_error_mapped_response_is_logged() {
        let events = Events::default();
        let _guard =
            tracing::subscriber::set_default(tracing_subscriber::registry().with(events.clone()));
        let pipeline = Pipeline::builder()
            .stage(RequestLoggingStage::default())
            .stage(Reply(StatusCode::SERVICE_UNAVAILABLE))
            .build();

        let response = pipeline.run(&mut ctx()).await.unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            *events.0.lock().unwrap(),
            vec![("Request completed".to_string(), Some(503))]
        );
    }

    #[tokio::test]
    async fn test_propagated_fault_is_not_logged() {
        let events = Events::default();
        let _guard =
            tracing::subscriber::set_default(tracing_subscriber::registry().with(events.clone()));
        let pipeline = Pipeline::builder()
            .stage(RequestLoggingStage::default())
            .stage(Fault)
            .build();

        let err = pipeline.run(&mut ctx()).await.unwrap_err();

        assert_eq!(err.to_string(), "ledger offline");
        assert!(events.0.lock().unwrap().is_empty());
    }
}
