//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Build the upstream registry, route table and pipeline from config
//! - Create the Axum router with a single fallback handler
//! - Wire up request ID and body limit layers
//! - Serve until shutdown is triggered

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::http::middleware::{ExceptionContainmentStage, ForwardStage, RequestLoggingStage};
use crate::http::pipeline::{Pipeline, RequestContext};
use crate::http::request::{propagate_request_id_layer, set_request_id_layer};
use crate::lifecycle::Shutdown;
use crate::resilience::clock::{SharedClock, SystemClock};
use crate::routing::Router as RouteTable;
use crate::upstream::registry::UpstreamRegistry;

/// Application state injected into the handler.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Pipeline,
    pub shutdown: Shutdown,
}

/// HTTP server for the gateway.
pub struct HttpServer {
    router: Router,
    config: GatewayConfig,
    pipeline: Pipeline,
    upstreams: Arc<UpstreamRegistry>,
    shutdown: Shutdown,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Same as [`HttpServer::new`] with an explicit time source.
    pub fn with_clock(config: GatewayConfig, clock: SharedClock) -> Result<Self, GatewayError> {
        let upstreams = Arc::new(UpstreamRegistry::from_config(
            &config.upstreams,
            &config.timeouts,
            clock.clone(),
        )?);
        let routes = Arc::new(RouteTable::from_config(config.routes.clone()));
        let pipeline = build_pipeline(&config, routes, upstreams.clone(), clock);

        tracing::info!(
            stages = ?pipeline.stage_names(),
            upstreams = upstreams.len(),
            "Pipeline built"
        );

        let shutdown = Shutdown::new();
        let state = AppState {
            pipeline: pipeline.clone(),
            shutdown: shutdown.clone(),
        };
        let router = Self::build_router(&config, state);

        Ok(Self {
            router,
            config,
            pipeline,
            upstreams,
            shutdown,
        })
    }

    fn build_router(config: &GatewayConfig, state: AppState) -> Router {
        Router::new()
            .fallback(gateway_handler)
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(set_request_id_layer())
                    .layer(propagate_request_id_layer())
                    .layer(RequestBodyLimitLayer::new(config.limits.max_body_bytes)),
            )
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(self, listener: TcpListener) -> Result<(), GatewayError> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let shutdown = self.shutdown.clone();
        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move { shutdown.wait().await })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Handle that stops [`HttpServer::run`] when triggered.
    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn upstreams(&self) -> &Arc<UpstreamRegistry> {
        &self.upstreams
    }
}

/// Standard composition: containment → logging → forward.
pub fn build_pipeline(
    config: &GatewayConfig,
    routes: Arc<RouteTable>,
    upstreams: Arc<UpstreamRegistry>,
    clock: SharedClock,
) -> Pipeline {
    Pipeline::builder()
        .stage(ExceptionContainmentStage)
        .stage(RequestLoggingStage::new(clock))
        .stage(ForwardStage::new(
            routes,
            upstreams,
            Duration::from_secs(config.timeouts.request_secs),
            config.limits.max_body_bytes,
        ))
        .build()
}

/// Runs every inbound request through the pipeline.
async fn gateway_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let mut ctx = RequestContext::with_cancellation(request, state.shutdown.request_token());
    // Client disconnect drops this future; cancel whatever still holds the token.
    let _cancel_on_drop = ctx.cancellation().clone().drop_guard();

    match state.pipeline.run(&mut ctx).await {
        Ok(response) => response,
        Err(fault) => {
            tracing::error!(
                request_id = %ctx.request_id(),
                path = %ctx.path(),
                error = %fault,
                "Fault escaped the pipeline"
            );
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
