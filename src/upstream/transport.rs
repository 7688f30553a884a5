//! Single network attempt against an upstream.
//!
//! # Responsibilities
//! - Rewrite the buffered request onto the upstream's base address
//! - Send it with the shared hyper client
//! - Buffer and classify the response into a [`CallOutcome`]
//!
//! # Design Decisions
//! - No retry or breaker logic here; the invoker owns that
//! - Connection and body-read errors are transient
//! - One `HttpTransport` per upstream, all sharing one pooled client

use std::fmt;
use std::time::Duration;

use axum::body::{self, Body};
use axum::http::Request;
use bytes::Bytes;
use futures_util::future::{BoxFuture, FutureExt};
use hyper::body::Incoming;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use url::Url;

use crate::resilience::outcome::{CallOutcome, Failure};
use crate::upstream::message::{UpstreamRequest, UpstreamResponse};

/// Upper bound on buffered upstream response bodies.
const MAX_RESPONSE_BYTES: usize = 16 * 1024 * 1024;

/// Performs one attempt and classifies the result.
pub trait Transport: Send + Sync + fmt::Debug {
    fn send<'a>(&'a self, request: &'a UpstreamRequest) -> BoxFuture<'a, CallOutcome>;
}

/// Shared pooled HTTP client.
pub type HttpClient = Client<HttpConnector, Body>;

/// Build the client used by every upstream transport.
pub fn build_client(connect_timeout: Duration) -> HttpClient {
    let mut connector = HttpConnector::new();
    connector.set_connect_timeout(Some(connect_timeout));
    connector.set_nodelay(true);
    Client::builder(TokioExecutor::new()).build(connector)
}

/// Transport to one upstream base address.
#[derive(Clone)]
pub struct HttpTransport {
    client: HttpClient,
    base: Url,
}

impl HttpTransport {
    pub fn new(client: HttpClient, base: Url) -> Self {
        Self { client, base }
    }

    fn target_uri(&self, path_and_query: &str) -> String {
        format!("{}{}", self.base.as_str().trim_end_matches('/'), path_and_query)
    }

    async fn attempt(&self, request: &UpstreamRequest) -> CallOutcome {
        let mut builder = Request::builder()
            .method(request.method.clone())
            .uri(self.target_uri(&request.path_and_query));
        if let Some(headers) = builder.headers_mut() {
            headers.extend(request.headers.clone());
        }

        let outbound = match builder.body(Body::from(request.body.clone())) {
            Ok(req) => req,
            // Malformed target; retrying would build the same request.
            Err(e) => return CallOutcome::FatalFailure(Failure::Transport(e.to_string())),
        };

        let response = match self.client.request(outbound).await {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!(upstream = %self.base, error = %e, "Upstream request failed");
                return CallOutcome::TransientFailure(Failure::Transport(e.to_string()));
            }
        };

        let (parts, incoming) = response.into_parts();
        let body = match read_body(incoming).await {
            Ok(bytes) => bytes,
            Err(e) => return CallOutcome::TransientFailure(Failure::Transport(e.to_string())),
        };

        CallOutcome::from_response(UpstreamResponse {
            status: parts.status,
            headers: parts.headers,
            body,
        })
    }
}

/// Buffer an upstream response body up to [`MAX_RESPONSE_BYTES`].
async fn read_body(incoming: Incoming) -> Result<Bytes, axum::Error> {
    body::to_bytes(Body::new(incoming), MAX_RESPONSE_BYTES).await
}

impl fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTransport")
            .field("base", &self.base.as_str())
            .finish_non_exhaustive()
    }
}

impl Transport for HttpTransport {
    fn send<'a>(&'a self, request: &'a UpstreamRequest) -> BoxFuture<'a, CallOutcome> {
        self.attempt(request).boxed()
    }
}
