//! Buffered request/response pair exchanged with an upstream.
//!
//! Requests are buffered so every retry attempt can resend the same bytes.

use axum::body::{self, Body};
use axum::http::{header, HeaderMap, Method, Request, Response, StatusCode};
use bytes::Bytes;
use http_body_util::LengthLimitError;

use crate::error::GatewayError;

/// Connection-scoped headers that are never forwarded in either direction.
const HOP_BY_HOP: [header::HeaderName; 7] = [
    header::CONNECTION,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Remove hop-by-hop headers, including any named in `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<header::HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| header::HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();
    for name in named.iter().chain(HOP_BY_HOP.iter()) {
        headers.remove(name);
    }
    headers.remove("keep-alive");
}

/// Request as forwarded to an upstream.
#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    pub method: Method,
    /// Path and query of the inbound request.
    pub path_and_query: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl UpstreamRequest {
    /// Buffer an inbound request, reading at most `max_body_bytes` of body.
    pub async fn from_request(
        request: Request<Body>,
        max_body_bytes: usize,
    ) -> Result<Self, GatewayError> {
        let (parts, body) = request.into_parts();
        let body = body::to_bytes(body, max_body_bytes)
            .await
            .map_err(|e| {
                if exceeds_limit(&e) {
                    GatewayError::PayloadTooLarge {
                        limit: max_body_bytes,
                    }
                } else {
                    GatewayError::RequestBody(e.to_string())
                }
            })?;

        let mut headers = parts.headers;
        // The transport addresses the upstream by URI; the client's Host is not meaningful there.
        headers.remove(header::HOST);
        strip_hop_by_hop(&mut headers);

        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| "/".to_string());

        Ok(Self {
            method: parts.method,
            path_and_query,
            headers,
            body,
        })
    }
}

/// Whether a body read failed on the size limit, here or in an outer limit layer.
fn exceeds_limit(err: &axum::Error) -> bool {
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(e) = source {
        if e.is::<LengthLimitError>() {
            return true;
        }
        source = e.source();
    }
    false
}

/// Fully buffered upstream response.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl UpstreamResponse {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn into_response(self) -> Response<Body> {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        strip_hop_by_hop(response.headers_mut());
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_buffering_keeps_path_query_and_drops_host() {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/orders/7?expand=items")
            .header("host", "gateway.local")
            .header("x-request-id", "abc")
            .body(Body::from("payload"))
            .unwrap();

        let buffered = UpstreamRequest::from_request(request, 1024).await.unwrap();
        assert_eq!(buffered.method, Method::POST);
        assert_eq!(buffered.path_and_query, "/orders/7?expand=items");
        assert!(buffered.headers.get(header::HOST).is_none());
        assert_eq!(buffered.headers.get("x-request-id").unwrap(), "abc");
        assert_eq!(&buffered.body[..], b"payload");
    }

    #[tokio::test]
    async fn test_oversized_body_is_rejected() {
        let request = Request::builder()
            .uri("/")
            .body(Body::from(vec![0u8; 64]))
            .unwrap();
        let err = UpstreamRequest::from_request(request, 16).await.unwrap_err();
        assert!(matches!(err, GatewayError::PayloadTooLarge { limit: 16 }));
    }

    #[test]
    fn test_into_response_keeps_status_and_headers() {
        let mut upstream = UpstreamResponse::new(StatusCode::CREATED);
        upstream
            .headers
            .insert("x-upstream", "orders".parse().unwrap());
        let response = upstream.into_response();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers().get("x-upstream").unwrap(), "orders");
    }

    #[test]
    fn test_hop_by_hop_headers_are_stripped() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONNECTION, "close, x-trace-hop".parse().unwrap());
        headers.insert("x-trace-hop", "1".parse().unwrap());
        headers.insert("keep-alive", "timeout=5".parse().unwrap());
        headers.insert(header::TRANSFER_ENCODING, "chunked".parse().unwrap());
        headers.insert(header::CONTENT_TYPE, "text/plain".parse().unwrap());

        strip_hop_by_hop(&mut headers);

        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get(header::CONTENT_TYPE).unwrap(), "text/plain");
    }
}
