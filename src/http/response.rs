//! Response construction.
//!
//! # Responsibilities
//! - Map a resilient call's final outcome to the client response
//! - Build the generic internal-error JSON body
//!
//! # Design Decisions
//! - Upstream responses are relayed untouched, even when classified as failures
//! - Transport failure after retries → 502, circuit open → 503, deadline → 504
//! - Clients never see retry or breaker internals

use axum::body::Body;
use axum::http::{Response, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use crate::resilience::outcome::{CallOutcome, Failure};

/// Message placed in `error` for every unhandled fault.
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

/// Client-facing body for unhandled faults.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
    pub status_code: u16,
}

/// 500 response carrying `detail` in the JSON body.
pub fn internal_error(detail: impl Into<String>) -> Response<Body> {
    let status = StatusCode::INTERNAL_SERVER_ERROR;
    let body = ErrorBody {
        error: INTERNAL_ERROR_MESSAGE,
        message: detail.into(),
        status_code: status.as_u16(),
    };
    (status, Json(body)).into_response()
}

/// Client response for a call outcome.
pub fn outcome_into_response(outcome: CallOutcome) -> Response<Body> {
    match outcome {
        CallOutcome::Success(response) => response.into_response(),
        CallOutcome::TransientFailure(failure) | CallOutcome::FatalFailure(failure) => {
            failure_into_response(failure)
        }
    }
}

fn failure_into_response(failure: Failure) -> Response<Body> {
    match failure {
        Failure::Status(response) => response.into_response(),
        Failure::Transport(_) => {
            (StatusCode::BAD_GATEWAY, "Upstream request failed").into_response()
        }
        Failure::CircuitOpen => {
            (StatusCode::SERVICE_UNAVAILABLE, "Upstream temporarily unavailable").into_response()
        }
        Failure::Cancelled => {
            (StatusCode::GATEWAY_TIMEOUT, "Upstream request timed out").into_response()
        }
    }
}
