//! Result of one upstream attempt or of a whole resilient call.

use axum::http::StatusCode;

use crate::upstream::message::UpstreamResponse;

/// Outcome of a call, consumed by both the retry policy and the breaker.
#[derive(Debug, Clone)]
pub enum CallOutcome {
    Success(UpstreamResponse),
    /// Likely to resolve on retry; counts toward opening the breaker.
    TransientFailure(Failure),
    /// Not retried and not evidence of an upstream outage.
    FatalFailure(Failure),
}

/// Why a call did not succeed.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Failure {
    #[error("upstream responded with status {}", .0.status)]
    Status(UpstreamResponse),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("circuit open")]
    CircuitOpen,
    #[error("cancelled")]
    Cancelled,
}

impl CallOutcome {
    /// Classify an upstream response by status class.
    ///
    /// 408 and every 5xx are transient, other 4xx are fatal.
    pub fn from_response(response: UpstreamResponse) -> Self {
        if is_transient_status(response.status) {
            CallOutcome::TransientFailure(Failure::Status(response))
        } else if response.status.is_client_error() {
            CallOutcome::FatalFailure(Failure::Status(response))
        } else {
            CallOutcome::Success(response)
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, CallOutcome::Success(_))
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, CallOutcome::TransientFailure(_))
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, CallOutcome::FatalFailure(_))
    }

    /// Short label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            CallOutcome::Success(_) => "success",
            CallOutcome::TransientFailure(_) => "transient_failure",
            CallOutcome::FatalFailure(Failure::CircuitOpen) => "circuit_open",
            CallOutcome::FatalFailure(Failure::Cancelled) => "cancelled",
            CallOutcome::FatalFailure(_) => "fatal_failure",
        }
    }
}

/// Statuses worth retrying.
pub fn is_transient_status(status: StatusCode) -> bool {
    status == StatusCode::REQUEST_TIMEOUT || status.is_server_error()
}
