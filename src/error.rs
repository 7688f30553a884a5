//! Gateway fault type.
//!
//! Upstream outcomes travel as [`CallOutcome`](crate::resilience::outcome::CallOutcome)
//! values; `GatewayError` is reserved for faults that escape a pipeline stage
//! and for startup failures.

use crate::config::loader::ConfigError;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("request body could not be read: {0}")]
    RequestBody(String),

    #[error("request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error("request already consumed by an earlier stage")]
    RequestConsumed,

    #[error("no stage produced a response")]
    ChainExhausted,

    #[error("route {route} points at unknown upstream {upstream}")]
    UnknownUpstream { route: String, upstream: String },

    #[error("invalid upstream {name}: {reason}")]
    InvalidUpstream { name: String, reason: String },

    #[error("handler panicked: {0}")]
    Panic(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Internal(String),
}

impl GatewayError {
    pub fn internal(message: impl Into<String>) -> Self {
        GatewayError::Internal(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::loader::parse_config;

    #[test]
    fn test_config_error_converts() {
        fn load() -> Result<(), GatewayError> {
            parse_config("upstreams = 7")?;
            Ok(())
        }

        let err = load().unwrap_err();
        assert!(matches!(err, GatewayError::Config(ConfigError::Parse(_))));
        assert!(err.to_string().starts_with("Parse error: "));
    }

    #[test]
    fn test_io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::AddrInUse, "address in use");
        let err: GatewayError = io.into();
        assert!(matches!(err, GatewayError::Io(_)));
        assert_eq!(err.to_string(), "address in use");
    }
}
