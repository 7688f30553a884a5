//! Shutdown coordination for the gateway.

use tokio_util::sync::CancellationToken;

/// Coordinator for graceful shutdown.
///
/// Every request gets a child of this token, so triggering shutdown also
/// aborts retry backoff sleeps still pending inside in-flight calls.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    token: CancellationToken,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Trigger the shutdown signal.
    pub fn trigger(&self) {
        self.token.cancel();
    }

    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once shutdown is triggered.
    pub async fn wait(&self) {
        self.token.cancelled().await
    }

    /// Token for one request; cancelled on shutdown.
    pub fn request_token(&self) -> CancellationToken {
        self.token.child_token()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_trigger_cancels_request_tokens() {
        let shutdown = Shutdown::new();
        let request = shutdown.request_token();
        assert!(!request.is_cancelled());

        shutdown.trigger();
        shutdown.wait().await;

        assert!(shutdown.is_triggered());
        assert!(request.is_cancelled());
    }

    #[tokio::test]
    async fn test_request_token_does_not_cancel_parent() {
        let shutdown = Shutdown::new();
        shutdown.request_token().cancel();
        assert!(!shutdown.is_triggered());
    }
}
