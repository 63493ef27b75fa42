//! Retry policy applied around every transport fetch
//!
//! One policy object is shared by page downloads and chapter document
//! fetches, so every source gets the same behaviour. Back-off sleeps and the
//! fetches themselves both observe the run's cancellation token.

use crate::config::RetryConfig;
use crate::transport::{AuthContext, Transport, TransportError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Bounded exponential back-off
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,

    /// Delay before the second attempt
    pub initial_backoff: Duration,

    /// Upper bound on any single delay
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Builds the policy from the `[retry]` configuration section
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
        }
    }

    /// A policy that never retries
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// Delay after the given failed attempt (1-based), doubling each time
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    /// Fetches a URL, retrying transient failures
    ///
    /// # Returns
    ///
    /// * `Ok(Vec<u8>)` - The response body
    /// * `Err(TransportError::Cancelled)` - The token fired during a fetch or a back-off
    /// * `Err(TransportError)` - The last failure once attempts are exhausted, or
    ///   the first non-retryable failure
    pub async fn fetch(
        &self,
        transport: &dyn Transport,
        url: &str,
        auth: &AuthContext,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, TransportError> {
        let mut attempt = 1;
        loop {
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(TransportError::Cancelled),
                result = transport.fetch(url, auth) => result,
            };

            match result {
                Ok(body) => return Ok(body),
                Err(error) if error.is_retryable() && attempt < self.max_attempts => {
                    let delay = self.backoff_for(attempt);
                    tracing::debug!(
                        "Attempt {}/{} for {} failed ({}), retrying in {:?}",
                        attempt,
                        self.max_attempts,
                        url,
                        error,
                        delay
                    );
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(TransportError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeTransport, Reply};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(350),
        };
        assert_eq!(policy.backoff_for(1), Duration::from_millis(100));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(200));
        assert_eq!(policy.backoff_for(3), Duration::from_millis(350));
        assert_eq!(policy.backoff_for(30), Duration::from_millis(350));
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        let transport = FakeTransport::new();
        transport.route("https://cdn.test/1.jpg", Reply::Status(503));
        transport.route("https://cdn.test/1.jpg", Reply::body("image"));

        let body = fast_policy(3)
            .fetch(
                &transport,
                "https://cdn.test/1.jpg",
                &AuthContext::default(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(body, b"image");
        assert_eq!(transport.call_count("https://cdn.test/1.jpg"), 2);
    }

    #[tokio::test]
    async fn test_permanent_failure_is_not_retried() {
        let transport = FakeTransport::new();
        transport.route("https://cdn.test/1.jpg", Reply::Status(404));

        let result = fast_policy(3)
            .fetch(
                &transport,
                "https://cdn.test/1.jpg",
                &AuthContext::default(),
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(result.unwrap_err().status(), Some(404));
        assert_eq!(transport.call_count("https://cdn.test/1.jpg"), 1);
    }

    #[tokio::test]
    async fn test_attempts_are_bounded() {
        let transport = FakeTransport::new();
        transport.route("https://cdn.test/1.jpg", Reply::Status(500));

        let result = fast_policy(3)
            .fetch(
                &transport,
                "https://cdn.test/1.jpg",
                &AuthContext::default(),
                &CancellationToken::new(),
            )
            .await;

        assert!(result.is_err());
        assert_eq!(transport.call_count("https://cdn.test/1.jpg"), 3);
    }

    #[tokio::test]
    async fn test_cancelled_token_stops_fetch() {
        let transport = FakeTransport::new();
        transport.route("https://cdn.test/slow.jpg", Reply::Hang);

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let result = RetryPolicy::default()
            .fetch(
                &transport,
                "https://cdn.test/slow.jpg",
                &AuthContext::default(),
                &cancel,
            )
            .await;

        assert_eq!(result, Err(TransportError::Cancelled));
    }
}
