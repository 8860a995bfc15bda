//! Bounded-timeout and exponential-backoff layer around any client.
//!
//! With the default policy (no timeout, zero retries) this performs exactly
//! one blocking call and returns its outcome untouched. Only errors for which
//! [`FlowError::is_transient`] holds are retried; the wait doubles after each
//! attempt (`backoff_ms * 2^(attempt-1)`) unless the service named a
//! `retry-after` delay, which is honoured up to
//! [`RETRY_AFTER_CAP_FACTOR`] times the computed backoff.

use super::{CompletionClient, CompletionRequest};
use crate::config::PipelineConfig;
use crate::error::FlowError;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::time::{sleep, timeout, Duration};
use tracing::warn;

/// A server-requested `retry-after` never waits longer than this many
/// times the exponential backoff for the same attempt.
pub const RETRY_AFTER_CAP_FACTOR: u64 = 20;

/// Timeout and retry settings for outbound completion calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_ms: u64,
    pub timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            backoff_ms: 500,
            timeout: None,
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            backoff_ms: config.retry_backoff_ms,
            timeout: config.api_timeout_secs.map(Duration::from_secs),
        }
    }

    /// Delay before retry number `attempt` (1-based).
    fn backoff_for(&self, attempt: u32, retry_after_secs: Option<u64>) -> Duration {
        let backoff_ms = self
            .backoff_ms
            .saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)));
        match retry_after_secs {
            Some(secs) => Duration::from_secs(secs).min(Duration::from_millis(
                backoff_ms.saturating_mul(RETRY_AFTER_CAP_FACTOR),
            )),
            None => Duration::from_millis(backoff_ms),
        }
    }
}

/// Wraps a client with a [`RetryPolicy`].
pub struct RetryingClient {
    inner: Arc<dyn CompletionClient>,
    policy: RetryPolicy,
}

impl RetryingClient {
    pub fn new(inner: Arc<dyn CompletionClient>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    async fn attempt(&self, request: &CompletionRequest) -> Result<String, FlowError> {
        match self.policy.timeout {
            Some(limit) => match timeout(limit, self.inner.complete(request)).await {
                Ok(result) => result,
                Err(_) => Err(FlowError::ServiceTimeout {
                    elapsed_ms: limit.as_millis() as u64,
                }),
            },
            None => self.inner.complete(request).await,
        }
    }
}

#[async_trait]
impl CompletionClient for RetryingClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, FlowError> {
        let mut attempt = 0u32;
        loop {
            match self.attempt(request).await {
                Ok(text) => return Ok(text),
                Err(e) if e.is_transient() && attempt < self.policy.max_retries => {
                    attempt += 1;
                    let retry_after = match &e {
                        FlowError::RateLimited { retry_after_secs } => *retry_after_secs,
                        _ => None,
                    };
                    let delay = self.policy.backoff_for(attempt, retry_after);
                    warn!(
                        "Completion call failed ({}); retry {}/{} after {}ms",
                        e,
                        attempt,
                        self.policy.max_retries,
                        delay.as_millis()
                    );
                    sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ContentPart, ScriptedClient};

    fn request() -> CompletionRequest {
        CompletionRequest::single_turn(vec![ContentPart::text("x")], 10, 0.2)
    }

    fn unavailable() -> FlowError {
        FlowError::ServiceError {
            status: Some(503),
            message: "unavailable".into(),
        }
    }

    #[tokio::test]
    async fn default_policy_makes_exactly_one_call() {
        let stub = Arc::new(ScriptedClient::new().with_error(unavailable()).with_reply("late"));
        let client = RetryingClient::new(stub.clone(), RetryPolicy::default());
        assert!(client.complete(&request()).await.is_err());
        assert_eq!(stub.call_count(), 1);
    }

    #[tokio::test]
    async fn transient_errors_are_retried() {
        let stub = Arc::new(
            ScriptedClient::new()
                .with_error(unavailable())
                .with_error(unavailable())
                .with_reply("ok"),
        );
        let policy = RetryPolicy {
            max_retries: 3,
            backoff_ms: 1,
            timeout: None,
        };
        let client = RetryingClient::new(stub.clone(), policy);
        assert_eq!(client.complete(&request()).await.unwrap(), "ok");
        assert_eq!(stub.call_count(), 3);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let stub = Arc::new(
            ScriptedClient::new()
                .with_error(FlowError::AuthError {
                    detail: "bad key".into(),
                })
                .with_reply("never"),
        );
        let policy = RetryPolicy {
            max_retries: 3,
            backoff_ms: 1,
            timeout: None,
        };
        let client = RetryingClient::new(stub.clone(), policy);
        assert!(matches!(
            client.complete(&request()).await,
            Err(FlowError::AuthError { .. })
        ));
        assert_eq!(stub.call_count(), 1);
    }

    #[test]
    fn backoff_doubles() {
        let policy = RetryPolicy {
            max_retries: 3,
            backoff_ms: 500,
            timeout: None,
        };
        assert_eq!(policy.backoff_for(1, None), Duration::from_millis(500));
        assert_eq!(policy.backoff_for(2, None), Duration::from_millis(1000));
        assert_eq!(policy.backoff_for(3, None), Duration::from_millis(2000));
        assert_eq!(policy.backoff_for(1, Some(4)), Duration::from_secs(4));
    }

    #[test]
    fn retry_after_is_capped() {
        let policy = RetryPolicy {
            max_retries: 3,
            backoff_ms: 500,
            timeout: None,
        };
        assert_eq!(policy.backoff_for(1, Some(86_400)), Duration::from_secs(10));
        assert_eq!(policy.backoff_for(2, Some(86_400)), Duration::from_secs(20));
    }

    #[tokio::test]
    async fn huge_retry_after_does_not_stall_the_run() {
        let stub = Arc::new(
            ScriptedClient::new()
                .with_error(FlowError::RateLimited {
                    retry_after_secs: Some(86_400),
                })
                .with_reply("ok"),
        );
        let policy = RetryPolicy {
            max_retries: 1,
            backoff_ms: 1,
            timeout: None,
        };
        let client = RetryingClient::new(stub.clone(), policy);
        let result = tokio::time::timeout(Duration::from_secs(5), client.complete(&request())).await;
        assert_eq!(result.expect("retry wait was not capped").unwrap(), "ok");
        assert_eq!(stub.call_count(), 2);
    }

    #[test]
    fn policy_from_config() {
        let config = PipelineConfig::builder()
            .max_retries(2)
            .api_timeout_secs(30)
            .build()
            .unwrap();
        let policy = RetryPolicy::from_config(&config);
        assert_eq!(policy.max_retries, 2);
        assert_eq!(policy.timeout, Some(Duration::from_secs(30)));
    }
}
