//! HTTP client for a messages-style completion endpoint.
//!
//! By default this targets the Bedrock runtime `invoke` URL derived from
//! the configured region and model id, authenticated with a bearer API key.
//! Any endpoint that accepts the same body works, which is how the tests
//! point it at a local mock server.
//!
//! Body layout:
//!
//! ```json
//! {
//!   "anthropic_version": "bedrock-2023-05-31",
//!   "max_tokens": 2000,
//!   "temperature": 0.2,
//!   "messages": [{"role": "user", "content": [{"type": "text", "text": "…"}]}]
//! }
//! ```

use super::{CompletionClient, CompletionRequest, CompletionResponse};
use crate::config::PipelineConfig;
use crate::error::{excerpt, FlowError};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE, RETRY_AFTER};
use serde::Serialize;
use std::time::Instant;
use tracing::{debug, warn};

/// Longest error body echoed back in an error message.
const MAX_ERROR_BODY: usize = 500;

/// Completion client speaking the messages wire format over HTTP.
pub struct MessagesClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    anthropic_version: String,
}

#[derive(Serialize)]
struct MessagesBody<'a> {
    anthropic_version: &'a str,
    #[serde(flatten)]
    request: &'a CompletionRequest,
}

impl MessagesClient {
    pub fn new(
        endpoint: impl Into<String>,
        anthropic_version: impl Into<String>,
    ) -> Result<Self, FlowError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| FlowError::Internal(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
            api_key: None,
            anthropic_version: anthropic_version.into(),
        })
    }

    /// Build a client from the endpoint, key and version in `config`.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, FlowError> {
        let client = Self::new(config.resolved_endpoint()?, config.anthropic_version.as_str())?;
        Ok(match config.api_key {
            Some(ref key) => client.with_api_key(key.as_str()),
            None => client,
        })
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl CompletionClient for MessagesClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, FlowError> {
        let start = Instant::now();
        let body = MessagesBody {
            anthropic_version: &self.anthropic_version,
            request,
        };

        let mut builder = self
            .http
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .json(&body);
        if let Some(ref key) = self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                FlowError::ServiceTimeout {
                    elapsed_ms: start.elapsed().as_millis() as u64,
                }
            } else {
                FlowError::ServiceError {
                    status: None,
                    message: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            let text = response.text().await.unwrap_or_default();
            warn!("Completion endpoint returned HTTP {}", status.as_u16());
            return Err(map_status_error(status.as_u16(), &text, retry_after));
        }

        let envelope: CompletionResponse =
            response.json().await.map_err(|e| FlowError::ServiceError {
                status: Some(status.as_u16()),
                message: format!("malformed response envelope: {e}"),
            })?;

        debug!(
            "Completion returned {} content block(s), stop_reason={:?}, {:?}",
            envelope.content.len(),
            envelope.stop_reason,
            start.elapsed()
        );

        envelope
            .first_text()
            .map(str::to_string)
            .ok_or_else(|| FlowError::ServiceError {
                status: Some(status.as_u16()),
                message: "response contained no text content".into(),
            })
    }
}

/// Map a non-2xx status to the matching error variant.
fn map_status_error(status: u16, body: &str, retry_after_secs: Option<u64>) -> FlowError {
    let detail = excerpt(body, MAX_ERROR_BODY);
    match status {
        401 | 403 => FlowError::AuthError { detail },
        429 => FlowError::RateLimited { retry_after_secs },
        _ => FlowError::ServiceError {
            status: Some(status),
            message: detail,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ContentPart;
    use mockito::{Matcher, Server};
    use serde_json::json;

    fn request() -> CompletionRequest {
        CompletionRequest::single_turn(vec![ContentPart::text("hello")], 2000, 0.2)
    }

    #[tokio::test]
    async fn posts_versioned_body_and_reads_first_text() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/invoke")
            .match_header("authorization", "Bearer test-key")
            .match_body(Matcher::PartialJson(json!({
                "anthropic_version": "bedrock-2023-05-31",
                "max_tokens": 2000,
                "messages": [{"role": "user", "content": [{"type": "text", "text": "hello"}]}]
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"content": [{"type": "text", "text": "[1, 2]"}], "stop_reason": "end_turn"}"#)
            .create_async()
            .await;

        let client = MessagesClient::new(format!("{}/invoke", server.url()), "bedrock-2023-05-31")
            .unwrap()
            .with_api_key("test-key");
        let text = client.complete(&request()).await.unwrap();
        assert_eq!(text, "[1, 2]");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn maps_auth_failure() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/invoke")
            .with_status(403)
            .with_body("forbidden")
            .create_async()
            .await;

        let client =
            MessagesClient::new(format!("{}/invoke", server.url()), "bedrock-2023-05-31").unwrap();
        let err = client.complete(&request()).await.unwrap_err();
        assert!(matches!(err, FlowError::AuthError { .. }), "got: {err:?}");
    }

    #[tokio::test]
    async fn maps_rate_limit_with_retry_after() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/invoke")
            .with_status(429)
            .with_header("retry-after", "7")
            .create_async()
            .await;

        let client =
            MessagesClient::new(format!("{}/invoke", server.url()), "bedrock-2023-05-31").unwrap();
        let err = client.complete(&request()).await.unwrap_err();
        assert!(matches!(
            err,
            FlowError::RateLimited {
                retry_after_secs: Some(7)
            }
        ));
    }

    #[tokio::test]
    async fn empty_content_is_a_service_error() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/invoke")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"content": []}"#)
            .create_async()
            .await;

        let client =
            MessagesClient::new(format!("{}/invoke", server.url()), "bedrock-2023-05-31").unwrap();
        let err = client.complete(&request()).await.unwrap_err();
        assert!(matches!(err, FlowError::ServiceError { status: Some(200), .. }));
    }

    #[test]
    fn map_status_error_server_side() {
        let err = map_status_error(503, "overloaded", None);
        assert!(err.is_transient());
        assert!(err.to_string().contains("overloaded"));
    }
}
